//! Command-line entry point for the `stdcap` runner.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::process::ExitCode;

use clap::Parser;
use stdcap_runner::{TestRunner, args::CommandLineArgs, config, events, reporting};

/// Exit code for usage errors, internal errors, and interrupted runs.
const EXIT_ERROR: u8 = 2;

fn main() -> ExitCode {
    //
    // Set up panic handler. On release builds, it will capture panic details to a
    // temporary .toml file and report a human-readable message to the screen.
    //
    human_panic::setup_panic!(
        human_panic::Metadata::new(env!("CARGO_BIN_NAME"), env!("CARGO_PKG_VERSION"))
            .homepage(env!("CARGO_PKG_REPOSITORY"))
            .support("please file an issue at https://github.com/stdcap/stdcap/issues/new")
    );

    //
    // Parse args.
    //
    let args = match CommandLineArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();

            // clap returns errors for `--help` and `--version` too.
            return match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    ExitCode::SUCCESS
                }
                _ => ExitCode::from(EXIT_ERROR),
            };
        }
    };

    // Initialize tracing.
    let mut event_config = events::TraceEventConfig::init(&args.enabled_debug_events);
    for event in &args.disabled_events {
        if let Err(e) = event_config.disable(*event) {
            tracing::warn!("failed to disable {event} events: {e}");
        }
    }

    // Load configuration; only an explicitly requested file is required to load.
    let loaded = config::load_config(args.no_config, args.config_file.as_deref());
    if let Some(e) = &loaded.error {
        let path = loaded
            .path
            .as_ref()
            .map_or_else(String::new, |p| p.display().to_string());
        if loaded.explicit_path {
            tracing::error!("error: {path}: {e}");
            return ExitCode::from(EXIT_ERROR);
        }
        tracing::warn!("ignoring configuration in {path}: {e}");
    }
    let settings = loaded.config.to_settings(&args);

    let mut runner = TestRunner::new(settings.clone());

    #[cfg(unix)]
    if let Err(e) = signal_hook::flag::register(signal_hook::consts::SIGINT, runner.interrupt_flag())
    {
        tracing::warn!("failed to install interrupt handler: {e}");
    }

    //
    // Run.
    //
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| runner.run(&args.paths)));

    let results = match outcome {
        Ok(Ok(results)) => results,
        Ok(Err(e)) => {
            runner.abort();
            tracing::error!("error: {e:#}");
            return ExitCode::from(EXIT_ERROR);
        }
        Err(payload) => {
            runner.abort();
            tracing::error!("internal error: {}", panic_message(payload.as_ref()));
            return ExitCode::from(EXIT_ERROR);
        }
    };

    if let Err(e) = reporting::report_results(&mut std::io::stdout().lock(), &results, settings.format)
    {
        tracing::error!("failed to report results: {e:#}");
        return ExitCode::from(EXIT_ERROR);
    }

    if results.interrupted {
        ExitCode::from(EXIT_ERROR)
    } else if results.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
