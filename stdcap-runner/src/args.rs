//! Command-line arguments for the stdcap runner.

use clap::{
    Parser,
    builder::{PossibleValuesParser, TypedValueParser, styling},
};
use std::path::PathBuf;
use stdcap_core::CaptureMethod;
use strum::VariantNames;

use crate::events;

const SHORT_DESCRIPTION: &str = "Run shell test cases with per-test output capture";

const LONG_DESCRIPTION: &str = r"
stdcap runs the cases in YAML test files, capturing everything each case writes to
standard output and standard error. Captured output is only shown for failing cases.
";

/// Format for reporting results.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, clap::ValueEnum, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Per-case results, captured output of failures, and a summary.
    #[default]
    Pretty,
    /// One character per case, failures, and a summary.
    Terse,
}

/// Parsed command-line arguments for the runner.
#[derive(Parser)]
#[clap(name = "stdcap",
       version,
       about = SHORT_DESCRIPTION,
       long_about = LONG_DESCRIPTION,
       author,
       styles = help_styles())]
#[allow(clippy::module_name_repetitions)]
pub struct CommandLineArgs {
    /// Per-test capturing method.
    #[clap(
        long = "capture",
        value_name = "METHOD",
        value_parser = PossibleValuesParser::new(CaptureMethod::VARIANTS)
            .try_map(|name| CaptureMethod::parse(&name)),
    )]
    pub capture: Option<CaptureMethod>,

    /// Shortcut for --capture=no.
    #[clap(short = 's', conflicts_with = "capture")]
    pub no_capture: bool,

    /// Show setup and teardown of each case as it happens.
    #[clap(long = "setup-show")]
    pub setup_show: bool,

    /// After a failing case, show its output and wait for Enter.
    #[clap(long = "pause-on-failure")]
    pub pause_on_failure: bool,

    /// Path to a configuration file.
    #[clap(long = "config", value_name = "PATH", env = "STDCAP_CONFIG")]
    pub config_file: Option<PathBuf>,

    /// Don't load any configuration file.
    #[clap(long = "no-config", conflicts_with = "config_file")]
    pub no_config: bool,

    /// Result reporting format.
    #[clap(long = "format")]
    pub format: Option<OutputFormat>,

    /// Enable debug logging for classes of tracing events.
    #[clap(long = "debug", value_name = "EVENT")]
    pub enabled_debug_events: Vec<events::TraceEvent>,

    /// Disable logging for classes of tracing events.
    #[clap(long = "disable-event", value_name = "EVENT")]
    pub disabled_events: Vec<events::TraceEvent>,

    /// Test files, or directories to search for `*.yaml` test files.
    #[clap(required = true)]
    pub paths: Vec<PathBuf>,
}

/// Returns clap styling to be used for command-line help.
#[doc(hidden)]
fn help_styles() -> clap::builder::Styles {
    styling::Styles::styled()
        .header(
            styling::AnsiColor::Yellow.on_default()
                | styling::Effects::BOLD
                | styling::Effects::UNDERLINE,
        )
        .usage(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .literal(styling::AnsiColor::Magenta.on_default() | styling::Effects::BOLD)
        .placeholder(styling::AnsiColor::Cyan.on_default())
}
