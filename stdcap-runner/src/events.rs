//! Tracing configuration for the runner.

use std::collections::HashSet;

use tracing_subscriber::{
    Layer, Registry, filter::Targets, layer::SubscriberExt, reload::Handle,
    util::SubscriberInitExt,
};

use crate::trace_categories;

/// Type of event to trace.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, clap::ValueEnum, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum TraceEvent {
    /// Traces stream capture transitions.
    Capture,
    /// Traces capture fixtures.
    Fixtures,
    /// Traces entry and exit of test phases.
    Phases,
    /// Traces test discovery and command execution.
    Runner,
}

impl TraceEvent {
    const fn target(self) -> &'static str {
        match self {
            Self::Capture => "capture",
            Self::Fixtures => "fixtures",
            Self::Phases => "phases",
            Self::Runner => trace_categories::RUNNER,
        }
    }
}

/// Errors from changing the tracing configuration.
#[derive(Debug, thiserror::Error)]
pub enum TraceConfigError {
    /// Tracing was never initialized.
    #[error("tracing not initialized")]
    NotInitialized,
    /// The filter could not be swapped.
    #[error("failed to update tracing filter: {0}")]
    Reload(#[from] tracing_subscriber::reload::Error),
}

/// Tracks which trace events are enabled and holds the handle used to update the
/// installed filter.
#[derive(Default)]
pub struct TraceEventConfig {
    enabled_trace_events: HashSet<TraceEvent>,
    handle: Option<Handle<Targets, Registry>>,
}

impl TraceEventConfig {
    /// Installs the global subscriber with the given events enabled.
    ///
    /// Events are written to standard error; while a phase's output is being captured,
    /// they land in that phase's captured standard error.
    pub fn init(enabled_events: &[TraceEvent]) -> Self {
        let mut config = Self {
            enabled_trace_events: enabled_events.iter().copied().collect(),
            ..Default::default()
        };

        let filter = config.compose_filter();

        // Make the filter reloadable so that we can change the log level at runtime.
        let (reload_filter, handle) = tracing_subscriber::reload::Layer::new(filter);

        let layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .without_time()
            .with_target(false)
            .with_filter(reload_filter);

        if tracing_subscriber::registry()
            .with(layer)
            .try_init()
            .is_ok()
        {
            config.handle = Some(handle);
        } else {
            // Something went wrong; proceed on anyway but complain audibly.
            eprintln!("warning: failed to initialize tracing.");
        }

        config
    }

    fn compose_filter(&self) -> Targets {
        let mut filter =
            Targets::new().with_default(tracing_subscriber::filter::LevelFilter::INFO);

        for event in &self.enabled_trace_events {
            filter = filter.with_target(event.target(), tracing::Level::DEBUG);
        }

        filter
    }

    /// Disables an event class.
    pub fn disable(&mut self, event: TraceEvent) -> Result<(), TraceConfigError> {
        // Don't bother to reload config if nothing has changed.
        if !self.enabled_trace_events.remove(&event) {
            return Ok(());
        }

        self.reload_filter()
    }

    fn reload_filter(&self) -> Result<(), TraceConfigError> {
        let handle = self.handle.as_ref().ok_or(TraceConfigError::NotInitialized)?;
        handle.reload(self.compose_filter())?;
        Ok(())
    }
}
