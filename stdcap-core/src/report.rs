//! Reports that captured output is attached to.

/// A test-execution phase.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum_macros::Display, strum_macros::EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    /// Preparing the test.
    Setup,
    /// Running the test body.
    Call,
    /// Cleaning up after the test.
    Teardown,
}

/// A titled block of text attached to a report.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Section {
    /// Title of the section, e.g. `Captured stdout call`.
    pub title: String,
    /// Contents of the section.
    pub content: String,
}

/// Something captured output can be attached to.
pub trait ReportSink {
    /// Attaches captured text for one stream of one phase.
    ///
    /// Arguments:
    ///
    /// * `phase`: The phase the text was captured during.
    /// * `key`: The stream the text was captured from (`stdout` or `stderr`).
    /// * `content`: The captured text.
    fn add_report_section(&mut self, phase: Phase, key: &str, content: &str);
}

/// Outcome of running one phase.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// The phase completed successfully.
    Passed,
    /// The phase failed.
    Failed(String),
    /// The phase was not run.
    Skipped(String),
}

impl Outcome {
    /// Returns whether the outcome is a failure.
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Accumulated report for one test item.
#[derive(Clone, Debug, Default)]
pub struct ItemReport {
    /// Name of the item.
    pub name: String,
    /// Outcome of each phase that ran, in order.
    pub outcomes: Vec<(Phase, Outcome)>,
    /// Attached sections, in the order they were added.
    pub sections: Vec<Section>,
}

impl ItemReport {
    /// Creates an empty report for the named item.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Records the outcome of a phase.
    pub fn set_outcome(&mut self, phase: Phase, outcome: Outcome) {
        self.outcomes.push((phase, outcome));
    }

    /// Returns the outcome of the given phase, if it ran.
    pub fn outcome(&self, phase: Phase) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find_map(|(p, o)| (*p == phase).then_some(o))
    }

    /// Returns whether any phase failed.
    pub fn failed(&self) -> bool {
        self.outcomes.iter().any(|(_, o)| o.is_failure())
    }

    /// Returns the text captured from `key` during `phase`, or an empty string if nothing
    /// was captured.
    pub fn captured(&self, phase: Phase, key: &str) -> &str {
        let title = section_title(phase, key);
        self.sections
            .iter()
            .find(|s| s.title == title)
            .map_or("", |s| s.content.as_str())
    }
}

impl ReportSink for ItemReport {
    fn add_report_section(&mut self, phase: Phase, key: &str, content: &str) {
        if content.is_empty() {
            return;
        }

        let title = section_title(phase, key);
        if let Some(existing) = self.sections.iter_mut().find(|s| s.title == title) {
            existing.content.push_str(content);
        } else {
            self.sections.push(Section {
                title,
                content: content.to_owned(),
            });
        }
    }
}

fn section_title(phase: Phase, key: &str) -> String {
    std::format!("Captured {key} {phase}")
}

/// Report for collecting one test file.
#[derive(Clone, Debug, Default)]
pub struct CollectReport {
    /// The file that was collected.
    pub source: String,
    /// The failure encountered while collecting, if any.
    pub failure: Option<String>,
    /// Attached sections.
    pub sections: Vec<Section>,
}

impl CollectReport {
    /// Creates an empty report for the given source.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    /// Attaches captured collection output. Empty text is not recorded.
    pub fn add_captured(&mut self, key: &str, content: &str) {
        if !content.is_empty() {
            self.sections.push(Section {
                title: std::format!("Captured {key}"),
                content: content.to_owned(),
            });
        }
    }
}
