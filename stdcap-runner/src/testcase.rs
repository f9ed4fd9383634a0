//! Test case definitions and YAML schema.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use anyhow::Context;
use stdcap_core::FixtureKind;

/// A single test case.
#[derive(Clone, Debug, Deserialize)]
pub struct TestCase {
    /// Name of the test case.
    pub name: String,

    /// Command to run during the setup phase.
    #[serde(default)]
    pub setup: Option<String>,

    /// Command to run during the call phase.
    pub run: String,

    /// Command to run during the teardown phase.
    #[serde(default)]
    pub teardown: Option<String>,

    /// Capture fixtures requested by the case.
    #[serde(default)]
    pub fixtures: Vec<FixtureKind>,

    /// Input to provide to the case's commands. When set, standard input is fed from this
    /// text instead of the captured (empty) standard input.
    #[serde(default)]
    pub stdin: Option<String>,

    /// Expected standard output of the call phase.
    #[serde(default)]
    pub expect_stdout: Option<String>,

    /// Expected standard error of the call phase.
    #[serde(default)]
    pub expect_stderr: Option<String>,
}

impl TestCase {
    /// Returns whether this test case has any output expectations.
    pub const fn has_expectations(&self) -> bool {
        self.expect_stdout.is_some() || self.expect_stderr.is_some()
    }
}

/// A set of test cases loaded from a single YAML file.
#[derive(Clone, Debug, Deserialize)]
pub struct TestFile {
    /// Name of the test file's suite.
    #[serde(default)]
    pub name: Option<String>,

    /// The test cases in this file.
    pub cases: Vec<TestCase>,

    /// Path to the YAML file (computed at load time).
    #[serde(skip)]
    pub source_file: PathBuf,
}

impl TestFile {
    /// Loads and parses a test file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("opening {}", path.display()))?;
        let mut test_file: Self = serde_yaml::from_reader(file)
            .with_context(|| format!("parsing {}", path.display()))?;

        test_file.source_file = path.to_path_buf();

        Ok(test_file)
    }

    /// Returns the name used to identify this file in reports.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.source_file.display().to_string())
    }
}

/// Expands the given paths into the list of YAML test files to run. Directories are
/// searched recursively.
pub fn discover(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = vec![];

    for path in paths {
        if path.is_dir() {
            let pattern = path.join("**/*.yaml").to_string_lossy().to_string();
            let mut found = glob::glob(&pattern)
                .with_context(|| format!("invalid search pattern: {pattern}"))?
                .collect::<Result<Vec<_>, _>>()?;
            found.sort();
            files.extend(found);
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            anyhow::bail!("file or directory not found: {}", path.display());
        }
    }

    Ok(files)
}
