//! Build-tool task execution and test-report assembly.
//!
//! Only the tasks named by [`TaskId`] can run. Each maps to a fixed argument
//! list, so nothing a client sends ever reaches the command line.

mod report;
mod runner;

pub use report::{assemble_report, ReportLocation, REPORT_PLACEHOLDER};
pub use runner::{TaskOutcome, TaskRunner};

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::OnboardError;

/// Permitted build-tool tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskId {
    Test,
    Check,
    Build,
    Clean,
    /// The BDD feature suite.
    Cucumber,
}

impl TaskId {
    pub const ALL: [TaskId; 5] = [
        TaskId::Test,
        TaskId::Check,
        TaskId::Build,
        TaskId::Clean,
        TaskId::Cucumber,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Check => "check",
            Self::Build => "build",
            Self::Clean => "clean",
            Self::Cucumber => "cucumber",
        }
    }

    /// Arguments appended after the configured program and prefix arguments.
    pub fn args(self) -> &'static [&'static str] {
        match self {
            Self::Test => &["test"],
            Self::Check => &["check"],
            Self::Build => &["build", "-x", "test"],
            Self::Clean => &["clean"],
            Self::Cucumber => &["test", "--tests", "com.example.bdd.CucumberTestSuite"],
        }
    }

    /// Whether a successful run leaves an HTML test report behind.
    pub fn produces_report(self) -> bool {
        matches!(self, Self::Test | Self::Check | Self::Cucumber)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskId {
    type Err = OnboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(OnboardError::validation("taskName must not be empty"));
        }
        TaskId::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| OnboardError::validation(format!("unknown task '{s}'")))
    }
}
