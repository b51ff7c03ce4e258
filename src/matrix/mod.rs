pub mod config;
pub mod executor;
pub mod job;
pub mod runner;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use config::{CommandSpec, FailurePolicy, MatrixConfig, OperationSpec, QuerySource};
pub use executor::{Completion, JobExecutor, ProcessExecutor};
pub use job::{BenchmarkJob, Invocation, JobOutcome, JobStatus};
pub use runner::{MatrixPaths, MatrixReport, MatrixRunner, RowReport};

/// The columns of the benchmark matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Build,
    Decode,
    Access,
    NextGeq,
    And,
    Or,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Build => "build",
            Operation::Decode => "decode",
            Operation::Access => "access",
            Operation::NextGeq => "next_geq",
            Operation::And => "and",
            Operation::Or => "or",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which output stream of an invocation carries the benchmark numbers.
/// It is appended to the result log, the other stream goes to the harness' own terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}
