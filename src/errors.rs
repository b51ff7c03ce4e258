use std::{io, path::PathBuf};

use thiserror::Error;

use crate::matrix::Operation;

/// Error type for argument validation, file IO, configuration and job failures.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("io error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("{failed} job(s) failed, first: {operation} #{repetition} for codec '{codec}': {cause}")]
    SubprocessFailure {
        codec: String,
        operation: Operation,
        repetition: usize,
        cause: String,
        failed: usize,
    },
    #[error("matrix aborted: {0}")]
    Aborted(String),
}

impl HarnessError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        HarnessError::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit status for a run that ended with this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            HarnessError::InvalidArgument(_) | HarnessError::Configuration(_) => 2,
            HarnessError::Io { .. } => 3,
            HarnessError::SubprocessFailure { .. } => 4,
            HarnessError::Aborted(_) => 5,
        }
    }
}

/// Maps an error chain to an exit status, 1 if no `HarnessError` is involved.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<HarnessError>())
        .map_or(1, HarnessError::exit_code)
}

#[cfg(test)]
mod tests {
    use super::{exit_code, HarnessError};
    use anyhow::Context;

    #[test]
    fn exit_codes_are_distinct_per_stage() {
        let codes = [
            HarnessError::InvalidArgument("u".into()).exit_code(),
            HarnessError::io("x", std::io::ErrorKind::NotFound.into()).exit_code(),
            HarnessError::Aborted("x".into()).exit_code(),
        ];
        assert_eq!(codes, [2, 3, 5]);
    }

    #[test]
    fn exit_code_looks_through_context() {
        let err = Err::<(), _>(HarnessError::InvalidArgument("upper bound".into()))
            .context("sampling pairs")
            .unwrap_err();
        assert_eq!(exit_code(&err), 2);
        assert_eq!(exit_code(&anyhow::anyhow!("plain")), 1);
    }
}
