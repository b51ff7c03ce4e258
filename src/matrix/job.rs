use std::{ffi::OsString, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use super::{
    config::{MatrixConfig, OperationSpec, QuerySource},
    runner::MatrixPaths,
    Operation, OutputStream,
};

/// One external invocation of the matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkJob {
    pub codec: String,
    pub operation: Operation,
    pub repetition: usize,
    pub artifact: PathBuf,
    pub query_source: Option<PathBuf>,
}

/// Argument vector of a job. Nothing goes through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub stdin: Option<PathBuf>,
    pub capture: OutputStream,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>, capture: OutputStream) -> Self {
        Self {
            program: program.into(),
            args: vec![],
            stdin: None,
            capture,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn stdin(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    Failed { cause: String },
    TimedOut,
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job: BenchmarkJob,
    #[serde(flatten)]
    pub status: JobStatus,
    pub elapsed_ms: u64,
}

impl JobOutcome {
    pub fn new(job: BenchmarkJob, status: JobStatus, elapsed: Duration) -> Self {
        Self {
            job,
            status,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn skipped(job: BenchmarkJob, reason: &str) -> Self {
        Self::new(
            job,
            JobStatus::Skipped {
                reason: reason.to_string(),
            },
            Duration::ZERO,
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self.status,
            JobStatus::Failed { .. } | JobStatus::TimedOut
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedJob {
    pub job: BenchmarkJob,
    pub invocation: Invocation,
}

/// Expand the configured operations into the ordered job list of one codec:
/// build first, then every operation in configured order, per input file, per repetition.
pub fn plan_row(config: &MatrixConfig, paths: &MatrixPaths, codec: &str) -> Vec<PlannedJob> {
    let artifact = paths.artifact(codec);
    let mut planned = vec![];
    for spec in &config.operations {
        for source in query_sources(spec, paths) {
            for repetition in 0..spec.repetitions {
                let invocation = invocation(spec, paths, codec, source.as_ref());
                planned.push(PlannedJob {
                    job: BenchmarkJob {
                        codec: codec.to_string(),
                        operation: spec.kind,
                        repetition,
                        artifact: artifact.clone(),
                        query_source: source.clone(),
                    },
                    invocation,
                });
            }
        }
    }
    planned
}

fn query_sources(spec: &OperationSpec, paths: &MatrixPaths) -> Vec<Option<PathBuf>> {
    match &spec.input {
        QuerySource::None => vec![None],
        QuerySource::QueryLog { suffixes } => suffixes
            .iter()
            .map(|suffix| {
                let mut path = OsString::from(paths.queries.as_os_str());
                path.push(suffix);
                Some(PathBuf::from(path))
            })
            .collect(),
        QuerySource::File { path } => vec![Some(path.clone())],
        QuerySource::Documents => vec![Some(paths.collection.clone())],
    }
}

fn invocation(
    spec: &OperationSpec,
    paths: &MatrixPaths,
    codec: &str,
    source: Option<&PathBuf>,
) -> Invocation {
    let mut inv = Invocation::new(&spec.command.program, spec.stream);
    if spec.command.pass_codec {
        inv = inv.arg(codec);
    }
    let artifact = paths.artifact(codec);
    if spec.kind == Operation::Build {
        inv = inv.arg(&paths.collection).arg("--out").arg(artifact);
    } else {
        inv = inv.arg(artifact);
        if let Some(bound) = spec.repetition_bound {
            inv = inv.arg(bound.to_string());
        }
        match (&spec.input, source) {
            (QuerySource::Documents, Some(docs)) => inv = inv.arg(docs),
            (QuerySource::QueryLog { .. } | QuerySource::File { .. }, Some(queries)) => {
                inv = inv.stdin(queries)
            }
            _ => {}
        }
    }
    for extra in &spec.command.args {
        inv = inv.arg(extra);
    }
    inv
}
