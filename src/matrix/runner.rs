use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{
    config::{FailurePolicy, MatrixConfig},
    executor::{Completion, JobExecutor, ProcessExecutor},
    job::{self, JobOutcome, JobStatus, PlannedJob},
    Operation,
};
use crate::{
    errors::HarnessError,
    results::{with_suffix, CodecLogs},
};

/// The positional inputs of a matrix run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixPaths {
    pub collection: PathBuf,
    /// Prefix for artifacts (`<prefix>.<codec>.bin`) and result logs.
    pub prefix: PathBuf,
    /// Query log basename, partition suffixes are appended to it.
    pub queries: PathBuf,
}

impl MatrixPaths {
    pub fn new(
        collection: impl Into<PathBuf>,
        prefix: impl Into<PathBuf>,
        queries: impl Into<PathBuf>,
    ) -> Self {
        Self {
            collection: collection.into(),
            prefix: prefix.into(),
            queries: queries.into(),
        }
    }

    pub fn artifact(&self, codec: &str) -> PathBuf {
        with_suffix(&self.prefix, &format!("{}.bin", codec))
    }

    /// Where the job outcomes of a run are stored.
    pub fn report(&self) -> PathBuf {
        with_suffix(&self.prefix, "outcomes.json")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowReport {
    pub codec: String,
    pub artifact: PathBuf,
    pub result_logs: Vec<PathBuf>,
    pub outcomes: Vec<JobOutcome>,
    pub artifact_removed: bool,
}

impl RowReport {
    pub fn failures(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixReport {
    pub rows: Vec<RowReport>,
    pub aborted: bool,
}

impl MatrixReport {
    pub fn failures(&self) -> impl Iterator<Item = &JobOutcome> {
        self.rows.iter().flat_map(RowReport::failures)
    }

    pub fn write_json(&self, path: &Path) -> Result<(), HarnessError> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| HarnessError::Configuration(e.to_string()))?;
        fs::write(path, text).map_err(|e| HarnessError::io(path, e))
    }

    /// Collapse the report into the error a caller should exit with, if any.
    pub fn into_result(self) -> Result<(), HarnessError> {
        let failed = self.failures().count();
        let first = self.failures().next().cloned();
        if self.aborted {
            return Err(HarnessError::Aborted(format!(
                "{} job(s) failed before the matrix was stopped",
                failed
            )));
        }
        match first {
            None => Ok(()),
            Some(outcome) => Err(HarnessError::SubprocessFailure {
                codec: outcome.job.codec,
                operation: outcome.job.operation,
                repetition: outcome.job.repetition,
                cause: match outcome.status {
                    JobStatus::Failed { cause } => cause,
                    _ => "timed out".to_string(),
                },
                failed,
            }),
        }
    }
}

/// Runs the build-then-operate row of every configured codec.
pub struct MatrixRunner<E = ProcessExecutor> {
    config: MatrixConfig,
    paths: MatrixPaths,
    executor: E,
}

impl MatrixRunner<ProcessExecutor> {
    pub fn new(config: MatrixConfig, paths: MatrixPaths) -> Result<Self, HarnessError> {
        Self::with_executor(config, paths, ProcessExecutor::default())
    }
}

impl<E: JobExecutor> MatrixRunner<E> {
    pub fn with_executor(
        config: MatrixConfig,
        paths: MatrixPaths,
        executor: E,
    ) -> Result<Self, HarnessError> {
        config.validate()?;
        Ok(Self {
            config,
            paths,
            executor,
        })
    }

    /// Fail fast on missing input files, before any job writes output.
    pub fn check_inputs(&self) -> Result<(), HarnessError> {
        let mut required = vec![];
        if self.config.builds() {
            required.push(self.paths.collection.clone());
        }
        // query sources are the same for every codec
        if let Some(codec) = self.config.codecs.first() {
            required.extend(
                job::plan_row(&self.config, &self.paths, codec)
                    .into_iter()
                    .filter_map(|planned| planned.job.query_source),
            );
        }
        match required.into_iter().find(|path| !path.exists()) {
            Some(missing) => Err(HarnessError::io(
                missing,
                io::Error::new(io::ErrorKind::NotFound, "input file does not exist"),
            )),
            None => Ok(()),
        }
    }

    /// Run all rows. Rows are independent, so with `parallelism > 1` they are spread
    /// over a thread pool; the report keeps the configured codec order either way.
    pub fn run(&self) -> Result<MatrixReport, HarnessError> {
        let abort = AtomicBool::new(false);
        let rows: Vec<RowReport> = if self.config.parallelism > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.parallelism)
                .build()
                .map_err(|e| HarnessError::Configuration(e.to_string()))?;
            pool.install(|| {
                self.config
                    .codecs
                    .par_iter()
                    .map(|codec| self.run_row(codec, &abort))
                    .collect()
            })
        } else {
            self.config
                .codecs
                .iter()
                .map(|codec| self.run_row(codec, &abort))
                .collect()
        };
        Ok(MatrixReport {
            rows,
            aborted: abort.load(Ordering::SeqCst),
        })
    }

    fn run_row(&self, codec: &str, abort: &AtomicBool) -> RowReport {
        let logs = CodecLogs::new(self.config.layout, &self.paths.prefix, codec);
        let artifact = self.paths.artifact(codec);
        let plan = job::plan_row(&self.config, &self.paths, codec);
        tracing::info!("codec {}: {} jobs", codec, plan.len());

        let mut outcomes = Vec::with_capacity(plan.len());
        let aborted = abort.load(Ordering::SeqCst);
        if !aborted && !self.config.builds() && !artifact.exists() {
            tracing::warn!("codec {}: no artifact at {}", codec, artifact.display());
            let cause = format!("index artifact {} missing", artifact.display());
            outcomes.extend(plan.into_iter().map(|planned| {
                let status = JobStatus::Failed {
                    cause: cause.clone(),
                };
                JobOutcome::new(planned.job, status, Duration::ZERO)
            }));
            // the row is already over, only an abort carries past it
            if let Some(first) = outcomes.first() {
                self.apply_policy(first, abort);
            }
            return self.row_report(codec, artifact, &logs, outcomes);
        }
        let mut halted: Option<String> = None;
        for planned in plan {
            if halted.is_none() && abort.load(Ordering::SeqCst) {
                halted = Some("matrix aborted".to_string());
            }
            if let Some(reason) = &halted {
                outcomes.push(JobOutcome::skipped(planned.job, reason));
                continue;
            }
            let outcome = self.execute(planned, &logs);
            if outcome.is_failure() {
                halted = self.apply_policy(&outcome, abort);
            }
            outcomes.push(outcome);
        }

        self.row_report(codec, artifact, &logs, outcomes)
    }

    /// Finish a row: reclaim the artifact if configured and summarize the outcomes.
    fn row_report(
        &self,
        codec: &str,
        artifact: PathBuf,
        logs: &CodecLogs,
        outcomes: Vec<JobOutcome>,
    ) -> RowReport {
        let artifact_removed = self.config.cleanup && remove_artifact(codec, &artifact);
        RowReport {
            codec: codec.to_string(),
            artifact,
            result_logs: logs.paths(self.config.operations.iter().map(|op| op.kind)),
            outcomes,
            artifact_removed,
        }
    }

    fn execute(&self, planned: PlannedJob, logs: &CodecLogs) -> JobOutcome {
        let PlannedJob { job, invocation } = planned;
        let log = logs.log_for(job.operation);
        tracing::info!(
            "codec {}: {} #{}{}",
            job.codec,
            job.operation,
            job.repetition,
            job.query_source
                .as_ref()
                .map(|q| format!(" ({})", q.display()))
                .unwrap_or_default()
        );
        let started = Instant::now();
        let status = match self
            .executor
            .execute(&invocation, &log, self.config.timeout())
        {
            Ok(Completion::Exited { success: true, .. }) => JobStatus::Succeeded,
            Ok(Completion::Exited {
                code: Some(code), ..
            }) => JobStatus::Failed {
                cause: format!("exit status {}", code),
            },
            Ok(Completion::Exited { code: None, .. }) => JobStatus::Failed {
                cause: "terminated by signal".to_string(),
            },
            Ok(Completion::TimedOut) => JobStatus::TimedOut,
            Err(err) => JobStatus::Failed {
                cause: err.to_string(),
            },
        };
        JobOutcome::new(job, status, started.elapsed())
    }

    /// Decide how the row continues after a failed job. Returns why the remaining jobs
    /// of the row are skipped, if they are.
    fn apply_policy(&self, outcome: &JobOutcome, abort: &AtomicBool) -> Option<String> {
        let job = &outcome.job;
        let policy = match outcome.status {
            JobStatus::TimedOut => self.config.on_timeout,
            _ => self.config.on_failure,
        };
        tracing::warn!(
            "codec {}: {} #{} did not succeed ({:?}), policy {:?}",
            job.codec,
            job.operation,
            job.repetition,
            outcome.status,
            policy
        );
        match policy {
            FailurePolicy::AbortMatrix => {
                abort.store(true, Ordering::SeqCst);
                Some("matrix aborted".to_string())
            }
            FailurePolicy::SkipCodec => Some(format!("earlier {} failed", job.operation)),
            // nothing can run against an index that was never built
            FailurePolicy::Continue if job.operation == Operation::Build => {
                Some("build failed".to_string())
            }
            FailurePolicy::Continue => None,
        }
    }
}

fn remove_artifact(codec: &str, artifact: &Path) -> bool {
    match fs::remove_file(artifact) {
        Ok(()) => {
            tracing::info!("codec {}: removed {}", codec, artifact.display());
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(
                "codec {}: could not remove {}: {}",
                codec,
                artifact.display(),
                e
            );
            false
        }
    }
}
