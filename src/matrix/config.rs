use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use super::{Operation, OutputStream};
use crate::{errors::HarnessError, results::ResultLayout};

/// The external program behind one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandSpec {
    pub program: PathBuf,
    /// Pass the codec name as first argument. Single-codec tools don't take one.
    #[serde(default = "yes")]
    pub pass_codec: bool,
    /// Extra arguments appended after the positional ones.
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            pass_codec: true,
            args: vec![],
        }
    }
}

/// Where an operation reads its queries from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum QuerySource {
    /// No input, stdin is closed.
    #[default]
    None,
    /// One run per suffix, stdin from `<query basename><suffix>`.
    QueryLog { suffixes: Vec<String> },
    /// Stdin from a fixed file, e.g. a random pair sample.
    File { path: PathBuf },
    /// The collection is passed as a positional argument (seek benchmarks).
    Documents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationSpec {
    pub kind: Operation,
    pub command: CommandSpec,
    #[serde(default = "one")]
    pub repetitions: usize,
    /// Required: deployments disagree on which stream carries the timings.
    pub stream: OutputStream,
    #[serde(default)]
    pub input: QuerySource,
    /// Passed right after the artifact, e.g. the number of runs per query.
    #[serde(default)]
    pub repetition_bound: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure and go on with the next job.
    Continue,
    /// Skip the remaining jobs of the codec.
    SkipCodec,
    /// Stop the whole matrix.
    AbortMatrix,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatrixConfig {
    pub codecs: Vec<String>,
    pub operations: Vec<OperationSpec>,
    /// Remove each codec's index artifact once its row is done.
    pub cleanup: bool,
    #[serde(default)]
    pub layout: ResultLayout,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "continue_policy")]
    pub on_failure: FailurePolicy,
    #[serde(default = "skip_codec_policy")]
    pub on_timeout: FailurePolicy,
    #[serde(default = "one")]
    pub parallelism: usize,
}

fn yes() -> bool {
    true
}

fn one() -> usize {
    1
}

fn continue_policy() -> FailurePolicy {
    FailurePolicy::Continue
}

fn skip_codec_policy() -> FailurePolicy {
    FailurePolicy::SkipCodec
}

const QUERY_LOG_SUFFIXES: [&str; 4] = [".2", ".3", ".4", ".5+"];

const DEFAULT_CODECS: [&str; 11] = [
    "maskedvbyte",
    "opt_vbyte",
    "bic",
    "delta",
    "rice",
    "pef_opt",
    "single_packed_dint",
    "optpfor",
    "simple16",
    "qmx",
    "slicing",
];

impl MatrixConfig {
    /// Build every codec, decode five times, then intersect and unite over the
    /// length-partitioned query logs, keeping the index artifacts around.
    pub fn default_matrix() -> Self {
        let query_logs = QuerySource::QueryLog {
            suffixes: QUERY_LOG_SUFFIXES.iter().map(|s| s.to_string()).collect(),
        };
        Self {
            codecs: DEFAULT_CODECS.iter().map(|c| c.to_string()).collect(),
            operations: vec![
                OperationSpec {
                    kind: Operation::Build,
                    command: CommandSpec::new("./build_index"),
                    repetitions: 1,
                    stream: OutputStream::Stdout,
                    input: QuerySource::None,
                    repetition_bound: None,
                },
                OperationSpec {
                    kind: Operation::Decode,
                    command: CommandSpec::new("./decode"),
                    repetitions: 5,
                    stream: OutputStream::Stdout,
                    input: QuerySource::None,
                    repetition_bound: None,
                },
                OperationSpec {
                    kind: Operation::And,
                    command: CommandSpec::new("./and"),
                    repetitions: 1,
                    stream: OutputStream::Stderr,
                    input: query_logs.clone(),
                    repetition_bound: Some(1000),
                },
                OperationSpec {
                    kind: Operation::Or,
                    command: CommandSpec::new("./or"),
                    repetitions: 1,
                    stream: OutputStream::Stderr,
                    input: query_logs,
                    repetition_bound: Some(1000),
                },
            ],
            cleanup: false,
            layout: ResultLayout::PerCodec,
            timeout_secs: None,
            on_failure: FailurePolicy::Continue,
            on_timeout: FailurePolicy::SkipCodec,
            parallelism: 1,
        }
    }

    pub fn from_json(text: &str) -> Result<Self, HarnessError> {
        let config: MatrixConfig = serde_json::from_str(text)
            .map_err(|e| HarnessError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, HarnessError> {
        let text = fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
        Self::from_json(&text)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn builds(&self) -> bool {
        self.operations.iter().any(|op| op.kind == Operation::Build)
    }

    /// Check every constraint the runner relies on, before any job is started.
    pub fn validate(&self) -> Result<(), HarnessError> {
        let invalid =
            |msg: String| -> Result<(), HarnessError> { Err(HarnessError::Configuration(msg)) };
        if self.codecs.is_empty() {
            return invalid("no codecs configured".to_string());
        }
        let mut seen = HashSet::new();
        for codec in &self.codecs {
            // codecs end up in file names
            if codec.is_empty()
                || codec == "."
                || codec == ".."
                || codec.contains(|c: char| c == '/' || c == '\\' || c.is_whitespace())
            {
                return invalid(format!("invalid codec name '{}'", codec));
            }
            if !seen.insert(codec.as_str()) {
                return invalid(format!("codec '{}' listed twice", codec));
            }
        }
        if self.operations.is_empty() {
            return invalid("no operations configured".to_string());
        }
        let mut kinds = HashSet::new();
        for (idx, op) in self.operations.iter().enumerate() {
            if !kinds.insert(op.kind) {
                return invalid(format!("operation {} configured twice", op.kind));
            }
            if op.kind == Operation::Build {
                if idx != 0 {
                    return invalid("build must be the first operation".to_string());
                }
                if op.repetitions != 1 {
                    return invalid(format!(
                        "build runs exactly once per codec, got {} repetitions",
                        op.repetitions
                    ));
                }
                if op.input != QuerySource::None {
                    return invalid("build takes no query input".to_string());
                }
            } else if op.repetitions == 0 {
                return invalid(format!("{} needs at least one repetition", op.kind));
            }
            if let QuerySource::QueryLog { suffixes } = &op.input {
                if suffixes.is_empty() {
                    return invalid(format!("{} has an empty query log list", op.kind));
                }
            }
        }
        if self.parallelism == 0 {
            return invalid("parallelism must be at least 1".to_string());
        }
        if self.timeout_secs == Some(0) {
            return invalid("timeout must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{FailurePolicy, MatrixConfig, QuerySource};
    use crate::{
        errors::HarnessError,
        matrix::{Operation, OutputStream},
        results::ResultLayout,
    };

    const MINIMAL: &str = r#"{
        "codecs": ["a", "b"],
        "cleanup": true,
        "operations": [
            {"kind": "build", "command": {"program": "./build_index"}, "stream": "stdout"},
            {"kind": "and", "command": {"program": "./and"}, "stream": "stderr",
             "repetitions": 3, "repetition_bound": 1000,
             "input": {"kind": "query_log", "suffixes": [".2", ".3"]}},
            {"kind": "next_geq", "command": {"program": "./next_geq"}, "stream": "stdout",
             "input": {"kind": "documents"}}
        ]
    }"#;

    fn assert_rejected(text: &str) {
        assert!(
            matches!(MatrixConfig::from_json(text), Err(HarnessError::Configuration(_))),
            "expected rejection of {}",
            text
        );
    }

    #[test]
    fn default_matrix_is_valid() -> anyhow::Result<()> {
        let config = MatrixConfig::default_matrix();
        config.validate()?;
        assert_eq!(config.codecs.len(), 11);
        assert!(!config.cleanup);
        assert!(config.builds());
        Ok(())
    }

    #[test]
    fn parses_minimal_config_with_defaults() -> anyhow::Result<()> {
        let config = MatrixConfig::from_json(MINIMAL)?;
        assert_eq!(config.codecs, vec!["a", "b"]);
        assert_eq!(config.operations[1].kind, Operation::And);
        assert_eq!(config.operations[1].stream, OutputStream::Stderr);
        assert_eq!(config.operations[1].repetitions, 3);
        assert_eq!(config.operations[2].input, QuerySource::Documents);
        assert!(config.operations[0].command.pass_codec);
        assert_eq!(config.layout, ResultLayout::PerCodec);
        assert_eq!(config.on_failure, FailurePolicy::Continue);
        assert_eq!(config.on_timeout, FailurePolicy::SkipCodec);
        assert_eq!(config.parallelism, 1);
        assert_eq!(config.timeout(), None);
        Ok(())
    }

    #[test]
    fn json_roundtrip_keeps_the_matrix() -> anyhow::Result<()> {
        let config = MatrixConfig::default_matrix();
        let text = serde_json::to_string_pretty(&config)?;
        assert_eq!(MatrixConfig::from_json(&text)?, config);
        Ok(())
    }

    #[test]
    fn stream_must_be_explicit() {
        assert_rejected(&MINIMAL.replace(r#", "stream": "stdout"},"#, "},"));
        assert_rejected(&MINIMAL.replace(r#""stream": "stderr""#, r#""stream": "both""#));
    }

    #[test]
    fn cleanup_must_be_explicit() {
        assert_rejected(&MINIMAL.replace(r#""cleanup": true,"#, ""));
    }

    #[test]
    fn rejects_bad_codecs() {
        assert_rejected(&MINIMAL.replace(r#"["a", "b"]"#, r#"["a", "a"]"#));
        assert_rejected(&MINIMAL.replace(r#"["a", "b"]"#, r#"["a", "x/y"]"#));
        assert_rejected(&MINIMAL.replace(r#"["a", "b"]"#, "[]"));
    }

    #[test]
    fn build_must_come_first_and_once() -> anyhow::Result<()> {
        let mut config = MatrixConfig::from_json(MINIMAL)?;
        config.operations.swap(0, 1);
        assert!(config.validate().is_err());

        let mut config = MatrixConfig::from_json(MINIMAL)?;
        config.operations[0].repetitions = 2;
        assert!(config.validate().is_err());
        Ok(())
    }

    #[test]
    fn rejects_zero_repetitions_and_parallelism() -> anyhow::Result<()> {
        let mut config = MatrixConfig::from_json(MINIMAL)?;
        config.operations[1].repetitions = 0;
        assert!(config.validate().is_err());

        let mut config = MatrixConfig::from_json(MINIMAL)?;
        config.parallelism = 0;
        assert!(config.validate().is_err());

        let mut config = MatrixConfig::from_json(MINIMAL)?;
        config.timeout_secs = Some(0);
        assert!(config.validate().is_err());
        Ok(())
    }

    #[test]
    fn rejects_unknown_fields() {
        assert_rejected(&MINIMAL.replace(
            r#""cleanup": true,"#,
            r#""cleanup": true, "clean": 1,"#,
        ));
    }
}
