use std::{
    ffi::OsString,
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{errors::HarnessError, matrix::Operation};

/// How invocation output is spread over result files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultLayout {
    /// `<prefix>.<codec>.results`
    #[default]
    PerCodec,
    /// `<prefix>.<codec>.<operation>.results`
    PerOperation,
}

/// Append `suffix` to the file name of `prefix`, so `out/run` becomes `out/run.<suffix>`.
pub fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// An append-only text file collecting raw invocation output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultLog {
    path: PathBuf,
}

impl ResultLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open for appending, creating the file on first use. Never truncates.
    pub fn open_append(&self) -> Result<File, HarnessError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| HarnessError::io(&self.path, e))
    }
}

/// The result logs owned by one codec. No two codecs ever resolve to the same file.
#[derive(Debug, Clone)]
pub struct CodecLogs {
    layout: ResultLayout,
    prefix: PathBuf,
    codec: String,
}

impl CodecLogs {
    pub fn new(layout: ResultLayout, prefix: &Path, codec: &str) -> Self {
        Self {
            layout,
            prefix: prefix.to_path_buf(),
            codec: codec.to_string(),
        }
    }

    pub fn log_for(&self, operation: Operation) -> ResultLog {
        let suffix = match self.layout {
            ResultLayout::PerCodec => format!("{}.results", self.codec),
            ResultLayout::PerOperation => format!("{}.{}.results", self.codec, operation),
        };
        ResultLog::new(with_suffix(&self.prefix, &suffix))
    }

    /// Every distinct log path the given operations write to, in first-use order.
    pub fn paths(&self, operations: impl IntoIterator<Item = Operation>) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = vec![];
        for op in operations {
            let path = self.log_for(op).path;
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        paths
    }
}
