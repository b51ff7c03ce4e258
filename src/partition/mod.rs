pub mod offsets;

use std::{
    fmt,
    fs::{self, File},
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use itertools::Itertools;
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use tempfile::NamedTempFile;

use crate::errors::HarnessError;

/// Log a progress line every this many input lines.
pub const PROGRESS_INTERVAL: usize = 1000;

/// Query length classes. Every line falls into exactly one class:
/// `Short` catches empty and single-term lines so nothing is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LengthClass {
    Short,
    Two,
    Three,
    Four,
    FivePlus,
}

impl LengthClass {
    pub const ALL: [LengthClass; 5] = [
        LengthClass::Short,
        LengthClass::Two,
        LengthClass::Three,
        LengthClass::Four,
        LengthClass::FivePlus,
    ];

    pub fn of(tokens: usize) -> Self {
        match tokens {
            0 | 1 => LengthClass::Short,
            2 => LengthClass::Two,
            3 => LengthClass::Three,
            4 => LengthClass::Four,
            _ => LengthClass::FivePlus,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            LengthClass::Short => "1",
            LengthClass::Two => "2",
            LengthClass::Three => "3",
            LengthClass::Four => "4",
            LengthClass::FivePlus => "5+",
        }
    }

    /// `queries.<suffix>`, the bucket file inside the output directory.
    pub fn file_name(self) -> String {
        format!("queries.{}", self.suffix())
    }

    // the short bucket only shows up on disk when some line needed it
    fn always_written(self) -> bool {
        self != LengthClass::Short
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for LengthClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Re-join the whitespace separated tokens of a line with single spaces.
/// Returns the token count along with the normalized record.
pub fn normalize(line: &str) -> (usize, String) {
    let count = line.split_whitespace().count();
    (count, line.split_whitespace().join(" "))
}

/// One ordered sequence per length class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buckets<T> {
    slots: [Vec<T>; 5],
}

impl<T> Default for Buckets<T> {
    fn default() -> Self {
        Self {
            slots: Default::default(),
        }
    }
}

impl<T> Buckets<T> {
    pub fn push(&mut self, class: LengthClass, item: T) {
        self.slots[class.slot()].push(item);
    }

    pub fn get(&self, class: LengthClass) -> &[T] {
        &self.slots[class.slot()]
    }

    pub fn len(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (LengthClass, &[T])> {
        LengthClass::ALL
            .into_iter()
            .map(move |class| (class, self.get(class)))
    }

    /// Permute every bucket independently. Buckets are visited in class order
    /// so a seeded rng always yields the same permutation.
    pub fn shuffle(&mut self, rng: &mut impl Rng) {
        for slot in self.slots.iter_mut() {
            slot.shuffle(rng);
        }
    }
}

fn log_progress(lines: usize) {
    if lines % PROGRESS_INTERVAL == 0 {
        tracing::info!("processed {} lines", lines);
    }
}

/// Classify every line of `reader` into its length bucket, keeping the normalized record.
pub fn classify(reader: impl BufRead) -> io::Result<Buckets<String>> {
    let mut buckets = Buckets::default();
    for (idx, line) in reader.lines().enumerate() {
        let (tokens, record) = normalize(&line?);
        buckets.push(LengthClass::of(tokens), record);
        log_progress(idx + 1);
    }
    Ok(buckets)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStrategy {
    /// Buffer every record before shuffling. Memory grows linearly with the log size.
    InMemory,
    /// Buffer only line offsets and re-read records from the source while writing.
    OffsetIndex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSummary {
    pub lines: usize,
    pub seed: u64,
    pub counts: Vec<(LengthClass, usize)>,
    pub files: Vec<PathBuf>,
}

impl PartitionSummary {
    pub fn count(&self, class: LengthClass) -> usize {
        self.counts
            .iter()
            .find(|(c, _)| *c == class)
            .map_or(0, |(_, n)| *n)
    }
}

/// Splits a query log into shuffled `queries.<length>` files.
#[derive(Debug, Clone)]
pub struct QueryLogPartitioner {
    seed: u64,
    strategy: PartitionStrategy,
}

impl QueryLogPartitioner {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            strategy: PartitionStrategy::InMemory,
        }
    }

    pub fn with_strategy(mut self, strategy: PartitionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Partition `input` into `output_dir`. Nothing is written unless the input can be
    /// read completely, and bucket files only appear once every bucket has been written.
    pub fn partition(
        &self,
        input: &Path,
        output_dir: &Path,
    ) -> Result<PartitionSummary, HarnessError> {
        let file = File::open(input).map_err(|e| HarnessError::io(input, e))?;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.seed);
        tracing::info!(
            "partitioning {} into {} ({:?}, seed {})",
            input.display(),
            output_dir.display(),
            self.strategy,
            self.seed
        );
        let (lines, counts, files) = match self.strategy {
            PartitionStrategy::InMemory => {
                let mut buckets =
                    classify(BufReader::new(file)).map_err(|e| HarnessError::io(input, e))?;
                buckets.shuffle(&mut rng);
                let files = write_buckets(&buckets, output_dir, |record, out| {
                    writeln!(out, "{}", record)
                })?;
                (buckets.len(), bucket_counts(&buckets), files)
            }
            PartitionStrategy::OffsetIndex => {
                let mut spans = offsets::index_lines(BufReader::new(file))
                    .map_err(|e| HarnessError::io(input, e))?;
                spans.shuffle(&mut rng);
                let mut source = offsets::SpanReader::open(input)?;
                let files = write_buckets(&spans, output_dir, |span, out| {
                    let record = source.record(span)?;
                    writeln!(out, "{}", record)
                })?;
                (spans.len(), bucket_counts(&spans), files)
            }
        };
        for (class, count) in &counts {
            tracing::info!("bucket {}: {} queries", class, count);
        }
        Ok(PartitionSummary {
            lines,
            seed: self.seed,
            counts,
            files,
        })
    }
}

fn bucket_counts<T>(buckets: &Buckets<T>) -> Vec<(LengthClass, usize)> {
    buckets
        .iter()
        .map(|(class, items)| (class, items.len()))
        .collect()
}

/// Write each bucket to a temporary file in `output_dir`, then move all of them into
/// place. An error while writing drops the temporaries and leaves the directory untouched.
/// An error while moving removes the bucket files this call already placed, so the
/// directory never holds a mix of old and new buckets. Bucket files of an earlier run
/// that this run does not write are removed, so the directory always matches the input.
pub(crate) fn write_buckets<T>(
    buckets: &Buckets<T>,
    output_dir: &Path,
    mut emit: impl FnMut(&T, &mut dyn Write) -> io::Result<()>,
) -> Result<Vec<PathBuf>, HarnessError> {
    fs::create_dir_all(output_dir).map_err(|e| HarnessError::io(output_dir, e))?;
    let mut staged = vec![];
    let mut stale = vec![];
    for (class, items) in buckets.iter() {
        if items.is_empty() && !class.always_written() {
            stale.push(output_dir.join(class.file_name()));
            continue;
        }
        let target = output_dir.join(class.file_name());
        let tmp =
            NamedTempFile::new_in(output_dir).map_err(|e| HarnessError::io(output_dir, e))?;
        let mut out = BufWriter::new(tmp);
        for item in items {
            emit(item, &mut out).map_err(|e| HarnessError::io(&target, e))?;
        }
        let tmp = out
            .into_inner()
            .map_err(|e| HarnessError::io(&target, e.into_error()))?;
        staged.push((tmp, target));
    }
    let mut files = vec![];
    for (tmp, target) in staged {
        if let Err(e) = tmp.persist(&target) {
            roll_back(&files);
            return Err(HarnessError::io(&target, e.error));
        }
        files.push(target);
    }
    for path in stale {
        match fs::remove_file(&path) {
            Ok(()) => tracing::info!("removed stale bucket {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                roll_back(&files);
                return Err(HarnessError::io(&path, e));
            }
        }
    }
    Ok(files)
}

fn roll_back(placed: &[PathBuf]) {
    for path in placed {
        if let Err(e) = fs::remove_file(path) {
            tracing::warn!("could not remove {}: {}", path.display(), e);
        }
    }
}
