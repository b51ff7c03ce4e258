//! Offset-index partitioning: only the byte span of every line is kept in memory,
//! the records themselves are re-read from the source log in shuffled order.
//! Peak memory is one `LineSpan` per line regardless of how long queries are,
//! at the price of one seek per written record.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, Read, Seek, SeekFrom},
    path::Path,
};

use super::{log_progress, normalize, Buckets, LengthClass};
use crate::errors::HarnessError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSpan {
    pub offset: u64,
    pub len: usize,
}

/// Classify lines by token count, remembering where each line lives in the source.
pub fn index_lines(mut reader: impl BufRead) -> io::Result<Buckets<LineSpan>> {
    let mut buckets = Buckets::default();
    let mut line = String::new();
    let mut offset = 0u64;
    let mut lines = 0;
    loop {
        line.clear();
        let len = reader.read_line(&mut line)?;
        if len == 0 {
            break;
        }
        let tokens = line.split_whitespace().count();
        buckets.push(LengthClass::of(tokens), LineSpan { offset, len });
        offset += len as u64;
        lines += 1;
        log_progress(lines);
    }
    Ok(buckets)
}

/// Random access to the lines of a query log.
pub struct SpanReader {
    reader: BufReader<File>,
    buf: Vec<u8>,
}

impl SpanReader {
    pub fn open(path: &Path) -> Result<Self, HarnessError> {
        let file = File::open(path).map_err(|e| HarnessError::io(path, e))?;
        Ok(Self {
            reader: BufReader::new(file),
            buf: vec![],
        })
    }

    /// Read the line behind `span` and return it normalized.
    pub fn record(&mut self, span: &LineSpan) -> io::Result<String> {
        self.reader.seek(SeekFrom::Start(span.offset))?;
        self.buf.resize(span.len, 0);
        self.reader.read_exact(&mut self.buf)?;
        let line = std::str::from_utf8(&self.buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(normalize(line).1)
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, io::Cursor};

    use pretty_assertions::assert_eq;

    use super::{index_lines, LineSpan, SpanReader};
    use crate::partition::LengthClass;

    #[test]
    fn spans_cover_every_byte() -> anyhow::Result<()> {
        let log = "1 2\n3 4 5\n\n6 7 8 9 10\n11";
        let buckets = index_lines(Cursor::new(log))?;
        let mut spans: Vec<LineSpan> = buckets.iter().flat_map(|(_, s)| s.to_vec()).collect();
        spans.sort_by_key(|s| s.offset);
        let covered: usize = spans.iter().map(|s| s.len).sum();
        assert_eq!(covered, log.len());
        assert_eq!(buckets.get(LengthClass::Short).len(), 2);
        assert_eq!(buckets.get(LengthClass::FivePlus), &[LineSpan { offset: 11, len: 11 }]);
        Ok(())
    }

    #[test]
    fn reads_records_back_by_offset() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("log");
        fs::write(&path, "1\t2\n3  4 5\n")?;
        let buckets = index_lines(Cursor::new(fs::read(&path)?))?;
        let mut reader = SpanReader::open(&path)?;
        let three = buckets.get(LengthClass::Three)[0];
        let two = buckets.get(LengthClass::Two)[0];
        assert_eq!(reader.record(&three)?, "3 4 5");
        assert_eq!(reader.record(&two)?, "1 2");
        Ok(())
    }
}
