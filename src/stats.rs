//! Corpus-wide statistics that parameterize a simulation.

use crate::record::{Record, RecordStream, Schema, IO_BUFFER};
use crate::Error;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Number of records and the time span they cover, in the corpus' native timestamp unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CorpusStats {
    pub records: u64,
    pub min_time: i64,
    pub max_time: i64,
}

impl Default for CorpusStats {
    fn default() -> Self {
        Self {
            records: 0,
            min_time: i64::MAX,
            max_time: i64::MIN,
        }
    }
}

impl fmt::Display for CorpusStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "records {} min_time {} max_time {} duration {}",
            self.records,
            self.min_time,
            self.max_time,
            self.duration()
        )
    }
}

impl CorpusStats {
    pub(crate) fn observe(&mut self, time: i64) {
        self.records += 1;
        self.min_time = self.min_time.min(time);
        self.max_time = self.max_time.max(time);
    }

    /// `max_time - min_time`, or 0 for an empty corpus.
    pub fn duration(&self) -> i64 {
        if self.records == 0 {
            0
        } else {
            self.max_time.saturating_sub(self.min_time)
        }
    }

    /// Reject corpora that cannot drive a simulation.
    pub fn validate(&self) -> Result<(), Error> {
        if self.records == 0 {
            return Err(Error::DegenerateCorpus(
                "corpus contains no valid records".to_string(),
            ));
        }
        if self.duration() <= 0 {
            return Err(Error::DegenerateCorpus(format!(
                "all records share a single timestamp ({})",
                self.min_time
            )));
        }
        Ok(())
    }

    /// Scan every record once. Works on unsorted input; records without a timestamp are ignored.
    pub fn scan(reader: impl BufRead, schema: &Schema) -> Result<Self, Error> {
        let mut stats = Self::default();
        for record in RecordStream::new(reader) {
            if let Ok(time) = record?.timestamp(&schema.time_field) {
                stats.observe(time);
            }
        }
        Ok(stats)
    }

    pub fn scan_file(path: &Path, schema: &Schema) -> Result<Self, Error> {
        let file = File::open(path)?;
        Self::scan(BufReader::with_capacity(IO_BUFFER, file), schema)
    }

    /// Cheap statistics of a file that is already sorted by time: the timestamps of the first and
    /// the last valid records, plus the number of non-blank lines (no JSON decoding involved).
    pub fn peek_file(path: &Path, schema: &Schema) -> Result<Self, Error> {
        let mut file = File::open(path)?;
        let records = count_lines(BufReader::with_capacity(IO_BUFFER, &mut file))?;

        file.seek(SeekFrom::Start(0))?;
        let first = RecordStream::new(BufReader::with_capacity(IO_BUFFER, &mut file))
            .filter_map(|r| match r {
                Ok(r) => r.timestamp(&schema.time_field).ok().map(Ok),
                Err(e) => Some(Err(e)),
            })
            .next()
            .transpose()?;
        let last = last_timestamp(&mut file, schema)?;

        match (first, last) {
            (Some(min_time), Some(max_time)) => Ok(Self {
                records,
                min_time,
                max_time,
            }),
            _ => Ok(Self::default()),
        }
    }
}

/// Count non-blank lines by scanning for line terminators.
fn count_lines(mut reader: impl BufRead) -> io::Result<u64> {
    let mut count = 0u64;
    let mut prev = b'\n';
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            break;
        }
        for &b in buf {
            if b == b'\n' && prev != b'\n' {
                count += 1;
            }
            prev = b;
        }
        let len = buf.len();
        reader.consume(len);
    }
    if prev != b'\n' {
        count += 1;
    }
    Ok(count)
}

/// The timestamp of the last valid record of a file, read backwards from its end in growing
/// windows.
fn last_timestamp(file: &mut File, schema: &Schema) -> io::Result<Option<i64>> {
    let len = file.seek(SeekFrom::End(0))?;
    let mut window = 4096u64;
    loop {
        let start = len.saturating_sub(window);
        file.seek(SeekFrom::Start(start))?;
        let mut buf = Vec::with_capacity((len - start) as usize);
        file.by_ref().take(len - start).read_to_end(&mut buf)?;

        let mut lines: Vec<&[u8]> = buf.split(|&b| b == b'\n').collect();
        if start > 0 {
            // the first piece may be the tail of a longer line
            lines.remove(0);
        }
        for line in lines.into_iter().rev() {
            let Ok(line) = std::str::from_utf8(line) else {
                continue;
            };
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(time) = Record::parse(line.to_string())
                .and_then(|r| r.timestamp(&schema.time_field))
            {
                return Ok(Some(time));
            }
        }
        if start == 0 {
            return Ok(None);
        }
        window *= 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn schema() -> Schema {
        Schema {
            time_field: "t".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn scan_unsorted() {
        let input = "{\"t\": 30}\n{\"t\": 10}\nbad\n{\"x\": 1}\n{\"t\": 20}\n";
        let stats = CorpusStats::scan(input.as_bytes(), &schema()).unwrap();
        assert_eq!(
            stats,
            CorpusStats {
                records: 3,
                min_time: 10,
                max_time: 30
            }
        );
        assert_eq!(stats.duration(), 20);
        assert!(stats.validate().is_ok());
    }

    #[test]
    fn degenerate() {
        let stats = CorpusStats::scan("".as_bytes(), &schema()).unwrap();
        assert_eq!(stats.duration(), 0);
        assert!(matches!(stats.validate(), Err(Error::DegenerateCorpus(_))));

        let stats = CorpusStats::scan("{\"t\": 5}\n{\"t\": 5}\n".as_bytes(), &schema()).unwrap();
        assert_eq!(stats.records, 2);
        assert!(matches!(stats.validate(), Err(Error::DegenerateCorpus(_))));
    }

    #[test]
    fn count_non_blank_lines() {
        assert_eq!(count_lines("".as_bytes()).unwrap(), 0);
        assert_eq!(count_lines("a".as_bytes()).unwrap(), 1);
        assert_eq!(count_lines("a\n".as_bytes()).unwrap(), 1);
        assert_eq!(count_lines("\n\na\n\nb\n\n".as_bytes()).unwrap(), 2);
        assert_eq!(count_lines("a\nb".as_bytes()).unwrap(), 2);
    }

    #[test]
    fn peek_sorted_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sorted.dat");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "oops").unwrap();
        writeln!(f, "{{\"t\": 100, \"pad\": \"{}\"}}", "x".repeat(10000)).unwrap();
        for t in 101..1000 {
            writeln!(f, "{{\"t\": {}}}", t).unwrap();
        }
        writeln!(f, "{{\"t\": 1000, \"pad\": \"{}\"}}", "y".repeat(10000)).unwrap();
        write!(f, "{{\"t\": 1001").unwrap(); // truncated last line
        drop(f);

        let stats = CorpusStats::peek_file(&path, &schema()).unwrap();
        assert_eq!(stats.min_time, 100);
        assert_eq!(stats.max_time, 1000);
        assert_eq!(stats.records, 903);
    }

    #[test]
    fn peek_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.dat");
        File::create(&path).unwrap();
        let stats = CorpusStats::peek_file(&path, &schema()).unwrap();
        assert_eq!(stats, CorpusStats::default());
        assert!(stats.validate().is_err());
    }
}
