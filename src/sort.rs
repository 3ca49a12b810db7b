//! External sort of line-delimited JSON records.
//!
//! The input is cut into chunks of at most `buffer_size` lines. Each chunk is sorted in memory and
//! spilled to a temporary file, cycling over the configured temporary directories so that I/O can
//! be spread over multiple drives. All chunks are then merged with a k-way merge into the output.
//!
//! ## Configuration Format
//!
//! ```toml
//! [sort]
//! buffer_size = 500000          # lines held in memory at once
//! temp_dirs = ["/mnt/a", "/mnt/b"]
//! ```
//!
//! Both options are optional. The default temporary directory is [`std::env::temp_dir`].
//!
//! Records are ordered by [`SortKey`]: the timestamp field first, then the tie-break fields (see
//! [`crate::record`]). Lines that cannot be decoded, or that lack a numeric timestamp, get an
//! out-of-band key that sorts after everything else and are dropped during the merge.
//!
//! Chunk files are removed as soon as they are merged, and on every error path.

use crate::record::{timestamp_of, Line, LineReader, Schema, IO_BUFFER};
use crate::stats::CorpusStats;
use crate::Error;
use hashbrown::HashMap;
use log::{debug, info, warn};
use quanta::Instant;
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::Value;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// A totally ordered JSON value, used for tie-break fields.
///
/// Values of different kinds order as `null < bool < number < string < other`, where "other" are
/// arrays and objects compared by their serialized form.
#[derive(Clone, Debug)]
pub enum SortValue {
    Null,
    Bool(bool),
    Integer(i128),
    Float(f64),
    Text(String),
    Other(String),
}

impl SortValue {
    fn rank(&self) -> u8 {
        match self {
            SortValue::Null => 0,
            SortValue::Bool(_) => 1,
            SortValue::Integer(_) | SortValue::Float(_) => 2,
            SortValue::Text(_) => 3,
            SortValue::Other(_) => 4,
        }
    }
}

impl From<&Value> for SortValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => SortValue::Null,
            Value::Bool(b) => SortValue::Bool(*b),
            Value::Number(n) => {
                let integral = n
                    .as_i64()
                    .map(i128::from)
                    .or_else(|| n.as_u64().map(i128::from));
                match integral {
                    Some(i) => SortValue::Integer(i),
                    None => SortValue::Float(n.as_f64().unwrap_or(f64::NAN)),
                }
            }
            Value::String(s) => SortValue::Text(s.clone()),
            other => SortValue::Other(other.to_string()),
        }
    }
}

impl Ord for SortValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortValue::Bool(a), SortValue::Bool(b)) => a.cmp(b),
            (SortValue::Integer(a), SortValue::Integer(b)) => a.cmp(b),
            (SortValue::Float(a), SortValue::Float(b)) => {
                a.partial_cmp(b).unwrap_or_else(|| a.total_cmp(b))
            }
            (SortValue::Integer(a), SortValue::Float(b)) => cmp_int_float(*a, *b),
            (SortValue::Float(a), SortValue::Integer(b)) => cmp_int_float(*b, *a).reverse(),
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            (SortValue::Other(a), SortValue::Other(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Exact comparison of an integer with a float, without rounding the integer. NaN orders by its
/// sign, like `total_cmp` does.
fn cmp_int_float(i: i128, f: f64) -> Ordering {
    if f.is_nan() {
        return if f.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    // i128::MIN is -2^127, every i128 lies in [-2^127, 2^127)
    const BOUND: f64 = 170141183460469231731687303715884105728.0;
    let whole = f.trunc();
    if whole >= BOUND {
        return Ordering::Less;
    }
    if whole < -BOUND {
        return Ordering::Greater;
    }
    match i.cmp(&(whole as i128)) {
        Ordering::Equal => 0f64.partial_cmp(&(f - whole)).unwrap_or(Ordering::Equal),
        unequal => unequal,
    }
}

impl PartialOrd for SortValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SortValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortValue {}

/// The composite order of records: timestamp first, then tie-break fields.
///
/// `Malformed` is declared last, so it orders after every valid key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortKey {
    Record { time: i64, ties: Vec<SortValue> },
    Malformed,
}

impl SortKey {
    /// Compute the key of a line. Only the top level of the object is parsed; field values are
    /// kept as raw JSON and only the ones named by the schema are decoded.
    pub fn of_line(line: &str, schema: &Schema) -> Self {
        let fields: HashMap<String, &RawValue> = match serde_json::from_str(line) {
            Ok(fields) => fields,
            Err(_) => return SortKey::Malformed,
        };
        let decode = |field: &str| -> Option<Value> {
            fields
                .get(field)
                .and_then(|raw| serde_json::from_str(raw.get()).ok())
        };
        let time = match decode(&schema.time_field).as_ref().and_then(timestamp_of) {
            Some(time) => time,
            None => return SortKey::Malformed,
        };
        let ties = schema
            .tiebreak_fields
            .iter()
            .map(|f| match decode(f) {
                Some(v) => SortValue::from(&v),
                None => SortValue::Null,
            })
            .collect();
        SortKey::Record { time, ties }
    }

    pub fn time(&self) -> Option<i64> {
        match self {
            SortKey::Record { time, .. } => Some(*time),
            SortKey::Malformed => None,
        }
    }
}

/// The sort section deserialized from TOML. See the module documentation.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct SortOpt {
    pub buffer_size: Option<usize>,
    pub temp_dirs: Option<Vec<PathBuf>>,
}

const DEFAULT_BUFFER_SIZE: usize = 500_000;

/// A spilled, sorted chunk. The file is removed when this is dropped.
struct Chunk {
    path: TempPath,
}

/// An open chunk in the merge phase.
struct ChunkReader {
    lines: LineReader<BufReader<File>>,
    path: TempPath,
}

impl ChunkReader {
    fn open(chunk: Chunk) -> Result<Self, Error> {
        let file = File::open(&chunk.path)?;
        Ok(Self {
            lines: LineReader::new(BufReader::with_capacity(IO_BUFFER, file)),
            path: chunk.path,
        })
    }

    /// The next line of this chunk. Chunks only ever contain valid UTF-8 lines.
    fn next(&mut self) -> Result<Option<String>, Error> {
        loop {
            match self.lines.next_line()? {
                Some(Line::Text(line)) => return Ok(Some(line)),
                Some(Line::Invalid) => continue,
                None => return Ok(None),
            }
        }
    }

    /// Delete the chunk file now rather than whenever the reader is dropped.
    fn close(self) {
        let ChunkReader { lines, path } = self;
        drop(lines);
        let display = path.to_path_buf();
        if let Err(e) = path.close() {
            warn!("Failed to remove chunk {}: {}", display.display(), e);
        }
    }
}

/// The current head of a chunk in the merge heap.
struct Head {
    key: SortKey,
    chunk: usize,
    line: String,
}

impl Ord for Head {
    fn cmp(&self, other: &Self) -> Ordering {
        // equal keys are taken from earlier chunks first, which keeps the sort stable
        self.key
            .cmp(&other.key)
            .then_with(|| self.chunk.cmp(&other.chunk))
    }
}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Head {}

/// Sorts line-delimited JSON with a bounded memory footprint.
#[derive(Debug)]
pub struct ExternalSorter {
    buffer_size: usize,
    temp_dirs: Vec<PathBuf>,
    schema: Schema,
}

impl ExternalSorter {
    pub fn new(opt: &SortOpt, schema: &Schema) -> Result<Self, Error> {
        let buffer_size = opt.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        if buffer_size == 0 {
            return Err(Error::Config("buffer_size should be positive".to_string()));
        }
        let temp_dirs = match opt.temp_dirs.as_ref() {
            Some(dirs) if !dirs.is_empty() => dirs.clone(),
            _ => vec![std::env::temp_dir()],
        };
        if let Some(dir) = temp_dirs.iter().find(|d| !d.is_dir()) {
            return Err(Error::Config(format!(
                "temporary directory does not exist: {}",
                dir.display()
            )));
        }
        Ok(Self {
            buffer_size,
            temp_dirs,
            schema: schema.clone(),
        })
    }

    /// Sort `input` into `output`. Returns the statistics of the records written.
    pub fn sort(&self, input: impl BufRead, output: &mut impl Write) -> Result<CorpusStats, Error> {
        let start = Instant::now();
        let (chunks, malformed) = self.split(input)?;
        let nr_chunks = chunks.len();
        let stats = self.merge(chunks, output)?;
        info!(
            "Sorted {} records from {} chunks in {:.2}s, dropped {} malformed lines",
            stats.records,
            nr_chunks,
            start.elapsed().as_secs_f64(),
            malformed
        );
        Ok(stats)
    }

    pub fn sort_file(&self, input: &Path, output: &Path) -> Result<CorpusStats, Error> {
        let reader = BufReader::with_capacity(IO_BUFFER, File::open(input)?);
        self.sort_into(reader, File::create(output)?)
    }

    /// Like [`Self::sort_file`], but `output` is removed when the returned guard is dropped, or
    /// right away if sorting fails. A file that was already at `output` is left alone if the input
    /// cannot be opened or `output` cannot be created.
    pub fn sort_file_temp(
        &self,
        input: &Path,
        output: &Path,
    ) -> Result<(CorpusStats, TempPath), Error> {
        let reader = BufReader::with_capacity(IO_BUFFER, File::open(input)?);
        let file = File::create(output)?;
        let guard = TempPath::from_path(output);
        let stats = self.sort_into(reader, file)?;
        Ok((stats, guard))
    }

    fn sort_into(&self, input: impl BufRead, output: File) -> Result<CorpusStats, Error> {
        let mut writer = BufWriter::with_capacity(IO_BUFFER, output);
        let stats = self.sort(input, &mut writer)?;
        writer.flush()?;
        Ok(stats)
    }

    /// Cut the input into sorted chunks. Returns the chunks and the number of malformed lines.
    fn split(&self, input: impl BufRead) -> Result<(Vec<Chunk>, u64), Error> {
        let mut lines = LineReader::new(input);
        let mut chunks = Vec::new();
        let mut malformed = 0u64;
        let mut batch: Vec<(SortKey, String)> = Vec::new();
        for dir in self.temp_dirs.iter().cycle() {
            batch.clear();
            while batch.len() < self.buffer_size {
                match lines.next_line()? {
                    Some(Line::Text(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let key = SortKey::of_line(&line, &self.schema);
                        if key == SortKey::Malformed {
                            malformed += 1;
                        }
                        batch.push((key, line));
                    }
                    Some(Line::Invalid) => malformed += 1,
                    None => break,
                }
            }
            if batch.is_empty() {
                break;
            }
            // stable, so records with equal keys keep their input order
            batch.sort_by(|a, b| a.0.cmp(&b.0));
            chunks.push(self.spill(&batch, dir, chunks.len())?);
        }
        Ok((chunks, malformed))
    }

    fn spill(&self, batch: &[(SortKey, String)], dir: &Path, id: usize) -> Result<Chunk, Error> {
        let file = tempfile::Builder::new()
            .prefix(&format!("tracebench-{:06}-", id))
            .tempfile_in(dir)?;
        // the path guard is taken right away so the file is removed even if writing fails
        let (file, path) = file.into_parts();
        let mut writer = BufWriter::with_capacity(IO_BUFFER, file);
        for (_, line) in batch {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        debug!(
            "Spilled chunk {} with {} lines to {}",
            id,
            batch.len(),
            path.display()
        );
        Ok(Chunk { path })
    }

    fn merge(&self, chunks: Vec<Chunk>, output: &mut impl Write) -> Result<CorpusStats, Error> {
        let mut readers = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            readers.push(Some(ChunkReader::open(chunk)?));
        }
        let mut heap = BinaryHeap::with_capacity(readers.len());
        for chunk in 0..readers.len() {
            self.advance(&mut readers, chunk, &mut heap)?;
        }

        let mut stats = CorpusStats::default();
        while let Some(Reverse(head)) = heap.pop() {
            let Some(time) = head.key.time() else {
                // the smallest head is malformed, so are all the remaining lines
                break;
            };
            output.write_all(head.line.as_bytes())?;
            output.write_all(b"\n")?;
            stats.observe(time);
            self.advance(&mut readers, head.chunk, &mut heap)?;
        }
        Ok(stats)
    }

    /// Push the next line of a chunk into the heap, or close the chunk if it is exhausted.
    fn advance(
        &self,
        readers: &mut [Option<ChunkReader>],
        chunk: usize,
        heap: &mut BinaryHeap<Reverse<Head>>,
    ) -> Result<(), Error> {
        let Some(reader) = readers[chunk].as_mut() else {
            return Ok(());
        };
        match reader.next()? {
            Some(line) => {
                let key = SortKey::of_line(&line, &self.schema);
                heap.push(Reverse(Head { key, chunk, line }));
            }
            None => {
                if let Some(reader) = readers[chunk].take() {
                    reader.close();
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordOpt;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    fn schema() -> Schema {
        Schema::new(&RecordOpt {
            time_field: Some("t".to_string()),
            tiebreak_fields: Some(vec!["id".to_string()]),
            ..Default::default()
        })
        .unwrap()
    }

    fn sorter(dirs: &[&Path], buffer_size: usize) -> ExternalSorter {
        let opt = SortOpt {
            buffer_size: Some(buffer_size),
            temp_dirs: Some(dirs.iter().map(|d| d.to_path_buf()).collect()),
        };
        ExternalSorter::new(&opt, &schema()).unwrap()
    }

    fn files_in(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    fn sort_str(sorter: &ExternalSorter, input: &str) -> (Vec<String>, CorpusStats) {
        let mut output = Vec::new();
        let stats = sorter.sort(input.as_bytes(), &mut output).unwrap();
        let lines = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| l.to_string())
            .collect();
        (lines, stats)
    }

    #[test]
    fn sort_key_order() {
        let s = schema();
        let a = SortKey::of_line(r#"{"t": 1, "id": 9, "x": [1, 2, {"y": null}]}"#, &s);
        let b = SortKey::of_line(r#"{"t": 2, "id": 1}"#, &s);
        let c = SortKey::of_line(r#"{"t": 2, "id": 2}"#, &s);
        let d = SortKey::of_line(r#"{"t": 2}"#, &s);
        let bad = SortKey::of_line(r#"{"t": "soon", "id": 2}"#, &s);
        let worse = SortKey::of_line("not json", &s);
        assert!(a < b && b < c);
        assert!(d < b, "missing tie-break orders as null");
        assert!(c < bad);
        assert_eq!(bad, SortKey::Malformed);
        assert_eq!(worse, SortKey::Malformed);
        assert_eq!(a.time(), Some(1));
        assert_eq!(bad.time(), None);
    }

    #[test]
    fn sort_value_mixed_kinds() {
        let values: Vec<Value> = serde_json::from_str(r#"["a", 2.5, 2, null, true, [1]]"#).unwrap();
        let v: Vec<SortValue> = values.iter().map(SortValue::from).collect();
        let mut sorted = v.clone();
        sorted.sort();
        assert!(matches!(sorted[0], SortValue::Null));
        assert!(matches!(sorted[1], SortValue::Bool(true)));
        assert!(matches!(sorted[2], SortValue::Integer(2)));
        assert!(matches!(sorted[3], SortValue::Float(_)));
        assert!(matches!(sorted[4], SortValue::Text(_)));
        assert!(matches!(sorted[5], SortValue::Other(_)));
    }

    #[test]
    fn sort_value_numbers_compare_exactly() {
        let big = 1i128 << 53;
        let (i1, i2) = (SortValue::Integer(big), SortValue::Integer(big + 1));
        let f = SortValue::Float(big as f64);
        assert_eq!(i1, f);
        assert!(f < i2);
        assert!(i1 < i2);

        let mut values = vec![
            i2.clone(),
            f.clone(),
            i1.clone(),
            SortValue::Float(big as f64 + 2.0),
        ];
        values.sort();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert!(matches!(values[3], SortValue::Float(_)));

        assert!(SortValue::Integer(2) < SortValue::Float(2.5));
        assert!(SortValue::Float(2.5) < SortValue::Integer(3));
        assert!(SortValue::Integer(-1) < SortValue::Float(-0.5));
        assert!(SortValue::Float(-0.5) < SortValue::Integer(0));
        assert_eq!(SortValue::Integer(0), SortValue::Float(-0.0));
        assert_eq!(SortValue::Float(0.0), SortValue::Float(-0.0));
        assert!(SortValue::Integer(i128::MAX) < SortValue::Float(1e300));
        assert!(SortValue::Integer(i128::MIN) > SortValue::Float(-1e300));
        assert!(SortValue::Integer(i128::MAX) < SortValue::Float(f64::INFINITY));
    }

    #[test]
    fn sort_is_a_permutation_for_any_chunking() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut records: Vec<String> = (0..300)
            .map(|i| format!(r#"{{"t": {}, "id": {}, "payload": "r{}"}}"#, i % 37, i, i))
            .collect();
        records.shuffle(&mut rng);
        let mut input = String::new();
        for (i, r) in records.iter().enumerate() {
            input.push_str(r);
            input.push('\n');
            if i % 50 == 0 {
                input.push_str("{broken\n");
            }
        }

        let dir = tempfile::tempdir().unwrap();
        for buffer_size in [1, 2, 3, 64, 299, 300, 10000] {
            let s = sorter(&[dir.path()], buffer_size);
            let (lines, stats) = sort_str(&s, &input);
            assert_eq!(lines.len(), 300, "buffer_size {}", buffer_size);
            let keys: Vec<SortKey> = lines
                .iter()
                .map(|l| SortKey::of_line(l, &schema()))
                .collect();
            assert!(keys.windows(2).all(|w| w[0] <= w[1]));
            let mut expected = records.clone();
            expected.sort();
            let mut got = lines.clone();
            got.sort();
            assert_eq!(got, expected);
            assert_eq!(stats.records, 300);
            assert_eq!(stats.min_time, 0);
            assert_eq!(stats.max_time, 36);
            assert_eq!(files_in(dir.path()), 0);
        }
    }

    #[test]
    fn sort_is_stable_for_equal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let input = "{\"t\": 1, \"n\": \"a\"}\n{\"t\": 0}\n{\"t\": 1, \"n\": \"b\"}\n{\"t\": 1, \"n\": \"c\"}\n";
        let s = ExternalSorter::new(
            &SortOpt {
                buffer_size: Some(2),
                temp_dirs: Some(vec![dir.path().to_path_buf()]),
            },
            &Schema {
                time_field: "t".to_string(),
                tiebreak_fields: vec![],
                ..Default::default()
            },
        )
        .unwrap();
        let (lines, _) = sort_str(&s, input);
        assert_eq!(
            lines,
            vec![
                "{\"t\": 0}",
                "{\"t\": 1, \"n\": \"a\"}",
                "{\"t\": 1, \"n\": \"b\"}",
                "{\"t\": 1, \"n\": \"c\"}"
            ]
        );
    }

    #[test]
    fn sort_empty_and_all_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let s = sorter(&[dir.path()], 4);
        let (lines, stats) = sort_str(&s, "");
        assert!(lines.is_empty());
        assert_eq!(stats.records, 0);

        let (lines, stats) = sort_str(&s, "a\nb\n\n{\"t\": null}\nc\nd\n");
        assert!(lines.is_empty());
        assert_eq!(stats.records, 0);
        assert_eq!(files_in(dir.path()), 0);
    }

    #[test]
    fn chunks_cycle_over_temp_dirs() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let s = sorter(&[a.path(), b.path()], 2);
        let input: String = (0..9).rev().map(|i| format!("{{\"t\": {}}}\n", i)).collect();
        let (chunks, malformed) = s.split(input.as_bytes()).unwrap();
        assert_eq!(chunks.len(), 5);
        assert_eq!(malformed, 0);
        assert_eq!(files_in(a.path()), 3);
        assert_eq!(files_in(b.path()), 2);
        drop(chunks);
        assert_eq!(files_in(a.path()), 0);
        assert_eq!(files_in(b.path()), 0);
    }

    #[test]
    fn chunks_are_removed_on_io_failure() {
        let good = tempfile::tempdir().unwrap();
        let gone = tempfile::tempdir().unwrap();
        let s = sorter(&[good.path(), gone.path()], 2);
        // the second directory disappears after the sorter was configured
        let gone_path = gone.path().to_path_buf();
        gone.close().unwrap();

        let input: String = (0..10).map(|i| format!("{{\"t\": {}}}\n", i)).collect();
        let mut output = Vec::new();
        let result = s.sort(input.as_bytes(), &mut output);
        assert!(matches!(result, Err(Error::Io(_))));
        assert!(!gone_path.exists());
        assert_eq!(files_in(good.path()), 0);
    }

    #[test]
    fn sort_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.dat");
        let output = dir.path().join("sorted.dat");
        std::fs::write(&input, "{\"t\": 3}\n{\"t\": 1}\n{\"t\": 2}\n").unwrap();
        let stats = sorter(&[tmp.path()], 2).sort_file(&input, &output).unwrap();
        assert_eq!(stats.records, 3);
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "{\"t\": 1}\n{\"t\": 2}\n{\"t\": 3}\n"
        );
        assert_eq!(files_in(tmp.path()), 0);
    }

    #[test]
    fn sort_file_temp_removes_only_its_own_output() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let s = sorter(&[tmp.path()], 2);
        let output = dir.path().join("sorted.dat");
        std::fs::write(&output, "kept from an earlier run\n").unwrap();

        let missing = dir.path().join("typo.json");
        assert!(matches!(
            s.sort_file_temp(&missing, &output),
            Err(Error::Io(_))
        ));
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "kept from an earlier run\n"
        );

        let input = dir.path().join("input.dat");
        std::fs::write(&input, "{\"t\": 2}\n{\"t\": 1}\n").unwrap();
        let (stats, guard) = s.sort_file_temp(&input, &output).unwrap();
        assert_eq!(stats.records, 2);
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "{\"t\": 1}\n{\"t\": 2}\n"
        );
        drop(guard);
        assert!(!output.exists());
    }

    #[test]
    fn invalid_options() {
        let s = schema();
        let opt = SortOpt {
            buffer_size: Some(0),
            temp_dirs: None,
        };
        assert!(matches!(ExternalSorter::new(&opt, &s), Err(Error::Config(_))));
        let opt = SortOpt {
            buffer_size: None,
            temp_dirs: Some(vec![PathBuf::from("/definitely/not/here")]),
        };
        assert!(matches!(ExternalSorter::new(&opt, &s), Err(Error::Config(_))));
        let s = ExternalSorter::new(&SortOpt::default(), &s).unwrap();
        assert_eq!(s.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(s.temp_dirs, vec![std::env::temp_dir()]);
    }
}
