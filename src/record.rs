//! Schema-less records and the stream that decodes them.
//!
//! A record is one JSON object on one line of the input. Only a few fields are ever interpreted,
//! and which ones is decided by the `[record]` section of the configuration:
//!
//! ```toml
//! [record]
//! time_field = "CreationTime"  # numeric timestamp, any unit
//! tiebreak_fields = ["ID"]     # secondary sort order for equal timestamps
//! primary_key = "ID"           # target of "rp" reads
//! secondary_key = "UserID"     # target of "rs" reads
//! key_type = "string"          # or "numeric"
//! ```
//!
//! All options are optional and default to the values above.

use crate::{Error, KeySpace};
use log::debug;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Buffer capacity used for every file read or written line by line.
pub(crate) const IO_BUFFER: usize = 64 * 1024;

/// How key values are ordered, which matters for range reads.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    /// Every value is rendered as text and ordered lexicographically.
    String,

    /// Integral numbers are ordered numerically; other values fall back to text.
    Numeric,
}

/// A key value extracted from a record.
///
/// Numbers always order before text, which only matters when a key field mixes both.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Number(i128),
    Text(String),
}

impl Key {
    /// Convert a JSON value into a key, or `None` if the value counts as missing (`null`, empty
    /// string, empty array or empty object).
    pub fn from_value(value: &Value, key_type: KeyType) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::Array(a) if a.is_empty() => None,
            Value::Object(o) if o.is_empty() => None,
            Value::String(s) => Some(Key::Text(s.clone())),
            Value::Number(n) => {
                let integral = n
                    .as_i64()
                    .map(i128::from)
                    .or_else(|| n.as_u64().map(i128::from));
                match (key_type, integral) {
                    (KeyType::Numeric, Some(v)) => Some(Key::Number(v)),
                    _ => Some(Key::Text(n.to_string())),
                }
            }
            other => Some(Key::Text(other.to_string())),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Number(n) => write!(f, "{}", n),
            Key::Text(s) => f.write_str(s),
        }
    }
}

/// Problems with a single record. These never abort a run: a malformed line is skipped, and a
/// record with a missing field is simply not used where that field is needed.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RecordError {
    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("missing field: {0}")]
    MissingField(String),
}

/// Extract a timestamp from a JSON value. Fractional timestamps are floored.
pub(crate) fn timestamp_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite())
                .map(|f| f.floor() as i64)
        }),
        _ => None,
    }
}

/// The fields section deserialized from TOML. See the module documentation.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct RecordOpt {
    pub time_field: Option<String>,
    pub tiebreak_fields: Option<Vec<String>>,
    pub primary_key: Option<String>,
    pub secondary_key: Option<String>,
    pub key_type: Option<KeyType>,
}

/// The set of fields the engine reads from every record.
#[derive(Clone, Debug, PartialEq)]
pub struct Schema {
    pub time_field: String,
    pub tiebreak_fields: Vec<String>,
    pub primary_key: String,
    pub secondary_key: String,
    pub key_type: KeyType,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            time_field: "CreationTime".to_string(),
            tiebreak_fields: vec!["ID".to_string()],
            primary_key: "ID".to_string(),
            secondary_key: "UserID".to_string(),
            key_type: KeyType::String,
        }
    }
}

impl Schema {
    pub fn new(opt: &RecordOpt) -> Result<Self, Error> {
        let default = Self::default();
        let schema = Self {
            time_field: opt.time_field.clone().unwrap_or(default.time_field),
            tiebreak_fields: opt
                .tiebreak_fields
                .clone()
                .unwrap_or(default.tiebreak_fields),
            primary_key: opt.primary_key.clone().unwrap_or(default.primary_key),
            secondary_key: opt.secondary_key.clone().unwrap_or(default.secondary_key),
            key_type: opt.key_type.unwrap_or(default.key_type),
        };
        let names = [&schema.time_field, &schema.primary_key, &schema.secondary_key];
        if names
            .into_iter()
            .chain(schema.tiebreak_fields.iter())
            .any(|f| f.is_empty())
        {
            return Err(Error::Config("field names should not be empty".to_string()));
        }
        Ok(schema)
    }

    /// The field read by reads of the given key space.
    pub fn key_field(&self, space: KeySpace) -> &str {
        match space {
            KeySpace::Primary => &self.primary_key,
            KeySpace::Secondary => &self.secondary_key,
        }
    }
}

/// A decoded record: the original line plus its top-level fields.
#[derive(Clone, Debug)]
pub struct Record {
    line: String,
    fields: Map<String, Value>,
}

impl Record {
    /// Decode a line. Surrounding whitespace is not part of the record.
    pub fn parse(line: String) -> Result<Self, RecordError> {
        let trimmed = line.trim();
        let fields = serde_json::from_str::<Map<String, Value>>(trimmed)
            .map_err(|e| RecordError::Malformed(e.to_string()))?;
        let line = if trimmed.len() == line.len() {
            line
        } else {
            trimmed.to_string()
        };
        Ok(Self { line, fields })
    }

    /// The record exactly as it appeared in the input.
    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn timestamp(&self, field: &str) -> Result<i64, RecordError> {
        self.get(field)
            .and_then(timestamp_of)
            .ok_or_else(|| RecordError::MissingField(field.to_string()))
    }

    pub fn key(&self, field: &str, key_type: KeyType) -> Result<Key, RecordError> {
        self.get(field)
            .and_then(|v| Key::from_value(v, key_type))
            .ok_or_else(|| RecordError::MissingField(field.to_string()))
    }
}

/// One raw line of input.
pub(crate) enum Line {
    Text(String),
    /// Not valid UTF-8, can never be a record.
    Invalid,
}

/// Splits a reader into lines without failing on invalid UTF-8.
pub(crate) struct LineReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: BufRead> LineReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
        }
    }

    /// The next line with its terminator removed, or `None` at the end of input.
    pub(crate) fn next_line(&mut self) -> io::Result<Option<Line>> {
        self.buf.clear();
        if self.inner.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        while matches!(self.buf.last(), Some(b'\n') | Some(b'\r')) {
            self.buf.pop();
        }
        match String::from_utf8(std::mem::take(&mut self.buf)) {
            Ok(s) => Ok(Some(Line::Text(s))),
            Err(_) => Ok(Some(Line::Invalid)),
        }
    }
}

/// A lazy stream of records decoded from line-delimited JSON.
///
/// Blank lines are ignored, malformed lines are skipped and counted. Only I/O failures surface as
/// errors.
pub struct RecordStream<R> {
    lines: LineReader<R>,
    malformed: u64,
}

impl RecordStream<BufReader<File>> {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::with_capacity(IO_BUFFER, file)))
    }
}

impl<R: BufRead> RecordStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: LineReader::new(reader),
            malformed: 0,
        }
    }

    /// Number of lines skipped so far because they could not be decoded.
    pub fn malformed(&self) -> u64 {
        self.malformed
    }
}

impl<R: BufRead> Iterator for RecordStream<R> {
    type Item = io::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next_line() {
                Ok(Some(Line::Text(line))) => line,
                Ok(Some(Line::Invalid)) => {
                    self.malformed += 1;
                    debug!("Skipping line that is not valid UTF-8");
                    continue;
                }
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            };
            if line.trim().is_empty() {
                continue;
            }
            match Record::parse(line) {
                Ok(record) => return Some(Ok(record)),
                Err(e) => {
                    self.malformed += 1;
                    debug!("Skipping line: {}", e);
                }
            }
        }
    }
}
