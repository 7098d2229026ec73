// JSON/CSV record import/export

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use imputer_engine::{record_keys, Record, Value};

use crate::error::{IoError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    Json,
    Csv,
}

impl RecordFormat {
    /// Format from the file extension (`.json`, `.csv`, `.tsv`).
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(Self::Json),
            Some("csv") | Some("tsv") => Ok(Self::Csv),
            _ => Err(IoError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Load a record file. CSV cells under `numeric_keys` must parse as numbers.
pub fn read_records(path: &Path, numeric_keys: &[String]) -> Result<Vec<Record>> {
    let format = RecordFormat::from_path(path)?;
    let content = read_file_as_utf8(path)?;
    let records = match format {
        RecordFormat::Json => parse_json_records(&content)?,
        RecordFormat::Csv => parse_csv_records(&content, numeric_keys, &path.display().to_string())?,
    };
    tracing::debug!(path = %path.display(), records = records.len(), "loaded records");
    Ok(records)
}

/// A JSON array of flat objects. Numbers, strings, booleans and nulls map
/// onto [`Value`] directly.
pub fn parse_json_records(content: &str) -> Result<Vec<Record>> {
    Ok(serde_json::from_str(content)?)
}

/// CSV with a header row. Empty cells are null; cells under `numeric_keys`
/// are numbers; everything else stays text.
pub fn parse_csv_records(content: &str, numeric_keys: &[String], dataset: &str) -> Result<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(content))
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let fields = result?;
        let mut record = Record::with_capacity(headers.len());
        for (key, field) in headers.iter().zip(fields.iter()) {
            let value = if field.is_empty() {
                Value::Null
            } else if numeric_keys.iter().any(|k| k == key) {
                let n: f64 = field.parse().map_err(|_| IoError::BadValue {
                    dataset: dataset.to_string(),
                    row,
                    key: key.to_string(),
                    reason: format!("is not a number: '{field}'"),
                })?;
                Value::Number(n)
            } else {
                Value::Text(field.to_string())
            };
            record.insert(key.to_string(), value);
        }
        records.push(record);
    }
    Ok(records)
}

/// Detect the field delimiter from the header and the first few rows.
///
/// Each candidate (comma, tab, semicolon, pipe) is scored by how many
/// sample lines split into the same number of fields as the first line.
fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b',', b'\t', b';', b'|'];
    let sample: Vec<&str> = content.lines().take(10).collect();

    let mut best = b',';
    let mut best_score = 0usize;
    for &delim in candidates {
        let counts: Vec<usize> = sample
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        let Some(&target) = counts.first() else {
            continue;
        };
        if target <= 1 {
            continue;
        }
        let score = counts.iter().filter(|&&c| c == target).count() * target;
        if score > best_score {
            best_score = score;
            best = delim;
        }
    }
    best
}

/// Read a file, falling back to Windows-1252 when it is not valid UTF-8
/// (spreadsheet exports often are not).
fn read_file_as_utf8(path: &Path) -> Result<String> {
    let read_err = |source: std::io::Error| IoError::Read {
        path: path.to_path_buf(),
        source,
    };
    let mut bytes = Vec::new();
    File::open(path)
        .and_then(|mut f| f.read_to_end(&mut bytes))
        .map_err(read_err)?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(e.as_bytes());
            Ok(decoded.into_owned())
        }
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Write records to `path`, choosing JSON or CSV by extension.
pub fn write_records(path: &Path, records: &[Record]) -> Result<()> {
    let format = RecordFormat::from_path(path)?;
    let file = File::create(path).map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    write_records_to(&mut writer, records, format)?;
    writer.flush().map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// JSON is a pretty-printed array; CSV gets a header row from the shared
/// record keys and empty cells for nulls.
pub fn write_records_to<W: Write>(writer: W, records: &[Record], format: RecordFormat) -> Result<()> {
    match format {
        RecordFormat::Json => {
            let mut writer = writer;
            serde_json::to_writer_pretty(&mut writer, records)?;
            writeln!(writer).map_err(|e| IoError::Json(serde_json::Error::io(e)))?;
        }
        RecordFormat::Csv => {
            let keys = record_keys(records)?;
            let mut csv_writer = csv::Writer::from_writer(writer);
            if !keys.is_empty() {
                csv_writer.write_record(&keys)?;
            }
            for record in records {
                csv_writer.write_record(keys.iter().map(|k| cell(&record[k.as_str()])))?;
            }
            csv_writer.flush().map_err(csv::Error::from)?;
        }
    }
    Ok(())
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
