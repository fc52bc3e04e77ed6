//! Signal file for the execution platform.
//!
//! One CSV row per accepted entry:
//!
//! ```text
//! DateTime,Direction,Entry_Price,Stop_Loss,Target
//! 03/04/2024 10:00:00,LONG,14602.00,14590.00,14698.00
//! ```
//!
//! The last column is named by the schema version. Appending to a file whose
//! header does not match the chosen schema is refused.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tradegate_core::domain::{Direction, ValidSetup};

/// Timestamp layout expected by the execution platform.
pub const SIGNAL_TIME_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// Column layout version of the signal file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalSchema {
    /// Last column `Target`.
    #[default]
    V1,
    /// Last column `Take_Profit`.
    V2,
}

impl SignalSchema {
    pub fn columns(self) -> [&'static str; 5] {
        let target = match self {
            SignalSchema::V1 => "Target",
            SignalSchema::V2 => "Take_Profit",
        };
        ["DateTime", "Direction", "Entry_Price", "Stop_Loss", target]
    }

    pub fn header(self) -> String {
        self.columns().join(",")
    }

    /// Identify the schema from a header line.
    pub fn detect(header: &str) -> Option<Self> {
        let header = header.trim();
        [SignalSchema::V1, SignalSchema::V2]
            .into_iter()
            .find(|s| s.header() == header)
    }
}

impl FromStr for SignalSchema {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v1" | "1" => Ok(SignalSchema::V1),
            "v2" | "2" => Ok(SignalSchema::V2),
            other => Err(format!("unknown signal schema {other:?} (expected v1 or v2)")),
        }
    }
}

#[derive(Debug, Error)]
pub enum SignalFileError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path} has header {found:?}, expected {expected:?}")]
    HeaderMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("line {line}: {detail}")]
    BadRow { line: u64, detail: String },
}

/// One entry signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRow {
    pub timestamp: NaiveDateTime,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub target: f64,
}

impl SignalRow {
    pub fn from_setup(setup: &ValidSetup) -> Self {
        Self {
            timestamp: setup.created_at,
            direction: setup.direction,
            entry_price: setup.entry_price,
            stop_loss: setup.stop_price,
            target: setup.target_price,
        }
    }

    fn fields(&self) -> [String; 5] {
        [
            self.timestamp.format(SIGNAL_TIME_FORMAT).to_string(),
            self.direction.to_string(),
            format!("{:.2}", self.entry_price),
            format!("{:.2}", self.stop_loss),
            format!("{:.2}", self.target),
        ]
    }
}

/// Append-only writer over a signal file.
pub struct SignalWriter {
    path: PathBuf,
    schema: SignalSchema,
    writer: csv::Writer<File>,
    written: usize,
}

impl SignalWriter {
    /// Open `path` for appending, creating it with a header if missing or empty.
    ///
    /// An existing header must match `schema` exactly.
    pub fn open(path: &Path, schema: SignalSchema) -> Result<Self, SignalFileError> {
        let io_err = |source| SignalFileError::Io {
            path: path.to_path_buf(),
            source,
        };

        let existing = match File::open(path) {
            Ok(f) => {
                let mut first = String::new();
                BufReader::new(f).read_line(&mut first).map_err(io_err)?;
                Some(first.trim().to_string())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(io_err(e)),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_err)?;

        match existing.as_deref() {
            None | Some("") => {
                writeln!(file, "{}", schema.header()).map_err(io_err)?;
                tracing::info!(path = %path.display(), ?schema, "created signal file");
            }
            Some(found) if found == schema.header() => {}
            Some(found) => {
                return Err(SignalFileError::HeaderMismatch {
                    path: path.to_path_buf(),
                    expected: schema.header(),
                    found: found.to_string(),
                })
            }
        }

        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        Ok(Self {
            path: path.to_path_buf(),
            schema,
            writer,
            written: 0,
        })
    }

    pub fn schema(&self) -> SignalSchema {
        self.schema
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written through this writer (not counting rows already in the file).
    pub fn written(&self) -> usize {
        self.written
    }

    /// Append one row and flush it to disk.
    pub fn write(&mut self, row: &SignalRow) -> Result<(), SignalFileError> {
        self.writer.write_record(row.fields())?;
        self.writer.flush().map_err(|source| SignalFileError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.written += 1;
        tracing::info!(
            direction = %row.direction,
            entry = row.entry_price,
            stop = row.stop_loss,
            target = row.target,
            "signal written"
        );
        Ok(())
    }

    pub fn write_setup(&mut self, setup: &ValidSetup) -> Result<(), SignalFileError> {
        self.write(&SignalRow::from_setup(setup))
    }
}

/// Read every row from a signal file, detecting its schema from the header.
pub fn read_signals(path: &Path) -> Result<(SignalSchema, Vec<SignalRow>), SignalFileError> {
    let file = File::open(path).map_err(|source| SignalFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rdr = csv::Reader::from_reader(file);
    let header = rdr.headers()?.iter().collect::<Vec<_>>().join(",");
    let schema = SignalSchema::detect(&header).ok_or_else(|| SignalFileError::HeaderMismatch {
        path: path.to_path_buf(),
        expected: SignalSchema::default().header(),
        found: header.clone(),
    })?;

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let bad = |detail: String| SignalFileError::BadRow { line, detail };
        let field = |i: usize| record.get(i).unwrap_or("").trim();
        let price = |i: usize| {
            field(i)
                .parse::<f64>()
                .map_err(|_| bad(format!("bad price {:?}", field(i))))
        };

        let timestamp = NaiveDateTime::parse_from_str(field(0), SIGNAL_TIME_FORMAT)
            .map_err(|_| bad(format!("bad timestamp {:?}", field(0))))?;
        let direction = match field(1) {
            "LONG" => Direction::Long,
            "SHORT" => Direction::Short,
            other => return Err(bad(format!("bad direction {other:?}"))),
        };
        rows.push(SignalRow {
            timestamp,
            direction,
            entry_price: price(2)?,
            stop_loss: price(3)?,
            target: price(4)?,
        });
    }
    Ok((schema, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(h: u32, direction: Direction) -> SignalRow {
        SignalRow {
            timestamp: NaiveDate::from_ymd_opt(2024, 3, 4)
                .unwrap()
                .and_hms_opt(h, 0, 0)
                .unwrap(),
            direction,
            entry_price: 14602.0,
            stop_loss: 14590.0,
            target: 14698.126,
        }
    }

    #[test]
    fn schema_headers() {
        assert_eq!(
            SignalSchema::V1.header(),
            "DateTime,Direction,Entry_Price,Stop_Loss,Target"
        );
        assert_eq!(
            SignalSchema::V2.header(),
            "DateTime,Direction,Entry_Price,Stop_Loss,Take_Profit"
        );
        assert_eq!(SignalSchema::default(), SignalSchema::V1);
        assert_eq!("V2".parse::<SignalSchema>().unwrap(), SignalSchema::V2);
        assert!("v3".parse::<SignalSchema>().is_err());
    }

    #[test]
    fn new_file_gets_header_and_formatted_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signals.csv");
        let mut w = SignalWriter::open(&path, SignalSchema::V1).unwrap();
        w.write(&row(10, Direction::Long)).unwrap();
        assert_eq!(w.written(), 1);
        drop(w);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "DateTime,Direction,Entry_Price,Stop_Loss,Target\n\
             03/04/2024 10:00:00,LONG,14602.00,14590.00,14698.13\n"
        );
    }

    #[test]
    fn reopening_appends_under_same_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signals.csv");
        SignalWriter::open(&path, SignalSchema::V2)
            .unwrap()
            .write(&row(10, Direction::Long))
            .unwrap();
        SignalWriter::open(&path, SignalSchema::V2)
            .unwrap()
            .write(&row(11, Direction::Short))
            .unwrap();

        let (schema, rows) = read_signals(&path).unwrap();
        assert_eq!(schema, SignalSchema::V2);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].direction, Direction::Short);
        assert_eq!(rows[1].target, 14698.13);
    }

    #[test]
    fn header_mismatch_refuses_to_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signals.csv");
        SignalWriter::open(&path, SignalSchema::V1).unwrap();
        let err = SignalWriter::open(&path, SignalSchema::V2).err().unwrap();
        assert!(matches!(err, SignalFileError::HeaderMismatch { .. }));

        std::fs::write(&path, "Time,Side,Px\n").unwrap();
        let err = SignalWriter::open(&path, SignalSchema::V1).err().unwrap();
        assert!(matches!(err, SignalFileError::HeaderMismatch { .. }));
        // The foreign file is untouched.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Time,Side,Px\n");
    }

    #[test]
    fn empty_file_is_initialized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signals.csv");
        std::fs::write(&path, "").unwrap();
        SignalWriter::open(&path, SignalSchema::V1).unwrap();
        let (schema, rows) = read_signals(&path).unwrap();
        assert_eq!(schema, SignalSchema::V1);
        assert!(rows.is_empty());
    }
}
