//! Market data and setup loading.
//!
//! Bars come from CSV files with a `DateTime,Open,High,Low,Close[,Volume]`
//! header. Setups come from JSON Lines, one serialized `Setup` per line.
//! Deterministic synthetic data is available for smoke runs and benchmarks.

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tradegate_core::domain::{
    Bar, ConfirmationBucket, Direction, RegimeBucket, SessionBucket, Setup, SetupContext,
};

/// Accepted timestamp layouts, tried in order.
pub const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing column {0:?}")]
    MissingColumn(&'static str),

    #[error("line {line}: cannot parse {field} from {value:?}")]
    BadField {
        line: u64,
        field: &'static str,
        value: String,
    },

    #[error("line {line}: invalid setup: {source}")]
    BadSetup {
        line: usize,
        source: serde_json::Error,
    },
}

// ─── Bars ───────────────────────────────────────────────────────────

/// Load bars from a CSV file. Input order is preserved; ordering problems
/// surface later as data errors in the driver.
pub fn load_bars_csv(path: &Path) -> Result<Vec<Bar>, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let bars = read_bars_csv(file)?;
    tracing::info!(path = %path.display(), bars = bars.len(), "loaded bars");
    Ok(bars)
}

/// Parse bars from any CSV reader.
pub fn read_bars_csv<R: Read>(reader: R) -> Result<Vec<Bar>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = rdr.headers()?.clone();
    let column = |name: &'static str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or(LoadError::MissingColumn(name))
    };
    let ts_col = column("DateTime")?;
    let open_col = column("Open")?;
    let high_col = column("High")?;
    let low_col = column("Low")?;
    let close_col = column("Close")?;
    let volume_col = column("Volume").ok();

    let mut bars = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let field = |col: usize| record.get(col).unwrap_or("");
        let price = |col: usize, name: &'static str| {
            field(col).parse::<f64>().map_err(|_| LoadError::BadField {
                line,
                field: name,
                value: field(col).to_string(),
            })
        };

        let raw_ts = field(ts_col);
        let timestamp = parse_timestamp(raw_ts).ok_or_else(|| LoadError::BadField {
            line,
            field: "DateTime",
            value: raw_ts.to_string(),
        })?;
        let volume = match volume_col.map(field) {
            None | Some("") => 0,
            Some(v) => parse_volume(v).ok_or_else(|| LoadError::BadField {
                line,
                field: "Volume",
                value: v.to_string(),
            })?,
        };

        bars.push(Bar {
            timestamp,
            open: price(open_col, "Open")?,
            high: price(high_col, "High")?,
            low: price(low_col, "Low")?,
            close: price(close_col, "Close")?,
            volume,
        });
    }
    Ok(bars)
}

pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Volumes sometimes arrive as floats ("1200.0").
fn parse_volume(s: &str) -> Option<u64> {
    s.parse::<u64>().ok().or_else(|| {
        s.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v.round() as u64)
    })
}

// ─── Setups ─────────────────────────────────────────────────────────

/// Load setups from a JSON Lines file. Blank lines are skipped.
pub fn load_setups_jsonl(path: &Path) -> Result<Vec<Setup>, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let setups = parse_setups_jsonl(&content)?;
    tracing::info!(path = %path.display(), setups = setups.len(), "loaded setups");
    Ok(setups)
}

pub fn parse_setups_jsonl(content: &str) -> Result<Vec<Setup>, LoadError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| {
            serde_json::from_str(l).map_err(|source| LoadError::BadSetup { line: i + 1, source })
        })
        .collect()
}

// ─── Synthetic data ─────────────────────────────────────────────────

fn seeded_rng(seed: &str) -> StdRng {
    StdRng::from_seed(*blake3::hash(seed.as_bytes()).as_bytes())
}

/// Generate deterministic one-minute bars from a seed string.
///
/// Same seed, start and count always give the same bars.
pub fn generate_synthetic_bars(
    seed: &str,
    start: NaiveDateTime,
    count: usize,
    start_price: f64,
) -> Vec<Bar> {
    let mut rng = seeded_rng(seed);
    let mut bars = Vec::with_capacity(count);
    let mut price = start_price;

    for i in 0..count {
        let open = price;
        let close = (open + rng.gen_range(-6.0..6.0)).max(1.0);
        let high = open.max(close) + rng.gen_range(0.0..4.0);
        let low = (open.min(close) - rng.gen_range(0.0..4.0)).max(0.25);
        let volume = rng.gen_range(100..5_000);

        bars.push(Bar {
            timestamp: start + Duration::minutes(i as i64),
            open,
            high,
            low,
            close,
            volume,
        });
        price = close;
    }
    bars
}

const EMA_FAST: usize = 8;
const EMA_MID: usize = 21;
const EMA_SLOW: usize = 50;

/// Propose a setup every `every` bars, following a fast/mid/slow EMA stack.
///
/// Stops are placed `risk_points` from the close with a target at `r_multiple`.
/// Context tags come from the bar time and the EMA regime.
pub fn generate_synthetic_setups(
    seed: &str,
    bars: &[Bar],
    every: usize,
    risk_points: f64,
    r_multiple: f64,
) -> Vec<Setup> {
    let mut rng = seeded_rng(&format!("{seed}/setups"));
    let every = every.max(1);
    let (mut fast, mut mid, mut slow) = (0.0, 0.0, 0.0);
    let mut setups = Vec::new();

    for (i, bar) in bars.iter().enumerate() {
        if i == 0 {
            (fast, mid, slow) = (bar.close, bar.close, bar.close);
        } else {
            fast = ema_step(fast, bar.close, EMA_FAST);
            mid = ema_step(mid, bar.close, EMA_MID);
            slow = ema_step(slow, bar.close, EMA_SLOW);
        }
        if i < EMA_SLOW || i % every != 0 {
            continue;
        }

        let regime = RegimeBucket::from_emas(fast, mid, slow, bar.close);
        let direction = if fast >= mid {
            Direction::Long
        } else {
            Direction::Short
        };
        let confirmation = match (direction, bar.close > bar.open) {
            (Direction::Long, true) | (Direction::Short, false) => ConfirmationBucket::Confirmed,
            _ => ConfirmationBucket::Unconfirmed,
        };
        let sign = direction.sign();
        setups.push(Setup {
            direction,
            entry_price: bar.close,
            stop_price: bar.close - sign * risk_points,
            target_price: bar.close + sign * risk_points * r_multiple,
            confidence: rng.gen_range(0.4..0.9),
            context: SetupContext {
                session: SessionBucket::from_time(bar.timestamp.time()),
                regime,
                confirmation,
            },
            created_at: bar.timestamp,
            setup_type: Some("ema_trend".into()),
            reasoning: None,
        });
    }
    setups
}

fn ema_step(prev: f64, value: f64, period: usize) -> f64 {
    let alpha = 2.0 / (period as f64 + 1.0);
    prev + alpha * (value - prev)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    #[test]
    fn reads_both_timestamp_layouts_and_optional_volume() {
        let csv = "DateTime,Open,High,Low,Close,Volume\n\
                   2024-01-02 09:30:00,100,101,99,100.5,1200\n\
                   01/02/2024 09:31:00,100.5,102,100,101.75,1300.0\n";
        let bars = read_bars_csv(csv.as_bytes()).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].timestamp, start());
        assert_eq!(bars[1].timestamp, start() + Duration::minutes(1));
        assert_eq!(bars[1].close, 101.75);
        assert_eq!(bars[1].volume, 1300);

        let no_volume = "DateTime,Open,High,Low,Close\n2024-01-02 09:30:00,1,2,0.5,1.5\n";
        assert_eq!(read_bars_csv(no_volume.as_bytes()).unwrap()[0].volume, 0);
    }

    #[test]
    fn header_lookup_ignores_case_and_order() {
        let csv = "close,low,high,open,datetime\n1.5,0.5,2,1,2024-01-02 09:30:00\n";
        let bars = read_bars_csv(csv.as_bytes()).unwrap();
        let bar = &bars[0];
        assert_eq!((bar.open, bar.high, bar.low, bar.close), (1.0, 2.0, 0.5, 1.5));
    }

    #[test]
    fn missing_column_and_bad_fields_are_errors() {
        let err = read_bars_csv("DateTime,Open,High,Low\n".as_bytes()).unwrap_err();
        assert!(matches!(err, LoadError::MissingColumn("Close")));

        let err = read_bars_csv(
            "DateTime,Open,High,Low,Close\n2024-01-02 09:30:00,1,2,0.5,abc\n".as_bytes(),
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::BadField { field: "Close", .. }));

        let err = read_bars_csv("DateTime,Open,High,Low,Close\nyesterday,1,2,0.5,1\n".as_bytes())
            .unwrap_err();
        assert!(matches!(err, LoadError::BadField { field: "DateTime", .. }));
    }

    #[test]
    fn setups_jsonl_skips_blank_lines_and_reports_line() {
        let line = r#"{"direction":"LONG","entry_price":100.0,"stop_price":80.0,"target_price":180.0,"confidence":0.7,"context":{"session":"MORNING","regime":"UPTREND","confirmation":"CONFIRMED"},"created_at":"2024-01-02T10:00:00"}"#;
        let content = format!("{line}\n\n{line}\n");
        let setups = parse_setups_jsonl(&content).unwrap();
        assert_eq!(setups.len(), 2);
        assert_eq!(setups[0].direction, Direction::Long);
        assert!(setups[0].setup_type.is_none());

        let err = parse_setups_jsonl(&format!("{line}\n{{not json}}\n")).unwrap_err();
        assert!(matches!(err, LoadError::BadSetup { line: 2, .. }));
    }

    #[test]
    fn synthetic_bars_are_deterministic_and_sane() {
        let a = generate_synthetic_bars("seed-1", start(), 500, 15000.0);
        let b = generate_synthetic_bars("seed-1", start(), 500, 15000.0);
        let c = generate_synthetic_bars("seed-2", start(), 500, 15000.0);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|bar| bar.is_sane()));
        assert!(a.windows(2).all(|w| w[1].timestamp > w[0].timestamp));
        assert!(a.windows(2).all(|w| w[1].open == w[0].close));
    }

    #[test]
    fn synthetic_setups_follow_bars() {
        let bars = generate_synthetic_bars("s", start(), 400, 15000.0);
        let setups = generate_synthetic_setups("s", &bars, 25, 20.0, 4.0);
        assert!(!setups.is_empty());
        for s in &setups {
            assert!(s.is_ordered());
            assert!((s.risk() - 20.0).abs() < 1e-9);
            assert!((s.reward() - 80.0).abs() < 1e-6);
            assert!(bars.iter().any(|b| b.timestamp == s.created_at && b.close == s.entry_price));
        }
        assert_eq!(setups, generate_synthetic_setups("s", &bars, 25, 20.0, 4.0));
    }
}
