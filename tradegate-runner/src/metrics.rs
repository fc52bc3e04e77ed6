//! Performance metrics, computed as pure functions over closed trades.
//!
//! P&L is in points summed over all contracts of a trade. Breakeven trades
//! count toward the trade total but not toward the win rate.
//!
//! Besides the headline figures this covers breakdowns by setup type, grade,
//! direction and exit day, the cumulative equity curve, and a calibration of
//! producer confidence against realized win rate.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tradegate_core::domain::{Direction, TradeRecord, TradeResult};

/// Label used in breakdowns for trades with no setup type.
pub const UNLABELED_SETUP: &str = "unlabeled";

/// Aggregate performance metrics for a single backtest run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub trade_count: usize,
    pub wins: usize,
    pub losses: usize,
    pub breakevens: usize,
    pub win_rate: f64,
    pub total_pnl_points: f64,
    pub avg_pnl_points: f64,
    pub gross_profit_points: f64,
    pub gross_loss_points: f64,
    pub profit_factor: f64,
    pub avg_win_points: f64,
    pub avg_loss_points: f64,
    pub largest_win_points: f64,
    pub largest_loss_points: f64,
    pub expectancy_points: f64,
    pub avg_r_multiple: f64,
    pub avg_bars_held: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub max_drawdown_points: f64,
    pub by_setup_type: BTreeMap<String, GroupStats>,
    pub by_grade: BTreeMap<String, GroupStats>,
    /// Keyed LONG / SHORT; both keys are always present.
    #[serde(default)]
    pub by_direction: BTreeMap<String, GroupStats>,
    /// Keyed by the calendar date of each trade's exit.
    #[serde(default)]
    pub by_day: BTreeMap<NaiveDate, GroupStats>,
    #[serde(default)]
    pub equity_curve: Vec<EquityPoint>,
    #[serde(default)]
    pub confidence_calibration: ConfidenceCalibration,
}

/// Win/loss summary for a subset of trades.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub total_pnl_points: f64,
}

impl GroupStats {
    /// Add one closed trade.
    pub fn record(&mut self, result: TradeResult, pnl_points: f64) {
        self.trades += 1;
        self.total_pnl_points += pnl_points;
        match result {
            TradeResult::Win => self.wins += 1,
            TradeResult::Loss => self.losses += 1,
            TradeResult::Breakeven => {}
        }
        let decided = self.wins + self.losses;
        self.win_rate = if decided > 0 {
            self.wins as f64 / decided as f64
        } else {
            0.0
        };
    }
}

/// Cumulative P&L after one closed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub pnl_points: f64,
    pub equity_points: f64,
}

impl PerformanceMetrics {
    pub fn compute(trades: &[TradeRecord]) -> Self {
        let wins = count(trades, TradeResult::Win);
        let losses = count(trades, TradeResult::Loss);
        let total = total_pnl(trades);
        Self {
            trade_count: trades.len(),
            wins,
            losses,
            breakevens: count(trades, TradeResult::Breakeven),
            win_rate: win_rate(trades),
            total_pnl_points: total,
            avg_pnl_points: if trades.is_empty() {
                0.0
            } else {
                total / trades.len() as f64
            },
            gross_profit_points: gross_profit(trades),
            gross_loss_points: gross_loss(trades),
            profit_factor: profit_factor(trades),
            avg_win_points: avg_win(trades),
            avg_loss_points: avg_loss(trades),
            largest_win_points: largest_win(trades),
            largest_loss_points: largest_loss(trades),
            expectancy_points: expectancy(trades),
            avg_r_multiple: mean_f64(
                &trades
                    .iter()
                    .map(|t| t.r_multiple_achieved)
                    .collect::<Vec<_>>(),
            ),
            avg_bars_held: mean_f64(&trades.iter().map(|t| t.bars_held as f64).collect::<Vec<_>>()),
            max_consecutive_wins: max_consecutive(trades, TradeResult::Win),
            max_consecutive_losses: max_consecutive(trades, TradeResult::Loss),
            max_drawdown_points: max_drawdown(trades),
            by_setup_type: group_by(trades, |t| {
                t.setup_type
                    .clone()
                    .unwrap_or_else(|| UNLABELED_SETUP.to_string())
            }),
            by_grade: group_by(trades, |t| t.grade.to_string()),
            by_direction: stats_by_direction(trades),
            by_day: daily_stats(trades),
            equity_curve: equity_curve(trades),
            confidence_calibration: ConfidenceCalibration::compute(trades),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Wins over decided trades (wins + losses). Breakevens are excluded.
pub fn win_rate(trades: &[TradeRecord]) -> f64 {
    let wins = count(trades, TradeResult::Win);
    let decided = wins + count(trades, TradeResult::Loss);
    if decided == 0 {
        return 0.0;
    }
    wins as f64 / decided as f64
}

pub fn total_pnl(trades: &[TradeRecord]) -> f64 {
    trades.iter().map(|t| t.realized_pnl_points).sum()
}

/// Sum of P&L over winning trades.
pub fn gross_profit(trades: &[TradeRecord]) -> f64 {
    results(trades, TradeResult::Win)
        .map(|t| t.realized_pnl_points)
        .sum()
}

/// Absolute sum of P&L over losing trades.
pub fn gross_loss(trades: &[TradeRecord]) -> f64 {
    results(trades, TradeResult::Loss)
        .map(|t| t.realized_pnl_points)
        .sum::<f64>()
        .abs()
}

/// Gross profit / gross loss.
///
/// Capped at 100.0 when there are winners and no losses.
pub fn profit_factor(trades: &[TradeRecord]) -> f64 {
    let gp = gross_profit(trades);
    let gl = gross_loss(trades);
    if gl < 1e-10 {
        return if gp > 0.0 { 100.0 } else { 0.0 };
    }
    (gp / gl).min(100.0)
}

pub fn avg_win(trades: &[TradeRecord]) -> f64 {
    let wins = count(trades, TradeResult::Win);
    if wins == 0 {
        return 0.0;
    }
    gross_profit(trades) / wins as f64
}

/// Average loss as a positive number of points.
pub fn avg_loss(trades: &[TradeRecord]) -> f64 {
    let losses = count(trades, TradeResult::Loss);
    if losses == 0 {
        return 0.0;
    }
    gross_loss(trades) / losses as f64
}

pub fn largest_win(trades: &[TradeRecord]) -> f64 {
    results(trades, TradeResult::Win)
        .map(|t| t.realized_pnl_points)
        .fold(0.0, f64::max)
}

/// Most negative trade P&L (0.0 when there are no losses).
pub fn largest_loss(trades: &[TradeRecord]) -> f64 {
    results(trades, TradeResult::Loss)
        .map(|t| t.realized_pnl_points)
        .fold(0.0, f64::min)
}

/// win_rate × avg_win − (1 − win_rate) × avg_loss.
pub fn expectancy(trades: &[TradeRecord]) -> f64 {
    if count(trades, TradeResult::Win) + count(trades, TradeResult::Loss) == 0 {
        return 0.0;
    }
    let wr = win_rate(trades);
    wr * avg_win(trades) - (1.0 - wr) * avg_loss(trades)
}

/// Largest drop of cumulative P&L from its running peak, as a positive
/// number of points. The peak starts at zero.
pub fn max_drawdown(trades: &[TradeRecord]) -> f64 {
    let mut equity = 0.0_f64;
    let mut peak = 0.0_f64;
    let mut max_dd = 0.0_f64;
    for t in trades {
        equity += t.realized_pnl_points;
        peak = peak.max(equity);
        max_dd = max_dd.max(peak - equity);
    }
    max_dd
}

/// Longest run of consecutive trades with the given result.
pub fn max_consecutive(trades: &[TradeRecord], result: TradeResult) -> usize {
    let mut max_streak = 0;
    let mut current = 0;
    for t in trades {
        if t.result == result {
            current += 1;
            max_streak = max_streak.max(current);
        } else {
            current = 0;
        }
    }
    max_streak
}

/// Cumulative P&L in exit-time order. Trades closing at the same time keep
/// their input order.
pub fn equity_curve(trades: &[TradeRecord]) -> Vec<EquityPoint> {
    let mut ordered: Vec<&TradeRecord> = trades.iter().collect();
    ordered.sort_by_key(|t| t.exit_time);
    let mut equity = 0.0;
    ordered
        .into_iter()
        .map(|t| {
            equity += t.realized_pnl_points;
            EquityPoint {
                timestamp: t.exit_time,
                pnl_points: t.realized_pnl_points,
                equity_points: equity,
            }
        })
        .collect()
}

// ─── Breakdowns ─────────────────────────────────────────────────────

pub fn stats_by_direction(trades: &[TradeRecord]) -> BTreeMap<String, GroupStats> {
    let mut groups = group_by(trades, |t| t.direction.to_string());
    for direction in [Direction::Long, Direction::Short] {
        groups.entry(direction.to_string()).or_default();
    }
    groups
}

/// Stats per calendar day of the exit.
pub fn daily_stats(trades: &[TradeRecord]) -> BTreeMap<NaiveDate, GroupStats> {
    group_by(trades, |t| t.exit_time.date())
}

fn group_by<K, F>(trades: &[TradeRecord], key: F) -> BTreeMap<K, GroupStats>
where
    K: Ord,
    F: Fn(&TradeRecord) -> K,
{
    let mut groups: BTreeMap<K, GroupStats> = BTreeMap::new();
    for t in trades {
        groups
            .entry(key(t))
            .or_default()
            .record(t.result, t.realized_pnl_points);
    }
    groups
}

// ─── Confidence calibration ─────────────────────────────────────────

/// Closed trades needed before calibration gives a verdict.
pub const MIN_CALIBRATION_TRADES: usize = 20;
/// Trades a bucket needs before its win rate is compared.
pub const MIN_BUCKET_TRADES: usize = 3;
/// Win-rate margin very-high confidence must hold over low confidence.
pub const PREDICTIVE_EDGE: f64 = 0.10;

/// Producer confidence band. Bands are half-open except the top one,
/// which includes 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBucket {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceBucket {
    pub const ALL: [ConfidenceBucket; 4] = [
        ConfidenceBucket::Low,
        ConfidenceBucket::Medium,
        ConfidenceBucket::High,
        ConfidenceBucket::VeryHigh,
    ];

    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.9 {
            ConfidenceBucket::VeryHigh
        } else if confidence >= 0.75 {
            ConfidenceBucket::High
        } else if confidence >= 0.6 {
            ConfidenceBucket::Medium
        } else {
            ConfidenceBucket::Low
        }
    }

    /// Lower and upper bound of the band.
    pub fn range(self) -> (f64, f64) {
        match self {
            ConfidenceBucket::Low => (0.0, 0.6),
            ConfidenceBucket::Medium => (0.6, 0.75),
            ConfidenceBucket::High => (0.75, 0.9),
            ConfidenceBucket::VeryHigh => (0.9, 1.0),
        }
    }
}

impl fmt::Display for ConfidenceBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceBucket::Low => write!(f, "low"),
            ConfidenceBucket::Medium => write!(f, "medium"),
            ConfidenceBucket::High => write!(f, "high"),
            ConfidenceBucket::VeryHigh => write!(f, "very_high"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketStats {
    pub bucket: ConfidenceBucket,
    pub stats: GroupStats,
}

/// Whether higher producer confidence has actually meant more winners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalibrationVerdict {
    /// Fewer than `MIN_CALIBRATION_TRADES` closed trades.
    InsufficientData,
    /// Fewer than two buckets hold `MIN_BUCKET_TRADES` trades.
    TooFewLevels,
    /// Very-high confidence beats low confidence by `PREDICTIVE_EDGE`.
    Predictive,
    NotPredictive,
}

impl CalibrationVerdict {
    pub fn trusts_confidence(self) -> bool {
        self == CalibrationVerdict::Predictive
    }
}

impl fmt::Display for CalibrationVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CalibrationVerdict::InsufficientData => "insufficient data",
            CalibrationVerdict::TooFewLevels => "too few confidence levels with data",
            CalibrationVerdict::Predictive => "high-confidence setups perform better",
            CalibrationVerdict::NotPredictive => "confidence is not predictive",
        };
        f.write_str(text)
    }
}

/// Win rate per confidence bucket, always holding all four buckets in
/// ascending order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceCalibration {
    pub buckets: Vec<BucketStats>,
}

impl Default for ConfidenceCalibration {
    fn default() -> Self {
        Self {
            buckets: ConfidenceBucket::ALL
                .iter()
                .map(|&bucket| BucketStats {
                    bucket,
                    stats: GroupStats::default(),
                })
                .collect(),
        }
    }
}

impl ConfidenceCalibration {
    pub fn compute(trades: &[TradeRecord]) -> Self {
        let mut calibration = Self::default();
        for t in trades {
            calibration.record_outcome(t.confidence, t.result, t.realized_pnl_points);
        }
        calibration
    }

    pub fn record_outcome(&mut self, confidence: f64, result: TradeResult, pnl_points: f64) {
        let bucket = ConfidenceBucket::from_confidence(confidence);
        if let Some(b) = self.buckets.iter_mut().find(|b| b.bucket == bucket) {
            b.stats.record(result, pnl_points);
        }
    }

    pub fn bucket(&self, bucket: ConfidenceBucket) -> Option<&GroupStats> {
        self.buckets
            .iter()
            .find(|b| b.bucket == bucket)
            .map(|b| &b.stats)
    }

    pub fn total_trades(&self) -> usize {
        self.buckets.iter().map(|b| b.stats.trades).sum()
    }

    pub fn verdict(&self) -> CalibrationVerdict {
        if self.total_trades() < MIN_CALIBRATION_TRADES {
            return CalibrationVerdict::InsufficientData;
        }
        let rated = |bucket| {
            self.bucket(bucket)
                .filter(|g| g.trades >= MIN_BUCKET_TRADES)
                .map(|g| g.win_rate)
        };
        let levels = ConfidenceBucket::ALL
            .iter()
            .filter(|&&b| rated(b).is_some())
            .count();
        if levels < 2 {
            return CalibrationVerdict::TooFewLevels;
        }
        match (
            rated(ConfidenceBucket::VeryHigh),
            rated(ConfidenceBucket::Low),
        ) {
            (Some(high), Some(low)) if high > low + PREDICTIVE_EDGE => {
                CalibrationVerdict::Predictive
            }
            _ => CalibrationVerdict::NotPredictive,
        }
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn results(trades: &[TradeRecord], result: TradeResult) -> impl Iterator<Item = &TradeRecord> {
    trades.iter().filter(move |t| t.result == result)
}

fn count(trades: &[TradeRecord], result: TradeResult) -> usize {
    results(trades, result).count()
}

fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
