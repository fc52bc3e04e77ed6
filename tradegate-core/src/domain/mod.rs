//! Domain types for TradeGate

pub mod action;
pub mod bar;
pub mod grade;
pub mod setup;
pub mod trade;

pub use action::{Action, Rejection, StopKind};
pub use bar::Bar;
pub use grade::{Grade, Recommendation};
pub use setup::{
    ConfirmationBucket, Direction, RegimeAlignment, RegimeBucket, SessionBucket, Setup,
    SetupContext, ValidSetup,
};
pub use trade::{ExitLeg, ExitReason, LegKind, TradeRecord, TradeResult};
