//! Outbound actions for the execution collaborator.

use serde::{Deserialize, Serialize};

use super::{Direction, ExitReason, Grade, LegKind, Recommendation};
use crate::error::{DenyReason, ValidationError};

/// Why a stop moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopKind {
    Breakeven,
    Trail,
}

/// Why a candidate setup did not become a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rejection {
    Validation { error: ValidationError },
    Risk { reason: DenyReason },
    Recommendation { grade: Grade, recommendation: Recommendation },
    NoSize { grade: Grade },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::Validation { error } => write!(f, "validation: {error}"),
            Rejection::Risk { reason } => write!(f, "risk: {reason}"),
            Rejection::Recommendation {
                grade,
                recommendation,
            } => write!(f, "grade {grade} recommends {recommendation:?}"),
            Rejection::NoSize { grade } => write!(f, "grade {grade} sizes to zero contracts"),
        }
    }
}

/// One decision emitted by the lifecycle driver.
///
/// `Rejected` is audit-only; the execution collaborator ignores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Enter {
        direction: Direction,
        entry_price: f64,
        stop_price: f64,
        target_price: f64,
        quantity: u32,
        grade: Grade,
    },
    ScaleExit {
        leg: LegKind,
        quantity: u32,
        price: f64,
    },
    MoveStop {
        kind: StopKind,
        price: f64,
    },
    Close {
        reason: ExitReason,
        quantity: u32,
        price: f64,
    },
    Rejected {
        rejection: Rejection,
    },
}

impl Action {
    /// Short wire name, e.g. `SCALE_EXIT`.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Enter { .. } => "ENTER",
            Action::ScaleExit { .. } => "SCALE_EXIT",
            Action::MoveStop { .. } => "MOVE_STOP",
            Action::Close { .. } => "CLOSE",
            Action::Rejected { .. } => "REJECTED",
        }
    }

    /// True for actions the execution collaborator must act on.
    pub fn is_executable(&self) -> bool {
        !matches!(self, Action::Rejected { .. })
    }

    pub(crate) fn rejected(rejection: Rejection) -> Self {
        Action::Rejected { rejection }
    }
}
