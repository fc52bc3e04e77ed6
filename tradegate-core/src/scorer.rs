//! Edge scorer: maps a setup's context to a 0-100 score and a grade.
//!
//! Four sub-scores, each capped at 25:
//! - Session timing: the morning window scores highest, thin sessions lowest
//! - Regime alignment: trend-aligned > ranging > counter-trend
//! - Entry confirmation: confirmed > unknown > unconfirmed
//! - Reward/risk: configured tiers, non-decreasing in R, saturating at the top tier
//!
//! Pure lookup. Same inputs always produce the same `EdgeScore`.

use serde::{Deserialize, Serialize};

use crate::config::ScorerConfig;
use crate::domain::{
    ConfirmationBucket, Grade, Recommendation, RegimeAlignment, SessionBucket, Setup, SetupContext,
};

/// Maximum points per sub-score.
pub const SUB_SCORE_CAP: u32 = 25;

/// Scored setup, with the factors that drove the score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeScore {
    pub score: u32,
    pub session_points: u32,
    pub regime_points: u32,
    pub confirmation_points: u32,
    pub reward_risk_points: u32,
    pub grade: Grade,
    pub size_multiplier: f64,
    pub recommendation: Recommendation,
    /// Factors that added edge, human readable.
    pub edge_factors: Vec<String>,
    /// Factors that detracted from edge, human readable.
    pub risk_factors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct EdgeScorer {
    config: ScorerConfig,
}

impl EdgeScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    /// Score a setup under an explicit context.
    pub fn score(&self, setup: &Setup, context: &SetupContext) -> EdgeScore {
        let mut edge_factors = Vec::new();
        let mut risk_factors = Vec::new();

        let session_points = session_points(context.session);
        match context.session {
            SessionBucket::Morning | SessionBucket::Afternoon => {
                edge_factors.push(format!("{:?} session", context.session))
            }
            SessionBucket::Lunch => risk_factors.push("lunch chop".to_string()),
            SessionBucket::Premarket | SessionBucket::AfterHours => {
                risk_factors.push(format!("low liquidity ({:?})", context.session))
            }
            SessionBucket::OpenDrive | SessionBucket::Close => {
                risk_factors.push(format!("volatile window ({:?})", context.session))
            }
        }

        let alignment = context.regime.alignment(setup.direction);
        let regime_points = regime_points(alignment);
        match alignment {
            RegimeAlignment::Aligned => {
                edge_factors.push(format!("aligned with {:?}", context.regime))
            }
            RegimeAlignment::Ranging => risk_factors.push("ranging market".to_string()),
            RegimeAlignment::Counter => {
                risk_factors.push(format!("counter to {:?}", context.regime))
            }
        }

        let confirmation_points = confirmation_points(context.confirmation);
        match context.confirmation {
            ConfirmationBucket::Confirmed => edge_factors.push("entry confirmed".to_string()),
            ConfirmationBucket::Unconfirmed => {
                risk_factors.push("no confirming price action".to_string())
            }
            ConfirmationBucket::Unknown => {}
        }

        let r = setup.r_multiple().unwrap_or(0.0);
        let reward_risk_points = self.reward_risk_points(r);
        if reward_risk_points >= self.ceiling_points() {
            edge_factors.push(format!("excellent R/R ({r:.1}R)"));
        } else if reward_risk_points <= self.config.reward_risk_floor_points {
            risk_factors.push(format!("poor R/R ({r:.1}R)"));
        }

        let score = session_points + regime_points + confirmation_points + reward_risk_points;
        let grade = Grade::from_score(score);

        EdgeScore {
            score,
            session_points,
            regime_points,
            confirmation_points,
            reward_risk_points,
            grade,
            size_multiplier: grade.size_multiplier(),
            recommendation: grade.recommendation(),
            edge_factors,
            risk_factors,
        }
    }

    /// Score a setup under the context it carries.
    pub fn score_setup(&self, setup: &Setup) -> EdgeScore {
        self.score(setup, &setup.context)
    }

    /// Points for a given R-multiple: the first tier whose threshold is met.
    pub fn reward_risk_points(&self, r_multiple: f64) -> u32 {
        self.config
            .reward_risk_tiers
            .iter()
            .find(|tier| r_multiple >= tier.min_r)
            .map(|tier| tier.points)
            .unwrap_or(self.config.reward_risk_floor_points)
            .min(SUB_SCORE_CAP)
    }

    fn ceiling_points(&self) -> u32 {
        self.config
            .reward_risk_tiers
            .first()
            .map(|t| t.points)
            .unwrap_or(SUB_SCORE_CAP)
    }
}

fn session_points(session: SessionBucket) -> u32 {
    match session {
        SessionBucket::Morning => 25,
        SessionBucket::Afternoon => 20,
        SessionBucket::OpenDrive | SessionBucket::Close => 12,
        SessionBucket::Lunch => 7,
        SessionBucket::Premarket | SessionBucket::AfterHours => 5,
    }
}

fn regime_points(alignment: RegimeAlignment) -> u32 {
    match alignment {
        RegimeAlignment::Aligned => 25,
        RegimeAlignment::Ranging => 10,
        RegimeAlignment::Counter => 5,
    }
}

fn confirmation_points(confirmation: ConfirmationBucket) -> u32 {
    match confirmation {
        ConfirmationBucket::Confirmed => 25,
        ConfirmationBucket::Unknown => 10,
        ConfirmationBucket::Unconfirmed => 8,
    }
}
