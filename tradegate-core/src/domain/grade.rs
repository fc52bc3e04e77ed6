//! Letter grades produced by the edge scorer.

use serde::{Deserialize, Serialize};

/// Setup quality label. Derived once per setup, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

/// What the scorer advises doing with a graded setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Take,
    Wait,
    Skip,
}

impl Grade {
    /// Map a 0-100 score to a grade: A >= 85, B >= 70, C >= 55, D >= 40, else F.
    pub fn from_score(score: u32) -> Self {
        match score {
            85.. => Grade::A,
            70..=84 => Grade::B,
            55..=69 => Grade::C,
            40..=54 => Grade::D,
            _ => Grade::F,
        }
    }

    pub fn size_multiplier(self) -> f64 {
        match self {
            Grade::A => 1.5,
            Grade::B => 1.0,
            Grade::C => 0.5,
            Grade::D | Grade::F => 0.0,
        }
    }

    pub fn recommendation(self) -> Recommendation {
        match self {
            Grade::A | Grade::B => Recommendation::Take,
            Grade::C => Recommendation::Wait,
            Grade::D | Grade::F => Recommendation::Skip,
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_inclusive() {
        assert_eq!(Grade::from_score(100), Grade::A);
        assert_eq!(Grade::from_score(85), Grade::A);
        assert_eq!(Grade::from_score(84), Grade::B);
        assert_eq!(Grade::from_score(70), Grade::B);
        assert_eq!(Grade::from_score(69), Grade::C);
        assert_eq!(Grade::from_score(55), Grade::C);
        assert_eq!(Grade::from_score(54), Grade::D);
        assert_eq!(Grade::from_score(40), Grade::D);
        assert_eq!(Grade::from_score(39), Grade::F);
        assert_eq!(Grade::from_score(0), Grade::F);
    }

    #[test]
    fn multipliers_and_recommendations() {
        assert_eq!(Grade::A.size_multiplier(), 1.5);
        assert_eq!(Grade::B.size_multiplier(), 1.0);
        assert_eq!(Grade::C.size_multiplier(), 0.5);
        assert_eq!(Grade::D.size_multiplier(), 0.0);
        assert_eq!(Grade::F.size_multiplier(), 0.0);

        assert_eq!(Grade::A.recommendation(), Recommendation::Take);
        assert_eq!(Grade::B.recommendation(), Recommendation::Take);
        assert_eq!(Grade::C.recommendation(), Recommendation::Wait);
        assert_eq!(Grade::D.recommendation(), Recommendation::Skip);
        assert_eq!(Grade::F.recommendation(), Recommendation::Skip);
    }
}
