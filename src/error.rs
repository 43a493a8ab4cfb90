use thiserror::Error;

use crate::types::{MatchId, TeamId};

pub type BracketResult<T> = Result<T, BracketError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BracketError {
    #[error("A bracket needs at least 2 teams, got {count}")]
    InvalidTeamCount { count: usize },

    #[error("Bracket size {size} is not supported (power of two between 2 and {max})")]
    UnsupportedBracketSize { size: usize, max: usize },

    #[error("Broken bracket link at match {match_id}: {detail}")]
    BrokenBracketLink { match_id: MatchId, detail: String },

    #[error("Invalid seeding: {0}")]
    InvalidSeeding(String),

    #[error("Team {0} appears more than once")]
    DuplicateTeam(TeamId),

    #[error("Match {0} not found")]
    UnknownMatch(MatchId),

    #[error("Invalid result for match {match_id}: {detail}")]
    InvalidResult { match_id: MatchId, detail: String },
}

impl BracketError {
    /// True when the error points at a defect in the generated graph rather
    /// than at bad caller input.
    pub fn is_construction_defect(&self) -> bool {
        match self {
            BracketError::BrokenBracketLink { .. } => true,
            BracketError::InvalidTeamCount { .. } => false,
            BracketError::UnsupportedBracketSize { .. } => false,
            BracketError::InvalidSeeding(_) => false,
            BracketError::DuplicateTeam(_) => false,
            BracketError::UnknownMatch(_) => false,
            BracketError::InvalidResult { .. } => false,
        }
    }

    pub(crate) fn broken_link(match_id: MatchId, detail: impl Into<String>) -> Self {
        BracketError::BrokenBracketLink {
            match_id,
            detail: detail.into(),
        }
    }

    pub(crate) fn invalid_result(match_id: MatchId, detail: impl Into<String>) -> Self {
        BracketError::InvalidResult {
            match_id,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_broken_links_are_construction_defects() {
        assert!(BracketError::broken_link(MatchId(3), "no winner target").is_construction_defect());
        assert!(!BracketError::InvalidTeamCount { count: 1 }.is_construction_defect());
        assert!(!BracketError::UnknownMatch(MatchId(9)).is_construction_defect());
        assert!(!BracketError::invalid_result(MatchId(1), "not seated").is_construction_defect());
    }

    #[test]
    fn messages_carry_context() {
        let err = BracketError::broken_link(MatchId(12), "no loser drop");
        assert_eq!(err.to_string(), "Broken bracket link at match 12: no loser drop");
        let err = BracketError::UnsupportedBracketSize {
            size: 131_072,
            max: 65_536,
        };
        assert!(err.to_string().contains("131072"));
    }
}
