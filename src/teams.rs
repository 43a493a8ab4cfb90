use std::collections::{HashMap, HashSet};

use crate::error::{BracketError, BracketResult};
use crate::types::{Team, TeamId, MIN_TEAM_COUNT};

/// Validate a caller-supplied team list and return it ordered by seed.
///
/// Ids must be unique and non-empty, and seeds must be exactly `1..=n`.
pub fn normalize_teams(teams: &[Team]) -> BracketResult<Vec<Team>> {
    if teams.len() < MIN_TEAM_COUNT {
        return Err(BracketError::InvalidTeamCount { count: teams.len() });
    }

    let mut seen_ids: HashSet<&TeamId> = HashSet::new();
    for team in teams {
        if team.id.0.trim().is_empty() {
            return Err(BracketError::InvalidSeeding(format!(
                "team with seed {} has an empty id",
                team.seed
            )));
        }
        if !seen_ids.insert(&team.id) {
            return Err(BracketError::DuplicateTeam(team.id.clone()));
        }
    }

    let mut sorted = teams.to_vec();
    sorted.sort_by_key(|team| team.seed);
    for (index, team) in sorted.iter().enumerate() {
        let expected = index as u32 + 1;
        if team.seed != expected {
            return Err(BracketError::InvalidSeeding(format!(
                "expected seed {} for team {}, found {}",
                expected, team.id, team.seed
            )));
        }
    }
    Ok(sorted)
}

/// Lookup from team id to the caller's team record, used for display names.
#[derive(Clone, Debug, Default)]
pub struct TeamDirectory {
    teams: HashMap<TeamId, Team>,
}

impl TeamDirectory {
    pub fn new(teams: &[Team]) -> Self {
        TeamDirectory {
            teams: teams
                .iter()
                .map(|team| (team.id.clone(), team.clone()))
                .collect(),
        }
    }

    pub fn get(&self, id: &TeamId) -> Option<&Team> {
        self.teams.get(id)
    }

    pub fn seed_of(&self, id: &TeamId) -> Option<u32> {
        self.get(id).map(|team| team.seed)
    }

    /// Team name when one was given, otherwise the id itself.
    pub fn display_name(&self, id: &TeamId) -> String {
        self.get(id)
            .and_then(|team| team.name.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| id.0.clone())
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(id: &str, seed: u32, name: &str) -> Team {
        Team {
            id: TeamId::from(id),
            seed,
            name: Some(name.to_string()),
        }
    }

    #[test]
    fn test_normalize_sorts_by_seed() {
        let teams = vec![Team::new("c", 3), Team::new("a", 1), Team::new("b", 2)];
        let sorted = normalize_teams(&teams).unwrap();
        let ids: Vec<&str> = sorted.iter().map(|team| team.id.0.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_normalize_rejects_short_lists() {
        assert_eq!(
            normalize_teams(&[Team::new("solo", 1)]),
            Err(BracketError::InvalidTeamCount { count: 1 })
        );
        assert_eq!(
            normalize_teams(&[]),
            Err(BracketError::InvalidTeamCount { count: 0 })
        );
    }

    #[test]
    fn test_normalize_rejects_duplicates() {
        let teams = vec![Team::new("a", 1), Team::new("a", 2)];
        assert_eq!(
            normalize_teams(&teams),
            Err(BracketError::DuplicateTeam(TeamId::from("a")))
        );
    }

    #[test]
    fn test_normalize_rejects_gaps_and_zero_seeds() {
        let gap = vec![Team::new("a", 1), Team::new("b", 3)];
        assert!(matches!(
            normalize_teams(&gap),
            Err(BracketError::InvalidSeeding(_))
        ));
        let zero = vec![Team::new("a", 0), Team::new("b", 1)];
        assert!(matches!(
            normalize_teams(&zero),
            Err(BracketError::InvalidSeeding(_))
        ));
        let repeated = vec![Team::new("a", 1), Team::new("b", 1)];
        assert!(matches!(
            normalize_teams(&repeated),
            Err(BracketError::InvalidSeeding(_))
        ));
    }

    #[test]
    fn test_directory_names() {
        let directory = TeamDirectory::new(&[
            named("t1", 1, "Dink Dynasty"),
            named("t2", 2, "  "),
            Team::new("t3", 3),
        ]);
        assert_eq!(directory.display_name(&TeamId::from("t1")), "Dink Dynasty");
        assert_eq!(directory.display_name(&TeamId::from("t2")), "t2");
        assert_eq!(directory.display_name(&TeamId::from("t3")), "t3");
        assert_eq!(directory.display_name(&TeamId::from("ghost")), "ghost");
        assert_eq!(directory.seed_of(&TeamId::from("t3")), Some(3));
        assert_eq!(directory.len(), 3);
    }
}
