use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{BracketError, BracketResult};
use crate::types::{BracketInfo, Team, TeamId, MAX_BRACKET_SIZE, MIN_TEAM_COUNT};

/// One first-round pairing. A side without a team is a bye.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Matchup {
  pub seed_a: u32,
  pub seed_b: Option<u32>,
  pub team_a: Option<TeamId>,
  pub team_b: Option<TeamId>,
  pub is_bye: bool,
}

impl Matchup {
  /// The team that advances without playing.
  pub fn bye_winner(&self) -> Option<&TeamId> {
    if !self.is_bye {
      return None;
    }
    self.team_a.as_ref().or(self.team_b.as_ref())
  }
}

pub fn next_power_of_two(n: usize) -> usize {
  let value = n.max(1);
  if value.is_power_of_two() {
    return value;
  }
  value.next_power_of_two()
}

pub fn bye_count(team_count: usize) -> usize {
  next_power_of_two(team_count) - team_count
}

pub fn bracket_info(team_count: usize) -> BracketResult<BracketInfo> {
  if team_count < MIN_TEAM_COUNT {
    return Err(BracketError::InvalidTeamCount { count: team_count });
  }
  let bracket_size = next_power_of_two(team_count);
  if bracket_size > MAX_BRACKET_SIZE {
    return Err(BracketError::UnsupportedBracketSize {
      size: bracket_size,
      max: MAX_BRACKET_SIZE,
    });
  }
  Ok(BracketInfo {
    team_count,
    bracket_size,
    bye_count: bracket_size - team_count,
    round_count: bracket_size.trailing_zeros() as usize,
  })
}

/// Canonical seeding order for a power-of-two bracket.
///
/// Built by doubling: each seed `s` of the order for `n` slots is followed by
/// its complement `2n + 1 - s`. `[1]` becomes `[1, 2]`, then `[1, 4, 2, 3]`,
/// then `[1, 8, 4, 5, 2, 7, 3, 6]`, and so on for every size up to
/// `MAX_BRACKET_SIZE`. Adjacent pairs are first-round opponents.
pub fn seeding_order(bracket_size: usize) -> BracketResult<Vec<u32>> {
  if bracket_size < MIN_TEAM_COUNT || !bracket_size.is_power_of_two() || bracket_size > MAX_BRACKET_SIZE {
    return Err(BracketError::UnsupportedBracketSize {
      size: bracket_size,
      max: MAX_BRACKET_SIZE,
    });
  }
  let mut seeds = vec![1u32];
  while seeds.len() < bracket_size {
    let complement = (seeds.len() * 2 + 1) as u32;
    let mut next = Vec::with_capacity(seeds.len() * 2);
    for seed in seeds.iter().copied() {
      next.push(seed);
      next.push(complement - seed);
    }
    seeds = next;
  }
  Ok(seeds)
}

/// Pair the seeding order into first-round matchups.
///
/// Seeds above the team count have no team, so the top seeds face them and
/// advance on a bye.
pub fn first_round_matchups(teams: &[Team]) -> BracketResult<Vec<Matchup>> {
  let info = bracket_info(teams.len())?;
  let order = seeding_order(info.bracket_size)?;

  let mut seed_map: HashMap<u32, &TeamId> = HashMap::new();
  for team in teams {
    seed_map.insert(team.seed, &team.id);
  }

  let matchups = order
    .chunks_exact(2)
    .map(|pair| {
      let (seed_a, seed_b) = (pair[0], pair[1]);
      let team_a = seed_map.get(&seed_a).map(|id| (*id).clone());
      let team_b = seed_map.get(&seed_b).map(|id| (*id).clone());
      let is_bye = team_a.is_none() || team_b.is_none();
      Matchup {
        seed_a,
        seed_b: team_b.as_ref().map(|_| seed_b),
        team_a,
        team_b,
        is_bye,
      }
    })
    .collect();
  Ok(matchups)
}
