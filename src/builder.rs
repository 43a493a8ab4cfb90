use serde::Serialize;
use tracing::debug;

use crate::error::BracketResult;
use crate::linker::ProgressionLinker;
use crate::seeding::{bracket_info, first_round_matchups, Matchup};
use crate::teams::normalize_teams;
use crate::types::{Bracket, BracketInfo, BracketType, Match, MatchId, Round, Slot, SlotSide, Team};

/// What a loser-bracket round does, fixed once per round.
///
/// Round 0 pairs up first-round drops. After that, receiving rounds take one
/// fresh drop (slot A) against one survivor (slot B), and elimination rounds
/// halve the survivors. The last round is the loser-bracket final, where the
/// winner-bracket final's loser (slot B) meets the last survivor (slot A).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LoserRoundRole {
  FirstRound,
  ReceivingRound,
  EliminationRound,
  FinalRound,
}

impl LoserRoundRole {
  pub fn for_round(index: usize, loser_round_count: usize) -> Self {
    if index + 1 == loser_round_count {
      LoserRoundRole::FinalRound
    } else if index == 0 {
      LoserRoundRole::FirstRound
    } else if index % 2 == 1 {
      LoserRoundRole::ReceivingRound
    } else {
      LoserRoundRole::EliminationRound
    }
  }

  pub fn receives_drops(self) -> bool {
    !matches!(self, LoserRoundRole::EliminationRound)
  }

  /// Slot a survivor of the previous loser round lands in, when survivors
  /// arrive one per match.
  pub fn survivor_slot(self) -> Option<SlotSide> {
    match self {
      LoserRoundRole::ReceivingRound => Some(SlotSide::B),
      LoserRoundRole::FinalRound => Some(SlotSide::A),
      LoserRoundRole::FirstRound | LoserRoundRole::EliminationRound => None,
    }
  }

  /// Slot a winner-bracket drop lands in, when drops arrive one per match.
  pub fn drop_slot(self) -> Option<SlotSide> {
    match self {
      LoserRoundRole::ReceivingRound => Some(SlotSide::A),
      LoserRoundRole::FinalRound => Some(SlotSide::B),
      LoserRoundRole::FirstRound | LoserRoundRole::EliminationRound => None,
    }
  }
}

pub fn loser_round_count(winner_round_count: usize) -> usize {
  2 * winner_round_count.saturating_sub(1)
}

/// Loser round receiving the losers of winner round `winner_round`.
///
/// `L(0) = 0` and `L(w) = 2w - 1`, except the winner-bracket final, which
/// always drops into the loser-bracket final.
pub fn loser_round_for_drop(winner_round: usize, winner_round_count: usize) -> Option<usize> {
  let loser_rounds = loser_round_count(winner_round_count);
  if loser_rounds == 0 || winner_round >= winner_round_count {
    return None;
  }
  if winner_round + 1 == winner_round_count {
    return Some(loser_rounds - 1);
  }
  let index = if winner_round == 0 { 0 } else { 2 * winner_round - 1 };
  (index < loser_rounds).then_some(index)
}

/// Match count of the first loser round.
pub fn first_loser_round_size(non_bye_matches: usize, winner_round_count: usize) -> usize {
  if non_bye_matches == 0 {
    return 1 << winner_round_count.saturating_sub(2);
  }
  non_bye_matches.div_ceil(2)
}

/// Allocates every round and match of a double-elimination bracket.
///
/// Matches are created unlinked; `ProgressionLinker` wires the sources once
/// the whole arena exists.
pub struct BracketBuilder {
  info: BracketInfo,
  teams: Vec<Team>,
  matchups: Vec<Matchup>,
  rounds: Vec<Round>,
  matches: Vec<Match>,
  next_id: u64,
}

impl BracketBuilder {
  pub fn new(teams: &[Team]) -> BracketResult<Self> {
    let teams = normalize_teams(teams)?;
    let info = bracket_info(teams.len())?;
    let matchups = first_round_matchups(&teams)?;
    Ok(BracketBuilder {
      info,
      teams,
      matchups,
      rounds: Vec::new(),
      matches: Vec::new(),
      next_id: 1,
    })
  }

  pub fn info(&self) -> &BracketInfo {
    &self.info
  }

  pub fn build(mut self) -> Bracket {
    self.build_winner_bracket();
    self.build_loser_bracket();
    self.build_finals();

    let total_matches = self.matches.len();
    let total_rounds = self.rounds.len();
    Bracket {
      info: self.info,
      teams: self.teams,
      rounds: self.rounds,
      matches: self.matches,
      total_matches,
      total_rounds,
    }
  }

  fn build_winner_bracket(&mut self) {
    let round_count = self.info.round_count;
    let first = self.push_round(BracketType::Winner, round_count - 1);
    let matchups = std::mem::take(&mut self.matchups);
    for (position, matchup) in matchups.iter().enumerate() {
      let id = self.push_match(first, position);
      let m = self.match_mut(id);
      m.team_a = matchup.team_a.clone().map(Slot::Team).unwrap_or(Slot::Bye);
      m.team_b = matchup.team_b.clone().map(Slot::Team).unwrap_or(Slot::Bye);
      m.seed_a = Some(matchup.seed_a);
      m.seed_b = matchup.seed_b;
      m.is_bye = matchup.is_bye;
      m.winner = matchup.bye_winner().cloned();
    }

    let mut count = matchups.len();
    for round in 1..round_count {
      count /= 2;
      let idx = self.push_round(BracketType::Winner, round_count - 1 - round);
      for position in 0..count {
        self.push_match(idx, position);
      }
    }
    self.matchups = matchups;
    debug!(
      rounds = round_count,
      byes = self.info.bye_count,
      "winner bracket built"
    );
  }

  fn build_loser_bracket(&mut self) {
    let round_count = self.info.round_count;
    let loser_rounds = loser_round_count(round_count);
    let non_bye = self.matchups.iter().filter(|m| !m.is_bye).count();

    let mut previous = 0usize;
    let mut sizes = Vec::with_capacity(loser_rounds);
    for index in 0..loser_rounds {
      let count = match LoserRoundRole::for_round(index, loser_rounds) {
        LoserRoundRole::FirstRound => first_loser_round_size(non_bye, round_count),
        LoserRoundRole::ReceivingRound => self.info.bracket_size >> ((index + 1) / 2 + 1),
        LoserRoundRole::EliminationRound => previous.div_ceil(2).max(1),
        LoserRoundRole::FinalRound => 1,
      };
      let idx = self.push_round(BracketType::Loser, loser_rounds - 1 - index);
      for position in 0..count {
        self.push_match(idx, position);
      }
      sizes.push(count);
      previous = count;
    }
    debug!(rounds = loser_rounds, ?sizes, "loser bracket built");
  }

  fn build_finals(&mut self) {
    let first = self.push_round(BracketType::Finals, 1);
    self.push_match(first, 0);
    let reset = self.push_round(BracketType::Finals, 0);
    self.push_match(reset, 0);
  }

  fn push_round(&mut self, bracket_type: BracketType, depth: usize) -> usize {
    let idx = self.rounds.len();
    self.rounds.push(Round {
      idx,
      bracket_type,
      depth,
      matches: Vec::new(),
    });
    idx
  }

  fn push_match(&mut self, round: usize, bracket_position: usize) -> MatchId {
    let id = MatchId(self.next_id);
    self.next_id += 1;
    self.matches.push(Match::new(id, round, bracket_position));
    self.rounds[round].matches.push(id);
    id
  }

  fn match_mut(&mut self, id: MatchId) -> &mut Match {
    // Ids are handed out sequentially from 1 while building.
    &mut self.matches[(id.0 - 1) as usize]
  }
}

/// Build and link a complete double-elimination bracket. All or nothing: any
/// linking defect fails the whole call.
pub fn generate_bracket(teams: &[Team]) -> BracketResult<Bracket> {
  let mut bracket = BracketBuilder::new(teams)?.build();
  ProgressionLinker::new(&mut bracket)?.link()?;
  Ok(bracket)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::BracketError;

  fn seeded(count: u32) -> Vec<Team> {
    (1..=count).map(|seed| Team::new(format!("t{seed}"), seed)).collect()
  }

  fn round_sizes(bracket: &Bracket, bracket_type: BracketType) -> Vec<usize> {
    bracket.rounds_of(bracket_type).map(|round| round.matches.len()).collect()
  }

  #[test]
  fn test_roles() {
    use LoserRoundRole::*;
    let roles: Vec<_> = (0..6).map(|i| LoserRoundRole::for_round(i, 6)).collect();
    assert_eq!(
      roles,
      vec![FirstRound, ReceivingRound, EliminationRound, ReceivingRound, EliminationRound, FinalRound]
    );
    assert_eq!(LoserRoundRole::for_round(0, 2), FirstRound);
    assert_eq!(LoserRoundRole::for_round(1, 2), FinalRound);
    assert!(!EliminationRound.receives_drops());
    assert_eq!(ReceivingRound.drop_slot(), Some(SlotSide::A));
    assert_eq!(FinalRound.drop_slot(), Some(SlotSide::B));
    assert_eq!(FinalRound.survivor_slot(), Some(SlotSide::A));
    assert_eq!(FirstRound.survivor_slot(), None);
  }

  #[test]
  fn test_drop_rounds() {
    // Four winner rounds, six loser rounds.
    assert_eq!(loser_round_for_drop(0, 4), Some(0));
    assert_eq!(loser_round_for_drop(1, 4), Some(1));
    assert_eq!(loser_round_for_drop(2, 4), Some(3));
    assert_eq!(loser_round_for_drop(3, 4), Some(5));
    assert_eq!(loser_round_for_drop(4, 4), None);
    assert_eq!(loser_round_for_drop(0, 1), None);
    assert_eq!(loser_round_for_drop(1, 2), Some(1));
  }

  #[test]
  fn test_eight_team_shape() {
    let bracket = BracketBuilder::new(&seeded(8)).unwrap().build();
    assert_eq!(round_sizes(&bracket, BracketType::Winner), vec![4, 2, 1]);
    assert_eq!(round_sizes(&bracket, BracketType::Loser), vec![2, 2, 1, 1]);
    assert_eq!(round_sizes(&bracket, BracketType::Finals), vec![1, 1]);
    assert_eq!(bracket.total_matches, 15);
    assert_eq!(bracket.total_rounds, 9);
    let depths: Vec<usize> = bracket.rounds_of(BracketType::Winner).map(|r| r.depth).collect();
    assert_eq!(depths, vec![2, 1, 0]);
    let depths: Vec<usize> = bracket.rounds_of(BracketType::Loser).map(|r| r.depth).collect();
    assert_eq!(depths, vec![3, 2, 1, 0]);
  }

  #[test]
  fn test_round_idx_is_global_order() {
    let bracket = BracketBuilder::new(&seeded(6)).unwrap().build();
    for (position, round) in bracket.rounds.iter().enumerate() {
      assert_eq!(round.idx, position);
    }
    let kinds: Vec<BracketType> = bracket.rounds.iter().map(|r| r.bracket_type).collect();
    let first_loser = kinds.iter().position(|k| *k == BracketType::Loser).unwrap();
    let first_finals = kinds.iter().position(|k| *k == BracketType::Finals).unwrap();
    assert!(kinds[..first_loser].iter().all(|k| *k == BracketType::Winner));
    assert!(kinds[first_loser..first_finals].iter().all(|k| *k == BracketType::Loser));
  }

  #[test]
  fn test_byes_shrink_first_loser_round() {
    // 5 teams: three byes, a single real first-round match.
    let bracket = BracketBuilder::new(&seeded(5)).unwrap().build();
    assert_eq!(round_sizes(&bracket, BracketType::Loser), vec![1, 2, 1, 1]);
    let first = &bracket.matches[0];
    assert!(first.is_bye);
    assert_eq!(first.winner.as_ref().map(|t| t.0.as_str()), Some("t1"));
    assert_eq!(first.team_b, Slot::Bye);
  }

  #[test]
  fn test_two_teams_have_no_loser_bracket() {
    let bracket = BracketBuilder::new(&seeded(2)).unwrap().build();
    assert_eq!(round_sizes(&bracket, BracketType::Winner), vec![1]);
    assert!(round_sizes(&bracket, BracketType::Loser).is_empty());
    assert_eq!(bracket.total_matches, 3);
  }

  #[test]
  fn test_loser_round_count_closed_form() {
    for count in 2..=70u32 {
      let bracket = BracketBuilder::new(&seeded(count)).unwrap().build();
      let winner_rounds = bracket.rounds_of(BracketType::Winner).count();
      let loser_rounds = bracket.rounds_of(BracketType::Loser).count();
      assert_eq!(loser_rounds, 2 * (winner_rounds - 1), "{count} teams");
    }
  }

  #[test]
  fn test_bad_input_is_rejected() {
    assert!(matches!(
      BracketBuilder::new(&seeded(1)),
      Err(BracketError::InvalidTeamCount { count: 1 })
    ));
    let twice = vec![Team::new("x", 1), Team::new("x", 2)];
    assert!(matches!(
      generate_bracket(&twice),
      Err(BracketError::DuplicateTeam(_))
    ));
  }
}
