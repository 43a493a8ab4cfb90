use std::collections::HashMap;
use tracing::debug;

use crate::builder::{loser_round_for_drop, LoserRoundRole};
use crate::error::{BracketError, BracketResult};
use crate::progression::BracketIndex;
use crate::types::{Bracket, BracketType, Match, MatchId, MatchSource, Slot, SlotSide};

/// Wires `source_a`/`source_b` on every match of a freshly built bracket.
///
/// Passes run in a fixed order: winner bracket, loser bracket, drops from the
/// winner bracket into the loser bracket, then the finals. Loser matches left
/// with fewer than two sources become byes, and the finished graph is checked
/// for dangling or missing edges before `link` returns.
pub struct ProgressionLinker<'a> {
  bracket: &'a mut Bracket,
  positions: HashMap<MatchId, usize>,
}

impl<'a> ProgressionLinker<'a> {
  pub fn new(bracket: &'a mut Bracket) -> BracketResult<Self> {
    BracketIndex::build(bracket)?;
    let positions = bracket
      .matches
      .iter()
      .enumerate()
      .map(|(position, m)| (m.id, position))
      .collect();
    Ok(ProgressionLinker { bracket, positions })
  }

  pub fn link(mut self) -> BracketResult<()> {
    let winner = self.round_ids(BracketType::Winner);
    let loser = self.round_ids(BracketType::Loser);
    let finals = self.round_ids(BracketType::Finals);

    self.link_winner_bracket(&winner)?;
    self.link_loser_bracket(&loser)?;
    self.link_drops(&winner, &loser)?;
    self.link_finals(&winner, &loser, &finals)?;
    let loser_byes = self.flag_loser_byes(&loser);
    debug!(loser_byes, "bracket linked");

    BracketIndex::build(self.bracket)?.verify_outgoing(self.bracket)
  }

  fn round_ids(&self, bracket_type: BracketType) -> Vec<Vec<MatchId>> {
    self
      .bracket
      .rounds_of(bracket_type)
      .map(|round| round.matches.clone())
      .collect()
  }

  fn link_winner_bracket(&mut self, winner: &[Vec<MatchId>]) -> BracketResult<()> {
    for (round, ids) in winner.iter().enumerate().take(winner.len().saturating_sub(1)) {
      for (position, id) in ids.iter().enumerate() {
        let target = target_in(winner, round + 1, position / 2, *id)?;
        self.set_source(target, SlotSide::for_position(position), MatchSource::winner_of(*id))?;
      }
    }
    Ok(())
  }

  fn link_loser_bracket(&mut self, loser: &[Vec<MatchId>]) -> BracketResult<()> {
    let count = loser.len();
    for (index, ids) in loser.iter().enumerate().take(count.saturating_sub(1)) {
      let next = LoserRoundRole::for_round(index + 1, count);
      match LoserRoundRole::for_round(index, count) {
        LoserRoundRole::ReceivingRound => {
          for (position, id) in ids.iter().enumerate() {
            let target = target_in(loser, index + 1, position / 2, *id)?;
            self.set_source(target, SlotSide::for_position(position), MatchSource::winner_of(*id))?;
          }
        }
        LoserRoundRole::FirstRound | LoserRoundRole::EliminationRound => {
          for (position, id) in ids.iter().enumerate() {
            let slot = next.survivor_slot().ok_or_else(|| {
              BracketError::broken_link(*id, format!("loser round {} takes no single survivors", index + 1))
            })?;
            let target = target_in(loser, index + 1, position, *id)?;
            self.set_source(target, slot, MatchSource::winner_of(*id))?;
          }
        }
        LoserRoundRole::FinalRound => {}
      }
    }
    Ok(())
  }

  fn link_drops(&mut self, winner: &[Vec<MatchId>], loser: &[Vec<MatchId>]) -> BracketResult<()> {
    let loser_rounds = loser.len();
    for (round, ids) in winner.iter().enumerate() {
      let target_round = match loser_round_for_drop(round, winner.len()) {
        Some(target_round) => target_round,
        // Two teams: the single match drops straight into the finals.
        None if loser.is_empty() => continue,
        None => {
          let from = ids.first().copied().unwrap_or(MatchId(0));
          return Err(BracketError::broken_link(
            from,
            format!("winner round {round} has no loser round to drop into"),
          ));
        }
      };

      match LoserRoundRole::for_round(target_round, loser_rounds) {
        LoserRoundRole::FirstRound => {
          // Byes have no loser, so real losers are packed two per match.
          let mut ordinal = 0usize;
          for id in ids {
            if self.match_ref(*id)?.is_bye {
              continue;
            }
            let target = target_in(loser, target_round, ordinal / 2, *id)?;
            self.set_source(target, SlotSide::for_position(ordinal), MatchSource::loser_of(*id))?;
            ordinal += 1;
          }
        }
        role @ (LoserRoundRole::ReceivingRound | LoserRoundRole::FinalRound) => {
          for (position, id) in ids.iter().enumerate() {
            let slot = role
              .drop_slot()
              .ok_or_else(|| BracketError::broken_link(*id, "loser round takes no drops"))?;
            let target = target_in(loser, target_round, position, *id)?;
            self.set_source(target, slot, MatchSource::loser_of(*id))?;
          }
        }
        LoserRoundRole::EliminationRound => {
          let from = ids.first().copied().unwrap_or(MatchId(0));
          return Err(BracketError::broken_link(
            from,
            format!("winner round {round} would drop into elimination round {target_round}"),
          ));
        }
      }
    }
    debug!(winner_rounds = winner.len(), loser_rounds, "drops linked");
    Ok(())
  }

  fn link_finals(
    &mut self,
    winner: &[Vec<MatchId>],
    loser: &[Vec<MatchId>],
    finals: &[Vec<MatchId>],
  ) -> BracketResult<()> {
    let first_final = target_in(finals, 0, 0, MatchId(0))?;
    let reset = target_in(finals, 1, 0, first_final)?;
    let winner_final = target_in(winner, winner.len().saturating_sub(1), 0, first_final)?;

    self.set_source(first_final, SlotSide::A, MatchSource::winner_of(winner_final))?;
    if loser.is_empty() {
      self.set_source(first_final, SlotSide::B, MatchSource::loser_of(winner_final))?;
    } else {
      let loser_final = target_in(loser, loser.len() - 1, 0, first_final)?;
      self.set_source(first_final, SlotSide::B, MatchSource::winner_of(loser_final))?;
    }
    self.set_source(reset, SlotSide::A, MatchSource::rematch_of(first_final))
  }

  /// Marks loser matches that can only ever receive one team, and closes the
  /// empty side. Returns how many were flagged.
  fn flag_loser_byes(&mut self, loser: &[Vec<MatchId>]) -> usize {
    let mut flagged = 0;
    for id in loser.iter().flatten() {
      let Some(position) = self.positions.get(id).copied() else {
        continue;
      };
      let m = &mut self.bracket.matches[position];
      if m.source_count() >= 2 {
        continue;
      }
      m.is_bye = true;
      for slot in SlotSide::BOTH {
        if m.source(slot).is_none() {
          *m.slot_mut(slot) = Slot::Bye;
        }
      }
      flagged += 1;
    }
    flagged
  }

  fn set_source(&mut self, target: MatchId, slot: SlotSide, source: MatchSource) -> BracketResult<()> {
    if target == source.match_id {
      return Err(BracketError::broken_link(target, "match cannot feed itself"));
    }
    let position = self.position(target)?;
    let m = &mut self.bracket.matches[position];
    if m.source(slot).is_some() {
      return Err(BracketError::broken_link(target, format!("slot {slot} linked twice")));
    }
    if *m.slot(slot) != Slot::Pending {
      return Err(BracketError::broken_link(target, format!("slot {slot} is not open")));
    }
    *m.source_mut(slot) = Some(source);
    Ok(())
  }

  fn position(&self, id: MatchId) -> BracketResult<usize> {
    self
      .positions
      .get(&id)
      .copied()
      .ok_or_else(|| BracketError::broken_link(id, "match is not in the bracket"))
  }

  fn match_ref(&self, id: MatchId) -> BracketResult<&Match> {
    let position = self.position(id)?;
    Ok(&self.bracket.matches[position])
  }
}

fn target_in(rounds: &[Vec<MatchId>], round: usize, position: usize, from: MatchId) -> BracketResult<MatchId> {
  rounds
    .get(round)
    .and_then(|ids| ids.get(position))
    .copied()
    .ok_or_else(|| BracketError::broken_link(from, format!("no match at round {round} position {position}")))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::builder::{generate_bracket, BracketBuilder};
  use crate::types::{Feed, Team};

  fn seeded(count: u32) -> Vec<Team> {
    (1..=count).map(|seed| Team::new(format!("t{seed}"), seed)).collect()
  }

  fn find(bracket: &Bracket, id: MatchId) -> &Match {
    bracket.matches.iter().find(|m| m.id == id).unwrap()
  }

  fn ids_of(bracket: &Bracket, bracket_type: BracketType) -> Vec<Vec<MatchId>> {
    bracket.rounds_of(bracket_type).map(|round| round.matches.clone()).collect()
  }

  #[test]
  fn test_eight_team_links() {
    let bracket = generate_bracket(&seeded(8)).unwrap();
    let winner = ids_of(&bracket, BracketType::Winner);
    let loser = ids_of(&bracket, BracketType::Loser);

    let semi = find(&bracket, winner[1][1]);
    assert_eq!(semi.source_a, Some(MatchSource::winner_of(winner[0][2])));
    assert_eq!(semi.source_b, Some(MatchSource::winner_of(winner[0][3])));

    let first_loser = find(&bracket, loser[0][1]);
    assert_eq!(first_loser.source_a, Some(MatchSource::loser_of(winner[0][2])));
    assert_eq!(first_loser.source_b, Some(MatchSource::loser_of(winner[0][3])));

    let receiving = find(&bracket, loser[1][0]);
    assert_eq!(receiving.source_a, Some(MatchSource::loser_of(winner[1][0])));
    assert_eq!(receiving.source_b, Some(MatchSource::winner_of(loser[0][0])));

    let elimination = find(&bracket, loser[2][0]);
    assert_eq!(elimination.source_a, Some(MatchSource::winner_of(loser[1][0])));
    assert_eq!(elimination.source_b, Some(MatchSource::winner_of(loser[1][1])));

    let loser_final = find(&bracket, loser[3][0]);
    assert_eq!(loser_final.source_a, Some(MatchSource::winner_of(loser[2][0])));
    assert_eq!(loser_final.source_b, Some(MatchSource::loser_of(winner[2][0])));
    assert!(bracket.matches.iter().all(|m| !m.is_bye));
  }

  #[test]
  fn test_finals_sources() {
    let bracket = generate_bracket(&seeded(6)).unwrap();
    let winner = ids_of(&bracket, BracketType::Winner);
    let loser = ids_of(&bracket, BracketType::Loser);
    let (first_final, reset) = bracket.finals().unwrap();

    let first = find(&bracket, first_final);
    assert_eq!(first.source_a, Some(MatchSource::winner_of(winner[2][0])));
    assert_eq!(first.source_b, Some(MatchSource::winner_of(loser[3][0])));

    let second = find(&bracket, reset);
    assert_eq!(second.source_a, Some(MatchSource::rematch_of(first_final)));
    assert_eq!(second.source_b, None);
    assert_eq!(second.source_a.map(|s| s.feed), Some(Feed::Rematch));
  }

  #[test]
  fn test_single_bye_flags_loser_round_match() {
    // 7 teams: seed 1 has a bye, so one first-round loser match gets a
    // single drop.
    let bracket = generate_bracket(&seeded(7)).unwrap();
    let winner = ids_of(&bracket, BracketType::Winner);
    let loser = ids_of(&bracket, BracketType::Loser);
    assert_eq!(loser[0].len(), 2);

    let paired = find(&bracket, loser[0][0]);
    assert!(!paired.is_bye);
    assert_eq!(paired.source_a, Some(MatchSource::loser_of(winner[0][1])));
    assert_eq!(paired.source_b, Some(MatchSource::loser_of(winner[0][2])));

    let lonely = find(&bracket, loser[0][1]);
    assert!(lonely.is_bye);
    assert_eq!(lonely.source_a, Some(MatchSource::loser_of(winner[0][3])));
    assert_eq!(lonely.team_b, Slot::Bye);

    // The bye itself generates no drop.
    let bye_id = winner[0][0];
    assert!(bracket
      .matches
      .iter()
      .flat_map(|m| [m.source_a, m.source_b])
      .flatten()
      .all(|source| !(source.match_id == bye_id && source.feed == Feed::Loser)));
  }

  #[test]
  fn test_shrunk_first_round_leaves_receiving_byes() {
    // 5 teams: one real first-round match, so the second receiving match
    // has no survivor coming.
    let bracket = generate_bracket(&seeded(5)).unwrap();
    let loser = ids_of(&bracket, BracketType::Loser);
    assert!(find(&bracket, loser[0][0]).is_bye);
    assert!(!find(&bracket, loser[1][0]).is_bye);
    let tail = find(&bracket, loser[1][1]);
    assert!(tail.is_bye);
    assert!(tail.source_a.is_some());
    assert_eq!(tail.team_b, Slot::Bye);
  }

  #[test]
  fn test_two_team_bracket() {
    let bracket = generate_bracket(&seeded(2)).unwrap();
    let only = bracket.matches[0].id;
    let (first_final, _) = bracket.finals().unwrap();
    let first = find(&bracket, first_final);
    assert_eq!(first.source_a, Some(MatchSource::winner_of(only)));
    assert_eq!(first.source_b, Some(MatchSource::loser_of(only)));
  }

  #[test]
  fn test_linking_twice_fails() {
    let mut bracket = generate_bracket(&seeded(4)).unwrap();
    let err = ProgressionLinker::new(&mut bracket).unwrap().link().unwrap_err();
    assert!(err.is_construction_defect());
  }

  #[test]
  fn test_every_size_links_cleanly() {
    for count in 2..=70u32 {
      let mut bracket = BracketBuilder::new(&seeded(count)).unwrap().build();
      ProgressionLinker::new(&mut bracket)
        .and_then(|linker| linker.link())
        .unwrap_or_else(|err| panic!("{count} teams: {err}"));
    }
  }
}
