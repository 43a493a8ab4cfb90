use serde::Serialize;
use std::collections::HashMap;

use crate::error::{BracketError, BracketResult};
use crate::types::{Bracket, BracketType, Feed, Match, MatchId, SlotSide, TeamId};

/// An outgoing edge: `target`'s `slot` is fed by this match's `feed` outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
  pub target: MatchId,
  pub slot: SlotSide,
  pub feed: Feed,
}

/// Id lookup over a bracket's match arena, plus the reverse of every
/// `source_a`/`source_b` reference.
///
/// Only ever built from a complete arena, so a reference to a missing id is
/// reported instead of silently skipped.
#[derive(Clone, Debug, Default)]
pub struct BracketIndex {
  positions: HashMap<MatchId, usize>,
  children: HashMap<MatchId, Vec<Edge>>,
}

impl BracketIndex {
  pub fn build(bracket: &Bracket) -> BracketResult<Self> {
    let mut positions = HashMap::with_capacity(bracket.matches.len());
    for (position, m) in bracket.matches.iter().enumerate() {
      if positions.insert(m.id, position).is_some() {
        return Err(BracketError::broken_link(m.id, "match id assigned twice"));
      }
      if m.round >= bracket.rounds.len() {
        return Err(BracketError::broken_link(
          m.id,
          format!("round {} does not exist", m.round),
        ));
      }
    }

    let mut children: HashMap<MatchId, Vec<Edge>> = HashMap::new();
    for m in &bracket.matches {
      for slot in SlotSide::BOTH {
        let Some(source) = m.source(slot) else {
          continue;
        };
        if source.match_id == m.id {
          return Err(BracketError::broken_link(m.id, format!("slot {slot} sources itself")));
        }
        if !positions.contains_key(&source.match_id) {
          return Err(BracketError::broken_link(
            m.id,
            format!("slot {slot} sources unknown match {}", source.match_id),
          ));
        }
        children.entry(source.match_id).or_default().push(Edge {
          target: m.id,
          slot,
          feed: source.feed,
        });
      }
    }
    Ok(BracketIndex { positions, children })
  }

  pub fn position(&self, id: MatchId) -> Option<usize> {
    self.positions.get(&id).copied()
  }

  pub fn contains(&self, id: MatchId) -> bool {
    self.positions.contains_key(&id)
  }

  pub fn get<'b>(&self, bracket: &'b Bracket, id: MatchId) -> BracketResult<&'b Match> {
    self
      .position(id)
      .and_then(|position| bracket.matches.get(position))
      .ok_or(BracketError::UnknownMatch(id))
  }

  /// Matches fed by `id`.
  pub fn edges(&self, id: MatchId) -> &[Edge] {
    self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
  }

  /// Every match outside the finals must feed exactly one winner target, and
  /// every contested winner-bracket match must also drop its loser somewhere.
  pub fn verify_outgoing(&self, bracket: &Bracket) -> BracketResult<()> {
    for m in &bracket.matches {
      let bracket_type = bracket
        .bracket_type_of(m)
        .ok_or_else(|| BracketError::broken_link(m.id, "match has no round"))?;
      let edges = self.edges(m.id);
      let winner_edges = edges.iter().filter(|edge| edge.feed == Feed::Winner).count();
      if bracket_type != BracketType::Finals && winner_edges != 1 {
        return Err(BracketError::broken_link(
          m.id,
          format!("expected one winner target, found {winner_edges}"),
        ));
      }
      let drops = edges.iter().any(|edge| edge.feed == Feed::Loser);
      if bracket_type == BracketType::Winner && !m.is_bye && !drops {
        return Err(BracketError::broken_link(m.id, "loser has nowhere to drop"));
      }
    }
    Ok(())
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotTarget {
  pub match_id: MatchId,
  pub slot: SlotSide,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Advancement {
  pub match_id: MatchId,
  pub winner_target: Option<SlotTarget>,
  pub loser_target: Option<SlotTarget>,
  /// Set for Finals-1 only: the reset match, played when the loser-bracket
  /// champion wins. Whether it is played is the caller's decision.
  pub reset_match: Option<MatchId>,
}

/// Where the teams of a finished match go next.
pub struct ProgressionCalculator<'a> {
  bracket: &'a Bracket,
  index: &'a BracketIndex,
}

impl<'a> ProgressionCalculator<'a> {
  pub fn new(bracket: &'a Bracket, index: &'a BracketIndex) -> Self {
    ProgressionCalculator { bracket, index }
  }

  pub fn advance(
    &self,
    match_id: MatchId,
    winner: &TeamId,
    loser: Option<&TeamId>,
  ) -> BracketResult<Advancement> {
    let current = self.index.get(self.bracket, match_id)?;
    if loser == Some(winner) {
      return Err(BracketError::invalid_result(
        match_id,
        "winner and loser are the same team",
      ));
    }
    if current.is_bye && loser.is_some() {
      return Err(BracketError::invalid_result(match_id, "a bye has no loser"));
    }
    let bracket_type = self
      .bracket
      .bracket_type_of(current)
      .ok_or_else(|| BracketError::broken_link(match_id, "match has no round"))?;

    let mut advancement = Advancement {
      match_id,
      winner_target: None,
      loser_target: None,
      reset_match: None,
    };
    for edge in self.index.edges(match_id) {
      let target = SlotTarget {
        match_id: edge.target,
        slot: edge.slot,
      };
      match edge.feed {
        Feed::Winner => advancement.winner_target = Some(target),
        Feed::Loser if loser.is_some() => advancement.loser_target = Some(target),
        Feed::Loser => {}
        Feed::Rematch => advancement.reset_match = Some(edge.target),
      }
    }

    if bracket_type != BracketType::Finals && advancement.winner_target.is_none() {
      return Err(BracketError::broken_link(match_id, "no winner target"));
    }
    if bracket_type == BracketType::Winner && loser.is_some() && advancement.loser_target.is_none() {
      return Err(BracketError::broken_link(match_id, "no loser target"));
    }
    Ok(advancement)
  }
}
