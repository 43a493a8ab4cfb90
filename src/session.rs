use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info};

use crate::builder::generate_bracket;
use crate::error::{BracketError, BracketResult};
use crate::progression::{Advancement, BracketIndex, ProgressionCalculator, SlotTarget};
use crate::projection::{project, BracketProjection};
use crate::teams::TeamDirectory;
use crate::types::{Bracket, Feed, Match, MatchId, Slot, SlotSide, Team, TeamId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultOutcome {
  pub advancement: Advancement,
  /// Bye matches that resolved because of this result, in order.
  pub auto_advanced: Vec<MatchId>,
  pub reset_triggered: bool,
  pub champion: Option<TeamId>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketSnapshot {
  pub bracket: Bracket,
  pub ready_matches: Vec<MatchId>,
  pub champion: Option<TeamId>,
  pub reset_triggered: bool,
  pub complete: bool,
  pub created_at: DateTime<Utc>,
}

/// One bracket plus the results recorded against it.
///
/// Every mutating call works on a copy and only replaces `self` once the
/// whole change has gone through, so a failed call leaves nothing half
/// applied.
#[derive(Clone, Debug)]
pub struct BracketSession {
  bracket: Bracket,
  index: BracketIndex,
  teams: TeamDirectory,
  reset_triggered: bool,
  created_at: DateTime<Utc>,
}

impl BracketSession {
  pub fn new(bracket: Bracket) -> BracketResult<Self> {
    let index = BracketIndex::build(&bracket)?;
    index.verify_outgoing(&bracket)?;
    let teams = TeamDirectory::new(&bracket.teams);
    let mut session = BracketSession {
      bracket,
      index,
      teams,
      reset_triggered: false,
      created_at: Utc::now(),
    };

    let decided: Vec<MatchId> = session
      .bracket
      .matches
      .iter()
      .filter(|m| m.is_decided())
      .map(|m| m.id)
      .collect();
    for match_id in decided {
      session.propagate(match_id)?;
    }
    Ok(session)
  }

  pub fn from_teams(teams: &[Team]) -> BracketResult<Self> {
    BracketSession::new(generate_bracket(teams)?)
  }

  pub fn bracket(&self) -> &Bracket {
    &self.bracket
  }

  pub fn index(&self) -> &BracketIndex {
    &self.index
  }

  pub fn teams(&self) -> &TeamDirectory {
    &self.teams
  }

  pub fn reset_triggered(&self) -> bool {
    self.reset_triggered
  }

  pub fn get(&self, match_id: MatchId) -> BracketResult<&Match> {
    self.index.get(&self.bracket, match_id)
  }

  pub fn calculator(&self) -> ProgressionCalculator<'_> {
    ProgressionCalculator::new(&self.bracket, &self.index)
  }

  pub fn projection(&self) -> BracketProjection {
    project(&self.bracket, &self.index, &self.teams)
  }

  /// Matches with both teams seated and no winner yet.
  pub fn ready_matches(&self) -> Vec<MatchId> {
    self
      .bracket
      .matches
      .iter()
      .filter(|m| !m.is_bye && m.is_seated() && !m.is_decided())
      .map(|m| m.id)
      .collect()
  }

  pub fn champion(&self) -> Option<TeamId> {
    let (first_final, reset) = self.bracket.finals()?;
    let deciding = if self.reset_triggered { reset } else { first_final };
    self.get(deciding).ok()?.winner.clone()
  }

  pub fn is_complete(&self) -> bool {
    self.champion().is_some()
  }

  pub fn snapshot(&self) -> BracketSnapshot {
    let champion = self.champion();
    BracketSnapshot {
      bracket: self.bracket.clone(),
      ready_matches: self.ready_matches(),
      complete: champion.is_some(),
      champion,
      reset_triggered: self.reset_triggered,
      created_at: self.created_at,
    }
  }

  pub fn start_match(&mut self, match_id: MatchId, now: DateTime<Utc>) -> BracketResult<()> {
    let m = self.match_mut(match_id)?;
    if m.is_bye {
      return Err(BracketError::invalid_result(match_id, "byes are not played"));
    }
    if m.is_decided() {
      return Err(BracketError::invalid_result(match_id, "match is already decided"));
    }
    if m.started_at.is_some() {
      return Err(BracketError::invalid_result(match_id, "match has already started"));
    }
    if !m.is_seated() {
      return Err(BracketError::invalid_result(match_id, "match is missing teams"));
    }
    m.started_at = Some(now);
    Ok(())
  }

  /// Record `winner` for a seated match and move both teams on.
  ///
  /// Recording a different winner on a decided match first undoes everything
  /// the old result set in motion. Recording the same winner again is a no-op.
  pub fn record_result(
    &mut self,
    match_id: MatchId,
    winner: &TeamId,
    now: DateTime<Utc>,
  ) -> BracketResult<ResultOutcome> {
    let current = self.get(match_id)?;
    if current.is_bye {
      return Err(BracketError::invalid_result(match_id, "byes resolve on their own"));
    }
    if !current.is_seated() {
      return Err(BracketError::invalid_result(match_id, "match is missing teams"));
    }
    if current.side_of(winner).is_none() {
      return Err(BracketError::invalid_result(
        match_id,
        format!("team {winner} is not in this match"),
      ));
    }
    if current.winner.as_ref() == Some(winner) {
      let advancement = self.calculator().advance(match_id, winner, current.loser())?;
      return Ok(ResultOutcome {
        advancement,
        auto_advanced: Vec::new(),
        reset_triggered: self.reset_triggered,
        champion: self.champion(),
      });
    }

    let mut next = self.clone();
    if let Some(previous) = current.winner.as_ref() {
      info!(match_id = %match_id, previous = %previous, winner = %winner, "changing recorded winner");
      next.clear_downstream(match_id)?;
    }
    let m = next.match_mut(match_id)?;
    m.winner = Some(winner.clone());
    m.started_at = Some(m.started_at.unwrap_or(now));
    m.decided_at = Some(now);

    let (advancement, auto_advanced) = next.propagate(match_id)?;
    *self = next;

    let champion = self.champion();
    info!(
      match_id = %match_id,
      winner = %winner,
      auto_advanced = auto_advanced.len(),
      reset = self.reset_triggered,
      "result recorded"
    );
    if let Some(champion) = &champion {
      info!(champion = %champion, "bracket complete");
    }
    Ok(ResultOutcome {
      advancement,
      auto_advanced,
      reset_triggered: self.reset_triggered,
      champion,
    })
  }

  /// Undo a recorded result and everything downstream of it.
  pub fn reopen_match(&mut self, match_id: MatchId) -> BracketResult<()> {
    let current = self.get(match_id)?;
    if current.is_bye {
      return Err(BracketError::invalid_result(match_id, "byes cannot be reopened"));
    }
    if !current.is_decided() {
      return Err(BracketError::invalid_result(match_id, "match has no result to reopen"));
    }

    let mut next = self.clone();
    next.clear_downstream(match_id)?;
    let m = next.match_mut(match_id)?;
    m.winner = None;
    m.decided_at = None;
    *self = next;
    info!(match_id = %match_id, "match reopened");
    Ok(())
  }

  /// Apply a decided match, then keep resolving any bye it completes.
  fn propagate(&mut self, match_id: MatchId) -> BracketResult<(Advancement, Vec<MatchId>)> {
    let advancement = self.apply_outcome(match_id)?;
    let mut queue: VecDeque<MatchId> = self.resolve_byes(&advancement)?.into();
    let mut auto_advanced = Vec::new();
    while let Some(bye) = queue.pop_front() {
      auto_advanced.push(bye);
      let next = self.apply_outcome(bye)?;
      queue.extend(self.resolve_byes(&next)?);
    }
    Ok((advancement, auto_advanced))
  }

  fn apply_outcome(&mut self, match_id: MatchId) -> BracketResult<Advancement> {
    let current = self.get(match_id)?;
    let winner = current
      .winner
      .clone()
      .ok_or_else(|| BracketError::invalid_result(match_id, "match has no winner"))?;
    let loser = current.loser().cloned();
    let winner_side = current.side_of(&winner);
    let finalists = (current.team_a.clone(), current.team_b.clone());

    let advancement = self.calculator().advance(match_id, &winner, loser.as_ref())?;
    if let Some(target) = &advancement.winner_target {
      self.seat(target, winner.clone())?;
    }
    if let (Some(target), Some(loser)) = (&advancement.loser_target, loser) {
      self.seat(target, loser)?;
    }
    if let Some(reset) = advancement.reset_match {
      // The winner-bracket champion sits in slot A and has not lost yet.
      self.reset_triggered = winner_side == Some(SlotSide::B);
      if self.reset_triggered {
        for (slot, team) in [(SlotSide::A, finalists.0), (SlotSide::B, finalists.1)] {
          if let Slot::Team(team) = team {
            self.seat(&SlotTarget { match_id: reset, slot }, team)?;
          }
        }
        info!(match_id = %reset, "bracket reset triggered");
      }
    }
    Ok(advancement)
  }

  fn resolve_byes(&mut self, advancement: &Advancement) -> BracketResult<Vec<MatchId>> {
    let mut resolved = Vec::new();
    for target in [&advancement.winner_target, &advancement.loser_target]
      .into_iter()
      .flatten()
    {
      let m = self.match_mut(target.match_id)?;
      if !m.is_bye || m.is_decided() {
        continue;
      }
      let teams: Vec<TeamId> = m.teams().cloned().collect();
      if let [only] = teams.as_slice() {
        debug!(match_id = %m.id, team = %only, "bye resolved");
        m.winner = Some(only.clone());
        resolved.push(target.match_id);
      }
    }
    Ok(resolved)
  }

  fn seat(&mut self, target: &SlotTarget, team: TeamId) -> BracketResult<()> {
    let m = self.match_mut(target.match_id)?;
    if m.slot(target.slot).is_bye() {
      return Err(BracketError::broken_link(
        target.match_id,
        format!("slot {} is a bye but received team {team}", target.slot),
      ));
    }
    if m.is_decided() {
      return Err(BracketError::invalid_result(
        target.match_id,
        "a decided match cannot take a new team",
      ));
    }
    *m.slot_mut(target.slot) = Slot::Team(team);
    Ok(())
  }

  /// Empty every slot and decision that flowed out of `root`.
  fn clear_downstream(&mut self, root: MatchId) -> BracketResult<()> {
    let mut visited = HashSet::new();
    let mut stack = vec![root];
    while let Some(current) = stack.pop() {
      if !visited.insert(current) {
        continue;
      }
      for edge in self.index.edges(current).to_vec() {
        if edge.feed == Feed::Rematch {
          self.reset_triggered = false;
        }
        let m = self.match_mut(edge.target)?;
        match edge.feed {
          Feed::Rematch => {
            m.team_a = Slot::Pending;
            m.team_b = Slot::Pending;
          }
          Feed::Winner | Feed::Loser => {
            if !m.slot(edge.slot).is_bye() {
              *m.slot_mut(edge.slot) = Slot::Pending;
            }
          }
        }
        m.started_at = None;
        if m.winner.take().is_some() {
          m.decided_at = None;
          stack.push(edge.target);
        }
      }
    }
    Ok(())
  }

  fn match_mut(&mut self, match_id: MatchId) -> BracketResult<&mut Match> {
    let position = self
      .index
      .position(match_id)
      .ok_or(BracketError::UnknownMatch(match_id))?;
    self
      .bracket
      .matches
      .get_mut(position)
      .ok_or(BracketError::UnknownMatch(match_id))
  }
}
