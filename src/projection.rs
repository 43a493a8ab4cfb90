use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::warn;

use crate::progression::BracketIndex;
use crate::teams::TeamDirectory;
use crate::types::{Bracket, BracketType, Feed, Match, MatchId, MatchSource, Round, Slot, SlotSide};

pub const BYE_PARTICIPANT_ID: &str = "bye";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchState {
  NoParty,
  WalkOver,
  Played,
  ScoreDone,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantStatus {
  Played,
  WalkOver,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedParticipant {
  pub id: String,
  pub result_text: Option<String>,
  pub is_winner: bool,
  pub status: Option<ParticipantStatus>,
  pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedMatch {
  pub id: String,
  pub name: String,
  pub next_match_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub next_looser_match_id: Option<String>,
  pub start_time: String,
  pub tournament_round_text: String,
  pub state: MatchState,
  pub participants: Vec<ProjectedParticipant>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BracketProjection {
  pub upper: Vec<ProjectedMatch>,
  pub lower: Vec<ProjectedMatch>,
}

pub fn round_label(round: &Round) -> String {
  match (round.bracket_type, round.depth) {
    (BracketType::Finals, 1) => "Finals 1".to_string(),
    (BracketType::Finals, 0) => "Finals 2".to_string(),
    (BracketType::Finals, _) => "Finals".to_string(),
    (bracket_type, depth) => {
      let prefix = if bracket_type == BracketType::Winner { "W" } else { "L" };
      match depth {
        0 => format!("{prefix} Finals"),
        1 => format!("{prefix} Semis"),
        2 => format!("{prefix} Quarters"),
        _ => format!("{prefix} Round {depth}"),
      }
    }
  }
}

/// Display numbers, counting winner rounds first, then loser, then finals.
pub fn match_numbers(bracket: &Bracket) -> HashMap<MatchId, usize> {
  let mut rounds: Vec<&Round> = bracket.rounds.iter().collect();
  rounds.sort_by_key(|round| (bracket_order(round.bracket_type), round.idx));
  rounds
    .iter()
    .flat_map(|round| round.matches.iter().copied())
    .enumerate()
    .map(|(position, id)| (id, position + 1))
    .collect()
}

fn bracket_order(bracket_type: BracketType) -> u8 {
  match bracket_type {
    BracketType::Winner => 0,
    BracketType::Loser => 1,
    BracketType::Finals => 2,
  }
}

/// Flatten a bracket into the upper/lower match lists a bracket viewer draws.
///
/// Finals-2 is only shown once it has been seated, and any next-match id
/// that does not land on a projected match is dropped.
pub fn project(bracket: &Bracket, index: &BracketIndex, teams: &TeamDirectory) -> BracketProjection {
  let projector = Projector {
    bracket,
    index,
    teams,
    numbers: match_numbers(bracket),
  };

  let mut projection = BracketProjection::default();
  for bracket_type in [BracketType::Winner, BracketType::Loser] {
    for round in bracket.rounds_of(bracket_type) {
      for id in &round.matches {
        if let Ok(m) = index.get(bracket, *id) {
          let projected = projector.project_match(m, round);
          match bracket_type {
            BracketType::Loser => projection.lower.push(projected),
            _ => projection.upper.push(projected),
          }
        }
      }
    }
  }

  let mut finals: Vec<&Round> = bracket.rounds_of(BracketType::Finals).collect();
  finals.sort_by(|a, b| b.depth.cmp(&a.depth));
  for round in finals {
    for id in &round.matches {
      let Ok(m) = index.get(bracket, *id) else {
        continue;
      };
      if round.depth == 0 && !m.is_seated() {
        continue;
      }
      projection.upper.push(projector.project_match(m, round));
    }
  }

  drop_dangling_links(&mut projection);
  projection
}

fn drop_dangling_links(projection: &mut BracketProjection) {
  let present: HashSet<String> = projection
    .upper
    .iter()
    .chain(projection.lower.iter())
    .map(|m| m.id.clone())
    .collect();
  for m in projection.upper.iter_mut().chain(projection.lower.iter_mut()) {
    if let Some(next) = m.next_match_id.take() {
      if present.contains(&next) {
        m.next_match_id = Some(next);
      } else {
        warn!(match_id = %m.id, next = %next, "next match not projected, dropping link");
      }
    }
    if let Some(next) = m.next_looser_match_id.take() {
      if present.contains(&next) {
        m.next_looser_match_id = Some(next);
      } else {
        warn!(match_id = %m.id, next = %next, "loser drop not projected, dropping link");
      }
    }
  }
}

struct Projector<'a> {
  bracket: &'a Bracket,
  index: &'a BracketIndex,
  teams: &'a TeamDirectory,
  numbers: HashMap<MatchId, usize>,
}

impl Projector<'_> {
  fn project_match(&self, m: &Match, round: &Round) -> ProjectedMatch {
    let mut next_match_id = None;
    let mut next_looser_match_id = None;
    for edge in self.index.edges(m.id) {
      match edge.feed {
        Feed::Winner => next_match_id = Some(edge.target.to_string()),
        Feed::Loser => next_looser_match_id = Some(edge.target.to_string()),
        Feed::Rematch => {
          let reset_seated = self
            .index
            .get(self.bracket, edge.target)
            .map(Match::is_seated)
            .unwrap_or(false);
          if reset_seated {
            next_match_id = Some(edge.target.to_string());
          }
        }
      }
    }

    ProjectedMatch {
      id: m.id.to_string(),
      name: self.match_name(m.id),
      next_match_id,
      next_looser_match_id,
      start_time: m.started_at.map(|at| at.to_rfc3339()).unwrap_or_default(),
      tournament_round_text: round_label(round),
      state: match_state(m),
      participants: SlotSide::BOTH
        .into_iter()
        .map(|side| self.participant(m, side))
        .collect(),
    }
  }

  fn participant(&self, m: &Match, side: SlotSide) -> ProjectedParticipant {
    match m.slot(side) {
      Slot::Team(team) => {
        let is_winner = m.winner.as_ref() == Some(team);
        let (result_text, status) = match (&m.winner, m.is_bye) {
          (Some(_), true) => (Some("WON".to_string()), Some(ParticipantStatus::WalkOver)),
          (Some(_), false) => {
            let text = if is_winner { "WON" } else { "LOST" };
            (Some(text.to_string()), Some(ParticipantStatus::Played))
          }
          (None, _) => (None, None),
        };
        ProjectedParticipant {
          id: team.0.clone(),
          result_text,
          is_winner,
          status,
          name: self.teams.display_name(team),
        }
      }
      Slot::Bye => ProjectedParticipant {
        id: BYE_PARTICIPANT_ID.to_string(),
        result_text: None,
        is_winner: false,
        status: None,
        name: "BYE".to_string(),
      },
      Slot::Pending => ProjectedParticipant {
        id: match side {
          SlotSide::A => "tbd-1".to_string(),
          SlotSide::B => "tbd-2".to_string(),
        },
        result_text: None,
        is_winner: false,
        status: None,
        name: self.source_label(m.source(side)),
      },
    }
  }

  fn source_label(&self, source: Option<&MatchSource>) -> String {
    let Some(source) = source else {
      return "TBD".to_string();
    };
    let Some(number) = self.numbers.get(&source.match_id) else {
      return "TBD".to_string();
    };
    match source.feed {
      Feed::Winner | Feed::Rematch => format!("W Match {number}"),
      Feed::Loser => format!("L Match {number}"),
    }
  }

  fn match_name(&self, id: MatchId) -> String {
    self
      .numbers
      .get(&id)
      .map(|number| format!("Match {number}"))
      .unwrap_or_else(|| format!("Match {id}"))
  }
}

fn match_state(m: &Match) -> MatchState {
  if m.is_bye {
    return if m.is_decided() {
      MatchState::WalkOver
    } else {
      MatchState::NoParty
    };
  }
  if m.is_decided() {
    MatchState::ScoreDone
  } else if m.is_seated() && m.started_at.is_some() {
    MatchState::Played
  } else {
    MatchState::NoParty
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::session::BracketSession;
  use crate::types::{Team, TeamId};
  use chrono::Utc;

  fn seeded(count: u32) -> Vec<Team> {
    (1..=count)
      .map(|seed| Team {
        id: TeamId(format!("t{seed}")),
        seed,
        name: Some(format!("Club {seed}")),
      })
      .collect()
  }

  fn find<'a>(matches: &'a [ProjectedMatch], name: &str) -> &'a ProjectedMatch {
    matches.iter().find(|m| m.name == name).unwrap()
  }

  #[test]
  fn test_round_labels() {
    let label = |bracket_type, depth| {
      round_label(&Round {
        idx: 0,
        bracket_type,
        depth,
        matches: vec![],
      })
    };
    assert_eq!(label(BracketType::Winner, 0), "W Finals");
    assert_eq!(label(BracketType::Winner, 2), "W Quarters");
    assert_eq!(label(BracketType::Winner, 5), "W Round 5");
    assert_eq!(label(BracketType::Loser, 1), "L Semis");
    assert_eq!(label(BracketType::Finals, 1), "Finals 1");
    assert_eq!(label(BracketType::Finals, 0), "Finals 2");
  }

  #[test]
  fn test_fresh_eight_team_projection() {
    let session = BracketSession::from_teams(&seeded(8)).unwrap();
    let projection = session.projection();
    // 7 winner matches + Finals 1, Finals 2 hidden until seated.
    assert_eq!(projection.upper.len(), 8);
    assert_eq!(projection.lower.len(), 6);

    let opener = find(&projection.upper, "Match 1");
    assert_eq!(opener.tournament_round_text, "W Quarters");
    assert_eq!(opener.state, MatchState::NoParty);
    assert_eq!(opener.participants[0].name, "Club 1");
    assert_eq!(opener.participants[1].name, "Club 8");
    assert!(opener.next_match_id.is_some());
    assert!(opener.next_looser_match_id.is_some());

    let semi = find(&projection.upper, "Match 5");
    assert_eq!(semi.participants[0].name, "W Match 1");
    assert_eq!(semi.participants[1].name, "W Match 2");
    assert_eq!(semi.participants[0].id, "tbd-1");

    let loser_opener = find(&projection.lower, "Match 8");
    assert_eq!(loser_opener.participants[0].name, "L Match 1");
    assert_eq!(loser_opener.next_looser_match_id, None);

    let first_final = find(&projection.upper, "Match 14");
    assert_eq!(first_final.tournament_round_text, "Finals 1");
    assert_eq!(first_final.next_match_id, None);
    assert!(projection.upper.iter().all(|m| m.name != "Match 15"));
  }

  #[test]
  fn test_every_match_has_two_participants() {
    for count in 2..=20 {
      let session = BracketSession::from_teams(&seeded(count)).unwrap();
      let projection = session.projection();
      let ids: HashSet<&str> = projection
        .upper
        .iter()
        .chain(projection.lower.iter())
        .map(|m| m.id.as_str())
        .collect();
      for m in projection.upper.iter().chain(projection.lower.iter()) {
        assert_eq!(m.participants.len(), 2);
        for next in m.next_match_id.iter().chain(m.next_looser_match_id.iter()) {
          assert!(ids.contains(next.as_str()), "{count} teams: {} -> {next}", m.id);
        }
      }
    }
  }

  #[test]
  fn test_byes_project_as_walkovers() {
    let mut session = BracketSession::from_teams(&seeded(5)).unwrap();
    let projection = session.projection();
    let bye = find(&projection.upper, "Match 1");
    assert_eq!(bye.state, MatchState::WalkOver);
    assert_eq!(bye.participants[0].result_text.as_deref(), Some("WON"));
    assert_eq!(bye.participants[0].status, Some(ParticipantStatus::WalkOver));
    assert_eq!(bye.participants[1].id, BYE_PARTICIPANT_ID);

    let loser_bye = find(&projection.lower, "Match 8");
    assert_eq!(loser_bye.state, MatchState::NoParty);
    assert_eq!(loser_bye.participants[0].name, "L Match 2");
    assert_eq!(loser_bye.participants[1].name, "BYE");

    let contested = session.bracket().matches[1].id;
    session.start_match(contested, Utc::now()).unwrap();
    let started = session.projection();
    assert_eq!(find(&started.upper, "Match 2").state, MatchState::Played);
    assert!(!find(&started.upper, "Match 2").start_time.is_empty());

    session
      .record_result(contested, &TeamId::from("t5"), Utc::now())
      .unwrap();
    let decided = session.projection();
    let played = find(&decided.upper, "Match 2");
    assert_eq!(played.state, MatchState::ScoreDone);
    assert!(played.participants[1].is_winner);
    assert_eq!(played.participants[0].result_text.as_deref(), Some("LOST"));
    assert_eq!(find(&decided.lower, "Match 8").state, MatchState::WalkOver);
  }

  #[test]
  fn test_reset_final_appears_once_seated() {
    let mut session = BracketSession::from_teams(&seeded(2)).unwrap();
    let only = session.bracket().matches[0].id;
    let (first_final, reset) = session.bracket().finals().unwrap();
    session.record_result(only, &TeamId::from("t1"), Utc::now()).unwrap();
    session
      .record_result(first_final, &TeamId::from("t2"), Utc::now())
      .unwrap();

    let projection = session.projection();
    assert_eq!(projection.upper.len(), 3);
    assert!(projection.lower.is_empty());
    let first = find(&projection.upper, "Match 2");
    assert_eq!(first.next_match_id, Some(reset.to_string()));
    assert_eq!(find(&projection.upper, "Match 3").tournament_round_text, "Finals 2");
  }

  #[test]
  fn test_projection_json_shape() {
    let session = BracketSession::from_teams(&seeded(4)).unwrap();
    let json = serde_json::to_value(session.projection()).unwrap();
    let first = &json["upper"][0];
    assert_eq!(first["state"], "NO_PARTY");
    assert_eq!(first["startTime"], "");
    assert!(first.get("nextLooserMatchId").is_some());
    assert!(first["participants"][0].get("isWinner").is_some());
    let loser_final = &json["lower"][1];
    assert!(loser_final.get("nextLooserMatchId").is_none());
  }
}
