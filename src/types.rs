use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
};

use crate::session::BracketSession;

// ── Constants ──────────────────────────────────────────────────────────

pub const MIN_TEAM_COUNT: usize = 2;
pub const MAX_BRACKET_SIZE: usize = 1 << 16;
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:17890";
pub const DEFAULT_MAX_TEAMS: usize = 256;

// ── Shared state type aliases ──────────────────────────────────────────

pub type SharedBracketStore = Arc<Mutex<BracketStore>>;

// ── Identifiers ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub String);

impl From<&str> for TeamId {
    fn from(value: &str) -> Self {
        TeamId(value.to_string())
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub u64);

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Bracket domain types ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: TeamId,
    pub seed: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Team {
    pub fn new(id: impl Into<String>, seed: u32) -> Self {
        Team {
            id: TeamId(id.into()),
            seed,
            name: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BracketType {
    Winner,
    Loser,
    Finals,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotSide {
    A,
    B,
}

impl SlotSide {
    pub const BOTH: [SlotSide; 2] = [SlotSide::A, SlotSide::B];

    /// Slot for the `position`-th feeder when two feeders share one match.
    pub fn for_position(position: usize) -> Self {
        if position % 2 == 0 {
            SlotSide::A
        } else {
            SlotSide::B
        }
    }

    pub fn other(self) -> Self {
        match self {
            SlotSide::A => SlotSide::B,
            SlotSide::B => SlotSide::A,
        }
    }
}

impl fmt::Display for SlotSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotSide::A => f.write_str("A"),
            SlotSide::B => f.write_str("B"),
        }
    }
}

/// Occupant of one side of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "teamId", rename_all = "camelCase")]
pub enum Slot {
    Team(TeamId),
    /// Filled later by a source match.
    Pending,
    /// Nobody will ever arrive here.
    Bye,
}

impl Slot {
    pub fn team(&self) -> Option<&TeamId> {
        match self {
            Slot::Team(id) => Some(id),
            Slot::Pending | Slot::Bye => None,
        }
    }

    pub fn is_bye(&self) -> bool {
        matches!(self, Slot::Bye)
    }
}

/// Which outcome of the source match flows along an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Feed {
    Winner,
    Loser,
    /// Finals-2 replays both Finals-1 teams.
    Rematch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSource {
    pub match_id: MatchId,
    pub feed: Feed,
}

impl MatchSource {
    pub fn winner_of(match_id: MatchId) -> Self {
        MatchSource {
            match_id,
            feed: Feed::Winner,
        }
    }

    pub fn loser_of(match_id: MatchId) -> Self {
        MatchSource {
            match_id,
            feed: Feed::Loser,
        }
    }

    pub fn rematch_of(match_id: MatchId) -> Self {
        MatchSource {
            match_id,
            feed: Feed::Rematch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: MatchId,
    /// Index into `Bracket::rounds`.
    pub round: usize,
    pub bracket_position: usize,
    pub team_a: Slot,
    pub team_b: Slot,
    pub seed_a: Option<u32>,
    pub seed_b: Option<u32>,
    pub is_bye: bool,
    pub source_a: Option<MatchSource>,
    pub source_b: Option<MatchSource>,
    pub winner: Option<TeamId>,
    pub started_at: Option<DateTime<Utc>>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl Match {
    pub fn new(id: MatchId, round: usize, bracket_position: usize) -> Self {
        Match {
            id,
            round,
            bracket_position,
            team_a: Slot::Pending,
            team_b: Slot::Pending,
            seed_a: None,
            seed_b: None,
            is_bye: false,
            source_a: None,
            source_b: None,
            winner: None,
            started_at: None,
            decided_at: None,
        }
    }

    pub fn slot(&self, side: SlotSide) -> &Slot {
        match side {
            SlotSide::A => &self.team_a,
            SlotSide::B => &self.team_b,
        }
    }

    pub fn slot_mut(&mut self, side: SlotSide) -> &mut Slot {
        match side {
            SlotSide::A => &mut self.team_a,
            SlotSide::B => &mut self.team_b,
        }
    }

    pub fn source(&self, side: SlotSide) -> Option<&MatchSource> {
        match side {
            SlotSide::A => self.source_a.as_ref(),
            SlotSide::B => self.source_b.as_ref(),
        }
    }

    pub fn source_mut(&mut self, side: SlotSide) -> &mut Option<MatchSource> {
        match side {
            SlotSide::A => &mut self.source_a,
            SlotSide::B => &mut self.source_b,
        }
    }

    pub fn source_count(&self) -> usize {
        SlotSide::BOTH
            .iter()
            .filter(|side| self.source(**side).is_some())
            .count()
    }

    pub fn side_of(&self, team: &TeamId) -> Option<SlotSide> {
        SlotSide::BOTH
            .into_iter()
            .find(|side| self.slot(*side).team() == Some(team))
    }

    pub fn teams(&self) -> impl Iterator<Item = &TeamId> {
        self.team_a.team().into_iter().chain(self.team_b.team())
    }

    pub fn is_seated(&self) -> bool {
        self.team_a.team().is_some() && self.team_b.team().is_some()
    }

    pub fn is_decided(&self) -> bool {
        self.winner.is_some()
    }

    /// The team that lost a decided, contested match.
    pub fn loser(&self) -> Option<&TeamId> {
        let winner = self.winner.as_ref()?;
        self.teams().find(|team| *team != winner)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub idx: usize,
    pub bracket_type: BracketType,
    pub depth: usize,
    pub matches: Vec<MatchId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketInfo {
    pub team_count: usize,
    pub bracket_size: usize,
    pub bye_count: usize,
    /// Winner-bracket rounds, `log2(bracket_size)`.
    pub round_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bracket {
    pub info: BracketInfo,
    pub teams: Vec<Team>,
    pub rounds: Vec<Round>,
    /// Arena owning every match; rounds and sources refer to entries by id.
    pub matches: Vec<Match>,
    pub total_matches: usize,
    pub total_rounds: usize,
}

impl Bracket {
    pub fn rounds_of(&self, bracket_type: BracketType) -> impl Iterator<Item = &Round> {
        self.rounds
            .iter()
            .filter(move |round| round.bracket_type == bracket_type)
    }

    pub fn round_of(&self, m: &Match) -> Option<&Round> {
        self.rounds.get(m.round)
    }

    pub fn bracket_type_of(&self, m: &Match) -> Option<BracketType> {
        self.round_of(m).map(|round| round.bracket_type)
    }

    /// Finals-1 and Finals-2 ids, in that order.
    pub fn finals(&self) -> Option<(MatchId, MatchId)> {
        let mut finals = self
            .rounds_of(BracketType::Finals)
            .filter_map(|round| round.matches.first().copied());
        Some((finals.next()?, finals.next()?))
    }
}

// ── App config ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub bind_addr: String,
    pub logs_dir: String,
    pub log_filter: String,
    /// Upper bound on teams accepted by the HTTP layer.
    pub max_teams: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            logs_dir: "logs".to_string(),
            log_filter: "info".to_string(),
            max_teams: DEFAULT_MAX_TEAMS,
        }
    }
}

// ── Store types ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct BracketStore {
    pub brackets: HashMap<u64, BracketSession>,
    pub next_id: u64,
}

impl BracketStore {
    pub fn insert(&mut self, session: BracketSession) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.brackets.insert(id, session);
        id
    }
}

#[derive(Clone)]
pub struct ServerState {
    pub store: SharedBracketStore,
    pub config: Arc<AppConfig>,
}
