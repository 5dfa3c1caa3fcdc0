use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const MAX_LOGS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Venue {
    Home,
    Away,
}

impl Venue {
    /// Label the analysis service expects in the request context.
    pub fn wire_label(self) -> &'static str {
        match self {
            Venue::Home => "Casa",
            Venue::Away => "Fora",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStatus {
    Scheduled,
    Analyzing,
    Completed,
    Error,
}

/// Who the synthesis favours. `Home` is the analysed club, whatever the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winner {
    Home,
    Away,
    Draw,
    Undetermined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Success,
    Critical,
    Error,
}

impl Severity {
    pub fn tag(self) -> &'static str {
        match self {
            Severity::Info => "[INFO]",
            Severity::Success => "[SUCCESS]",
            Severity::Critical => "[CRITICAL]",
            Severity::Error => "[FATAL_ERROR]",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub severity: Severity,
    pub text: String,
}

impl LogEntry {
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            severity,
            text: text.into(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.severity.tag(), self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PlayerPerformance {
    pub games_played: Option<u32>,
    pub goals: Option<u32>,
    pub assists: Option<u32>,
    pub rating_average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub position: String,
    pub shirt_number: Option<u32>,
    pub age: Option<u32>,
    pub status: String,
    pub injury_details: Option<String>,
    pub performance: Option<PlayerPerformance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    pub inferred_winner: Winner,
    pub confidence: f64,
    pub confidence_breakdown: String,
    pub key_factors: Vec<String>,
    pub risk_factors: Vec<String>,
    pub collected_players: Vec<Player>,
}

/// The analysis request as entered by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobParams {
    pub opponent: String,
    pub competition: String,
    pub match_date: String,
    pub venue: Venue,
    pub special_directives: String,
    pub deep_dive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub opponent: String,
    pub competition: String,
    pub match_date: String,
    pub venue: Venue,
    pub status: MatchStatus,
    pub result: Option<AnalysisResult>,
    pub error: Option<String>,
    pub user_context: Option<String>,
}

impl Match {
    pub fn from_params(params: &JobParams) -> Self {
        let user_context = Some(params.special_directives.trim().to_string())
            .filter(|s| !s.is_empty());
        Self {
            id: new_match_id(),
            opponent: params.opponent.trim().to_string(),
            competition: params.competition.trim().to_string(),
            match_date: params.match_date.trim().to_string(),
            venue: params.venue,
            status: MatchStatus::Analyzing,
            result: None,
            error: None,
            user_context,
        }
    }

    pub fn completed(&self, result: AnalysisResult) -> Self {
        Self {
            status: MatchStatus::Completed,
            result: Some(result),
            error: None,
            ..self.clone()
        }
    }

    pub fn failed(&self, error: impl Into<String>) -> Self {
        Self {
            status: MatchStatus::Error,
            result: None,
            error: Some(error.into()),
            ..self.clone()
        }
    }
}

fn new_match_id() -> String {
    format!("match-{:016x}", rand::random::<u64>())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Submitting,
    Polling,
    Finalizing,
    Succeeded,
    Failed(String),
    Cancelled,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed(_) | Phase::Cancelled)
    }
}

#[derive(Debug, Clone)]
pub enum Delta {
    UpsertMatch(Match),
    MergePlayers(Vec<Player>),
    PhaseChanged(Phase),
    Log(LogEntry),
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub matches: Vec<Match>,
    pub players: Vec<Player>,
    pub logs: VecDeque<LogEntry>,
    pub phase: Phase,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            matches: Vec::new(),
            players: Vec::new(),
            logs: VecDeque::new(),
            phase: Phase::Idle,
        }
    }

    pub fn push_log(&mut self, entry: LogEntry) {
        self.logs.push_back(entry);
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }

    pub fn match_by_id(&self, id: &str) -> Option<&Match> {
        self.matches.iter().find(|m| m.id == id)
    }

    pub fn upsert_match(&mut self, incoming: Match) {
        match self.matches.iter_mut().find(|m| m.id == incoming.id) {
            Some(existing) => *existing = incoming,
            None => self.matches.push(incoming),
        }
    }

    /// Replaces players with the same (case-insensitive) name and appends the rest.
    pub fn merge_players(&mut self, incoming: Vec<Player>) {
        for player in incoming {
            let key = player.name.trim().to_lowercase();
            if key.is_empty() {
                continue;
            }
            match self
                .players
                .iter_mut()
                .find(|p| p.name.trim().to_lowercase() == key)
            {
                Some(existing) => *existing = player,
                None => self.players.push(player),
            }
        }
    }
}

pub fn apply_delta(state: &mut AppState, delta: Delta) {
    match delta {
        Delta::UpsertMatch(record) => state.upsert_match(record),
        Delta::MergePlayers(players) => state.merge_players(players),
        Delta::PhaseChanged(phase) => {
            // A new session resets the mirrored log.
            if phase == Phase::Submitting {
                state.logs.clear();
            }
            state.phase = phase;
        }
        Delta::Log(entry) => state.push_log(entry),
    }
}

pub fn winner_label(winner: Winner, home: &str, opponent: &str) -> String {
    match winner {
        Winner::Home => home.to_string(),
        Winner::Away => opponent.to_string(),
        Winner::Draw => "Draw".to_string(),
        Winner::Undetermined => "Undetermined".to_string(),
    }
}
