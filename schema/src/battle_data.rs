use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable player identifier as handed out by the host (a UUID string in practice).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        PlayerId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        PlayerId(id.to_string())
    }
}

impl From<String> for PlayerId {
    fn from(id: String) -> Self {
        PlayerId(id)
    }
}

/// Outcome of a tracked gym battle as stored in a battle record.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BattleResult {
    ChallengerWin,
    LeaderWin,
    Draw,
    Cancelled,
}

impl fmt::Display for BattleResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let display_name = match self {
            BattleResult::ChallengerWin => "CHALLENGER WIN",
            BattleResult::LeaderWin => "LEADER WIN",
            BattleResult::Draw => "DRAW",
            BattleResult::Cancelled => "CANCELLED",
        };
        write!(f, "{}", display_name)
    }
}

/// Battle format a gym is fought in.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum BattleFormat {
    #[default]
    Singles,
    Doubles,
}
