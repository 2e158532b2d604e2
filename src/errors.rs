use chrono::{DateTime, Utc};
use schema::GymType;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the gym league orchestration core
#[derive(Debug, Error)]
pub enum GymError {
    /// A challenge could not be proposed, accepted or declined
    #[error("Challenge error: {0}")]
    Challenge(#[from] ChallengeError),
    /// A leader assignment could not be changed
    #[error("Leader error: {0}")]
    Leader(#[from] LeaderError),
    /// A document could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Why a gym cannot currently be challenged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailability {
    Disabled,
    NoLeader,
}

impl fmt::Display for Unavailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unavailability::Disabled => write!(f, "disabled"),
            Unavailability::NoLeader => write!(f, "no leader"),
        }
    }
}

/// Which side of a proposal already has something pending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingConflict {
    ChallengerHasPending,
    LeaderHasPending,
}

impl fmt::Display for PendingConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingConflict::ChallengerHasPending => write!(
                f,
                "You already have a pending challenge. Wait for a response or timeout"
            ),
            PendingConflict::LeaderHasPending => {
                write!(f, "The leader already has a pending challenge")
            }
        }
    }
}

/// Challenger to leader distance as measured by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasuredDistance {
    Blocks(u64),
    /// The players are in different worlds, or the host reported no finite distance
    Unmeasurable,
}

impl MeasuredDistance {
    /// Whole blocks, rounded. Missing or non-finite distances are unmeasurable.
    pub fn from_blocks(distance: Option<f64>) -> Self {
        match distance {
            Some(d) if d.is_finite() => MeasuredDistance::Blocks(d.abs().round() as u64),
            _ => MeasuredDistance::Unmeasurable,
        }
    }
}

impl fmt::Display for MeasuredDistance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasuredDistance::Blocks(blocks) => write!(f, "{} blocks", blocks),
            MeasuredDistance::Unmeasurable => write!(f, "not in the same world"),
        }
    }
}

/// Errors raised by the challenge flow. Validation errors leave state untouched;
/// timing errors have already cleared the stale challenge when they are returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChallengeError {
    #[error("The {gym} gym is not available ({reason})")]
    GymUnavailable { gym: GymType, reason: Unavailability },

    #[error("You cannot challenge your own gym ({gym})")]
    SelfChallenge { gym: GymType },

    #[error("The gym leader {leader_name} is not online")]
    LeaderOffline { leader_name: String },

    #[error("You must be within {radius} blocks of the leader (currently: {distance})")]
    OutOfRange {
        radius: f64,
        distance: MeasuredDistance,
    },

    #[error("{0}")]
    AlreadyPending(PendingConflict),

    #[error("A gym battle between these players is already in progress")]
    BattleInProgress,

    #[error("You have no pending challenges")]
    NoPendingChallenge,

    #[error("The challenge from {challenger_name} has expired")]
    ChallengeExpired { challenger_name: String },

    #[error("The challenger {challenger_name} is no longer online")]
    ChallengerGone { challenger_name: String },

    #[error("You are no longer the leader of the {gym} gym")]
    LeaderReassigned { gym: GymType },

    #[error("The {gym} gym leader has not registered their team yet")]
    LeaderNotRegistered { gym: GymType },

    #[error("Failed to start battle: {0}")]
    BattleStartFailed(String),
}

/// Errors related to leader assignment
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeaderError {
    #[error("The {gym} gym has no leader")]
    NoLeader { gym: GymType },

    #[error("You are not the leader of the {gym} gym")]
    NotLeader { gym: GymType },

    #[error("A team needs at least one member")]
    EmptyTeam,

    #[error("The {gym} gym leader has not registered a team")]
    NoTeamRegistered { gym: GymType },

    #[error("Level cap must be 50 or 100 (got {0})")]
    InvalidLevelCap(u32),

    #[error("The {gym} gym team can be changed again at {available_at}")]
    TeamChangeOnCooldown {
        gym: GymType,
        available_at: DateTime<Utc>,
    },

    #[error("The {gym} gym rules can be changed again at {available_at}")]
    RulesChangeOnCooldown {
        gym: GymType,
        available_at: DateTime<Utc>,
    },
}

/// Errors related to reading and writing the persisted documents
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("persistence writer has shut down")]
    WriterClosed,
}

/// Errors reported by the host when handing an item to a player
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("unknown item {0}")]
    UnknownItem(String),
    #[error("player {0} is not reachable")]
    PlayerUnavailable(String),
    #[error("delivery rejected: {0}")]
    Rejected(String),
}

/// Error reported by the external battle engine when it refuses to start a match
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct BattleEngineError(pub String);

/// Type alias for Results using GymError
pub type GymResult<T> = Result<T, GymError>;

/// Type alias for Results using ChallengeError
pub type ChallengeResult<T> = Result<T, ChallengeError>;

/// Type alias for Results using LeaderError
pub type LeaderResult<T> = Result<T, LeaderError>;

/// Type alias for Results using PersistenceError
pub type PersistenceResult<T> = Result<T, PersistenceError>;
