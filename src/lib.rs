// In: src/lib.rs

//! Gym League Orchestration Core
//!
//! Server-side gym leader challenges for a creature battling game: challenge
//! proposals with timeouts, correlation of externally run battles back to the
//! challenge that started them, and exactly-once monthly rewards backed by a
//! persistent battle ledger. Everything outside the core (players, the battle
//! engine, items, chat) is reached through the traits in [`ports`].

// --- MODULE DECLARATIONS ---
// This declares the module hierarchy for the crate.
pub mod audit;
pub mod calendar;
pub mod challenge;
pub mod config;
pub mod context;
pub mod correlator;
pub mod errors;
pub mod host;
pub mod leaders;
pub mod ledger;
pub mod persistence;
pub mod ports;
pub mod registry;
pub mod rewards;
pub mod teams;

#[cfg(test)]
mod tests;

// --- PUBLIC API RE-EXPORTS ---
// This section defines the public-facing API of the `gym-league` crate,
// making it easy for users to import the most important types directly.

// --- From the `schema` crate ---
// Re-export the shared identity enums and data shapes.
pub use schema::{
    presentation, BattleFormat, BattleResult, ChatColor, GymPresentation, GymType, ItemStack,
    PlayerId, RewardSpec,
};

// --- From this crate's modules (`src/`) ---

// The orchestration context and its inbound event seam.
pub use context::{BattleEventSink, BattleListener, GymContext};

// Host ports and the in-memory host.
pub use host::{ManualClock, SimulatedWorld};
pub use ports::{BattleEngine, Clock, HostPorts, ItemDelivery, Notifier, PlayerDirectory, SystemClock};

// Challenge flow and battle correlation.
pub use challenge::{ChallengeId, PendingChallenge};
pub use correlator::{ActiveBattle, BattleConclusion, BattleEndedEvent, BattleHandle};

// Configuration, ledger and persistence.
pub use calendar::MonthKey;
pub use config::{GymConfig, GymEntry, GymSettings, LeaderAssignment};
pub use leaders::LeaderChange;
pub use ledger::{BattleRecord, CleanupReport, ClaimOutcome, PlayerGymStats};
pub use persistence::{DocumentStore, JsonFileStore, MemoryStore};
pub use rewards::{DeliveryOutcome, GrantReport};
pub use teams::{GymRules, LeaderTeam, TeamMember};

// Crate-specific error and result types.
pub use errors::{
    BattleEngineError, ChallengeError, ChallengeResult, DeliveryError, GymError, GymResult,
    LeaderError, LeaderResult, PersistenceError, PersistenceResult,
};
