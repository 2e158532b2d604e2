//! Host ports: the traits the orchestration core calls outward through.
//!
//! The host process (the game server, the demo binary or the test harness)
//! implements these. The core never reaches for global state; everything it
//! needs from the outside world arrives through a [`HostPorts`] bundle.

use crate::errors::{BattleEngineError, DeliveryError};
use chrono::{DateTime, Utc};
use schema::{ItemStack, PlayerId};
use std::sync::Arc;

/// Who is online, what they are called and where they stand.
pub trait PlayerDirectory: Send + Sync {
    /// Display name of a connected player, `None` when offline.
    fn online_name(&self, player: &PlayerId) -> Option<String>;

    fn is_online(&self, player: &PlayerId) -> bool {
        self.online_name(player).is_some()
    }

    /// Distance in blocks between two connected players. `None` when the two
    /// cannot be compared (different worlds, or either is offline).
    fn distance(&self, a: &PlayerId, b: &PlayerId) -> Option<f64>;
}

/// The external battle engine. Only starting a match is needed; results come
/// back asynchronously through [`crate::BattleEventSink`].
pub trait BattleEngine: Send + Sync {
    fn start_battle(&self, challenger: &PlayerId, leader: &PlayerId)
        -> Result<(), BattleEngineError>;
}

/// Generic item delivery.
pub trait ItemDelivery: Send + Sync {
    /// Try to put the stack in the player's inventory. `Ok(false)` means it did
    /// not fit and nothing was added.
    fn add_to_inventory(&self, player: &PlayerId, stack: &ItemStack) -> Result<bool, DeliveryError>;

    /// Place the stack in the world right next to the player.
    fn place_near(&self, player: &PlayerId, stack: &ItemStack) -> Result<(), DeliveryError>;
}

/// One line of text to one player.
pub trait Notifier: Send + Sync {
    fn notify(&self, player: &PlayerId, line: &str);
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Everything the core needs from its host, bundled for injection.
#[derive(Clone)]
pub struct HostPorts {
    pub players: Arc<dyn PlayerDirectory>,
    pub engine: Arc<dyn BattleEngine>,
    pub items: Arc<dyn ItemDelivery>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for HostPorts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostPorts").finish_non_exhaustive()
    }
}

/// Player notifications collected while the state lock is held and delivered
/// after it is released, so a notifier that calls back into the core cannot
/// deadlock it.
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<(PlayerId, String)>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, player: &PlayerId, line: impl Into<String>) {
        self.messages.push((player.clone(), line.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[(PlayerId, String)] {
        &self.messages
    }

    pub fn deliver(self, notifier: &dyn Notifier) {
        for (player, line) in self.messages {
            notifier.notify(&player, &line);
        }
    }
}
