//! In-memory host: a simulated world that implements every port, plus a
//! manually driven clock.
//!
//! Used by the demo binary, the MCP server and the tests. Nothing here runs a
//! real battle; a started battle is only recorded until someone reports how
//! it ended.

use crate::errors::{BattleEngineError, DeliveryError};
use crate::ports::{BattleEngine, Clock, ItemDelivery, Notifier, PlayerDirectory};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use schema::{ItemStack, PlayerId};
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub const DEFAULT_INVENTORY_SLOTS: usize = 36;

#[derive(Debug, Clone)]
struct SimPlayer {
    name: String,
    world: String,
    position: (f64, f64, f64),
    online: bool,
    capacity: usize,
    inventory: Vec<ItemStack>,
    dropped: Vec<ItemStack>,
}

#[derive(Debug, Default)]
struct WorldState {
    players: HashMap<PlayerId, SimPlayer>,
    messages: Vec<(PlayerId, String)>,
    started_battles: Vec<(PlayerId, PlayerId)>,
    battle_start_failure: Option<String>,
    rejected_items: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct SimulatedWorld {
    state: Mutex<WorldState>,
}

impl SimulatedWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a player, creating them on first join. Inventory and drops
    /// survive reconnects.
    pub fn join(&self, id: &str, name: &str, world: &str, position: (f64, f64, f64)) {
        let mut state = self.state.lock();
        let player = state
            .players
            .entry(PlayerId::from(id))
            .or_insert_with(|| SimPlayer {
                name: name.to_string(),
                world: world.to_string(),
                position,
                online: true,
                capacity: DEFAULT_INVENTORY_SLOTS,
                inventory: Vec::new(),
                dropped: Vec::new(),
            });
        player.name = name.to_string();
        player.world = world.to_string();
        player.position = position;
        player.online = true;
    }

    pub fn leave(&self, id: &str) {
        if let Some(player) = self.state.lock().players.get_mut(&PlayerId::from(id)) {
            player.online = false;
        }
    }

    pub fn move_to(&self, id: &str, world: &str, position: (f64, f64, f64)) {
        if let Some(player) = self.state.lock().players.get_mut(&PlayerId::from(id)) {
            player.world = world.to_string();
            player.position = position;
        }
    }

    /// Number of distinct item stacks the player's inventory holds.
    pub fn set_inventory_capacity(&self, id: &str, slots: usize) {
        if let Some(player) = self.state.lock().players.get_mut(&PlayerId::from(id)) {
            player.capacity = slots;
        }
    }

    /// Make every delivery of `item_id` fail.
    pub fn reject_item(&self, item_id: &str) {
        self.state.lock().rejected_items.insert(item_id.to_string());
    }

    /// Make the battle engine refuse to start matches until cleared with `None`.
    pub fn set_battle_start_failure(&self, reason: Option<&str>) {
        self.state.lock().battle_start_failure = reason.map(str::to_string);
    }

    pub fn inventory_count(&self, id: &str, item_id: &str) -> u32 {
        self.state
            .lock()
            .players
            .get(&PlayerId::from(id))
            .map(|player| {
                player
                    .inventory
                    .iter()
                    .filter(|stack| stack.item_id == item_id)
                    .map(|stack| stack.count)
                    .sum()
            })
            .unwrap_or(0)
    }

    pub fn inventory(&self, id: &str) -> Vec<ItemStack> {
        self.state
            .lock()
            .players
            .get(&PlayerId::from(id))
            .map(|player| player.inventory.clone())
            .unwrap_or_default()
    }

    pub fn dropped_near(&self, id: &str) -> Vec<ItemStack> {
        self.state
            .lock()
            .players
            .get(&PlayerId::from(id))
            .map(|player| player.dropped.clone())
            .unwrap_or_default()
    }

    pub fn messages_for(&self, id: &str) -> Vec<String> {
        let player = PlayerId::from(id);
        self.state
            .lock()
            .messages
            .iter()
            .filter(|(to, _)| *to == player)
            .map(|(_, line)| line.clone())
            .collect()
    }

    /// Remove and return every message sent so far.
    pub fn drain_messages(&self) -> Vec<(PlayerId, String)> {
        std::mem::take(&mut self.state.lock().messages)
    }

    pub fn started_battles(&self) -> Vec<(PlayerId, PlayerId)> {
        self.state.lock().started_battles.clone()
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        let mut ids: Vec<PlayerId> = self.state.lock().players.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl PlayerDirectory for SimulatedWorld {
    fn online_name(&self, player: &PlayerId) -> Option<String> {
        self.state
            .lock()
            .players
            .get(player)
            .filter(|p| p.online)
            .map(|p| p.name.clone())
    }

    fn distance(&self, a: &PlayerId, b: &PlayerId) -> Option<f64> {
        let state = self.state.lock();
        let a = state.players.get(a).filter(|p| p.online)?;
        let b = state.players.get(b).filter(|p| p.online)?;
        if a.world != b.world {
            return None;
        }
        let (dx, dy, dz) = (
            a.position.0 - b.position.0,
            a.position.1 - b.position.1,
            a.position.2 - b.position.2,
        );
        Some((dx * dx + dy * dy + dz * dz).sqrt())
    }
}

impl BattleEngine for SimulatedWorld {
    fn start_battle(&self, challenger: &PlayerId, leader: &PlayerId) -> Result<(), BattleEngineError> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.battle_start_failure {
            return Err(BattleEngineError(reason.clone()));
        }
        for player in [challenger, leader] {
            if !state.players.get(player).is_some_and(|p| p.online) {
                return Err(BattleEngineError(format!("{} is not online", player)));
            }
        }
        state
            .started_battles
            .push((challenger.clone(), leader.clone()));
        debug!(challenger = %challenger, leader = %leader, "Simulated battle started");
        Ok(())
    }
}

impl ItemDelivery for SimulatedWorld {
    fn add_to_inventory(&self, player: &PlayerId, stack: &ItemStack) -> Result<bool, DeliveryError> {
        let mut state = self.state.lock();
        if state.rejected_items.contains(&stack.item_id) {
            return Err(DeliveryError::UnknownItem(stack.item_id.clone()));
        }
        let target = state
            .players
            .get_mut(player)
            .filter(|p| p.online)
            .ok_or_else(|| DeliveryError::PlayerUnavailable(player.to_string()))?;

        if let Some(existing) = target
            .inventory
            .iter_mut()
            .find(|slot| slot.item_id == stack.item_id)
        {
            existing.count += stack.count;
            return Ok(true);
        }
        if target.inventory.len() >= target.capacity {
            return Ok(false);
        }
        target.inventory.push(stack.clone());
        Ok(true)
    }

    fn place_near(&self, player: &PlayerId, stack: &ItemStack) -> Result<(), DeliveryError> {
        let mut state = self.state.lock();
        let target = state
            .players
            .get_mut(player)
            .filter(|p| p.online)
            .ok_or_else(|| DeliveryError::PlayerUnavailable(player.to_string()))?;
        target.dropped.push(stack.clone());
        Ok(())
    }
}

impl Notifier for SimulatedWorld {
    fn notify(&self, player: &PlayerId, line: &str) {
        self.state
            .lock()
            .messages
            .push((player.clone(), line.to_string()));
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock() = instant;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
