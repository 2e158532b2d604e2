//! Leader directory: who leads which gym, and the transitions between leaders.
//!
//! These are operations on [`GymRegistry`]; the registry entry is the only
//! place a leader assignment lives.

use crate::config::LeaderAssignment;
use crate::errors::{LeaderError, LeaderResult};
use crate::registry::GymRegistry;
use chrono::{DateTime, Utc};
use schema::{GymType, PlayerId, RewardSpec};

/// What a `set_leader` call did, for logging and the audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaderChange {
    /// The gym had no leader, or the same player was set again
    Set {
        gym: GymType,
        leader: LeaderAssignment,
    },
    /// A different player held the gym and was evicted
    Changed {
        gym: GymType,
        previous: LeaderAssignment,
        leader: LeaderAssignment,
    },
}

impl LeaderChange {
    pub fn gym(&self) -> GymType {
        match self {
            LeaderChange::Set { gym, .. } | LeaderChange::Changed { gym, .. } => *gym,
        }
    }

    pub fn leader(&self) -> &LeaderAssignment {
        match self {
            LeaderChange::Set { leader, .. } | LeaderChange::Changed { leader, .. } => leader,
        }
    }
}

impl GymRegistry {
    pub fn set_leader(
        &mut self,
        gym: GymType,
        player_id: &PlayerId,
        player_name: &str,
        now: DateTime<Utc>,
    ) -> LeaderChange {
        let leader = LeaderAssignment {
            player_id: player_id.clone(),
            player_name: player_name.to_string(),
            since: now,
        };

        let entry = self.entry_mut(gym);
        let previous = entry.leader.replace(leader.clone());

        match previous {
            Some(previous) if previous.player_id != *player_id => {
                entry.leader_registered = false;
                LeaderChange::Changed {
                    gym,
                    previous,
                    leader,
                }
            }
            Some(_) => LeaderChange::Set { gym, leader },
            None => {
                entry.leader_registered = false;
                LeaderChange::Set { gym, leader }
            }
        }
    }

    /// Clear the assignment. Returns the evicted leader.
    pub fn remove_leader(&mut self, gym: GymType) -> LeaderResult<LeaderAssignment> {
        let entry = self.entry_mut(gym);
        let previous = entry.leader.take().ok_or(LeaderError::NoLeader { gym })?;
        entry.leader_registered = false;
        Ok(previous)
    }

    pub fn leader_of(&self, gym: GymType) -> Option<&LeaderAssignment> {
        self.entry(gym).leader.as_ref()
    }

    /// First gym (in declaration order) led by `player`.
    pub fn gym_of(&self, player: &PlayerId) -> Option<GymType> {
        self.gyms_of(player).next()
    }

    pub fn gyms_of<'a>(&'a self, player: &'a PlayerId) -> impl Iterator<Item = GymType> + 'a {
        self.entries().filter_map(move |(gym, entry)| {
            entry
                .leader
                .as_ref()
                .filter(|leader| leader.player_id == *player)
                .map(|_| gym)
        })
    }

    pub fn is_any_leader(&self, player: &PlayerId) -> bool {
        self.gym_of(player).is_some()
    }

    /// Enabled gyms that currently have a leader.
    pub fn active_gyms(&self) -> Vec<GymType> {
        self.entries()
            .filter(|(_, entry)| entry.is_open())
            .map(|(gym, _)| gym)
            .collect()
    }

    pub fn set_gym_enabled(&mut self, gym: GymType, enabled: bool) {
        self.entry_mut(gym).enabled = enabled;
    }

    pub fn set_rewards(&mut self, gym: GymType, rewards: RewardSpec) {
        self.entry_mut(gym).rewards = rewards;
    }

    /// Confirm the current leader's team. Fails when the gym has no leader.
    pub fn mark_leader_registered(&mut self, gym: GymType, registered: bool) -> LeaderResult<()> {
        let entry = self.entry_mut(gym);
        if entry.leader.is_none() {
            return Err(LeaderError::NoLeader { gym });
        }
        entry.leader_registered = registered;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GymConfig;
    use pretty_assertions::assert_eq;

    fn registry() -> GymRegistry {
        GymRegistry::new(GymConfig::default())
    }

    #[test]
    fn test_set_then_change_leader() {
        let mut registry = registry();
        let now = Utc::now();
        let brock = PlayerId::from("p-brock");
        let flint = PlayerId::from("p-flint");

        let first = registry.set_leader(GymType::Rock, &brock, "Brock", now);
        assert!(matches!(first, LeaderChange::Set { .. }));
        registry.mark_leader_registered(GymType::Rock, true).unwrap();

        let second = registry.set_leader(GymType::Rock, &flint, "Flint", now);
        match second {
            LeaderChange::Changed { previous, leader, .. } => {
                assert_eq!(previous.player_name, "Brock");
                assert_eq!(leader.player_name, "Flint");
            }
            other => panic!("expected a leader change, got {:?}", other),
        }
        assert!(!registry.entry(GymType::Rock).leader_registered);
        assert_eq!(registry.gym_of(&flint), Some(GymType::Rock));
        assert_eq!(registry.gym_of(&brock), None);
    }

    #[test]
    fn test_resetting_same_leader_keeps_registration() {
        let mut registry = registry();
        let misty = PlayerId::from("p-misty");
        registry.set_leader(GymType::Water, &misty, "Misty", Utc::now());
        registry.mark_leader_registered(GymType::Water, true).unwrap();

        let change = registry.set_leader(GymType::Water, &misty, "Misty", Utc::now());
        assert!(matches!(change, LeaderChange::Set { .. }));
        assert!(registry.entry(GymType::Water).leader_registered);
    }

    #[test]
    fn test_remove_leader() {
        let mut registry = registry();
        assert_eq!(
            registry.remove_leader(GymType::Ghost),
            Err(LeaderError::NoLeader { gym: GymType::Ghost })
        );

        let morty = PlayerId::from("p-morty");
        registry.set_leader(GymType::Ghost, &morty, "Morty", Utc::now());
        assert_eq!(registry.active_gyms(), vec![GymType::Ghost]);

        let removed = registry.remove_leader(GymType::Ghost).unwrap();
        assert_eq!(removed.player_id, morty);
        assert!(registry.leader_of(GymType::Ghost).is_none());
        assert!(registry.active_gyms().is_empty());
        assert!(!registry.is_any_leader(&morty));
    }

    #[test]
    fn test_disabled_gym_is_not_active() {
        let mut registry = registry();
        registry.set_leader(GymType::Fire, &PlayerId::from("p-blaine"), "Blaine", Utc::now());
        registry.set_gym_enabled(GymType::Fire, false);
        assert!(registry.active_gyms().is_empty());
    }
}
