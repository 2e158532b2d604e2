use crate::config::{GymConfig, GymEntry, GymSettings};
use crate::errors::Unavailability;
use schema::GymType;

/// Durable per-gym configuration held in memory.
///
/// Every gym type always has an entry; loading fills gaps with defaults, so
/// lookups never fail.
#[derive(Debug, Clone)]
pub struct GymRegistry {
    config: GymConfig,
    fallback: GymEntry,
}

impl GymRegistry {
    pub fn new(config: GymConfig) -> Self {
        GymRegistry {
            config,
            fallback: GymEntry::default_for(GymType::Normal),
        }
    }

    pub fn settings(&self) -> &GymSettings {
        &self.config.settings
    }

    pub fn settings_mut(&mut self) -> &mut GymSettings {
        &mut self.config.settings
    }

    pub fn entry(&self, gym: GymType) -> &GymEntry {
        self.config.gyms.get(&gym).unwrap_or(&self.fallback)
    }

    pub fn entry_mut(&mut self, gym: GymType) -> &mut GymEntry {
        self.config
            .gyms
            .entry(gym)
            .or_insert_with(|| GymEntry::default_for(gym))
    }

    pub fn entries(&self) -> impl Iterator<Item = (GymType, &GymEntry)> {
        self.config.gyms.iter().map(|(gym, entry)| (*gym, entry))
    }

    /// Why `gym` cannot be challenged right now, if anything.
    pub fn unavailability(&self, gym: GymType) -> Option<Unavailability> {
        let entry = self.entry(gym);
        if !entry.enabled {
            Some(Unavailability::Disabled)
        } else if entry.leader.is_none() {
            Some(Unavailability::NoLeader)
        } else {
            None
        }
    }

    pub fn config(&self) -> &GymConfig {
        &self.config
    }

    /// Swap in a freshly loaded document.
    pub fn replace(&mut self, config: GymConfig) {
        self.config = config;
    }
}
