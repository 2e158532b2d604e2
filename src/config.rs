//! The per-install configuration document: global gym settings and one entry
//! per gym.
//!
//! Two shapes exist. [`GymConfigFile`] is the on-disk schema: flat, every field
//! optional or defaulted, string keyed. [`GymConfig`] is the validated
//! in-memory form the rest of the crate works with. Conversion in both
//! directions is explicit so that older or hand-edited files load with
//! defaults filled in, and the leader invariant is checked on the way in.

use crate::calendar::{parse_zone, DEFAULT_OPERATIONAL_ZONE};
use chrono::{DateTime, Utc};
use schema::{BattleFormat, GymType, PlayerId, RewardSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_COIN_ITEM_ID: &str = "gym_league:silver_coin";

/// Global settings for the challenge flow and the ledger.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct GymSettings {
    /// Battles a leader must fight in a month to qualify for the leader reward
    pub leader_min_battles_for_monthly_reward: u32,
    /// How long a proposal waits for the leader
    pub challenge_timeout_seconds: u64,
    /// Maximum challenger to leader distance, in blocks
    pub challenge_radius: f64,
    /// Challenges are refused until the leader has registered a team
    pub require_team_registration: bool,
    /// Days a leader waits between team changes and between rules changes; 0 disables the cooldown
    pub team_change_interval_days: u32,
    /// Item id handed out for `RewardSpec::coin_count`
    pub coin_item_id: String,
    /// IANA zone whose calendar months define claim windows
    pub operational_time_zone: String,
    /// Months of battle history kept by the retention cleanup
    pub history_retention_months: u32,
}

impl Default for GymSettings {
    fn default() -> Self {
        GymSettings {
            leader_min_battles_for_monthly_reward: 10,
            challenge_timeout_seconds: 60,
            challenge_radius: 32.0,
            require_team_registration: true,
            team_change_interval_days: 30,
            coin_item_id: DEFAULT_COIN_ITEM_ID.to_string(),
            operational_time_zone: DEFAULT_OPERATIONAL_ZONE.name().to_string(),
            history_retention_months: 12,
        }
    }
}

/// The player currently defending a gym.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderAssignment {
    pub player_id: PlayerId,
    pub player_name: String,
    pub since: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GymEntry {
    pub display_name: String,
    pub leader: Option<LeaderAssignment>,
    pub enabled: bool,
    pub rewards: RewardSpec,
    /// The leader has confirmed a team
    pub leader_registered: bool,
    pub battle_format: BattleFormat,
}

impl GymEntry {
    pub fn default_for(gym: GymType) -> Self {
        GymEntry {
            display_name: schema::presentation(gym).gym_title(),
            leader: None,
            enabled: true,
            rewards: default_rewards(gym),
            leader_registered: false,
            battle_format: BattleFormat::Singles,
        }
    }

    /// Enabled and led.
    pub fn is_open(&self) -> bool {
        self.enabled && self.leader.is_some()
    }
}

fn default_rewards(gym: GymType) -> RewardSpec {
    RewardSpec {
        badge_item_id: format!("gym_league:badge_{}", gym.id()),
        tm_item_id: String::new(),
        coin_count: 1,
        extra_items: BTreeMap::new(),
    }
}

/// Validated configuration document.
#[derive(Debug, Clone, PartialEq)]
pub struct GymConfig {
    pub settings: GymSettings,
    pub gyms: BTreeMap<GymType, GymEntry>,
}

impl Default for GymConfig {
    fn default() -> Self {
        GymConfig {
            settings: GymSettings::default(),
            gyms: GymType::all()
                .map(|gym| (gym, GymEntry::default_for(gym)))
                .collect(),
        }
    }
}

/// Something that was fixed up while loading a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadWarning {
    UnknownGym(String),
    MissingGym(GymType),
    PartialLeader(GymType),
    InvalidTimestamp { context: String, value: String },
    InvalidMonth(String),
    UnknownPlayerKey(String),
    UnknownTimeZone(String),
}

impl std::fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadWarning::UnknownGym(key) => write!(f, "skipped unknown gym '{}'", key),
            LoadWarning::MissingGym(gym) => write!(f, "added missing gym '{}' with defaults", gym),
            LoadWarning::PartialLeader(gym) => write!(
                f,
                "dropped leader of '{}': name and id must both be present",
                gym
            ),
            LoadWarning::InvalidTimestamp { context, value } => {
                write!(f, "invalid timestamp '{}' in {}", value, context)
            }
            LoadWarning::InvalidMonth(key) => write!(f, "skipped invalid month key '{}'", key),
            LoadWarning::UnknownPlayerKey(key) => write!(f, "skipped invalid player key '{}'", key),
            LoadWarning::UnknownTimeZone(name) => write!(
                f,
                "unknown operational time zone '{}', using {}",
                name,
                DEFAULT_OPERATIONAL_ZONE.name()
            ),
        }
    }
}

// --- On-disk schema ---

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct GymEntryRecord {
    pub display_name: Option<String>,
    pub current_leader: Option<String>,
    #[serde(rename = "currentLeaderUUID")]
    pub current_leader_uuid: Option<String>,
    pub leader_start_date: Option<String>,
    pub leader_registered: bool,
    pub battle_format: Option<BattleFormat>,
    pub rewards: Option<RewardSpec>,
    pub enabled: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct GymConfigFile {
    #[serde(flatten)]
    pub settings: GymSettings,
    pub gyms: BTreeMap<String, GymEntryRecord>,
}

impl GymConfigFile {
    /// Validate and fill defaults. Never fails; problems come back as warnings.
    pub fn into_config(self, now: DateTime<Utc>) -> (GymConfig, Vec<LoadWarning>) {
        let mut warnings = Vec::new();
        let mut gyms = BTreeMap::new();
        let mut settings = self.settings;

        if parse_zone(&settings.operational_time_zone).is_none() {
            warnings.push(LoadWarning::UnknownTimeZone(settings.operational_time_zone));
            settings.operational_time_zone = DEFAULT_OPERATIONAL_ZONE.name().to_string();
        }

        for (key, record) in self.gyms {
            let Some(gym) = GymType::from_id(&key) else {
                warnings.push(LoadWarning::UnknownGym(key));
                continue;
            };
            let defaults = GymEntry::default_for(gym);

            let leader = match (record.current_leader_uuid, record.current_leader) {
                (Some(id), Some(name)) if !id.is_empty() && !name.is_empty() => {
                    let since = match record.leader_start_date.as_deref() {
                        Some(raw) => parse_timestamp(raw).unwrap_or_else(|| {
                            warnings.push(LoadWarning::InvalidTimestamp {
                                context: format!("leaderStartDate of '{}'", gym),
                                value: raw.to_string(),
                            });
                            now
                        }),
                        None => now,
                    };
                    Some(LeaderAssignment {
                        player_id: PlayerId(id),
                        player_name: name,
                        since,
                    })
                }
                (None, None) => None,
                (Some(id), Some(name)) if id.is_empty() && name.is_empty() => None,
                _ => {
                    warnings.push(LoadWarning::PartialLeader(gym));
                    None
                }
            };

            let entry = GymEntry {
                display_name: record
                    .display_name
                    .filter(|name| !name.is_empty())
                    .unwrap_or(defaults.display_name),
                leader_registered: record.leader_registered && leader.is_some(),
                leader,
                enabled: record.enabled.unwrap_or(defaults.enabled),
                rewards: record.rewards.unwrap_or(defaults.rewards),
                battle_format: record.battle_format.unwrap_or_default(),
            };
            gyms.insert(gym, entry);
        }

        for gym in GymType::all() {
            if !gyms.contains_key(&gym) {
                warnings.push(LoadWarning::MissingGym(gym));
                gyms.insert(gym, GymEntry::default_for(gym));
            }
        }

        (
            GymConfig {
                settings,
                gyms,
            },
            warnings,
        )
    }
}

impl From<&GymConfig> for GymConfigFile {
    fn from(config: &GymConfig) -> Self {
        let gyms = config
            .gyms
            .iter()
            .map(|(gym, entry)| {
                let record = GymEntryRecord {
                    display_name: Some(entry.display_name.clone()),
                    current_leader: entry.leader.as_ref().map(|l| l.player_name.clone()),
                    current_leader_uuid: entry.leader.as_ref().map(|l| l.player_id.0.clone()),
                    leader_start_date: entry.leader.as_ref().map(|l| l.since.to_rfc3339()),
                    leader_registered: entry.leader_registered,
                    battle_format: Some(entry.battle_format),
                    rewards: Some(entry.rewards.clone()),
                    enabled: Some(entry.enabled),
                };
                (gym.id().to_string(), record)
            })
            .collect();

        GymConfigFile {
            settings: config.settings.clone(),
            gyms,
        }
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
