//! Registered leader teams and the battle rules of each gym.
//!
//! A new leader first registers the roster they will defend with, then picks
//! a battle format and level cap. Either can only be changed again once
//! `teamChangeIntervalDays` have passed since the last change; admins can
//! reset both timers. Teams are stored in the world document, keyed by gym.

use crate::config::{parse_timestamp, LoadWarning};
use crate::errors::{LeaderError, LeaderResult};
use crate::registry::GymRegistry;
use chrono::{DateTime, Duration, Utc};
use schema::{BattleFormat, GymType, PlayerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

pub const DEFAULT_LEVEL_CAP: u32 = 50;

/// Level caps a gym can be fought at.
pub const LEVEL_CAPS: [u32; 2] = [50, 100];

/// One creature of a registered roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamMember {
    pub species: String,
    /// Empty for the species' default form
    pub form: String,
    pub level: u32,
    pub member_id: String,
}

impl TeamMember {
    pub fn new(species: &str, level: u32, member_id: &str) -> Self {
        TeamMember {
            species: species.to_lowercase(),
            form: String::new(),
            level,
            member_id: member_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderTeam {
    pub leader_id: PlayerId,
    pub leader_name: String,
    /// `None` until the leader sets rules
    pub battle_format: Option<BattleFormat>,
    pub level_cap: u32,
    pub last_team_change: Option<DateTime<Utc>>,
    pub last_rules_change: Option<DateTime<Utc>>,
    pub members: Vec<TeamMember>,
}

/// The rules a gym battle is fought under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GymRules {
    pub format: BattleFormat,
    pub level_cap: u32,
}

impl LeaderTeam {
    fn new(leader_id: &PlayerId, leader_name: &str) -> Self {
        LeaderTeam {
            leader_id: leader_id.clone(),
            leader_name: leader_name.to_string(),
            battle_format: None,
            level_cap: DEFAULT_LEVEL_CAP,
            last_team_change: None,
            last_rules_change: None,
            members: Vec::new(),
        }
    }

    /// First instant the roster may change again; `None` when it may change now.
    pub fn next_team_change(&self, interval_days: u32) -> Option<DateTime<Utc>> {
        cooldown_end(self.last_team_change, interval_days)
    }

    /// First instant the rules may change again. Setting rules for the first
    /// time is never blocked.
    pub fn next_rules_change(&self, interval_days: u32) -> Option<DateTime<Utc>> {
        self.battle_format?;
        cooldown_end(self.last_rules_change, interval_days)
    }

    /// Rules once set; `default_format` otherwise.
    pub fn rules(&self, default_format: BattleFormat) -> GymRules {
        GymRules {
            format: self.battle_format.unwrap_or(default_format),
            level_cap: self.level_cap,
        }
    }
}

fn cooldown_end(last: Option<DateTime<Utc>>, interval_days: u32) -> Option<DateTime<Utc>> {
    if interval_days == 0 {
        return None;
    }
    last.map(|at| at + Duration::days(i64::from(interval_days)))
}

/// `true` unless `next` lies after `now`.
pub fn change_allowed(next: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    next.map_or(true, |at| now >= at)
}

pub fn validate_level_cap(level_cap: u32) -> LeaderResult<()> {
    if LEVEL_CAPS.contains(&level_cap) {
        Ok(())
    } else {
        Err(LeaderError::InvalidLevelCap(level_cap))
    }
}

/// Who is changing the rules. Admins skip the leader and cooldown checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RulesAuthority<'a> {
    Leader(&'a PlayerId),
    Admin,
}

/// Every gym's registered team.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaderTeams {
    teams: BTreeMap<GymType, LeaderTeam>,
}

impl LeaderTeams {
    pub fn get(&self, gym: GymType) -> Option<&LeaderTeam> {
        self.teams.get(&gym)
    }

    pub fn iter(&self) -> impl Iterator<Item = (GymType, &LeaderTeam)> {
        self.teams.iter().map(|(gym, team)| (*gym, team))
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    /// Store `members` as the current leader's roster and mark the gym
    /// registered.
    ///
    /// A registered leader is held to the team cooldown. Rules are cleared
    /// when the roster belongs to a new leader or the leader was unregistered,
    /// so the rules have to be picked again.
    pub fn register(
        &mut self,
        registry: &mut GymRegistry,
        gym: GymType,
        leader_id: &PlayerId,
        leader_name: &str,
        members: Vec<TeamMember>,
        now: DateTime<Utc>,
    ) -> LeaderResult<&LeaderTeam> {
        let interval = registry.settings().team_change_interval_days;
        let entry = registry.entry(gym);
        let is_leader = entry
            .leader
            .as_ref()
            .is_some_and(|leader| leader.player_id == *leader_id);
        if !is_leader {
            return Err(LeaderError::NotLeader { gym });
        }

        let was_registered = entry.leader_registered;
        if was_registered {
            match self.get(gym).and_then(|team| team.next_team_change(interval)) {
                Some(available_at) if now < available_at => {
                    return Err(LeaderError::TeamChangeOnCooldown { gym, available_at });
                }
                _ => {}
            }
        }
        if members.is_empty() {
            return Err(LeaderError::EmptyTeam);
        }

        registry.mark_leader_registered(gym, true)?;

        let team = self
            .teams
            .entry(gym)
            .or_insert_with(|| LeaderTeam::new(leader_id, leader_name));
        if team.leader_id != *leader_id || !was_registered {
            team.battle_format = None;
            team.last_rules_change = None;
        }
        team.leader_id = leader_id.clone();
        team.leader_name = leader_name.to_string();
        team.members = members;
        team.last_team_change = Some(now);

        info!(gym = %gym, leader = leader_name, members = team.members.len(), "Leader team registered");
        Ok(team)
    }

    /// Set the format and level cap of a registered gym.
    pub fn set_rules(
        &mut self,
        registry: &GymRegistry,
        gym: GymType,
        by: RulesAuthority<'_>,
        format: BattleFormat,
        level_cap: u32,
        now: DateTime<Utc>,
    ) -> LeaderResult<GymRules> {
        if let RulesAuthority::Leader(player) = by {
            let is_leader = registry
                .leader_of(gym)
                .is_some_and(|leader| leader.player_id == *player);
            if !is_leader {
                return Err(LeaderError::NotLeader { gym });
            }
        }
        validate_level_cap(level_cap)?;

        let interval = registry.settings().team_change_interval_days;
        let team = self
            .teams
            .get_mut(&gym)
            .ok_or(LeaderError::NoTeamRegistered { gym })?;
        if let RulesAuthority::Leader(_) = by {
            match team.next_rules_change(interval) {
                Some(available_at) if now < available_at => {
                    return Err(LeaderError::RulesChangeOnCooldown { gym, available_at });
                }
                _ => {}
            }
        }

        team.battle_format = Some(format);
        team.level_cap = level_cap;
        team.last_rules_change = Some(now);
        info!(gym = %gym, format = ?format, level_cap, "Gym rules updated");
        Ok(team.rules(format))
    }

    /// Clear the roster and its timer. The leader must register again.
    pub fn reset_team(&mut self, registry: &mut GymRegistry, gym: GymType) -> bool {
        let Some(team) = self.teams.get_mut(&gym) else {
            return false;
        };
        team.members.clear();
        team.last_team_change = None;
        registry.entry_mut(gym).leader_registered = false;
        info!(gym = %gym, "Leader team reset");
        true
    }

    /// Clear the rules timer so the leader can change rules immediately.
    pub fn reset_rules_timer(&mut self, gym: GymType) -> bool {
        match self.teams.get_mut(&gym) {
            Some(team) => {
                team.last_rules_change = None;
                info!(gym = %gym, "Gym rules timer reset");
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, gym: GymType) -> Option<LeaderTeam> {
        self.teams.remove(&gym)
    }
}

// --- On-disk schema ---

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct TeamMemberEntry {
    pub species: String,
    pub form: String,
    pub level: u32,
    #[serde(rename = "pokemonUUID")]
    pub member_uuid: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default, rename_all = "camelCase")]
pub struct LeaderTeamEntry {
    #[serde(rename = "leaderUUID")]
    pub leader_uuid: String,
    pub leader_name: String,
    pub battle_format: Option<BattleFormat>,
    pub level_cap: u32,
    pub last_team_change: Option<String>,
    pub last_rules_change: Option<String>,
    pub team: Vec<TeamMemberEntry>,
}

impl Default for LeaderTeamEntry {
    fn default() -> Self {
        LeaderTeamEntry {
            leader_uuid: String::new(),
            leader_name: String::new(),
            battle_format: None,
            level_cap: DEFAULT_LEVEL_CAP,
            last_team_change: None,
            last_rules_change: None,
            team: Vec::new(),
        }
    }
}

impl LeaderTeams {
    /// Load the `leaderTeams` section. Unknown gyms are skipped; bad
    /// timestamps clear the timer they belong to.
    pub fn from_entries(
        entries: BTreeMap<String, LeaderTeamEntry>,
        warnings: &mut Vec<LoadWarning>,
    ) -> Self {
        let mut teams = BTreeMap::new();
        for (key, entry) in entries {
            let Some(gym) = GymType::from_id(&key) else {
                warnings.push(LoadWarning::UnknownGym(key));
                continue;
            };
            if entry.leader_uuid.is_empty() {
                warnings.push(LoadWarning::UnknownPlayerKey(format!("leaderTeams.{}", gym)));
                continue;
            }
            let mut timestamp = |raw: Option<String>, field: &str| {
                let raw = raw?;
                parse_timestamp(&raw).or_else(|| {
                    warnings.push(LoadWarning::InvalidTimestamp {
                        context: format!("{} of the {} team", field, gym),
                        value: raw,
                    });
                    None
                })
            };
            let team = LeaderTeam {
                last_team_change: timestamp(entry.last_team_change, "lastTeamChange"),
                last_rules_change: timestamp(entry.last_rules_change, "lastRulesChange"),
                leader_id: PlayerId(entry.leader_uuid),
                leader_name: entry.leader_name,
                battle_format: entry.battle_format,
                level_cap: if LEVEL_CAPS.contains(&entry.level_cap) {
                    entry.level_cap
                } else {
                    DEFAULT_LEVEL_CAP
                },
                members: entry
                    .team
                    .into_iter()
                    .map(|member| TeamMember {
                        species: member.species,
                        form: member.form,
                        level: member.level,
                        member_id: member.member_uuid,
                    })
                    .collect(),
            };
            teams.insert(gym, team);
        }
        LeaderTeams { teams }
    }

    pub fn to_entries(&self) -> BTreeMap<String, LeaderTeamEntry> {
        self.teams
            .iter()
            .map(|(gym, team)| {
                let entry = LeaderTeamEntry {
                    leader_uuid: team.leader_id.0.clone(),
                    leader_name: team.leader_name.clone(),
                    battle_format: team.battle_format,
                    level_cap: team.level_cap,
                    last_team_change: team.last_team_change.map(|at| at.to_rfc3339()),
                    last_rules_change: team.last_rules_change.map(|at| at.to_rfc3339()),
                    team: team
                        .members
                        .iter()
                        .map(|member| TeamMemberEntry {
                            species: member.species.clone(),
                            form: member.form.clone(),
                            level: member.level,
                            member_uuid: member.member_id.clone(),
                        })
                        .collect(),
                };
                (gym.id().to_string(), entry)
            })
            .collect()
    }
}
