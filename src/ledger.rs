//! Battle ledger: battle records, player statistics, the monthly claim index
//! and the leader battle counter.
//!
//! The ledger is the single source of truth for "has this player already been
//! rewarded this month for this gym". [`BattleLedger::finish`] performs the
//! whole check, grant and record sequence while the caller holds the state
//! lock, so re-delivered or concurrent resolutions cannot grant twice.

use crate::calendar::MonthKey;
use crate::config::{parse_timestamp, LoadWarning};
use crate::correlator::ResolvedOutcome;
use crate::rewards::GrantReport;
use crate::teams::{LeaderTeamEntry, LeaderTeams};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use schema::{BattleResult, GymType, PlayerId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// One resolved gym battle. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BattleRecord {
    pub id: String,
    pub challenger_id: PlayerId,
    pub challenger_name: String,
    pub leader_id: PlayerId,
    pub leader_name: String,
    pub gym: GymType,
    pub timestamp: DateTime<Utc>,
    pub result: BattleResult,
    pub rewards_claimed: bool,
}

impl BattleRecord {
    pub fn involves(&self, player: &PlayerId) -> bool {
        self.challenger_id == *player || self.leader_id == *player
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerGymStats {
    pub total_battles: u32,
    pub wins: u32,
    pub losses: u32,
    pub badges_earned: BTreeSet<GymType>,
    pub battles_as_leader: u32,
    pub wins_as_leader: u32,
}

impl PlayerGymStats {
    /// Challenger win rate in percent.
    pub fn win_rate(&self) -> f64 {
        percent(self.wins, self.total_battles)
    }

    /// Leader defence rate in percent.
    pub fn leader_win_rate(&self) -> f64 {
        percent(self.wins_as_leader, self.battles_as_leader)
    }
}

fn percent(part: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// The world document held in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldData {
    pub battles: Vec<BattleRecord>,
    pub claims: BTreeMap<MonthKey, BTreeMap<GymType, BTreeSet<PlayerId>>>,
    pub leader_battles: BTreeMap<MonthKey, BTreeMap<PlayerId, u32>>,
    pub stats: BTreeMap<PlayerId, PlayerGymStats>,
    pub teams: LeaderTeams,
}

/// What happened to the reward side of a finished battle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Not a challenger win
    NotApplicable,
    Granted(GrantReport),
    AlreadyClaimed,
    /// The challenger was offline when the battle resolved
    ChallengerUnavailable,
    /// The gym has no reward configured
    NothingConfigured,
    /// Every stack failed to reach the player
    DeliveryFailed(GrantReport),
}

impl ClaimOutcome {
    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimOutcome::Granted(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedBattle {
    pub record: BattleRecord,
    pub claim: ClaimOutcome,
    pub month: MonthKey,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub months_removed: usize,
    pub battles_removed: usize,
}

#[derive(Debug, Default)]
pub struct BattleLedger {
    data: WorldData,
}

impl BattleLedger {
    pub fn new(data: WorldData) -> Self {
        BattleLedger { data }
    }

    pub fn data(&self) -> &WorldData {
        &self.data
    }

    pub fn teams(&self) -> &LeaderTeams {
        &self.data.teams
    }

    pub fn teams_mut(&mut self) -> &mut LeaderTeams {
        &mut self.data.teams
    }

    /// Record a resolved battle and, for a challenger win, run the monthly claim.
    ///
    /// `grant` performs the actual item delivery and returns `None` when the
    /// challenger cannot receive anything. It is only called when the
    /// `(month, gym, challenger)` claim is still open.
    pub fn finish<F>(
        &mut self,
        outcome: &ResolvedOutcome,
        now: DateTime<Utc>,
        zone: Tz,
        grant: F,
    ) -> FinishedBattle
    where
        F: FnOnce() -> Option<GrantReport>,
    {
        let month = MonthKey::containing(now, zone);
        let battle = &outcome.battle;

        let claim = if outcome.result == BattleResult::ChallengerWin {
            if self.has_claimed(&battle.challenger_id, battle.gym, month) {
                ClaimOutcome::AlreadyClaimed
            } else {
                match grant() {
                    None => ClaimOutcome::ChallengerUnavailable,
                    Some(report) if report.deliveries.is_empty() => {
                        ClaimOutcome::NothingConfigured
                    }
                    Some(report) if report.any_delivered() => {
                        self.mark_claimed(&battle.challenger_id, battle.gym, month);
                        self.stats_mut(&battle.challenger_id)
                            .badges_earned
                            .insert(battle.gym);
                        ClaimOutcome::Granted(report)
                    }
                    Some(report) => ClaimOutcome::DeliveryFailed(report),
                }
            }
        } else {
            ClaimOutcome::NotApplicable
        };

        let record = BattleRecord {
            id: new_record_id(),
            challenger_id: battle.challenger_id.clone(),
            challenger_name: battle.challenger_name.clone(),
            leader_id: battle.leader_id.clone(),
            leader_name: battle.leader_name.clone(),
            gym: battle.gym,
            timestamp: now,
            result: outcome.result,
            rewards_claimed: claim.is_claimed(),
        };

        let challenger = self.stats_mut(&record.challenger_id);
        challenger.total_battles += 1;
        match record.result {
            BattleResult::ChallengerWin => challenger.wins += 1,
            BattleResult::LeaderWin => challenger.losses += 1,
            BattleResult::Draw | BattleResult::Cancelled => {}
        }
        let leader = self.stats_mut(&record.leader_id);
        leader.battles_as_leader += 1;
        if record.result == BattleResult::LeaderWin {
            leader.wins_as_leader += 1;
        }

        *self
            .data
            .leader_battles
            .entry(month)
            .or_default()
            .entry(record.leader_id.clone())
            .or_insert(0) += 1;

        self.data.battles.push(record.clone());

        info!(
            record = %record.id,
            gym = %record.gym,
            challenger = %record.challenger_name,
            leader = %record.leader_name,
            result = %record.result,
            rewards_claimed = record.rewards_claimed,
            "Gym battle recorded"
        );

        FinishedBattle {
            record,
            claim,
            month,
        }
    }

    pub fn has_claimed(&self, player: &PlayerId, gym: GymType, month: MonthKey) -> bool {
        self.data
            .claims
            .get(&month)
            .and_then(|gyms| gyms.get(&gym))
            .is_some_and(|players| players.contains(player))
    }

    fn mark_claimed(&mut self, player: &PlayerId, gym: GymType, month: MonthKey) {
        self.data
            .claims
            .entry(month)
            .or_default()
            .entry(gym)
            .or_default()
            .insert(player.clone());
    }

    pub fn leader_battles_in(&self, month: MonthKey, leader: &PlayerId) -> u32 {
        self.data
            .leader_battles
            .get(&month)
            .and_then(|leaders| leaders.get(leader))
            .copied()
            .unwrap_or(0)
    }

    /// Stats for `player`; all zero when they never fought a gym battle.
    pub fn player_stats(&self, player: &PlayerId) -> PlayerGymStats {
        self.data.stats.get(player).cloned().unwrap_or_default()
    }

    pub fn has_badge(&self, player: &PlayerId, gym: GymType) -> bool {
        self.data
            .stats
            .get(player)
            .is_some_and(|stats| stats.badges_earned.contains(&gym))
    }

    pub fn battles_for<'a>(&'a self, player: &'a PlayerId) -> impl Iterator<Item = &'a BattleRecord> {
        self.data.battles.iter().filter(move |record| record.involves(player))
    }

    /// Up to `n` most recent records, newest first.
    pub fn recent_battles(&self, n: usize) -> Vec<&BattleRecord> {
        self.data.battles.iter().rev().take(n).collect()
    }

    pub fn reset_player_stats(&mut self, player: &PlayerId) -> bool {
        let removed = self.data.stats.remove(player).is_some();
        info!(player = %player, removed, "Reset gym stats for player");
        removed
    }

    pub fn reset_all_player_stats(&mut self) {
        let count = self.data.stats.len();
        self.data.stats.clear();
        info!(count, "Reset gym stats for all players");
    }

    /// Drop claim and counter months before the cutoff month, and records
    /// older than the cutoff month's first instant. Stats are kept.
    pub fn cleanup(
        &mut self,
        keep_months: u32,
        now: DateTime<Utc>,
        zone: Tz,
    ) -> CleanupReport {
        let cutoff = MonthKey::containing(now, zone).minus_months(keep_months);

        let before = self.data.claims.len() + self.data.leader_battles.len();
        self.data.claims.retain(|month, _| *month >= cutoff);
        self.data.leader_battles.retain(|month, _| *month >= cutoff);
        let months_removed = before - self.data.claims.len() - self.data.leader_battles.len();

        let battles_removed = match cutoff.start(zone) {
            Some(cutoff_instant) => {
                let before = self.data.battles.len();
                self.data
                    .battles
                    .retain(|record| record.timestamp >= cutoff_instant);
                before - self.data.battles.len()
            }
            None => 0,
        };

        debug!(%cutoff, months_removed, battles_removed, "Ledger cleanup");
        CleanupReport {
            months_removed,
            battles_removed,
        }
    }

    fn stats_mut(&mut self, player: &PlayerId) -> &mut PlayerGymStats {
        self.data.stats.entry(player.clone()).or_default()
    }
}

fn new_record_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

// --- On-disk schema ---

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct BattleRecordEntry {
    pub id: String,
    #[serde(rename = "challengerUUID")]
    pub challenger_uuid: String,
    pub challenger_name: String,
    #[serde(rename = "leaderUUID")]
    pub leader_uuid: String,
    pub leader_name: String,
    pub gym_type: String,
    pub timestamp: String,
    pub result: Option<BattleResult>,
    pub rewards_claimed: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayerStatsEntry {
    pub total_battles: u32,
    pub wins: u32,
    pub losses: u32,
    pub badges_earned: Vec<String>,
    pub battles_as_leader: u32,
    pub wins_as_leader: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct WorldDataFile {
    pub battles: Vec<BattleRecordEntry>,
    pub monthly_rewards_claimed: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    pub leader_battles_per_month: BTreeMap<String, BTreeMap<String, u32>>,
    pub player_stats: BTreeMap<String, PlayerStatsEntry>,
    pub leader_teams: BTreeMap<String, LeaderTeamEntry>,
}

impl WorldDataFile {
    /// Convert to the in-memory form. Entries that cannot be interpreted are
    /// skipped and reported.
    pub fn into_data(self) -> (WorldData, Vec<LoadWarning>) {
        let mut warnings = Vec::new();
        let mut data = WorldData::default();

        for entry in self.battles {
            let Some(gym) = GymType::from_id(&entry.gym_type) else {
                warnings.push(LoadWarning::UnknownGym(entry.gym_type));
                continue;
            };
            let Some(timestamp) = parse_timestamp(&entry.timestamp) else {
                warnings.push(LoadWarning::InvalidTimestamp {
                    context: format!("battle record '{}'", entry.id),
                    value: entry.timestamp,
                });
                continue;
            };
            data.battles.push(BattleRecord {
                id: if entry.id.is_empty() {
                    new_record_id()
                } else {
                    entry.id
                },
                challenger_id: PlayerId(entry.challenger_uuid),
                challenger_name: entry.challenger_name,
                leader_id: PlayerId(entry.leader_uuid),
                leader_name: entry.leader_name,
                gym,
                timestamp,
                result: entry.result.unwrap_or(BattleResult::Cancelled),
                rewards_claimed: entry.rewards_claimed,
            });
        }

        for (month, gyms) in self.monthly_rewards_claimed {
            let Ok(key) = month.parse::<MonthKey>() else {
                warnings.push(LoadWarning::InvalidMonth(month));
                continue;
            };
            for (gym, players) in gyms {
                let Some(gym_type) = GymType::from_id(&gym) else {
                    warnings.push(LoadWarning::UnknownGym(gym));
                    continue;
                };
                data.claims
                    .entry(key)
                    .or_default()
                    .entry(gym_type)
                    .or_default()
                    .extend(players.into_iter().map(PlayerId));
            }
        }

        for (month, leaders) in self.leader_battles_per_month {
            let Ok(key) = month.parse::<MonthKey>() else {
                warnings.push(LoadWarning::InvalidMonth(month));
                continue;
            };
            let counters = data.leader_battles.entry(key).or_default();
            for (leader, count) in leaders {
                counters.insert(PlayerId(leader), count);
            }
        }

        for (player, entry) in self.player_stats {
            if player.is_empty() {
                warnings.push(LoadWarning::UnknownPlayerKey(player));
                continue;
            }
            let mut badges_earned = BTreeSet::new();
            for badge in entry.badges_earned {
                match GymType::from_id(&badge) {
                    Some(gym) => {
                        badges_earned.insert(gym);
                    }
                    None => warnings.push(LoadWarning::UnknownGym(badge)),
                }
            }
            data.stats.insert(
                PlayerId(player),
                PlayerGymStats {
                    total_battles: entry.total_battles,
                    wins: entry.wins,
                    losses: entry.losses,
                    badges_earned,
                    battles_as_leader: entry.battles_as_leader,
                    wins_as_leader: entry.wins_as_leader,
                },
            );
        }

        data.teams = LeaderTeams::from_entries(self.leader_teams, &mut warnings);

        (data, warnings)
    }
}

impl From<&WorldData> for WorldDataFile {
    fn from(data: &WorldData) -> Self {
        WorldDataFile {
            battles: data
                .battles
                .iter()
                .map(|record| BattleRecordEntry {
                    id: record.id.clone(),
                    challenger_uuid: record.challenger_id.0.clone(),
                    challenger_name: record.challenger_name.clone(),
                    leader_uuid: record.leader_id.0.clone(),
                    leader_name: record.leader_name.clone(),
                    gym_type: record.gym.id().to_string(),
                    timestamp: record.timestamp.to_rfc3339(),
                    result: Some(record.result),
                    rewards_claimed: record.rewards_claimed,
                })
                .collect(),
            monthly_rewards_claimed: data
                .claims
                .iter()
                .map(|(month, gyms)| {
                    let gyms = gyms
                        .iter()
                        .map(|(gym, players)| {
                            (
                                gym.id().to_string(),
                                players.iter().map(|p| p.0.clone()).collect(),
                            )
                        })
                        .collect();
                    (month.to_string(), gyms)
                })
                .collect(),
            leader_battles_per_month: data
                .leader_battles
                .iter()
                .map(|(month, leaders)| {
                    let leaders = leaders
                        .iter()
                        .map(|(leader, count)| (leader.0.clone(), *count))
                        .collect();
                    (month.to_string(), leaders)
                })
                .collect(),
            player_stats: data
                .stats
                .iter()
                .map(|(player, stats)| {
                    (
                        player.0.clone(),
                        PlayerStatsEntry {
                            total_battles: stats.total_battles,
                            wins: stats.wins,
                            losses: stats.losses,
                            badges_earned: stats
                                .badges_earned
                                .iter()
                                .map(|gym| gym.id().to_string())
                                .collect(),
                            battles_as_leader: stats.battles_as_leader,
                            wins_as_leader: stats.wins_as_leader,
                        },
                    )
                })
                .collect(),
            leader_teams: data.teams.to_entries(),
        }
    }
}
