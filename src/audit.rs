//! Human-readable, append-only audit trail for operators.
//!
//! Two logs: leader history, and one battle log per month. Lines are rendered
//! here and handed to the persistence writer; the core never reads them back.

use crate::calendar::MonthKey;
use crate::config::LeaderAssignment;
use crate::ledger::BattleRecord;
use crate::rewards::{DeliveryOutcome, GrantReport};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use schema::{presentation, GymType};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Which file an audit line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditLog {
    LeaderHistory,
    Battles(MonthKey),
}

/// Rendered lines ready to append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub log: AuditLog,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum AuditEvent {
    LeaderSet {
        gym: GymType,
        leader: LeaderAssignment,
        by: String,
    },
    LeaderChanged {
        gym: GymType,
        previous: LeaderAssignment,
        leader: LeaderAssignment,
        by: String,
    },
    LeaderRemoved {
        gym: GymType,
        previous: LeaderAssignment,
        by: String,
        reason: String,
    },
    Battle(BattleRecord),
    RewardsGiven {
        player_name: String,
        gym: GymType,
        report: GrantReport,
    },
    RewardDeliveryFailed {
        player_name: String,
        gym: GymType,
        reason: String,
    },
}

impl AuditEvent {
    /// Timestamps and the monthly battle log follow the operational zone.
    pub fn render(&self, at: DateTime<Utc>, zone: Tz) -> AuditEntry {
        let ts = at.with_timezone(&zone).format(TIMESTAMP_FORMAT);
        let battles = AuditLog::Battles(MonthKey::containing(at, zone));

        match self {
            AuditEvent::LeaderSet { gym, leader, by } => AuditEntry {
                log: AuditLog::LeaderHistory,
                lines: vec![format!(
                    "[{}] SET {} Leader: {} (UUID: {}) by {}",
                    ts,
                    label(*gym),
                    leader.player_name,
                    leader.player_id,
                    by
                )],
            },
            AuditEvent::LeaderChanged {
                gym,
                previous,
                leader,
                by,
            } => AuditEntry {
                log: AuditLog::LeaderHistory,
                lines: vec![
                    format!(
                        "[{}] CHANGED {} Leader: {} -> {} (by {})",
                        ts,
                        label(*gym),
                        previous.player_name,
                        leader.player_name,
                        by
                    ),
                    format!(
                        "         Old: {} (UUID: {}) | New: {} (UUID: {})",
                        previous.player_name,
                        previous.player_id,
                        leader.player_name,
                        leader.player_id
                    ),
                ],
            },
            AuditEvent::LeaderRemoved {
                gym,
                previous,
                by,
                reason,
            } => AuditEntry {
                log: AuditLog::LeaderHistory,
                lines: vec![format!(
                    "[{}] REMOVED {} Leader: {} (UUID: {}) by {} - Reason: {}",
                    ts,
                    label(*gym),
                    previous.player_name,
                    previous.player_id,
                    by,
                    reason
                )],
            },
            AuditEvent::Battle(record) => AuditEntry {
                log: battles,
                lines: vec![format!(
                    "[{}] {} Gym | {} (Challenger) vs {} (Leader) -> {}{}",
                    ts,
                    record.gym.id().to_uppercase(),
                    record.challenger_name,
                    record.leader_name,
                    record.result,
                    if record.rewards_claimed {
                        " [Rewards Claimed]"
                    } else {
                        ""
                    }
                )],
            },
            AuditEvent::RewardsGiven {
                player_name,
                gym,
                report,
            } => {
                let items: Vec<String> = report
                    .deliveries
                    .iter()
                    .filter_map(|d| match d.outcome {
                        DeliveryOutcome::AddedToInventory => Some(d.stack.to_string()),
                        DeliveryOutcome::PlacedNearby => Some(format!("{} (dropped)", d.stack)),
                        DeliveryOutcome::Failed(_) => None,
                    })
                    .collect();
                AuditEntry {
                    log: battles,
                    lines: vec![format!(
                        "[{}] REWARDS {} Gym | Player: {} | {}",
                        ts,
                        label(*gym),
                        player_name,
                        items.join(", ")
                    )],
                }
            }
            AuditEvent::RewardDeliveryFailed {
                player_name,
                gym,
                reason,
            } => AuditEntry {
                log: battles,
                lines: vec![format!(
                    "[{}] REWARD FAILED {} Gym | Player: {} | {}",
                    ts,
                    label(*gym),
                    player_name,
                    reason
                )],
            },
        }
    }
}

fn label(gym: GymType) -> &'static str {
    presentation(gym).label
}

/// Last `n` lines of `text`, oldest first.
pub fn tail(text: &str, n: usize) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].iter().map(|line| line.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::DEFAULT_OPERATIONAL_ZONE;
    use crate::config::parse_timestamp;
    use crate::rewards::StackDelivery;
    use pretty_assertions::assert_eq;
    use schema::{BattleResult, ItemStack, PlayerId};

    fn at() -> DateTime<Utc> {
        parse_timestamp("2026-03-31T23:30:00Z").unwrap()
    }

    fn leader(name: &str) -> LeaderAssignment {
        LeaderAssignment {
            player_id: PlayerId::from(format!("id-{}", name.to_lowercase())),
            player_name: name.to_string(),
            since: at(),
        }
    }

    #[test]
    fn test_leader_change_renders_detail_line() {
        let event = AuditEvent::LeaderChanged {
            gym: GymType::Rock,
            previous: leader("Brock"),
            leader: leader("Flint"),
            by: "admin".to_string(),
        };
        let entry = event.render(at(), DEFAULT_OPERATIONAL_ZONE);

        assert_eq!(entry.log, AuditLog::LeaderHistory);
        assert_eq!(
            entry.lines,
            vec![
                "[2026-04-01 01:30:00] CHANGED Rock Leader: Brock -> Flint (by admin)".to_string(),
                "         Old: Brock (UUID: id-brock) | New: Flint (UUID: id-flint)".to_string(),
            ]
        );
    }

    #[test]
    fn test_battle_line_goes_to_operational_month() {
        let record = BattleRecord {
            id: "r1".to_string(),
            challenger_id: PlayerId::from("ash"),
            challenger_name: "Ash".to_string(),
            leader_id: PlayerId::from("bugsy"),
            leader_name: "Bugsy".to_string(),
            gym: GymType::Bug,
            timestamp: at(),
            result: BattleResult::ChallengerWin,
            rewards_claimed: true,
        };
        let entry = AuditEvent::Battle(record).render(at(), DEFAULT_OPERATIONAL_ZONE);

        assert_eq!(entry.log, AuditLog::Battles("2026-04".parse().unwrap()));
        assert_eq!(
            entry.lines[0],
            "[2026-04-01 01:30:00] BUG Gym | Ash (Challenger) vs Bugsy (Leader) -> CHALLENGER WIN [Rewards Claimed]"
        );
    }

    #[test]
    fn test_rewards_line_lists_delivered_items() {
        let report = GrantReport {
            deliveries: vec![
                StackDelivery {
                    stack: ItemStack::new("gym_league:badge_bug", 1),
                    outcome: DeliveryOutcome::AddedToInventory,
                },
                StackDelivery {
                    stack: ItemStack::new("gym_league:silver_coin", 3),
                    outcome: DeliveryOutcome::PlacedNearby,
                },
            ],
        };
        let entry = AuditEvent::RewardsGiven {
            player_name: "Ash".to_string(),
            gym: GymType::Bug,
            report,
        }
        .render(at(), chrono_tz::UTC);

        assert_eq!(
            entry.lines[0],
            "[2026-03-31 23:30:00] REWARDS Bug Gym | Player: Ash | 1x gym_league:badge_bug, 3x gym_league:silver_coin (dropped)"
        );
    }

    #[test]
    fn test_tail_keeps_last_lines() {
        assert_eq!(tail("a\nb\nc\n", 2), vec!["b".to_string(), "c".to_string()]);
        assert_eq!(tail("a", 5), vec!["a".to_string()]);
        assert!(tail("", 3).is_empty());
    }
}
