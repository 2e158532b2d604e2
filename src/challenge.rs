//! Challenge proposals: one pending proposal per challenger and per leader,
//! proximity and availability checks, and timeout expiry.

use crate::correlator::{BattleCorrelator, PairKey};
use crate::errors::{
    ChallengeError, ChallengeResult, MeasuredDistance, PendingConflict, Unavailability,
};
use crate::ports::{Outbox, PlayerDirectory};
use crate::registry::GymRegistry;
use chrono::{DateTime, Duration, Utc};
use schema::{presentation, GymType, PlayerId};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChallengeId(pub u64);

impl fmt::Display for ChallengeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChallenge {
    pub id: ChallengeId,
    pub challenger_id: PlayerId,
    pub challenger_name: String,
    pub leader_id: PlayerId,
    pub leader_name: String,
    pub gym: GymType,
    pub created_at: DateTime<Utc>,
}

impl PendingChallenge {
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.created_at > timeout
    }

    pub fn pair(&self) -> PairKey {
        PairKey::new(&self.challenger_id, &self.leader_id)
    }
}

/// Challenge timeout from the configured seconds, clamped to a range chrono accepts.
pub fn challenge_timeout(seconds: u64) -> Duration {
    Duration::seconds(seconds.min(u32::MAX as u64) as i64)
}

/// Holds the pending proposals, keyed by challenger.
#[derive(Debug, Default)]
pub struct ChallengeCoordinator {
    pending: HashMap<PlayerId, PendingChallenge>,
    next_id: u64,
}

impl ChallengeCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a proposal, then queue the leader's notification.
    ///
    /// Validation failures leave the coordinator untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn propose(
        &mut self,
        registry: &GymRegistry,
        players: &dyn PlayerDirectory,
        battles: &BattleCorrelator,
        challenger_id: &PlayerId,
        challenger_name: &str,
        gym: GymType,
        now: DateTime<Utc>,
        outbox: &mut Outbox,
    ) -> ChallengeResult<PendingChallenge> {
        let settings = registry.settings();

        if let Some(reason) = registry.unavailability(gym) {
            return Err(ChallengeError::GymUnavailable { gym, reason });
        }
        let leader = registry
            .leader_of(gym)
            .cloned()
            .ok_or(ChallengeError::GymUnavailable {
                gym,
                reason: Unavailability::NoLeader,
            })?;

        if settings.require_team_registration && !registry.entry(gym).leader_registered {
            return Err(ChallengeError::LeaderNotRegistered { gym });
        }

        if leader.player_id == *challenger_id {
            return Err(ChallengeError::SelfChallenge { gym });
        }

        let Some(leader_name) = players.online_name(&leader.player_id) else {
            return Err(ChallengeError::LeaderOffline {
                leader_name: leader.player_name,
            });
        };

        match players.distance(challenger_id, &leader.player_id) {
            Some(distance) if distance <= settings.challenge_radius => {}
            measured => {
                return Err(ChallengeError::OutOfRange {
                    radius: settings.challenge_radius,
                    distance: MeasuredDistance::from_blocks(measured),
                })
            }
        }

        if self.pending.contains_key(challenger_id) {
            return Err(ChallengeError::AlreadyPending(
                PendingConflict::ChallengerHasPending,
            ));
        }
        if self.pending_for_leader(&leader.player_id).is_some() {
            return Err(ChallengeError::AlreadyPending(
                PendingConflict::LeaderHasPending,
            ));
        }

        if battles
            .session_for_pair(&PairKey::new(challenger_id, &leader.player_id))
            .is_some()
        {
            return Err(ChallengeError::BattleInProgress);
        }

        self.next_id += 1;
        let challenge = PendingChallenge {
            id: ChallengeId(self.next_id),
            challenger_id: challenger_id.clone(),
            challenger_name: challenger_name.to_string(),
            leader_id: leader.player_id.clone(),
            leader_name,
            gym,
            created_at: now,
        };
        self.pending
            .insert(challenger_id.clone(), challenge.clone());

        let title = presentation(gym).gym_title();
        outbox.push(
            &challenge.leader_id,
            format!(
                "{} challenges you to a {} battle! Accept or decline within {} seconds.",
                challenge.challenger_name, title, settings.challenge_timeout_seconds
            ),
        );
        outbox.push(
            &challenge.challenger_id,
            format!("Challenge sent to {} ({}).", challenge.leader_name, title),
        );

        info!(
            challenge = %challenge.id,
            challenger = %challenge.challenger_name,
            leader = %challenge.leader_name,
            gym = %gym,
            "Challenge proposed"
        );
        Ok(challenge)
    }

    /// Take the challenge waiting for `leader` if it can still be accepted.
    ///
    /// Stale challenges (expired, challenger gone, leader no longer in charge)
    /// are removed before the error is returned.
    pub fn accept(
        &mut self,
        registry: &GymRegistry,
        players: &dyn PlayerDirectory,
        leader_id: &PlayerId,
        now: DateTime<Utc>,
        outbox: &mut Outbox,
    ) -> ChallengeResult<PendingChallenge> {
        let settings = registry.settings();
        let timeout = challenge_timeout(settings.challenge_timeout_seconds);

        let challenge = self
            .pending_for_leader(leader_id)
            .cloned()
            .ok_or(ChallengeError::NoPendingChallenge)?;

        if challenge.is_expired(now, timeout) {
            self.pending.remove(&challenge.challenger_id);
            notify_expired(&challenge, outbox);
            return Err(ChallengeError::ChallengeExpired {
                challenger_name: challenge.challenger_name,
            });
        }

        if !players.is_online(&challenge.challenger_id) {
            self.pending.remove(&challenge.challenger_id);
            return Err(ChallengeError::ChallengerGone {
                challenger_name: challenge.challenger_name,
            });
        }

        let still_leader = registry
            .leader_of(challenge.gym)
            .is_some_and(|leader| leader.player_id == *leader_id);
        if !still_leader {
            self.pending.remove(&challenge.challenger_id);
            outbox.push(
                &challenge.challenger_id,
                format!(
                    "Your challenge for the {} was cancelled: the gym has a new leader.",
                    presentation(challenge.gym).gym_title()
                ),
            );
            return Err(ChallengeError::LeaderReassigned { gym: challenge.gym });
        }

        self.pending.remove(&challenge.challenger_id);
        Ok(challenge)
    }

    pub fn decline(
        &mut self,
        leader_id: &PlayerId,
        outbox: &mut Outbox,
    ) -> ChallengeResult<PendingChallenge> {
        let challenge = self
            .take_for_leader(leader_id)
            .ok_or(ChallengeError::NoPendingChallenge)?;
        outbox.push(
            &challenge.challenger_id,
            format!("{} declined your challenge.", challenge.leader_name),
        );
        outbox.push(
            &challenge.leader_id,
            format!("You declined the challenge from {}.", challenge.challenger_name),
        );
        info!(challenge = %challenge.id, gym = %challenge.gym, "Challenge declined");
        Ok(challenge)
    }

    /// The challenger takes back their own proposal.
    pub fn withdraw(
        &mut self,
        challenger_id: &PlayerId,
        outbox: &mut Outbox,
    ) -> ChallengeResult<PendingChallenge> {
        let challenge = self
            .pending
            .remove(challenger_id)
            .ok_or(ChallengeError::NoPendingChallenge)?;
        outbox.push(
            &challenge.leader_id,
            format!("{} withdrew their challenge.", challenge.challenger_name),
        );
        outbox.push(&challenge.challenger_id, "You withdrew your challenge.");
        info!(challenge = %challenge.id, gym = %challenge.gym, "Challenge withdrawn");
        Ok(challenge)
    }

    /// Drop every proposal older than the timeout and notify both sides.
    pub fn sweep_expired(
        &mut self,
        now: DateTime<Utc>,
        timeout: Duration,
        outbox: &mut Outbox,
    ) -> Vec<PendingChallenge> {
        let expired: Vec<PlayerId> = self
            .pending
            .values()
            .filter(|challenge| challenge.is_expired(now, timeout))
            .map(|challenge| challenge.challenger_id.clone())
            .collect();

        let mut removed = Vec::with_capacity(expired.len());
        for challenger in expired {
            if let Some(challenge) = self.pending.remove(&challenger) {
                debug!(challenge = %challenge.id, "Challenge expired");
                notify_expired(&challenge, outbox);
                removed.push(challenge);
            }
        }
        removed
    }

    pub fn pending_for_leader(&self, leader_id: &PlayerId) -> Option<&PendingChallenge> {
        self.pending
            .values()
            .find(|challenge| challenge.leader_id == *leader_id)
    }

    pub fn pending_for_challenger(&self, challenger_id: &PlayerId) -> Option<&PendingChallenge> {
        self.pending.get(challenger_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn take_for_leader(&mut self, leader_id: &PlayerId) -> Option<PendingChallenge> {
        let challenger = self.pending_for_leader(leader_id)?.challenger_id.clone();
        self.pending.remove(&challenger)
    }
}

fn notify_expired(challenge: &PendingChallenge, outbox: &mut Outbox) {
    outbox.push(
        &challenge.challenger_id,
        format!(
            "Your challenge to {} ({}) has expired.",
            challenge.leader_name,
            presentation(challenge.gym).gym_title()
        ),
    );
    outbox.push(
        &challenge.leader_id,
        format!("The challenge from {} has expired.", challenge.challenger_name),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GymConfig;
    use crate::host::SimulatedWorld;
    use pretty_assertions::assert_eq;

    struct Fixture {
        registry: GymRegistry,
        world: SimulatedWorld,
        battles: BattleCorrelator,
        coordinator: ChallengeCoordinator,
        outbox: Outbox,
        now: DateTime<Utc>,
    }

    fn fixture() -> Fixture {
        let mut config = GymConfig::default();
        config.settings.challenge_radius = 50.0;
        let mut registry = GymRegistry::new(config);
        let now = Utc::now();
        registry.set_leader(GymType::Bug, &PlayerId::from("leader"), "Bugsy", now);
        registry.mark_leader_registered(GymType::Bug, true).unwrap();

        let world = SimulatedWorld::new();
        world.join("leader", "Bugsy", "overworld", (0.0, 64.0, 0.0));
        world.join("ash", "Ash", "overworld", (10.0, 64.0, 0.0));
        world.join("gary", "Gary", "overworld", (0.0, 64.0, 10.0));

        Fixture {
            registry,
            world,
            battles: BattleCorrelator::new(),
            coordinator: ChallengeCoordinator::new(),
            outbox: Outbox::new(),
            now,
        }
    }

    impl Fixture {
        fn propose(&mut self, challenger: &str) -> ChallengeResult<PendingChallenge> {
            let name = self
                .world
                .online_name(&PlayerId::from(challenger))
                .unwrap_or_default();
            self.coordinator.propose(
                &self.registry,
                &self.world,
                &self.battles,
                &PlayerId::from(challenger),
                &name,
                GymType::Bug,
                self.now,
                &mut self.outbox,
            )
        }

        fn accept(&mut self, at: DateTime<Utc>) -> ChallengeResult<PendingChallenge> {
            self.coordinator.accept(
                &self.registry,
                &self.world,
                &PlayerId::from("leader"),
                at,
                &mut self.outbox,
            )
        }
    }

    #[test]
    fn test_propose_notifies_leader() {
        let mut fx = fixture();
        let challenge = fx.propose("ash").unwrap();

        assert_eq!(challenge.leader_name, "Bugsy");
        assert_eq!(challenge.id, ChallengeId(1));
        assert!(fx
            .outbox
            .messages()
            .iter()
            .any(|(to, line)| to.as_str() == "leader" && line.contains("Ash challenges you")));
    }

    #[test]
    fn test_second_proposal_from_same_challenger_is_rejected() {
        let mut fx = fixture();
        fx.propose("ash").unwrap();
        assert_eq!(
            fx.propose("ash"),
            Err(ChallengeError::AlreadyPending(
                PendingConflict::ChallengerHasPending
            ))
        );
        assert_eq!(
            fx.propose("gary"),
            Err(ChallengeError::AlreadyPending(PendingConflict::LeaderHasPending))
        );
        assert_eq!(fx.coordinator.len(), 1);
    }

    #[test]
    fn test_leader_cannot_challenge_own_gym() {
        let mut fx = fixture();
        assert_eq!(
            fx.propose("leader"),
            Err(ChallengeError::SelfChallenge { gym: GymType::Bug })
        );
    }

    #[test]
    fn test_out_of_range_and_other_world() {
        let mut fx = fixture();
        fx.world.move_to("ash", "overworld", (60.0, 64.0, 0.0));
        let err = fx.propose("ash").unwrap_err();
        assert_eq!(
            err,
            ChallengeError::OutOfRange {
                radius: 50.0,
                distance: MeasuredDistance::Blocks(60)
            }
        );
        assert!(err.to_string().contains("60"));

        fx.world.move_to("ash", "nether", (0.0, 64.0, 0.0));
        assert!(matches!(
            fx.propose("ash"),
            Err(ChallengeError::OutOfRange {
                distance: MeasuredDistance::Unmeasurable,
                ..
            })
        ));
        assert!(fx.coordinator.is_empty());
    }

    #[test]
    fn test_leader_offline() {
        let mut fx = fixture();
        fx.world.leave("leader");
        assert_eq!(
            fx.propose("ash"),
            Err(ChallengeError::LeaderOffline {
                leader_name: "Bugsy".to_string()
            })
        );
    }

    #[test]
    fn test_accept_after_timeout_fails_and_removes() {
        let mut fx = fixture();
        fx.propose("ash").unwrap();
        let late = fx.now + Duration::seconds(61);

        assert_eq!(
            fx.accept(late),
            Err(ChallengeError::ChallengeExpired {
                challenger_name: "Ash".to_string()
            })
        );
        assert!(fx.coordinator.is_empty());
        assert_eq!(fx.accept(late), Err(ChallengeError::NoPendingChallenge));
    }

    #[test]
    fn test_accept_exactly_at_timeout_succeeds() {
        let mut fx = fixture();
        fx.propose("ash").unwrap();
        let challenge = fx.accept(fx.now + Duration::seconds(60)).unwrap();
        assert_eq!(challenge.challenger_id, PlayerId::from("ash"));
        assert!(fx.coordinator.is_empty());
    }

    #[test]
    fn test_accept_when_challenger_left() {
        let mut fx = fixture();
        fx.propose("ash").unwrap();
        fx.world.leave("ash");
        assert!(matches!(
            fx.accept(fx.now),
            Err(ChallengeError::ChallengerGone { .. })
        ));
        assert!(fx.coordinator.is_empty());
    }

    #[test]
    fn test_accept_after_leader_reassigned() {
        let mut fx = fixture();
        fx.propose("ash").unwrap();
        fx.registry
            .set_leader(GymType::Bug, &PlayerId::from("gary"), "Gary", fx.now);
        assert_eq!(
            fx.accept(fx.now),
            Err(ChallengeError::LeaderReassigned { gym: GymType::Bug })
        );
        assert!(fx.coordinator.is_empty());
    }

    #[test]
    fn test_fractional_radius_is_kept() {
        let mut fx = fixture();
        fx.registry.settings_mut().challenge_radius = 32.5;
        fx.world.move_to("ash", "overworld", (32.9, 64.0, 0.0));

        let err = fx.propose("ash").unwrap_err();
        assert_eq!(
            err,
            ChallengeError::OutOfRange {
                radius: 32.5,
                distance: MeasuredDistance::Blocks(33)
            }
        );
        assert!(err.to_string().contains("within 32.5 blocks"), "{}", err);

        fx.world.move_to("ash", "overworld", (32.5, 64.0, 0.0));
        assert!(fx.propose("ash").is_ok());
    }

    #[test]
    fn test_non_finite_distance_is_unmeasurable() {
        let mut fx = fixture();
        fx.world.move_to("ash", "overworld", (f64::NAN, 64.0, 0.0));
        assert_eq!(
            fx.propose("ash"),
            Err(ChallengeError::OutOfRange {
                radius: 50.0,
                distance: MeasuredDistance::Unmeasurable
            })
        );

        fx.world.move_to("ash", "overworld", (f64::INFINITY, 64.0, 0.0));
        assert!(matches!(
            fx.propose("ash"),
            Err(ChallengeError::OutOfRange {
                distance: MeasuredDistance::Unmeasurable,
                ..
            })
        ));
        assert!(fx.coordinator.is_empty());
    }

    #[test]
    fn test_unregistered_leader_cannot_be_challenged() {
        let mut fx = fixture();
        fx.registry
            .mark_leader_registered(GymType::Bug, false)
            .unwrap();

        assert_eq!(
            fx.propose("ash"),
            Err(ChallengeError::LeaderNotRegistered { gym: GymType::Bug })
        );
        assert!(fx.coordinator.is_empty());
        assert!(fx.outbox.messages().is_empty());

        fx.registry.settings_mut().require_team_registration = false;
        assert!(fx.propose("ash").is_ok());
    }

    #[test]
    fn test_registration_is_checked_before_self_challenge() {
        let mut fx = fixture();
        fx.registry
            .mark_leader_registered(GymType::Bug, false)
            .unwrap();
        assert_eq!(
            fx.propose("leader"),
            Err(ChallengeError::LeaderNotRegistered { gym: GymType::Bug })
        );
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let mut fx = fixture();
        fx.propose("ash").unwrap();
        fx.registry.set_leader(
            GymType::Grass,
            &PlayerId::from("gary"),
            "Gary",
            fx.now,
        );
        fx.registry
            .mark_leader_registered(GymType::Grass, true)
            .unwrap();
        fx.now += Duration::seconds(30);
        fx.world.join("erika", "Erika", "overworld", (5.0, 64.0, 5.0));
        fx.coordinator
            .propose(
                &fx.registry,
                &fx.world,
                &fx.battles,
                &PlayerId::from("erika"),
                "Erika",
                GymType::Grass,
                fx.now,
                &mut fx.outbox,
            )
            .unwrap();

        let mut outbox = Outbox::new();
        let removed =
            fx.coordinator
                .sweep_expired(fx.now + Duration::seconds(45), challenge_timeout(60), &mut outbox);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].challenger_id, PlayerId::from("ash"));
        assert!(fx
            .coordinator
            .pending_for_challenger(&PlayerId::from("erika"))
            .is_some());
        assert_eq!(outbox.messages().len(), 2);
    }

    #[test]
    fn test_decline_and_withdraw() {
        let mut fx = fixture();
        fx.propose("ash").unwrap();
        let declined = fx
            .coordinator
            .decline(&PlayerId::from("leader"), &mut fx.outbox)
            .unwrap();
        assert_eq!(declined.challenger_name, "Ash");
        assert!(fx.coordinator.is_empty());

        fx.propose("ash").unwrap();
        fx.coordinator
            .withdraw(&PlayerId::from("ash"), &mut fx.outbox)
            .unwrap();
        assert_eq!(
            fx.coordinator
                .withdraw(&PlayerId::from("ash"), &mut fx.outbox),
            Err(ChallengeError::NoPendingChallenge)
        );
    }
}
