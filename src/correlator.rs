//! Active gym battles, keyed by the unordered pair of players, and the
//! matching of external "battle finished" events back to them.

use crate::challenge::PendingChallenge;
use crate::errors::{ChallengeError, ChallengeResult};
use chrono::{DateTime, Utc};
use schema::{BattleResult, GymType, PlayerId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::trace;

/// Unordered pair of players, stored sorted so `(a, b)` and `(b, a)` collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey(PlayerId, PlayerId);

impl PairKey {
    pub fn new(a: &PlayerId, b: &PlayerId) -> Self {
        if a <= b {
            PairKey(a.clone(), b.clone())
        } else {
            PairKey(b.clone(), a.clone())
        }
    }

    pub fn contains(&self, player: &PlayerId) -> bool {
        self.0 == *player || self.1 == *player
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BattleHandle(pub u64);

impl fmt::Display for BattleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "battle-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveBattle {
    pub handle: BattleHandle,
    pub challenger_id: PlayerId,
    pub challenger_name: String,
    pub leader_id: PlayerId,
    pub leader_name: String,
    pub gym: GymType,
    pub started_at: DateTime<Utc>,
}

impl ActiveBattle {
    pub fn pair(&self) -> PairKey {
        PairKey::new(&self.challenger_id, &self.leader_id)
    }
}

/// How the engine says a battle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BattleConclusion {
    Victory { winners: HashSet<PlayerId> },
    Draw,
    Aborted,
}

/// The single asynchronous notification from the battle engine. It covers
/// every battle on the server, gym or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BattleEndedEvent {
    /// Human participants only
    pub participants: Vec<PlayerId>,
    pub conclusion: BattleConclusion,
}

impl BattleEndedEvent {
    pub fn victory(participants: &[&str], winners: &[&str]) -> Self {
        BattleEndedEvent {
            participants: participants.iter().map(|p| PlayerId::from(*p)).collect(),
            conclusion: BattleConclusion::Victory {
                winners: winners.iter().map(|p| PlayerId::from(*p)).collect(),
            },
        }
    }

    pub fn draw(participants: &[&str]) -> Self {
        BattleEndedEvent {
            participants: participants.iter().map(|p| PlayerId::from(*p)).collect(),
            conclusion: BattleConclusion::Draw,
        }
    }

    pub fn aborted(participants: &[&str]) -> Self {
        BattleEndedEvent {
            participants: participants.iter().map(|p| PlayerId::from(*p)).collect(),
            conclusion: BattleConclusion::Aborted,
        }
    }

    /// The pair this event is about, when it names exactly two distinct players.
    fn pair(&self) -> Option<PairKey> {
        let distinct: HashSet<&PlayerId> = self.participants.iter().collect();
        match (self.participants.as_slice(), distinct.len()) {
            ([a, b], 2) => Some(PairKey::new(a, b)),
            _ => None,
        }
    }
}

/// A session matched to its end, ready for the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutcome {
    pub battle: ActiveBattle,
    pub result: BattleResult,
}

#[derive(Debug, Default)]
pub struct BattleCorrelator {
    sessions: HashMap<PairKey, ActiveBattle>,
    next_handle: u64,
}

impl BattleCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_session(
        &mut self,
        challenge: &PendingChallenge,
        now: DateTime<Utc>,
    ) -> ChallengeResult<ActiveBattle> {
        let pair = challenge.pair();
        if self.sessions.contains_key(&pair) {
            return Err(ChallengeError::BattleInProgress);
        }

        self.next_handle += 1;
        let battle = ActiveBattle {
            handle: BattleHandle(self.next_handle),
            challenger_id: challenge.challenger_id.clone(),
            challenger_name: challenge.challenger_name.clone(),
            leader_id: challenge.leader_id.clone(),
            leader_name: challenge.leader_name.clone(),
            gym: challenge.gym,
            started_at: now,
        };
        self.sessions.insert(pair, battle.clone());
        Ok(battle)
    }

    /// Drop a session that never started (the engine refused it).
    pub fn discard(&mut self, handle: BattleHandle) -> Option<ActiveBattle> {
        let pair = self
            .sessions
            .iter()
            .find(|(_, battle)| battle.handle == handle)
            .map(|(pair, _)| pair.clone())?;
        self.sessions.remove(&pair)
    }

    /// Match an end event to its session and remove it. Events that are not
    /// about a tracked gym battle return `None`.
    pub fn resolve(&mut self, event: &BattleEndedEvent) -> Option<ResolvedOutcome> {
        let Some(pair) = event.pair() else {
            trace!(participants = event.participants.len(), "Ignoring non-duel battle end");
            return None;
        };
        let Some(battle) = self.sessions.remove(&pair) else {
            trace!(?pair, "Battle end does not match an active gym battle");
            return None;
        };

        let result = match &event.conclusion {
            BattleConclusion::Victory { winners } if winners.contains(&battle.challenger_id) => {
                BattleResult::ChallengerWin
            }
            BattleConclusion::Victory { .. } => BattleResult::LeaderWin,
            BattleConclusion::Draw => BattleResult::Draw,
            BattleConclusion::Aborted => BattleResult::Cancelled,
        };
        Some(ResolvedOutcome { battle, result })
    }

    /// Force-cancel the session involving `player`.
    pub fn cancel(&mut self, player: &PlayerId) -> Option<ResolvedOutcome> {
        let pair = self
            .sessions
            .keys()
            .find(|pair| pair.contains(player))
            .cloned()?;
        self.sessions.remove(&pair).map(|battle| ResolvedOutcome {
            battle,
            result: BattleResult::Cancelled,
        })
    }

    pub fn session_for(&self, player: &PlayerId) -> Option<&ActiveBattle> {
        self.sessions
            .iter()
            .find(|(pair, _)| pair.contains(player))
            .map(|(_, battle)| battle)
    }

    pub fn session_for_pair(&self, pair: &PairKey) -> Option<&ActiveBattle> {
        self.sessions.get(pair)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &ActiveBattle> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
