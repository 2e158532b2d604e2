//! The orchestration context.
//!
//! `GymContext` owns every piece of shared state behind one mutex and is the
//! only entry point for hosts. Each public operation takes the lock once and
//! queues its document snapshots and audit lines on the writer while still
//! holding it, so the writer sees snapshots in the order the state changed.
//! Player notifications, the battle engine and listeners are called after the
//! lock is released.

use crate::audit::{AuditEvent, AuditLog};
use crate::calendar::{operational_zone, MonthKey};
use crate::challenge::{challenge_timeout, ChallengeCoordinator, ChallengeId, PendingChallenge};
use crate::config::{GymConfig, GymConfigFile, GymEntry, GymSettings, LeaderAssignment, LoadWarning};
use crate::correlator::{ActiveBattle, BattleCorrelator, BattleEndedEvent, ResolvedOutcome};
use crate::errors::{
    ChallengeError, ChallengeResult, GymResult, LeaderResult, PersistenceResult,
};
use crate::leaders::LeaderChange;
use crate::ledger::{
    BattleLedger, BattleRecord, CleanupReport, ClaimOutcome, FinishedBattle, PlayerGymStats,
    WorldData, WorldDataFile,
};
use crate::persistence::{DocumentStore, PersistenceWriter};
use crate::ports::{HostPorts, Outbox};
use crate::registry::GymRegistry;
use crate::rewards::{DeliveryOutcome, RewardGrantor};
use crate::teams::{change_allowed, GymRules, LeaderTeam, RulesAuthority, TeamMember, DEFAULT_LEVEL_CAP};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use parking_lot::{Mutex, RwLock};
use schema::{presentation, BattleFormat, BattleResult, GymType, PlayerId, RewardSpec};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Receives the battle engine's "a battle finished" notification. The host
/// wires its engine callback to this.
pub trait BattleEventSink: Send + Sync {
    fn battle_ended(&self, event: &BattleEndedEvent);
}

pub type BattleListener = Box<dyn Fn(&BattleRecord) + Send + Sync>;

struct GymState {
    registry: GymRegistry,
    challenges: ChallengeCoordinator,
    battles: BattleCorrelator,
    ledger: BattleLedger,
}

impl GymState {
    fn zone(&self) -> Tz {
        operational_zone(&self.registry.settings().operational_time_zone)
    }

    fn config_doc(&self) -> GymConfigFile {
        GymConfigFile::from(self.registry.config())
    }

    fn world_doc(&self) -> WorldDataFile {
        WorldDataFile::from(self.ledger.data())
    }

    fn sweep(&mut self, now: DateTime<Utc>, outbox: &mut Outbox) -> usize {
        let timeout = challenge_timeout(self.registry.settings().challenge_timeout_seconds);
        self.challenges.sweep_expired(now, timeout, outbox).len()
    }
}

pub struct GymContext {
    state: Mutex<GymState>,
    ports: HostPorts,
    store: Arc<dyn DocumentStore>,
    writer: PersistenceWriter,
    listeners: RwLock<Vec<BattleListener>>,
}

impl std::fmt::Debug for GymContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GymContext")
            .field("ports", &self.ports)
            .finish_non_exhaustive()
    }
}

impl GymContext {
    /// Load both documents from `store` (falling back to defaults for missing
    /// or unreadable ones), start the writer and apply history retention.
    pub fn open(ports: HostPorts, store: Arc<dyn DocumentStore>) -> GymResult<Self> {
        let now = ports.clock.now();

        let (config, config_dirty) = match store.load_config() {
            Ok(Some(file)) => {
                let (config, warnings) = file.into_config(now);
                log_warnings("config", &warnings);
                (config, !warnings.is_empty())
            }
            Ok(None) => {
                info!("No gym config found, writing defaults");
                (GymConfig::default(), true)
            }
            Err(err) => {
                warn!(error = %err, "Gym config unreadable, using defaults");
                (GymConfig::default(), true)
            }
        };

        let world = match store.load_world() {
            Ok(Some(file)) => {
                let (data, warnings) = file.into_data();
                log_warnings("world", &warnings);
                data
            }
            Ok(None) => WorldData::default(),
            Err(err) => {
                warn!(error = %err, "Gym world data unreadable, starting empty");
                WorldData::default()
            }
        };

        let writer = PersistenceWriter::spawn(store.clone())?;
        let mut state = GymState {
            registry: GymRegistry::new(config),
            challenges: ChallengeCoordinator::new(),
            battles: BattleCorrelator::new(),
            ledger: BattleLedger::new(world),
        };

        if config_dirty {
            writer.save_config(state.config_doc());
        }

        let keep = state.registry.settings().history_retention_months;
        if keep > 0 {
            let report = state.ledger.cleanup(keep, now, state.zone());
            if report.battles_removed > 0 || report.months_removed > 0 {
                writer.save_world(state.world_doc());
            }
        }

        info!(
            active_gyms = state.registry.active_gyms().len(),
            battles = state.ledger.data().battles.len(),
            "Gym league loaded"
        );

        Ok(GymContext {
            state: Mutex::new(state),
            ports,
            store,
            writer,
            listeners: RwLock::new(Vec::new()),
        })
    }

    pub fn ports(&self) -> &HostPorts {
        &self.ports
    }

    fn now(&self) -> DateTime<Utc> {
        self.ports.clock.now()
    }

    fn deliver(&self, outbox: Outbox) {
        outbox.deliver(self.ports.notifier.as_ref());
    }

    fn display_name(&self, player: &PlayerId) -> String {
        self.ports
            .players
            .online_name(player)
            .unwrap_or_else(|| player.to_string())
    }

    // --- Challenge flow ---

    pub fn propose_challenge(&self, challenger: &PlayerId, gym: GymType) -> ChallengeResult<ChallengeId> {
        let now = self.now();
        let challenger_name = self.display_name(challenger);
        let mut outbox = Outbox::new();

        let proposed = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            state.sweep(now, &mut outbox);
            state.challenges.propose(
                &state.registry,
                self.ports.players.as_ref(),
                &state.battles,
                challenger,
                &challenger_name,
                gym,
                now,
                &mut outbox,
            )
        };

        self.deliver(outbox);
        proposed.map(|challenge| challenge.id)
    }

    /// Accept the challenge waiting for `leader` and start the battle.
    pub fn accept_challenge(&self, leader: &PlayerId) -> ChallengeResult<ActiveBattle> {
        let now = self.now();
        let mut outbox = Outbox::new();

        let opened = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let accepted = state.challenges.accept(
                &state.registry,
                self.ports.players.as_ref(),
                leader,
                now,
                &mut outbox,
            );
            state.sweep(now, &mut outbox);
            accepted.and_then(|challenge| state.battles.open_session(&challenge, now))
        };
        self.deliver(outbox);
        let battle = opened?;

        if let Err(err) = self
            .ports
            .engine
            .start_battle(&battle.challenger_id, &battle.leader_id)
        {
            self.state.lock().battles.discard(battle.handle);
            warn!(handle = %battle.handle, error = %err, "Battle engine refused to start gym battle");
            let line = format!("The gym battle could not be started: {}", err);
            self.ports.notifier.notify(&battle.challenger_id, &line);
            self.ports.notifier.notify(&battle.leader_id, &line);
            return Err(ChallengeError::BattleStartFailed(err.to_string()));
        }

        let line = format!("{} Battle started!", presentation(battle.gym).gym_title());
        self.ports.notifier.notify(&battle.challenger_id, &line);
        self.ports.notifier.notify(&battle.leader_id, &line);
        info!(
            handle = %battle.handle,
            gym = %battle.gym,
            challenger = %battle.challenger_name,
            leader = %battle.leader_name,
            "Gym battle started"
        );
        Ok(battle)
    }

    pub fn decline_challenge(&self, leader: &PlayerId) -> ChallengeResult<PendingChallenge> {
        self.with_challenges(|state, now, outbox| {
            state.sweep(now, outbox);
            state.challenges.decline(leader, outbox)
        })
    }

    pub fn withdraw_challenge(&self, challenger: &PlayerId) -> ChallengeResult<PendingChallenge> {
        self.with_challenges(|state, now, outbox| {
            state.sweep(now, outbox);
            state.challenges.withdraw(challenger, outbox)
        })
    }

    /// Expire stale proposals. Hosts may call this on a tick; every challenge
    /// operation also does it first.
    pub fn sweep_expired(&self) -> usize {
        self.with_challenges(|state, now, outbox| state.sweep(now, outbox))
    }

    fn with_challenges<T>(&self, op: impl FnOnce(&mut GymState, DateTime<Utc>, &mut Outbox) -> T) -> T {
        let now = self.now();
        let mut outbox = Outbox::new();
        let result = {
            let mut guard = self.state.lock();
            op(&mut *guard, now, &mut outbox)
        };
        self.deliver(outbox);
        result
    }

    pub fn pending_for_leader(&self, leader: &PlayerId) -> Option<PendingChallenge> {
        self.state.lock().challenges.pending_for_leader(leader).cloned()
    }

    pub fn pending_for_challenger(&self, challenger: &PlayerId) -> Option<PendingChallenge> {
        self.state
            .lock()
            .challenges
            .pending_for_challenger(challenger)
            .cloned()
    }

    pub fn active_battle_for(&self, player: &PlayerId) -> Option<ActiveBattle> {
        self.state.lock().battles.session_for(player).cloned()
    }

    pub fn active_battles(&self) -> Vec<ActiveBattle> {
        self.state.lock().battles.sessions().cloned().collect()
    }

    // --- Battle resolution ---

    /// Resolve a battle end event. Returns the new record when the event
    /// matched an active gym battle.
    pub fn report_battle_end(&self, event: &BattleEndedEvent) -> Option<BattleRecord> {
        let now = self.now();
        let mut outbox = Outbox::new();
        let finished = {
            let mut guard = self.state.lock();
            let outcome = guard.battles.resolve(event)?;
            self.finish_locked(&mut *guard, &outcome, now, &mut outbox)
        };
        Some(self.publish(finished, outbox))
    }

    /// Cancel the active battle involving `player` and record it as cancelled.
    pub fn force_cancel(&self, player: &PlayerId) -> Option<BattleRecord> {
        let now = self.now();
        let mut outbox = Outbox::new();
        let finished = {
            let mut guard = self.state.lock();
            let outcome = guard.battles.cancel(player)?;
            info!(handle = %outcome.battle.handle, player = %player, "Gym battle force-cancelled");
            self.finish_locked(&mut *guard, &outcome, now, &mut outbox)
        };
        Some(self.publish(finished, outbox))
    }

    fn finish_locked(
        &self,
        state: &mut GymState,
        outcome: &ResolvedOutcome,
        now: DateTime<Utc>,
        outbox: &mut Outbox,
    ) -> FinishedBattle {
        let zone = state.zone();
        let battle = &outcome.battle;
        let rewards = state.registry.entry(battle.gym).rewards.clone();
        let grantor = RewardGrantor::new(state.registry.settings().coin_item_id.clone());
        let players = self.ports.players.as_ref();
        let items = self.ports.items.as_ref();

        let finished = state.ledger.finish(outcome, now, zone, || {
            if !players.is_online(&battle.challenger_id) {
                return None;
            }
            Some(grantor.grant(&battle.challenger_id, &rewards, items))
        });

        let record = &finished.record;
        let result_line = match record.result {
            BattleResult::ChallengerWin => format!(
                "Challenger wins! {} defeated {} at the {}.",
                record.challenger_name,
                record.leader_name,
                presentation(record.gym).gym_title()
            ),
            BattleResult::LeaderWin => "The Gym Leader defends their title!".to_string(),
            BattleResult::Draw => "The battle ended in a draw.".to_string(),
            BattleResult::Cancelled => "The battle was cancelled.".to_string(),
        };
        outbox.push(&record.challenger_id, result_line.clone());
        outbox.push(&record.leader_id, result_line);

        let mut audit = vec![AuditEvent::Battle(record.clone())];
        let gym = record.gym;
        let challenger = &record.challenger_id;
        let challenger_name = record.challenger_name.clone();

        match &finished.claim {
            ClaimOutcome::Granted(report) => {
                outbox.push(
                    challenger,
                    format!(
                        "You received the {} and rewards!",
                        presentation(gym).badge_title()
                    ),
                );
                let dropped = report.placed_nearby();
                if dropped > 0 {
                    outbox.push(
                        challenger,
                        format!(
                            "Your inventory was full: {} reward item(s) were dropped at your feet.",
                            dropped
                        ),
                    );
                }
                for failure in report.failures() {
                    if let DeliveryOutcome::Failed(err) = &failure.outcome {
                        outbox.push(
                            challenger,
                            format!("A reward could not be delivered: {} ({})", failure.stack, err),
                        );
                        audit.push(AuditEvent::RewardDeliveryFailed {
                            player_name: challenger_name.clone(),
                            gym,
                            reason: format!("{}: {}", failure.stack, err),
                        });
                    }
                }
                audit.push(AuditEvent::RewardsGiven {
                    player_name: challenger_name,
                    gym,
                    report: report.clone(),
                });
            }
            ClaimOutcome::AlreadyClaimed => {
                outbox.push(
                    challenger,
                    "You already received this month's rewards for this gym.",
                );
            }
            ClaimOutcome::ChallengerUnavailable => {
                warn!(player = %challenger, gym = %gym, "Challenger offline at resolution, reward not claimed");
                outbox.push(
                    challenger,
                    "You were offline when your gym battle ended, so no reward was claimed.",
                );
                audit.push(AuditEvent::RewardDeliveryFailed {
                    player_name: challenger_name,
                    gym,
                    reason: "challenger offline".to_string(),
                });
            }
            ClaimOutcome::DeliveryFailed(report) => {
                warn!(player = %challenger, gym = %gym, "Every reward delivery failed, reward not claimed");
                outbox.push(
                    challenger,
                    "Your gym rewards could not be delivered. Please contact an admin.",
                );
                let reasons: Vec<String> = report
                    .failures()
                    .filter_map(|failure| match &failure.outcome {
                        DeliveryOutcome::Failed(err) => Some(format!("{}: {}", failure.stack, err)),
                        _ => None,
                    })
                    .collect();
                audit.push(AuditEvent::RewardDeliveryFailed {
                    player_name: challenger_name,
                    gym,
                    reason: reasons.join("; "),
                });
            }
            ClaimOutcome::NothingConfigured => {
                debug!(gym = %gym, "Gym has no rewards configured");
            }
            ClaimOutcome::NotApplicable => {}
        }

        self.writer.save_world(state.world_doc());
        for event in audit {
            self.writer.append_audit(event.render(now, zone));
        }
        finished
    }

    fn publish(&self, finished: FinishedBattle, outbox: Outbox) -> BattleRecord {
        self.deliver(outbox);

        for listener in self.listeners.read().iter() {
            listener(&finished.record);
        }
        finished.record
    }

    /// Register a callback invoked with every new battle record, after the
    /// state lock is released.
    pub fn on_battle_resolved(&self, listener: impl Fn(&BattleRecord) + Send + Sync + 'static) {
        self.listeners.write().push(Box::new(listener));
    }

    // --- Leaders and gym administration ---

    /// Assign `player` to `gym`. A different player loses any team the
    /// previous leader registered.
    pub fn set_leader(
        &self,
        gym: GymType,
        player: &PlayerId,
        player_name: &str,
        set_by: &str,
    ) -> LeaderChange {
        let now = self.now();
        let title = presentation(gym).gym_title();
        let mut outbox = Outbox::new();

        let (change, registered) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let change = state.registry.set_leader(gym, player, player_name, now);
            let event = match &change {
                LeaderChange::Set { leader, .. } => AuditEvent::LeaderSet {
                    gym,
                    leader: leader.clone(),
                    by: set_by.to_string(),
                },
                LeaderChange::Changed {
                    previous, leader, ..
                } => {
                    outbox.push(
                        &previous.player_id,
                        format!("You are no longer the leader of the {}.", title),
                    );
                    AuditEvent::LeaderChanged {
                        gym,
                        previous: previous.clone(),
                        leader: leader.clone(),
                        by: set_by.to_string(),
                    }
                }
            };
            let stale_team = state
                .ledger
                .teams()
                .get(gym)
                .is_some_and(|team| team.leader_id != *player);
            self.writer.save_config(state.config_doc());
            if stale_team {
                state.ledger.teams_mut().remove(gym);
                self.writer.save_world(state.world_doc());
            }
            self.writer.append_audit(event.render(now, state.zone()));
            (change, state.registry.entry(gym).leader_registered)
        };

        outbox.push(player, format!("You are now the leader of the {}!", title));
        if !registered {
            outbox.push(player, "Register your team before accepting challenges.");
        }
        self.deliver(outbox);

        info!(gym = %gym, leader = %player_name, set_by, "Gym leader set");
        change
    }

    pub fn remove_leader(
        &self,
        gym: GymType,
        removed_by: &str,
        reason: &str,
    ) -> LeaderResult<LeaderAssignment> {
        let now = self.now();
        let previous = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let previous = state.registry.remove_leader(gym)?;
            self.writer.save_config(state.config_doc());
            if state.ledger.teams_mut().remove(gym).is_some() {
                self.writer.save_world(state.world_doc());
            }
            self.writer.append_audit(
                AuditEvent::LeaderRemoved {
                    gym,
                    previous: previous.clone(),
                    by: removed_by.to_string(),
                    reason: reason.to_string(),
                }
                .render(now, state.zone()),
            );
            previous
        };
        self.ports.notifier.notify(
            &previous.player_id,
            &format!(
                "You are no longer the leader of the {}.",
                presentation(gym).gym_title()
            ),
        );
        info!(gym = %gym, leader = %previous.player_name, removed_by, reason, "Gym leader removed");
        Ok(previous)
    }

    pub fn set_gym_enabled(&self, gym: GymType, enabled: bool) {
        self.update_registry(|registry| registry.set_gym_enabled(gym, enabled));
        info!(gym = %gym, enabled, "Gym availability changed");
    }

    pub fn set_rewards(&self, gym: GymType, rewards: RewardSpec) {
        self.update_registry(|registry| registry.set_rewards(gym, rewards));
    }

    /// Edit the global settings and persist them.
    pub fn update_settings(&self, op: impl FnOnce(&mut GymSettings)) {
        self.update_registry(|registry| op(registry.settings_mut()));
    }

    fn update_registry<T>(&self, op: impl FnOnce(&mut GymRegistry) -> T) -> T {
        let mut state = self.state.lock();
        let result = op(&mut state.registry);
        self.writer.save_config(state.config_doc());
        result
    }

    // --- Leader teams and rules ---

    /// Register `members` as the roster `leader` defends `gym` with. Unlocks
    /// challenges when registration is required.
    pub fn register_team(
        &self,
        gym: GymType,
        leader: &PlayerId,
        members: Vec<TeamMember>,
    ) -> LeaderResult<LeaderTeam> {
        let now = self.now();
        let leader_name = self.display_name(leader);
        let team = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let team = state
                .ledger
                .teams_mut()
                .register(&mut state.registry, gym, leader, &leader_name, members, now)?
                .clone();
            self.writer.save_config(state.config_doc());
            self.writer.save_world(state.world_doc());
            team
        };
        self.ports.notifier.notify(
            leader,
            &format!(
                "Team registered for the {} ({} member(s)). Set your battle rules next.",
                presentation(gym).gym_title(),
                team.members.len()
            ),
        );
        Ok(team)
    }

    /// The leader picks the format and level cap of their gym.
    pub fn set_gym_rules(
        &self,
        gym: GymType,
        leader: &PlayerId,
        format: BattleFormat,
        level_cap: u32,
    ) -> LeaderResult<GymRules> {
        self.change_rules(gym, RulesAuthority::Leader(leader), format, level_cap)
    }

    /// Admin override of a gym's rules, ignoring the cooldown.
    pub fn force_gym_rules(
        &self,
        gym: GymType,
        format: BattleFormat,
        level_cap: u32,
    ) -> LeaderResult<GymRules> {
        self.change_rules(gym, RulesAuthority::Admin, format, level_cap)
    }

    fn change_rules(
        &self,
        gym: GymType,
        by: RulesAuthority<'_>,
        format: BattleFormat,
        level_cap: u32,
    ) -> LeaderResult<GymRules> {
        let now = self.now();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let rules = state
            .ledger
            .teams_mut()
            .set_rules(&state.registry, gym, by, format, level_cap, now)?;
        self.writer.save_world(state.world_doc());
        Ok(rules)
    }

    /// Clear the roster; the leader must register again before being challenged.
    pub fn reset_leader_team(&self, gym: GymType) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let reset = state.ledger.teams_mut().reset_team(&mut state.registry, gym);
        if reset {
            self.writer.save_config(state.config_doc());
            self.writer.save_world(state.world_doc());
        }
        reset
    }

    /// Let the leader change rules immediately.
    pub fn reset_gym_rules(&self, gym: GymType) -> bool {
        let mut state = self.state.lock();
        let reset = state.ledger.teams_mut().reset_rules_timer(gym);
        if reset {
            self.writer.save_world(state.world_doc());
        }
        reset
    }

    pub fn leader_team(&self, gym: GymType) -> Option<LeaderTeam> {
        self.state.lock().ledger.teams().get(gym).cloned()
    }

    /// Rules the gym is fought under: the leader's choice, else the
    /// configured format at the default level cap.
    pub fn gym_rules(&self, gym: GymType) -> GymRules {
        let state = self.state.lock();
        let default_format = state.registry.entry(gym).battle_format;
        state
            .ledger
            .teams()
            .get(gym)
            .map(|team| team.rules(default_format))
            .unwrap_or(GymRules {
                format: default_format,
                level_cap: DEFAULT_LEVEL_CAP,
            })
    }

    /// When the roster may next change; `None` when no cooldown applies.
    pub fn next_team_change(&self, gym: GymType) -> Option<DateTime<Utc>> {
        let state = self.state.lock();
        let interval = state.registry.settings().team_change_interval_days;
        state
            .ledger
            .teams()
            .get(gym)
            .and_then(|team| team.next_team_change(interval))
    }

    pub fn next_rules_change(&self, gym: GymType) -> Option<DateTime<Utc>> {
        let state = self.state.lock();
        let interval = state.registry.settings().team_change_interval_days;
        state
            .ledger
            .teams()
            .get(gym)
            .and_then(|team| team.next_rules_change(interval))
    }

    pub fn can_change_team(&self, gym: GymType) -> bool {
        change_allowed(self.next_team_change(gym), self.now())
    }

    pub fn can_change_rules(&self, gym: GymType) -> bool {
        change_allowed(self.next_rules_change(gym), self.now())
    }

    /// Re-read the config document, replacing the in-memory registry.
    /// Pending challenges and active battles are kept.
    pub fn reload_config(&self) -> GymResult<Vec<LoadWarning>> {
        self.writer.flush()?;
        let Some(file) = self.store.load_config()? else {
            return Ok(Vec::new());
        };
        let (config, warnings) = file.into_config(self.now());
        log_warnings("config", &warnings);
        self.state.lock().registry.replace(config);
        info!("Gym config reloaded");
        Ok(warnings)
    }

    pub fn leader_of(&self, gym: GymType) -> Option<LeaderAssignment> {
        self.state.lock().registry.leader_of(gym).cloned()
    }

    pub fn gym_of(&self, player: &PlayerId) -> Option<GymType> {
        self.state.lock().registry.gym_of(player)
    }

    pub fn is_any_leader(&self, player: &PlayerId) -> bool {
        self.state.lock().registry.is_any_leader(player)
    }

    pub fn active_gyms(&self) -> Vec<GymType> {
        self.state.lock().registry.active_gyms()
    }

    pub fn gym_entry(&self, gym: GymType) -> GymEntry {
        self.state.lock().registry.entry(gym).clone()
    }

    pub fn settings(&self) -> GymSettings {
        self.state.lock().registry.settings().clone()
    }

    // --- Ledger queries and maintenance ---

    pub fn current_month(&self) -> MonthKey {
        let zone = self.state.lock().zone();
        MonthKey::containing(self.now(), zone)
    }

    pub fn player_stats(&self, player: &PlayerId) -> PlayerGymStats {
        self.state.lock().ledger.player_stats(player)
    }

    pub fn has_badge(&self, player: &PlayerId, gym: GymType) -> bool {
        self.state.lock().ledger.has_badge(player, gym)
    }

    pub fn has_claimed(&self, player: &PlayerId, gym: GymType, month: MonthKey) -> bool {
        self.state.lock().ledger.has_claimed(player, gym, month)
    }

    pub fn has_claimed_this_month(&self, player: &PlayerId, gym: GymType) -> bool {
        let month = self.current_month();
        self.has_claimed(player, gym, month)
    }

    pub fn leader_battles_in(&self, month: MonthKey, leader: &PlayerId) -> u32 {
        self.state.lock().ledger.leader_battles_in(month, leader)
    }

    pub fn battles_for(&self, player: &PlayerId) -> Vec<BattleRecord> {
        self.state.lock().ledger.battles_for(player).cloned().collect()
    }

    pub fn recent_battles(&self, n: usize) -> Vec<BattleRecord> {
        self.state
            .lock()
            .ledger
            .recent_battles(n)
            .into_iter()
            .cloned()
            .collect()
    }

    /// The leader-side monthly reward gate: leads a gym and fought enough
    /// gym battles this month.
    pub fn is_eligible_for_leader_reward(&self, player: &PlayerId) -> bool {
        let state = self.state.lock();
        state.registry.is_any_leader(player) && Self::missing_battles(&state, player, self.now()) == 0
    }

    pub fn missing_battles_for_reward(&self, player: &PlayerId) -> u32 {
        let state = self.state.lock();
        Self::missing_battles(&state, player, self.now())
    }

    fn missing_battles(state: &GymState, player: &PlayerId, now: DateTime<Utc>) -> u32 {
        let month = MonthKey::containing(now, state.zone());
        let required = state.registry.settings().leader_min_battles_for_monthly_reward;
        required.saturating_sub(state.ledger.leader_battles_in(month, player))
    }

    pub fn reset_player_stats(&self, player: &PlayerId) -> bool {
        self.update_ledger(|ledger| ledger.reset_player_stats(player))
    }

    pub fn reset_all_player_stats(&self) {
        self.update_ledger(|ledger| ledger.reset_all_player_stats())
    }

    /// Prune claim months, leader counters and records older than
    /// `keep_months` (the configured retention when `None`).
    pub fn cleanup_history(&self, keep_months: Option<u32>) -> CleanupReport {
        let now = self.now();
        let report = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let keep = keep_months.unwrap_or(state.registry.settings().history_retention_months);
            let zone = state.zone();
            let report = state.ledger.cleanup(keep, now, zone);
            self.writer.save_world(state.world_doc());
            report
        };
        info!(
            months_removed = report.months_removed,
            battles_removed = report.battles_removed,
            "Gym history cleaned up"
        );
        report
    }

    fn update_ledger<T>(&self, op: impl FnOnce(&mut BattleLedger) -> T) -> T {
        let mut state = self.state.lock();
        let result = op(&mut state.ledger);
        self.writer.save_world(state.world_doc());
        result
    }

    // --- Audit and persistence ---

    pub fn leader_history_tail(&self, n: usize) -> PersistenceResult<Vec<String>> {
        self.writer.flush()?;
        self.store.audit_tail(AuditLog::LeaderHistory, n)
    }

    pub fn battle_log_tail(&self, month: MonthKey, n: usize) -> PersistenceResult<Vec<String>> {
        self.writer.flush()?;
        self.store.audit_tail(AuditLog::Battles(month), n)
    }

    /// Block until every queued write has reached the store.
    pub fn flush(&self) -> PersistenceResult<()> {
        self.writer.flush()
    }

    /// Flush and stop the writer. Later writes are dropped.
    pub fn shutdown(&self) {
        self.writer.shutdown();
    }
}

impl BattleEventSink for GymContext {
    fn battle_ended(&self, event: &BattleEndedEvent) {
        self.report_battle_end(event);
    }
}

fn log_warnings(document: &str, warnings: &[LoadWarning]) {
    for warning in warnings {
        warn!(document, "{}", warning);
    }
}
