use crate::config::{parse_timestamp, GymConfig, GymConfigFile, LeaderAssignment};
use crate::context::GymContext;
use crate::correlator::{ActiveBattle, BattleEndedEvent};
use crate::host::{ManualClock, SimulatedWorld};
use crate::ledger::BattleRecord;
use crate::persistence::{DocumentStore, MemoryStore};
use crate::ports::HostPorts;
use crate::teams::TeamMember;
use chrono::{DateTime, Utc};
use schema::{GymType, PlayerId};
use std::sync::Arc;

pub const START: &str = "2026-03-10T12:00:00Z";

pub fn at(s: &str) -> DateTime<Utc> {
    match parse_timestamp(s) {
        Some(ts) => ts,
        None => panic!("bad test timestamp {}", s),
    }
}

pub fn pid(id: &str) -> PlayerId {
    PlayerId::from(id)
}

/// A two-member roster owned by `leader`.
pub fn team_of(leader: &str) -> Vec<TeamMember> {
    vec![
        TeamMember::new("scyther", 48, &format!("{}-1", leader)),
        TeamMember::new("heracross", 50, &format!("{}-2", leader)),
    ]
}

/// A context wired to a simulated world, a manual clock and an in-memory store.
pub struct TestLeague {
    pub ctx: GymContext,
    pub world: Arc<SimulatedWorld>,
    pub clock: Arc<ManualClock>,
    pub store: MemoryStore,
}

impl TestLeague {
    /// Propose and accept in one go; panics if either step fails.
    pub fn start_battle(&self, challenger: &str, gym: GymType) -> ActiveBattle {
        if let Err(err) = self.ctx.propose_challenge(&pid(challenger), gym) {
            panic!("propose by {} failed: {}", challenger, err);
        }
        let leader = match self.ctx.leader_of(gym) {
            Some(leader) => leader.player_id,
            None => panic!("{} has no leader", gym),
        };
        match self.ctx.accept_challenge(&leader) {
            Ok(battle) => battle,
            Err(err) => panic!("accept by {} failed: {}", leader, err),
        }
    }

    pub fn finish(&self, challenger: &str, leader: &str, winner: &str) -> Option<BattleRecord> {
        self.ctx
            .report_battle_end(&BattleEndedEvent::victory(&[challenger, leader], &[winner]))
    }

    /// Start and finish a battle with `winner` taking it.
    pub fn play(&self, challenger: &str, gym: GymType, winner: &str) -> BattleRecord {
        let battle = self.start_battle(challenger, gym);
        match self.finish(challenger, battle.leader_id.as_str(), winner) {
            Some(record) => record,
            None => panic!("battle end for {} was not matched", challenger),
        }
    }

    /// Open a second context over the same store, world and clock.
    pub fn reopen(&self) -> GymContext {
        self.ctx.flush().unwrap();
        GymContext::open(ports(&self.world, &self.clock), Arc::new(self.store.clone())).unwrap()
    }
}

pub fn ports(world: &Arc<SimulatedWorld>, clock: &Arc<ManualClock>) -> HostPorts {
    HostPorts {
        players: world.clone(),
        engine: world.clone(),
        items: world.clone(),
        notifier: world.clone(),
        clock: clock.clone(),
    }
}

/// Builds a [`TestLeague`]. Defaults: radius 50, timeout 60s, clock at
/// [`START`], every leader registered with [`team_of`].
pub struct TestLeagueBuilder {
    config: GymConfig,
    players: Vec<(String, String, (f64, f64, f64))>,
    leaders: Vec<(GymType, String)>,
    register_teams: bool,
    start: DateTime<Utc>,
    store: Option<MemoryStore>,
}

impl TestLeagueBuilder {
    pub fn new() -> Self {
        let mut config = GymConfig::default();
        config.settings.challenge_radius = 50.0;
        Self {
            config,
            players: Vec::new(),
            leaders: Vec::new(),
            register_teams: true,
            start: at(START),
            store: None,
        }
    }

    /// Assign `id` as leader of `gym` and connect them at `position`.
    pub fn with_leader(mut self, gym: GymType, id: &str, name: &str, position: (f64, f64, f64)) -> Self {
        if let Some(entry) = self.config.gyms.get_mut(&gym) {
            entry.leader = Some(LeaderAssignment {
                player_id: pid(id),
                player_name: name.to_string(),
                since: self.start,
            });
        }
        self.leaders.push((gym, id.to_string()));
        self.with_player(id, name, position)
    }

    pub fn with_player(mut self, id: &str, name: &str, position: (f64, f64, f64)) -> Self {
        self.players
            .push((id.to_string(), name.to_string(), position));
        self
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.config.settings.challenge_radius = radius;
        self
    }

    /// Leave every leader without a registered team.
    pub fn without_registered_teams(mut self) -> Self {
        self.register_teams = false;
        self
    }

    pub fn starting_at(mut self, start: &str) -> Self {
        self.start = at(start);
        self
    }

    pub fn with_store(mut self, store: MemoryStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> TestLeague {
        let world = Arc::new(SimulatedWorld::new());
        for (id, name, position) in &self.players {
            world.join(id, name, "overworld", *position);
        }
        let clock = Arc::new(ManualClock::new(self.start));

        let store = match self.store {
            Some(store) => store,
            None => {
                let store = MemoryStore::new();
                store
                    .save_config(&GymConfigFile::from(&self.config))
                    .unwrap();
                store
            }
        };

        let ctx = GymContext::open(ports(&world, &clock), Arc::new(store.clone())).unwrap();
        if self.register_teams {
            for (gym, leader) in &self.leaders {
                if let Err(err) = ctx.register_team(*gym, &pid(leader), team_of(leader)) {
                    panic!("registering the {} team of {} failed: {}", gym, leader, err);
                }
            }
        }
        TestLeague {
            ctx,
            world,
            clock,
            store,
        }
    }
}

/// Bug gym led by Bugsy at the origin, Ash 10 blocks away, Gary 20 blocks away.
pub fn bug_league() -> TestLeague {
    TestLeagueBuilder::new()
        .with_leader(GymType::Bug, "bugsy", "Bugsy", (0.0, 64.0, 0.0))
        .with_player("ash", "Ash", (10.0, 64.0, 0.0))
        .with_player("gary", "Gary", (0.0, 64.0, 20.0))
        .build()
}
