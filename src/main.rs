use gym_league::{
    BattleEndedEvent, BattleFormat, GymContext, GymType, HostPorts, JsonFileStore, PlayerId,
    SimulatedWorld, SystemClock, TeamMember,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let data_dir = std::env::var("GYM_LEAGUE_DATA_DIR").unwrap_or_else(|_| "gym_data".to_string());

    let world = Arc::new(SimulatedWorld::new());
    world.join("bugsy", "Bugsy", "overworld", (0.0, 64.0, 0.0));
    world.join("ash", "Ash", "overworld", (12.0, 64.0, 3.0));
    world.join("gary", "Gary", "overworld", (200.0, 64.0, 0.0));

    let ports = HostPorts {
        players: world.clone(),
        engine: world.clone(),
        items: world.clone(),
        notifier: world.clone(),
        clock: Arc::new(SystemClock),
    };

    let ctx = match GymContext::open(ports, Arc::new(JsonFileStore::new(&data_dir))) {
        Ok(ctx) => ctx,
        Err(e) => {
            println!("Error opening gym data in '{}': {}", data_dir, e);
            return;
        }
    };

    let bugsy = PlayerId::from("bugsy");
    let ash = PlayerId::from("ash");
    let gary = PlayerId::from("gary");

    if ctx.gym_of(&bugsy) != Some(GymType::Bug) {
        ctx.set_leader(GymType::Bug, &bugsy, "Bugsy", "console");
    }
    if !ctx.gym_entry(GymType::Bug).leader_registered {
        let team = vec![
            TeamMember::new("Scyther", 50, "bugsy-1"),
            TeamMember::new("Heracross", 50, "bugsy-2"),
        ];
        match ctx.register_team(GymType::Bug, &bugsy, team) {
            Ok(team) => println!("Bugsy registered {} pokemon", team.members.len()),
            Err(e) => println!("Bugsy could not register a team: {}", e),
        }
    }
    if ctx.can_change_rules(GymType::Bug) {
        if let Err(e) = ctx.set_gym_rules(GymType::Bug, &bugsy, BattleFormat::Singles, 50) {
            println!("Bugsy could not set rules: {}", e);
        }
    }

    println!("=== Gym League Demo ===");
    println!("Data directory: {}", data_dir);
    println!("Open gyms: {:?}", ctx.active_gyms());
    let rules = ctx.gym_rules(GymType::Bug);
    println!("Bug gym rules: {:?}, level cap {}", rules.format, rules.level_cap);

    // Gary is too far away to challenge
    match ctx.propose_challenge(&gary, GymType::Bug) {
        Ok(id) => println!("Gary proposed challenge {}", id),
        Err(e) => println!("Gary cannot challenge: {}", e),
    }

    match ctx.propose_challenge(&ash, GymType::Bug) {
        Ok(id) => println!("Ash proposed challenge {}", id),
        Err(e) => {
            println!("Ash cannot challenge: {}", e);
            return;
        }
    }

    let battle = match ctx.accept_challenge(&bugsy) {
        Ok(battle) => battle,
        Err(e) => {
            println!("Bugsy could not accept: {}", e);
            return;
        }
    };
    println!(
        "{} started: {} vs {} at the {} gym",
        battle.handle, battle.challenger_name, battle.leader_name, battle.gym
    );

    let event = BattleEndedEvent::victory(&["ash", "bugsy"], &["ash"]);
    match ctx.report_battle_end(&event) {
        Some(record) => println!(
            "Recorded battle {}: {} (rewards claimed: {})",
            record.id, record.result, record.rewards_claimed
        ),
        None => println!("Battle end did not match any gym battle"),
    }

    println!();
    println!("--- Messages ---");
    for (player, message) in world.drain_messages() {
        println!("[{}] {}", player, message);
    }

    println!();
    println!("--- Ash ---");
    let stats = ctx.player_stats(&ash);
    println!(
        "Battles: {}  Wins: {}  Losses: {}  Win rate: {:.1}%",
        stats.total_battles,
        stats.wins,
        stats.losses,
        stats.win_rate()
    );
    println!("Badges: {:?}", stats.badges_earned);
    for stack in world.inventory("ash") {
        println!("  {}", stack);
    }
    println!(
        "Bugsy needs {} more battle(s) this month for the leader reward.",
        ctx.missing_battles_for_reward(&bugsy)
    );

    println!();
    println!("--- Battle log ({}) ---", ctx.current_month());
    match ctx.battle_log_tail(ctx.current_month(), 5) {
        Ok(lines) => lines.iter().for_each(|line| println!("{}", line)),
        Err(e) => println!("Error reading battle log: {}", e),
    }

    ctx.shutdown();
}
