//! Gym League MCP Server
//!
//! Exposes the gym league over the Model Context Protocol (rmcp, stdio
//! transport). Players live in a simulated world, so a client can stage
//! challenges, report how battles ended and inspect the ledger.

use std::borrow::Cow;
use std::sync::Arc;

use gym_league::{
    BattleEndedEvent, BattleFormat, GymContext, GymType, HostPorts, JsonFileStore, MonthKey,
    PlayerId, SimulatedWorld, SystemClock, TeamMember,
};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{ErrorData as McpError, *},
    schemars, tool, tool_handler, tool_router, ServerHandler, ServiceExt,
};
use serde::Deserialize;
use tokio::io::{stdin, stdout};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct GymLeagueService {
    tool_router: ToolRouter<GymLeagueService>,
    ctx: Arc<GymContext>,
    world: Arc<SimulatedWorld>,
}

// Tool request structures
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct JoinPlayerRequest {
    #[schemars(description = "Stable player id")]
    pub player_id: String,
    #[schemars(description = "Display name")]
    pub name: String,
    #[schemars(description = "World the player is in, e.g. 'overworld'")]
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct PlayerRequest {
    #[schemars(description = "Stable player id")]
    pub player_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SetLeaderRequest {
    #[schemars(description = "Gym id, e.g. 'bug' or 'water'")]
    pub gym: String,
    pub player_id: String,
    pub player_name: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RemoveLeaderRequest {
    #[schemars(description = "Gym id, e.g. 'bug' or 'water'")]
    pub gym: String,
    #[schemars(description = "Reason recorded in the leader history")]
    pub reason: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ChallengeRequest {
    #[schemars(description = "Id of the challenging player")]
    pub player_id: String,
    #[schemars(description = "Gym id to challenge")]
    pub gym: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ReportBattleRequest {
    #[schemars(description = "Ids of every human participant")]
    pub participants: Vec<String>,
    #[schemars(description = "'victory', 'draw' or 'aborted'")]
    pub outcome: String,
    #[schemars(description = "Winning player ids, for 'victory'")]
    #[serde(default)]
    pub winners: Vec<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct TeamMemberRequest {
    pub species: String,
    pub level: u32,
    #[schemars(description = "Id of this pokemon in the leader's party")]
    pub member_id: String,
    #[serde(default)]
    pub form: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RegisterTeamRequest {
    #[schemars(description = "Gym id, e.g. 'bug' or 'water'")]
    pub gym: String,
    #[schemars(description = "Id of the gym's leader")]
    pub player_id: String,
    pub team: Vec<TeamMemberRequest>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GymRulesRequest {
    #[schemars(description = "Gym id, e.g. 'bug' or 'water'")]
    pub gym: String,
    #[schemars(description = "Leader making the change; omit to override as an admin")]
    pub player_id: Option<String>,
    #[schemars(description = "'singles' or 'doubles'")]
    pub format: String,
    #[schemars(description = "Level cap, 50 or 100")]
    pub level_cap: u32,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GymRequest {
    #[schemars(description = "Gym id, e.g. 'bug' or 'water'")]
    pub gym: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct BattleLogRequest {
    #[schemars(description = "Month as YYYY-MM; the current month when omitted")]
    pub month: Option<String>,
    #[schemars(description = "Number of lines to return (default 20)")]
    pub lines: Option<usize>,
}

fn invalid_params(message: String) -> McpError {
    McpError {
        code: ErrorCode(-32602),
        message: Cow::from(message),
        data: None,
    }
}

fn parse_gym(raw: &str) -> Result<GymType, McpError> {
    GymType::from_id(raw).ok_or_else(|| invalid_params(format!("Unknown gym '{}'", raw)))
}

fn parse_format(raw: &str) -> Result<BattleFormat, McpError> {
    match raw.to_lowercase().as_str() {
        "singles" => Ok(BattleFormat::Singles),
        "doubles" => Ok(BattleFormat::Doubles),
        other => Err(invalid_params(format!("Unknown battle format '{}'", other))),
    }
}

fn text(text: impl Into<String>) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(text.into())]))
}

#[tool_router]
impl GymLeagueService {
    pub fn new(ctx: Arc<GymContext>, world: Arc<SimulatedWorld>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            ctx,
            world,
        }
    }

    #[tool(description = "Connect a player to the simulated world at a position")]
    async fn join_player(
        &self,
        Parameters(request): Parameters<JoinPlayerRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.world.join(
            &request.player_id,
            &request.name,
            &request.world,
            (request.x, request.y, request.z),
        );
        text(format!("{} joined {}.", request.name, request.world))
    }

    #[tool(description = "Disconnect a player from the simulated world")]
    async fn leave_player(
        &self,
        Parameters(request): Parameters<PlayerRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.world.leave(&request.player_id);
        text(format!("{} left.", request.player_id))
    }

    #[tool(description = "Assign a player as the leader of a gym")]
    async fn set_leader(
        &self,
        Parameters(request): Parameters<SetLeaderRequest>,
    ) -> Result<CallToolResult, McpError> {
        let gym = parse_gym(&request.gym)?;
        let change = self.ctx.set_leader(
            gym,
            &PlayerId::from(request.player_id),
            &request.player_name,
            "mcp",
        );
        text(format!(
            "{} now leads the {} gym.",
            change.leader().player_name,
            change.gym()
        ))
    }

    #[tool(description = "Remove the current leader of a gym")]
    async fn remove_leader(
        &self,
        Parameters(request): Parameters<RemoveLeaderRequest>,
    ) -> Result<CallToolResult, McpError> {
        let gym = parse_gym(&request.gym)?;
        match self.ctx.remove_leader(gym, "mcp", &request.reason) {
            Ok(previous) => text(format!("{} is no longer the {} leader.", previous.player_name, gym)),
            Err(e) => text(format!("Error: {}", e)),
        }
    }

    #[tool(description = "Register the team a leader will battle with")]
    async fn register_team(
        &self,
        Parameters(request): Parameters<RegisterTeamRequest>,
    ) -> Result<CallToolResult, McpError> {
        let gym = parse_gym(&request.gym)?;
        let members = request
            .team
            .into_iter()
            .map(|member| {
                let mut entry = TeamMember::new(&member.species, member.level, &member.member_id);
                entry.form = member.form.to_lowercase();
                entry
            })
            .collect();
        match self
            .ctx
            .register_team(gym, &PlayerId::from(request.player_id), members)
        {
            Ok(team) => text(format!(
                "{} registered {} pokemon for the {} gym.",
                team.leader_name,
                team.members.len(),
                gym
            )),
            Err(e) => text(format!("Error: {}", e)),
        }
    }

    #[tool(description = "Set a gym's battle format and level cap")]
    async fn set_gym_rules(
        &self,
        Parameters(request): Parameters<GymRulesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let gym = parse_gym(&request.gym)?;
        let format = parse_format(&request.format)?;
        let result = match request.player_id {
            Some(player) => {
                self.ctx
                    .set_gym_rules(gym, &PlayerId::from(player), format, request.level_cap)
            }
            None => self.ctx.force_gym_rules(gym, format, request.level_cap),
        };
        match result {
            Ok(rules) => text(format!(
                "The {} gym now battles {:?} at level {}.",
                gym, rules.format, rules.level_cap
            )),
            Err(e) => text(format!("Error: {}", e)),
        }
    }

    #[tool(description = "Clear a gym leader's team so it must be registered again")]
    async fn reset_leader_team(
        &self,
        Parameters(request): Parameters<GymRequest>,
    ) -> Result<CallToolResult, McpError> {
        let gym = parse_gym(&request.gym)?;
        if self.ctx.reset_leader_team(gym) {
            text(format!("The {} gym leader must register a new team.", gym))
        } else {
            text(format!("The {} gym has no registered team.", gym))
        }
    }

    #[tool(description = "Let a gym leader change rules again right away")]
    async fn reset_gym_rules(
        &self,
        Parameters(request): Parameters<GymRequest>,
    ) -> Result<CallToolResult, McpError> {
        let gym = parse_gym(&request.gym)?;
        if self.ctx.reset_gym_rules(gym) {
            text(format!("Rules cooldown cleared for the {} gym.", gym))
        } else {
            text(format!("The {} gym has no registered team.", gym))
        }
    }

    #[tool(description = "Challenge the leader of a gym")]
    async fn challenge(
        &self,
        Parameters(request): Parameters<ChallengeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let gym = parse_gym(&request.gym)?;
        match self
            .ctx
            .propose_challenge(&PlayerId::from(request.player_id), gym)
        {
            Ok(id) => text(format!("Challenge {} sent.", id)),
            Err(e) => text(format!("Error: {}", e)),
        }
    }

    #[tool(description = "Accept the challenge waiting for a leader and start the battle")]
    async fn accept(
        &self,
        Parameters(request): Parameters<PlayerRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.ctx.accept_challenge(&PlayerId::from(request.player_id)) {
            Ok(battle) => text(format!(
                "{} started: {} vs {} at the {} gym.",
                battle.handle, battle.challenger_name, battle.leader_name, battle.gym
            )),
            Err(e) => text(format!("Error: {}", e)),
        }
    }

    #[tool(description = "Decline the challenge waiting for a leader")]
    async fn decline(
        &self,
        Parameters(request): Parameters<PlayerRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.ctx.decline_challenge(&PlayerId::from(request.player_id)) {
            Ok(challenge) => text(format!("Declined the challenge from {}.", challenge.challenger_name)),
            Err(e) => text(format!("Error: {}", e)),
        }
    }

    #[tool(description = "Withdraw a challenger's pending challenge")]
    async fn withdraw(
        &self,
        Parameters(request): Parameters<PlayerRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.ctx.withdraw_challenge(&PlayerId::from(request.player_id)) {
            Ok(challenge) => text(format!("Withdrew the challenge to {}.", challenge.leader_name)),
            Err(e) => text(format!("Error: {}", e)),
        }
    }

    #[tool(description = "Report that the battle engine finished a battle")]
    async fn report_battle(
        &self,
        Parameters(request): Parameters<ReportBattleRequest>,
    ) -> Result<CallToolResult, McpError> {
        let participants: Vec<&str> = request.participants.iter().map(String::as_str).collect();
        let winners: Vec<&str> = request.winners.iter().map(String::as_str).collect();
        let event = match request.outcome.to_lowercase().as_str() {
            "victory" => BattleEndedEvent::victory(&participants, &winners),
            "draw" => BattleEndedEvent::draw(&participants),
            "aborted" => BattleEndedEvent::aborted(&participants),
            other => return Err(invalid_params(format!("Unknown outcome '{}'", other))),
        };
        match self.ctx.report_battle_end(&event) {
            Some(record) => text(format!(
                "Recorded {} gym battle: {} (rewards claimed: {}).",
                record.gym, record.result, record.rewards_claimed
            )),
            None => text("No active gym battle matched those participants."),
        }
    }

    #[tool(description = "Cancel the active gym battle a player is in")]
    async fn force_cancel(
        &self,
        Parameters(request): Parameters<PlayerRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.ctx.force_cancel(&PlayerId::from(request.player_id)) {
            Some(record) => text(format!(
                "Cancelled the {} battle between {} and {}.",
                record.gym, record.challenger_name, record.leader_name
            )),
            None => text("That player is not in a gym battle."),
        }
    }

    #[tool(description = "List every gym with its leader and availability")]
    async fn gym_status(&self) -> Result<CallToolResult, McpError> {
        let mut lines = Vec::new();
        for gym in GymType::all() {
            let entry = self.ctx.gym_entry(gym);
            let leader = match &entry.leader {
                Some(leader) => leader.player_name.clone(),
                None => "vacant".to_string(),
            };
            lines.push(format!(
                "{:<10} {:<18} leader: {:<16} {}",
                gym.id(),
                entry.display_name,
                leader,
                if entry.is_open() { "open" } else { "closed" }
            ));
        }
        for battle in self.ctx.active_battles() {
            lines.push(format!(
                "Active {}: {} vs {} ({})",
                battle.handle, battle.challenger_name, battle.leader_name, battle.gym
            ));
        }
        text(lines.join("\n"))
    }

    #[tool(description = "Show a player's gym statistics")]
    async fn player_stats(
        &self,
        Parameters(request): Parameters<PlayerRequest>,
    ) -> Result<CallToolResult, McpError> {
        let player = PlayerId::from(request.player_id);
        let stats = self.ctx.player_stats(&player);
        let badges: Vec<&str> = stats.badges_earned.iter().map(|gym| gym.id()).collect();
        let mut out = format!(
            "{}: {} battles, {} wins, {} losses ({:.1}% win rate)\nBadges: {}",
            player,
            stats.total_battles,
            stats.wins,
            stats.losses,
            stats.win_rate(),
            if badges.is_empty() { "none".to_string() } else { badges.join(", ") }
        );
        if let Some(gym) = self.ctx.gym_of(&player) {
            out.push_str(&format!(
                "\nLeads the {} gym: {} battles as leader, {} more needed for this month's reward",
                gym,
                stats.battles_as_leader,
                self.ctx.missing_battles_for_reward(&player)
            ));
        }
        text(out)
    }

    #[tool(description = "Drain chat messages sent to players since the last call")]
    async fn messages(&self) -> Result<CallToolResult, McpError> {
        let lines: Vec<String> = self
            .world
            .drain_messages()
            .into_iter()
            .map(|(player, message)| format!("[{}] {}", player, message))
            .collect();
        if lines.is_empty() {
            return text("No new messages.");
        }
        text(lines.join("\n"))
    }

    #[tool(description = "Show the tail of a month's battle log")]
    async fn battle_log(
        &self,
        Parameters(request): Parameters<BattleLogRequest>,
    ) -> Result<CallToolResult, McpError> {
        let month = match request.month {
            Some(raw) => raw
                .parse::<MonthKey>()
                .map_err(|_| invalid_params(format!("Invalid month '{}'", raw)))?,
            None => self.ctx.current_month(),
        };
        match self.ctx.battle_log_tail(month, request.lines.unwrap_or(20)) {
            Ok(lines) if lines.is_empty() => text(format!("No battles logged for {}.", month)),
            Ok(lines) => text(lines.join("\n")),
            Err(e) => text(format!("Error: {}", e)),
        }
    }

    #[tool(description = "Show the tail of the leader history")]
    async fn leader_history(&self) -> Result<CallToolResult, McpError> {
        match self.ctx.leader_history_tail(20) {
            Ok(lines) if lines.is_empty() => text("No leader changes recorded."),
            Ok(lines) => text(lines.join("\n")),
            Err(e) => text(format!("Error: {}", e)),
        }
    }
}

#[tool_handler]
impl ServerHandler for GymLeagueService {}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries the protocol; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let data_dir = std::env::var("GYM_LEAGUE_DATA_DIR").unwrap_or_else(|_| "gym_data".to_string());
    let world = Arc::new(SimulatedWorld::new());
    let ports = HostPorts {
        players: world.clone(),
        engine: world.clone(),
        items: world.clone(),
        notifier: world.clone(),
        clock: Arc::new(SystemClock),
    };
    let ctx = Arc::new(GymContext::open(ports, Arc::new(JsonFileStore::new(&data_dir)))?);

    info!(data_dir = %data_dir, "Gym League MCP server starting");
    let service = GymLeagueService::new(ctx.clone(), world);
    let server = service.serve((stdin(), stdout())).await?;

    let quit_reason = server.waiting().await?;
    info!(?quit_reason, "Gym League MCP server exiting");
    ctx.shutdown();
    Ok(())
}
