#[cfg(test)]
mod tests {
    use crate::calendar::MonthKey;
    use crate::tests::common::{at, bug_league, pid, TestLeagueBuilder};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use schema::{BattleResult, GymType};

    #[test]
    fn test_second_win_in_same_month_is_not_rewarded() {
        let league = bug_league();

        let first = league.play("ash", GymType::Bug, "ash");
        league.clock.set(at("2026-03-25T18:00:00Z"));
        let second = league.play("ash", GymType::Bug, "ash");

        assert!(first.rewards_claimed);
        assert!(!second.rewards_claimed);
        assert_eq!(second.result, BattleResult::ChallengerWin);
        assert_eq!(league.world.inventory_count("ash", "gym_league:badge_bug"), 1);
        assert!(league
            .world
            .messages_for("ash")
            .iter()
            .any(|line| line == "You already received this month's rewards for this gym."));
        assert_eq!(league.ctx.player_stats(&pid("ash")).wins, 2);
    }

    #[test]
    fn test_wins_in_consecutive_months_are_both_rewarded() {
        let league = bug_league();

        let march = league.play("ash", GymType::Bug, "ash");
        league.clock.set(at("2026-04-02T09:00:00Z"));
        let april = league.play("ash", GymType::Bug, "ash");

        assert!(march.rewards_claimed);
        assert!(april.rewards_claimed);
        assert_eq!(league.world.inventory_count("ash", "gym_league:badge_bug"), 2);
        assert!(league.ctx.has_claimed(&pid("ash"), GymType::Bug, "2026-03".parse().unwrap()));
        assert!(league.ctx.has_claimed(&pid("ash"), GymType::Bug, "2026-04".parse().unwrap()));
    }

    #[test]
    fn test_claims_are_per_gym() {
        let league = TestLeagueBuilder::new()
            .with_leader(GymType::Bug, "bugsy", "Bugsy", (0.0, 64.0, 0.0))
            .with_leader(GymType::Rock, "brock", "Brock", (0.0, 64.0, 5.0))
            .with_player("ash", "Ash", (10.0, 64.0, 0.0))
            .build();

        assert!(league.play("ash", GymType::Bug, "ash").rewards_claimed);
        assert!(league.play("ash", GymType::Rock, "ash").rewards_claimed);

        let badges = league.ctx.player_stats(&pid("ash")).badges_earned;
        assert!(badges.contains(&GymType::Bug) && badges.contains(&GymType::Rock));
    }

    #[rstest]
    // Berlin is on summer time (UTC+2) at the end of March and June
    #[case("2026-03-31T22:30:00Z", "2026-04")]
    #[case("2026-03-31T21:59:59Z", "2026-03")]
    #[case("2026-06-30T22:30:00Z", "2026-07")]
    #[case("2026-06-30T21:59:59Z", "2026-06")]
    // and on winter time (UTC+1) at the end of January
    #[case("2026-01-31T23:30:00Z", "2026-02")]
    fn test_claim_month_follows_berlin_time(#[case] instant: &str, #[case] expected: &str) {
        let league = TestLeagueBuilder::new()
            .with_leader(GymType::Bug, "bugsy", "Bugsy", (0.0, 64.0, 0.0))
            .with_player("ash", "Ash", (10.0, 64.0, 0.0))
            .starting_at(instant)
            .build();

        league.play("ash", GymType::Bug, "ash");

        let month: MonthKey = expected.parse().unwrap();
        assert_eq!(league.ctx.current_month(), month);
        assert!(league.ctx.has_claimed(&pid("ash"), GymType::Bug, month));
    }

    #[test]
    fn test_claim_month_follows_configured_zone() {
        let league = TestLeagueBuilder::new()
            .with_leader(GymType::Bug, "bugsy", "Bugsy", (0.0, 64.0, 0.0))
            .with_player("ash", "Ash", (10.0, 64.0, 0.0))
            .starting_at("2026-06-30T22:30:00Z")
            .build();
        league
            .ctx
            .update_settings(|settings| settings.operational_time_zone = "UTC".to_string());

        league.play("ash", GymType::Bug, "ash");

        assert!(league.ctx.has_claimed(&pid("ash"), GymType::Bug, "2026-06".parse().unwrap()));
    }

    #[test]
    fn test_leader_reward_gate() {
        let league = bug_league();
        assert_eq!(league.ctx.missing_battles_for_reward(&pid("bugsy")), 10);
        assert!(!league.ctx.is_eligible_for_leader_reward(&pid("bugsy")));

        for _ in 0..10 {
            league.play("ash", GymType::Bug, "bugsy");
        }

        assert_eq!(league.ctx.missing_battles_for_reward(&pid("bugsy")), 0);
        assert!(league.ctx.is_eligible_for_leader_reward(&pid("bugsy")));
        // Not a leader, however many battles
        assert!(!league.ctx.is_eligible_for_leader_reward(&pid("ash")));

        league.clock.set(at("2026-04-01T12:00:00Z"));
        assert_eq!(league.ctx.missing_battles_for_reward(&pid("bugsy")), 10);
        assert_eq!(league.ctx.player_stats(&pid("bugsy")).wins_as_leader, 10);
    }
}
