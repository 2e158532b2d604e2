#[cfg(test)]
mod tests {
    use crate::context::BattleEventSink;
    use crate::correlator::BattleEndedEvent;
    use crate::ledger::BattleRecord;
    use crate::tests::common::{bug_league, pid};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use schema::{BattleResult, GymType};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_duplicate_end_event_grants_once() {
        let league = bug_league();
        league.start_battle("ash", GymType::Bug);
        let event = BattleEndedEvent::victory(&["ash", "bugsy"], &["ash"]);

        let first = league.ctx.report_battle_end(&event);
        let second = league.ctx.report_battle_end(&event);

        assert!(first.unwrap().rewards_claimed);
        assert_eq!(second, None);
        assert_eq!(league.ctx.recent_battles(10).len(), 1);
        assert_eq!(league.world.inventory_count("ash", "gym_league:badge_bug"), 1);
    }

    #[test]
    fn test_concurrent_end_events_grant_once() {
        let league = bug_league();
        league.start_battle("ash", GymType::Bug);
        let event = BattleEndedEvent::victory(&["bugsy", "ash"], &["ash"]);

        let matched: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| league.ctx.report_battle_end(&event).is_some()))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap() as usize)
                .sum()
        });

        assert_eq!(matched, 1);
        assert_eq!(league.ctx.battles_for(&pid("ash")).len(), 1);
        assert_eq!(league.world.inventory_count("ash", "gym_league:badge_bug"), 1);
    }

    #[rstest]
    #[case(BattleEndedEvent::victory(&["ash", "bugsy"], &["bugsy"]), BattleResult::LeaderWin, 0, 1, 1)]
    #[case(BattleEndedEvent::draw(&["ash", "bugsy"]), BattleResult::Draw, 0, 0, 0)]
    #[case(BattleEndedEvent::aborted(&["ash", "bugsy"]), BattleResult::Cancelled, 0, 0, 0)]
    fn test_non_winning_outcomes_are_recorded_without_reward(
        #[case] event: BattleEndedEvent,
        #[case] expected: BattleResult,
        #[case] wins: u32,
        #[case] losses: u32,
        #[case] leader_wins: u32,
    ) {
        let league = bug_league();
        league.start_battle("ash", GymType::Bug);

        let record = league.ctx.report_battle_end(&event).unwrap();

        assert_eq!(record.result, expected);
        assert!(!record.rewards_claimed);
        assert!(league.world.inventory("ash").is_empty());
        let ash = league.ctx.player_stats(&pid("ash"));
        assert_eq!((ash.total_battles, ash.wins, ash.losses), (1, wins, losses));
        let bugsy = league.ctx.player_stats(&pid("bugsy"));
        assert_eq!((bugsy.battles_as_leader, bugsy.wins_as_leader), (1, leader_wins));
        assert_eq!(
            league
                .ctx
                .leader_battles_in(league.ctx.current_month(), &pid("bugsy")),
            1
        );
    }

    #[test]
    fn test_unrelated_battles_are_ignored() {
        let league = bug_league();
        league.start_battle("ash", GymType::Bug);

        // A wild battle, a different pair and a three-way battle
        assert_eq!(
            league
                .ctx
                .report_battle_end(&BattleEndedEvent::victory(&["ash"], &["ash"])),
            None
        );
        assert_eq!(
            league
                .ctx
                .report_battle_end(&BattleEndedEvent::victory(&["ash", "gary"], &["ash"])),
            None
        );
        assert_eq!(
            league.ctx.report_battle_end(&BattleEndedEvent::victory(
                &["ash", "bugsy", "gary"],
                &["ash"]
            )),
            None
        );
        assert!(league.ctx.active_battle_for(&pid("bugsy")).is_some());
    }

    #[test]
    fn test_sink_and_listeners_see_every_record() {
        let league = bug_league();
        let seen: Arc<Mutex<Vec<BattleRecord>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        league
            .ctx
            .on_battle_resolved(move |record| sink.lock().unwrap().push(record.clone()));

        league.start_battle("ash", GymType::Bug);
        let engine_callback: &dyn BattleEventSink = &league.ctx;
        engine_callback.battle_ended(&BattleEndedEvent::victory(&["ash", "bugsy"], &["ash"]));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].challenger_id, pid("ash"));
        assert_eq!(seen[0].result, BattleResult::ChallengerWin);
    }

    #[test]
    fn test_listener_may_call_back_into_context() {
        let league = Arc::new(bug_league());
        let inner = Arc::downgrade(&league);
        let observed = Arc::new(Mutex::new(None));
        let out = observed.clone();
        league.ctx.on_battle_resolved(move |record| {
            if let Some(league) = inner.upgrade() {
                *out.lock().unwrap() = Some(league.ctx.player_stats(&record.challenger_id).wins);
            }
        });

        league.play("ash", GymType::Bug, "ash");

        assert_eq!(*observed.lock().unwrap(), Some(1));
    }

    #[test]
    fn test_force_cancel_records_cancelled_battle() {
        let league = bug_league();
        league.start_battle("ash", GymType::Bug);

        let record = league.ctx.force_cancel(&pid("bugsy")).unwrap();

        assert_eq!(record.result, BattleResult::Cancelled);
        assert!(league.ctx.active_battles().is_empty());
        assert_eq!(league.ctx.force_cancel(&pid("bugsy")), None);
        assert_eq!(
            league.finish("ash", "bugsy", "ash"),
            None,
            "late engine callback must not resolve a cancelled battle"
        );
    }

    #[test]
    fn test_full_inventory_drops_rewards_nearby() {
        let league = bug_league();
        league.world.set_inventory_capacity("ash", 0);

        let record = league.play("ash", GymType::Bug, "ash");

        assert!(record.rewards_claimed);
        let dropped = league.world.dropped_near("ash");
        assert_eq!(dropped.len(), 2);
        assert!(dropped.iter().any(|stack| stack.item_id == "gym_league:badge_bug"));
        assert!(league
            .world
            .messages_for("ash")
            .iter()
            .any(|line| line.contains("dropped at your feet")));
    }

    #[test]
    fn test_offline_winner_keeps_claim_open() {
        let league = bug_league();
        league.start_battle("ash", GymType::Bug);
        league.world.leave("ash");

        let record = league.finish("ash", "bugsy", "ash").unwrap();
        assert!(!record.rewards_claimed);
        assert!(!league.ctx.has_claimed_this_month(&pid("ash"), GymType::Bug));

        league.world.join("ash", "Ash", "overworld", (10.0, 64.0, 0.0));
        let rematch = league.play("ash", GymType::Bug, "ash");
        assert!(rematch.rewards_claimed);
        assert!(league.ctx.has_claimed_this_month(&pid("ash"), GymType::Bug));
    }

    #[test]
    fn test_failed_deliveries_are_surfaced() {
        let league = bug_league();
        league.world.reject_item("gym_league:silver_coin");

        let record = league.play("ash", GymType::Bug, "ash");

        // The badge still arrived, so the claim counts
        assert!(record.rewards_claimed);
        assert!(league
            .world
            .messages_for("ash")
            .iter()
            .any(|line| line.contains("could not be delivered")));
        league.ctx.flush().unwrap();
        let month = league.ctx.current_month();
        let log = league
            .store
            .audit_lines(crate::audit::AuditLog::Battles(month));
        assert!(log.iter().any(|line| line.contains("REWARD FAILED")));
    }
}
