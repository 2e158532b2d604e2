use crate::errors::DeliveryError;
use crate::ports::ItemDelivery;
use schema::{ItemStack, PlayerId, RewardSpec};
use tracing::warn;

/// Where a single reward stack ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    AddedToInventory,
    /// The inventory was full; the stack was dropped next to the player
    PlacedNearby,
    Failed(DeliveryError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackDelivery {
    pub stack: ItemStack,
    pub outcome: DeliveryOutcome,
}

/// Per-stack result of one grant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantReport {
    pub deliveries: Vec<StackDelivery>,
}

impl GrantReport {
    /// At least one stack reached the player, in the inventory or beside them.
    pub fn any_delivered(&self) -> bool {
        self.deliveries
            .iter()
            .any(|d| !matches!(d.outcome, DeliveryOutcome::Failed(_)))
    }

    pub fn failures(&self) -> impl Iterator<Item = &StackDelivery> {
        self.deliveries
            .iter()
            .filter(|d| matches!(d.outcome, DeliveryOutcome::Failed(_)))
    }

    pub fn placed_nearby(&self) -> usize {
        self.deliveries
            .iter()
            .filter(|d| d.outcome == DeliveryOutcome::PlacedNearby)
            .count()
    }

    /// Delivered stacks whose item id is `item_id`.
    pub fn delivered(&self, item_id: &str) -> bool {
        self.deliveries.iter().any(|d| {
            d.stack.item_id == item_id && !matches!(d.outcome, DeliveryOutcome::Failed(_))
        })
    }
}

/// Turns a reward spec into item deliveries through the host.
#[derive(Debug, Clone)]
pub struct RewardGrantor {
    coin_item_id: String,
}

impl RewardGrantor {
    pub fn new(coin_item_id: impl Into<String>) -> Self {
        RewardGrantor {
            coin_item_id: coin_item_id.into(),
        }
    }

    pub fn coin_item_id(&self) -> &str {
        &self.coin_item_id
    }

    /// Hand out every configured stack in order: badge, TM, coins, extras.
    pub fn grant(
        &self,
        player: &PlayerId,
        spec: &RewardSpec,
        items: &dyn ItemDelivery,
    ) -> GrantReport {
        let deliveries = spec
            .stacks(&self.coin_item_id)
            .into_iter()
            .map(|stack| {
                let outcome = deliver(player, &stack, items);
                if let DeliveryOutcome::Failed(err) = &outcome {
                    warn!(player = %player, item = %stack, error = %err, "Reward delivery failed");
                }
                StackDelivery { stack, outcome }
            })
            .collect();
        GrantReport { deliveries }
    }
}

fn deliver(player: &PlayerId, stack: &ItemStack, items: &dyn ItemDelivery) -> DeliveryOutcome {
    match items.add_to_inventory(player, stack) {
        Ok(true) => DeliveryOutcome::AddedToInventory,
        Ok(false) => match items.place_near(player, stack) {
            Ok(()) => DeliveryOutcome::PlacedNearby,
            Err(err) => DeliveryOutcome::Failed(err),
        },
        Err(err) => DeliveryOutcome::Failed(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SimulatedWorld;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn spec() -> RewardSpec {
        let mut extra_items = BTreeMap::new();
        extra_items.insert("gym_league:rare_candy".to_string(), 2);
        RewardSpec {
            badge_item_id: "gym_league:badge_bug".to_string(),
            tm_item_id: "gym_league:tm_bug_bite".to_string(),
            coin_count: 3,
            extra_items,
        }
    }

    #[test]
    fn test_grant_fills_inventory_in_order() {
        let world = SimulatedWorld::new();
        world.join("ash", "Ash", "overworld", (0.0, 64.0, 0.0));
        let grantor = RewardGrantor::new("gym_league:silver_coin");

        let report = grantor.grant(&PlayerId::from("ash"), &spec(), &world);

        let ids: Vec<&str> = report
            .deliveries
            .iter()
            .map(|d| d.stack.item_id.as_str())
            .collect();
        assert_eq!(
            ids,
            vec![
                "gym_league:badge_bug",
                "gym_league:tm_bug_bite",
                "gym_league:silver_coin",
                "gym_league:rare_candy"
            ]
        );
        assert!(report.any_delivered());
        assert_eq!(report.failures().count(), 0);
        assert_eq!(world.inventory_count("ash", "gym_league:silver_coin"), 3);
    }

    #[test]
    fn test_full_inventory_places_items_nearby() {
        let world = SimulatedWorld::new();
        world.join("ash", "Ash", "overworld", (0.0, 64.0, 0.0));
        world.set_inventory_capacity("ash", 1);
        let grantor = RewardGrantor::new("gym_league:silver_coin");

        let report = grantor.grant(&PlayerId::from("ash"), &spec(), &world);

        assert_eq!(report.deliveries[0].outcome, DeliveryOutcome::AddedToInventory);
        assert_eq!(report.placed_nearby(), 3);
        assert_eq!(world.dropped_near("ash").len(), 3);
        assert_eq!(report.failures().count(), 0);
    }

    #[test]
    fn test_offline_player_gets_failures() {
        let world = SimulatedWorld::new();
        let grantor = RewardGrantor::new("gym_league:silver_coin");

        let report = grantor.grant(&PlayerId::from("ghost"), &spec(), &world);

        assert!(!report.any_delivered());
        assert_eq!(report.failures().count(), 4);
    }
}
