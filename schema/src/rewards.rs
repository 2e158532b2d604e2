use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single item id with a count, as handed to the host's item delivery.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemStack {
    pub item_id: String,
    pub count: u32,
}

impl ItemStack {
    pub fn new(item_id: impl Into<String>, count: u32) -> Self {
        ItemStack {
            item_id: item_id.into(),
            count,
        }
    }
}

impl fmt::Display for ItemStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x {}", self.count, self.item_id)
    }
}

/// What a challenger receives for their first win of the month against a gym.
/// Empty ids and zero counts mean "not configured".
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct RewardSpec {
    pub badge_item_id: String,
    pub tm_item_id: String,
    pub coin_count: u32,
    pub extra_items: BTreeMap<String, u32>,
}

impl RewardSpec {
    /// Flatten the spec into item stacks: badge, TM, coins, then extras in id order.
    pub fn stacks(&self, coin_item_id: &str) -> Vec<ItemStack> {
        let mut stacks = Vec::new();
        if !self.badge_item_id.is_empty() {
            stacks.push(ItemStack::new(self.badge_item_id.clone(), 1));
        }
        if !self.tm_item_id.is_empty() {
            stacks.push(ItemStack::new(self.tm_item_id.clone(), 1));
        }
        if self.coin_count > 0 && !coin_item_id.is_empty() {
            stacks.push(ItemStack::new(coin_item_id, self.coin_count));
        }
        for (item_id, count) in &self.extra_items {
            if *count > 0 && !item_id.is_empty() {
                stacks.push(ItemStack::new(item_id.clone(), *count));
            }
        }
        stacks
    }

    pub fn is_empty(&self, coin_item_id: &str) -> bool {
        self.stacks(coin_item_id).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stacks_skip_unconfigured_entries() {
        let mut spec = RewardSpec {
            badge_item_id: "league:badge_bug".to_string(),
            tm_item_id: String::new(),
            coin_count: 3,
            extra_items: BTreeMap::new(),
        };
        spec.extra_items.insert("league:rare_candy".to_string(), 2);
        spec.extra_items.insert("league:nothing".to_string(), 0);

        let stacks = spec.stacks("league:silver_coin");
        assert_eq!(
            stacks,
            vec![
                ItemStack::new("league:badge_bug", 1),
                ItemStack::new("league:silver_coin", 3),
                ItemStack::new("league:rare_candy", 2),
            ]
        );
    }

    #[test]
    fn test_default_spec_is_empty() {
        assert!(RewardSpec::default().is_empty("league:silver_coin"));
    }
}
