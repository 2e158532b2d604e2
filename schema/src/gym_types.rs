use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// The closed set of gyms. One gym per elemental type, each with a single leader slot.
///
/// This enum carries identity only. Labels and colors live in
/// [`crate::presentation`] so the orchestration core stays free of chat concerns.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumIter,
    EnumString,
    EnumCount,
    IntoStaticStr,
    Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum GymType {
    Bug,
    Dark,
    Dragon,
    Electric,
    Fairy,
    Fighting,
    Fire,
    Flying,
    Ghost,
    Grass,
    Ground,
    Ice,
    Normal,
    Poison,
    Psychic,
    Rock,
    Steel,
    Water,
}

impl GymType {
    /// Stable lowercase id, used as the key in persisted documents.
    pub fn id(&self) -> &'static str {
        (*self).into()
    }

    /// Case-insensitive lookup by id. Returns `None` for unknown ids.
    pub fn from_id(id: &str) -> Option<GymType> {
        id.trim().parse().ok()
    }

    /// All gyms in declaration order.
    pub fn all() -> impl Iterator<Item = GymType> {
        GymType::iter()
    }
}
