// Presentation metadata for gyms, kept apart from `GymType` so that only
// message-producing code needs to know about labels and colors.

use crate::gym_types::GymType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chat palette used by the host when rendering gym names.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatColor {
    White,
    Gray,
    DarkGray,
    Red,
    DarkRed,
    Gold,
    Yellow,
    Green,
    Aqua,
    Blue,
    LightPurple,
    DarkPurple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GymPresentation {
    pub gym: GymType,
    pub label: &'static str,
    pub color: ChatColor,
}

impl GymPresentation {
    /// "Bug Gym", "Electric Gym", ...
    pub fn gym_title(&self) -> String {
        format!("{} Gym", self.label)
    }

    pub fn badge_title(&self) -> String {
        format!("{} Badge", self.label)
    }
}

impl fmt::Display for GymPresentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

static PRESENTATION_TABLE: [GymPresentation; 18] = [
    GymPresentation { gym: GymType::Bug, label: "Bug", color: ChatColor::Green },
    GymPresentation { gym: GymType::Dark, label: "Dark", color: ChatColor::DarkGray },
    GymPresentation { gym: GymType::Dragon, label: "Dragon", color: ChatColor::DarkPurple },
    GymPresentation { gym: GymType::Electric, label: "Electric", color: ChatColor::Yellow },
    GymPresentation { gym: GymType::Fairy, label: "Fairy", color: ChatColor::LightPurple },
    GymPresentation { gym: GymType::Fighting, label: "Fighting", color: ChatColor::DarkRed },
    GymPresentation { gym: GymType::Fire, label: "Fire", color: ChatColor::Red },
    GymPresentation { gym: GymType::Flying, label: "Flying", color: ChatColor::Aqua },
    GymPresentation { gym: GymType::Ghost, label: "Ghost", color: ChatColor::DarkPurple },
    GymPresentation { gym: GymType::Grass, label: "Grass", color: ChatColor::Green },
    GymPresentation { gym: GymType::Ground, label: "Ground", color: ChatColor::Gold },
    GymPresentation { gym: GymType::Ice, label: "Ice", color: ChatColor::Aqua },
    GymPresentation { gym: GymType::Normal, label: "Normal", color: ChatColor::White },
    GymPresentation { gym: GymType::Poison, label: "Poison", color: ChatColor::DarkPurple },
    GymPresentation { gym: GymType::Psychic, label: "Psychic", color: ChatColor::LightPurple },
    GymPresentation { gym: GymType::Rock, label: "Rock", color: ChatColor::Gold },
    GymPresentation { gym: GymType::Steel, label: "Steel", color: ChatColor::Gray },
    GymPresentation { gym: GymType::Water, label: "Water", color: ChatColor::Blue },
];

/// Look up the label and color for a gym.
pub fn presentation(gym: GymType) -> &'static GymPresentation {
    // The table is declared in enum order.
    &PRESENTATION_TABLE[gym as usize]
}
