// Gym League Schema - Shared type definitions
// This crate contains the identity enums and plain data shapes shared between
// the orchestration core and the host binaries. Presentation metadata is kept
// in its own module so the core never needs it.

// Re-export the main types
pub use battle_data::*;
pub use gym_types::*;
pub use presentation::{presentation, ChatColor, GymPresentation};
pub use rewards::*;

pub mod battle_data;
pub mod gym_types;
pub mod presentation;
pub mod rewards;
