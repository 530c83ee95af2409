//! Core game logic. Keep this crate free of IO and platform concerns.

pub mod action;
pub mod ai;
pub mod dispatch;
pub mod entity;
pub mod events;
pub mod game;
pub mod metadata;
pub mod rng;
pub mod ruleset;
pub mod session;
pub mod vanilla;

pub use action::*;
pub use ai::*;
pub use dispatch::*;
pub use entity::*;
pub use events::*;
pub use game::*;
pub use metadata::*;
pub use rng::*;
pub use ruleset::*;
pub use session::*;
pub use vanilla::{VanillaConfig, VanillaRules};
