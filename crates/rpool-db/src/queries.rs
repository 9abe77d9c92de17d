//! Load and save functions organized by component.

pub mod registry;
pub mod rewards;
pub mod stake;
pub mod token;
pub mod vault;
