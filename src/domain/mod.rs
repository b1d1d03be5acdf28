//! Domain layer types and invariants.

pub mod content;
pub mod error;
pub mod members;
pub mod resources;
pub mod sessions;
pub mod settings;
pub mod types;
