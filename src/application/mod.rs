//! Request handling: the pipeline, its phases, controllers and the services
//! they share.

pub mod authentication;
pub mod context;
pub mod controllers;
pub mod error;
pub mod formatting;
pub mod localization;
pub mod phases;
pub mod pipeline;
pub mod reactions;
pub mod resources;
pub mod security;
pub mod services;
pub mod session;
pub mod topics;
pub mod urls;
