//! Bulletin Fusion: a server-rendered discussion forum.
//!
//! Every request runs through an ordered pipeline of phases (input
//! sanitization, database, table snapshots, settings, routing, session, member,
//! localization) before a controller action renders the response.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
