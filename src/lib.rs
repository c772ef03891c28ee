//! stepwizard - multi-step entity wizards for the delivery platform
//!
//! Sequences form steps for connectors, manifest sources and artifact
//! sources, threads an accumulated context between them and submits the
//! mapped payload through a [`submit::SubmissionAdapter`]. Also carries the
//! route table that maps navigation intents to scoped URL paths.

pub mod api;
pub mod config;
pub mod entities;
pub mod fetch;
pub mod logging;
pub mod routes;
pub mod scope;
pub mod submit;
pub mod wizard;
