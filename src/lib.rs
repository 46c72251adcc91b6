//! Idea Consult — client-side session orchestrator for the idea consultation
//! engine.

pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod identity;
pub mod progress;
pub mod session;
pub mod store;
pub mod validation;
