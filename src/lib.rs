//! Joule engine
//!
//! Turn-taking core for human/bot collaborative editing. Every conversation is
//! an ordered history of joules, and at every point exactly one joule type may
//! come next.

// Library-only pedantic lints
#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod conversation;
pub mod db;
pub mod joule;
pub mod rpc;
pub mod runtime;
pub mod state_machine;
