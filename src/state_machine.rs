//! Joule transition engine
//!
//! The directed graph over joule types: given the last settled joule of a
//! conversation, exactly one joule type may come next.

mod transition;

#[cfg(test)]
mod proptests;

pub use transition::{decide, next_joule_type, TransitionError};
