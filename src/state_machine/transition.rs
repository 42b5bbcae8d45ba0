//! Pure transition function
//!
//! Every settled joule maps to exactly one next joule type. The match below
//! has no catch-all arm: adding a joule variant or a stop reason must fail to
//! compile until its edge is declared here.

use crate::joule::{Joule, JouleBody, JouleId, JouleType, Outcome, Settled, StopReason};
use thiserror::Error;

/// Errors that can occur when deciding the next joule type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Joule {id} is still partial, next joule type is not yet decidable")]
    Undecidable { id: JouleId },
}

/// Edges of the joule state graph.
///
/// This function is pure - given the same inputs, it always produces the same
/// output, with no I/O side effects.
pub fn next_joule_type(last: Option<Settled<'_>>) -> JouleType {
    let Some(last) = last else {
        return JouleType::HumanChat;
    };

    match (last.outcome(), last.body()) {
        // A failed turn hands control back to the human
        (
            Outcome::Error,
            JouleBody::HumanChat { .. }
            | JouleBody::HumanConfirmCode { .. }
            | JouleBody::BotChat { .. }
            | JouleBody::BotCode { .. },
        ) => JouleType::HumanChat,

        (Outcome::Complete, JouleBody::HumanChat { .. }) => JouleType::BotChat,
        (Outcome::Complete, JouleBody::BotCode { .. }) => JouleType::HumanChat,

        (
            Outcome::Complete,
            JouleBody::BotChat {
                stop_reason: Some(StopReason::ConfirmCode),
                ..
            },
        ) => JouleType::HumanConfirmCode,
        (
            Outcome::Complete,
            JouleBody::BotChat {
                stop_reason: Some(StopReason::EndTurn),
                ..
            },
        ) => JouleType::HumanChat,
        // Malformed bot replies carry no stop reason
        (
            Outcome::Complete,
            JouleBody::BotChat {
                stop_reason: None, ..
            },
        ) => JouleType::HumanChat,

        (Outcome::Complete, JouleBody::HumanConfirmCode { confirmed: true }) => {
            JouleType::BotCode
        }
        (Outcome::Complete, JouleBody::HumanConfirmCode { confirmed: false }) => {
            JouleType::HumanChat
        }
    }
}

/// Fallible entry point for callers holding an arbitrary joule.
///
/// A partial joule yields `TransitionError::Undecidable` instead of a default.
pub fn decide(last: Option<&Joule>) -> Result<JouleType, TransitionError> {
    match last {
        None => Ok(next_joule_type(None)),
        Some(joule) => joule
            .settled()
            .map(|settled| next_joule_type(Some(settled)))
            .ok_or_else(|| TransitionError::Undecidable {
                id: joule.id().clone(),
            }),
    }
}
