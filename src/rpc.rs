//! Turn request surface
//!
//! Maps the methods a client can call on a conversation onto candidate joules
//! and session commands. Transport is left to the caller.

use crate::conversation::SequenceError;
use crate::joule::{CodeInfo, Joule, JouleId, JouleType};
use crate::runtime::{Applied, JouleStore, SessionError, SessionHandle, SessionManager};
use serde::{Deserialize, Serialize};

/// A request against one conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum TurnRequest {
    CreateJouleHumanChat {
        message: String,
        #[serde(default)]
        code_info: Option<CodeInfo>,
    },
    CreateJouleHumanConfirmCode {
        confirmed: bool,
    },
    /// Open a streaming bot joule of whichever bot type is expected
    StartBotTurn,
    /// Progress or completion of the streaming bot joule
    UpdateBotTurn {
        joule: Joule,
    },
    CancelBotTurn,
    Rollback {
        joule_id: JouleId,
    },
}

impl TurnRequest {
    pub fn method(&self) -> &'static str {
        match self {
            TurnRequest::CreateJouleHumanChat { .. } => "createJouleHumanChat",
            TurnRequest::CreateJouleHumanConfirmCode { .. } => "createJouleHumanConfirmCode",
            TurnRequest::StartBotTurn => "startBotTurn",
            TurnRequest::UpdateBotTurn { .. } => "updateBotTurn",
            TurnRequest::CancelBotTurn => "cancelBotTurn",
            TurnRequest::Rollback { .. } => "rollback",
        }
    }
}

/// Result of a dispatched request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnResponse {
    Committed {
        joule: Joule,
        expected_next: JouleType,
    },
    Cancelled {
        joule: Option<Joule>,
        expected_next: JouleType,
    },
    RolledBack {
        removed: usize,
        expected_next: JouleType,
    },
}

/// Streaming placeholder for the expected bot joule type
pub fn start_bot_joule(expected: JouleType) -> Result<Joule, SequenceError> {
    match expected {
        JouleType::BotChat => Ok(Joule::partial_bot_chat()),
        JouleType::BotCode => Ok(Joule::partial_bot_code()),
        JouleType::HumanChat | JouleType::HumanConfirmCode => {
            Err(SequenceError::ProtocolViolation {
                expected,
                actual: JouleType::BotChat,
            })
        }
    }
}

/// Bot-side methods only ever carry bot joules
fn check_bot_joule(joule: &Joule, expected: JouleType) -> Result<(), SequenceError> {
    let actual = joule.joule_type();
    if actual.is_bot() {
        Ok(())
    } else {
        Err(SequenceError::ProtocolViolation { expected, actual })
    }
}

impl SessionHandle {
    pub async fn dispatch(&self, request: TurnRequest) -> Result<TurnResponse, SessionError> {
        tracing::debug!(
            conv_id = %self.conversation_id(),
            method = request.method(),
            "Dispatching turn request"
        );

        match request {
            TurnRequest::CreateJouleHumanChat { message, code_info } => {
                self.commit(Joule::human_chat(message, code_info)).await
            }
            TurnRequest::CreateJouleHumanConfirmCode { confirmed } => {
                self.commit(Joule::human_confirm_code(confirmed)).await
            }
            TurnRequest::StartBotTurn => {
                let joule = start_bot_joule(self.expected_next_type())?;
                self.commit(joule).await
            }
            TurnRequest::UpdateBotTurn { joule } => {
                check_bot_joule(&joule, self.expected_next_type())?;
                self.commit(joule).await
            }
            TurnRequest::CancelBotTurn => {
                let Applied {
                    value: joule,
                    expected_next,
                } = self.cancel_partial().await?;
                Ok(TurnResponse::Cancelled {
                    joule,
                    expected_next,
                })
            }
            TurnRequest::Rollback { joule_id } => {
                let Applied {
                    value: removed,
                    expected_next,
                } = self.rollback(joule_id).await?;
                Ok(TurnResponse::RolledBack {
                    removed,
                    expected_next,
                })
            }
        }
    }

    async fn commit(&self, joule: Joule) -> Result<TurnResponse, SessionError> {
        let Applied { expected_next, .. } = self.append(joule.clone()).await?;
        Ok(TurnResponse::Committed {
            joule,
            expected_next,
        })
    }
}

impl<S> SessionManager<S>
where
    S: JouleStore + Clone + 'static,
{
    /// Route a request to the session owning `conversation_id`
    pub async fn dispatch(
        &self,
        conversation_id: &str,
        request: TurnRequest,
    ) -> Result<TurnResponse, SessionError> {
        self.get_or_create(conversation_id)
            .await?
            .dispatch(request)
            .await
    }
}
