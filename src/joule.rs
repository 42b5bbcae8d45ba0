//! Joule types
//!
//! A joule is one atomic contribution to a conversation: a human message, a
//! human confirmation, a bot chat reply or a bot code edit.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

// ============================================================================
// Identity and lifecycle
// ============================================================================

/// Opaque, unique joule identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JouleId(String);

impl JouleId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JouleId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for JouleId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for JouleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for JouleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle marker of a joule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JouleState {
    #[default]
    Complete,
    /// Still being produced (a streaming bot reply)
    Partial,
    /// A failed turn; routed like a chat turn that ends the bot's turn
    Error,
}

impl JouleState {
    pub fn as_str(self) -> &'static str {
        match self {
            JouleState::Complete => "complete",
            JouleState::Partial => "partial",
            JouleState::Error => "error",
        }
    }
}

impl fmt::Display for JouleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminant of a joule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JouleType {
    HumanChat,
    HumanConfirmCode,
    BotChat,
    BotCode,
}

impl JouleType {
    pub fn as_str(self) -> &'static str {
        match self {
            JouleType::HumanChat => "HumanChat",
            JouleType::HumanConfirmCode => "HumanConfirmCode",
            JouleType::BotChat => "BotChat",
            JouleType::BotCode => "BotCode",
        }
    }

    pub fn is_bot(self) -> bool {
        matches!(self, JouleType::BotChat | JouleType::BotCode)
    }
}

impl fmt::Display for JouleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a bot ended its turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    /// The bot proposed code and waits for the human to accept or reject it
    ConfirmCode,
}

// ============================================================================
// Payload types
// ============================================================================

/// Reference to a code change materialized outside the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CodeInfo {
    /// Opaque commit reference, never interpreted here
    pub commit: Option<String>,
    pub diff_info: Option<DiffInfo>,
}

impl CodeInfo {
    pub fn commit(commit: impl Into<String>) -> Self {
        Self {
            commit: Some(commit.into()),
            diff_info: None,
        }
    }

    #[must_use]
    pub fn with_diff(mut self, diff_info: DiffInfo) -> Self {
        self.diff_info = Some(diff_info);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffInfo {
    pub file_paths_changed: Option<Vec<String>>,
    pub diff_preview: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    User,
    Assistant,
}

/// One message of the raw model input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMessage {
    pub role: ModelRole,
    pub content: String,
    #[serde(default)]
    pub cache_up_to_this_block: bool,
}

/// Raw model input a bot joule was generated from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ModelConversation {
    pub system: String,
    pub messages: Vec<ModelMessage>,
}

/// Files that were placed in the model context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContextPaths {
    pub relative_paths: Vec<String>,
    pub root: String,
}

/// Execution metadata carried by every bot joule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BotExecInfo {
    pub raw_input: ModelConversation,
    pub raw_output: String,
    pub context_paths: ContextPaths,
}

// ============================================================================
// Joule
// ============================================================================

/// Variant-specific part of a joule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "joule_type")]
pub enum JouleBody {
    HumanChat {
        message: String,
        code_info: Option<CodeInfo>,
    },
    HumanConfirmCode {
        confirmed: bool,
    },
    BotChat {
        message: String,
        /// `None` only on malformed or error joules
        stop_reason: Option<StopReason>,
        exec_info: BotExecInfo,
    },
    BotCode {
        message: String,
        code_info: CodeInfo,
        exec_info: BotExecInfo,
    },
}

impl JouleBody {
    pub fn joule_type(&self) -> JouleType {
        match self {
            JouleBody::HumanChat { .. } => JouleType::HumanChat,
            JouleBody::HumanConfirmCode { .. } => JouleType::HumanConfirmCode,
            JouleBody::BotChat { .. } => JouleType::BotChat,
            JouleBody::BotCode { .. } => JouleType::BotCode,
        }
    }
}

/// A single turn of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Joule {
    id: JouleId,
    state: JouleState,
    #[serde(flatten)]
    body: JouleBody,
}

impl Joule {
    fn from_body(body: JouleBody) -> Self {
        Self {
            id: JouleId::new(),
            state: JouleState::Complete,
            body,
        }
    }

    pub fn human_chat(message: impl Into<String>, code_info: Option<CodeInfo>) -> Self {
        Self::from_body(JouleBody::HumanChat {
            message: message.into(),
            code_info,
        })
    }

    pub fn human_confirm_code(confirmed: bool) -> Self {
        Self::from_body(JouleBody::HumanConfirmCode { confirmed })
    }

    pub fn bot_chat(
        message: impl Into<String>,
        stop_reason: Option<StopReason>,
        exec_info: BotExecInfo,
    ) -> Self {
        Self::from_body(JouleBody::BotChat {
            message: message.into(),
            stop_reason,
            exec_info,
        })
    }

    pub fn bot_code(message: impl Into<String>, code_info: CodeInfo, exec_info: BotExecInfo) -> Self {
        Self::from_body(JouleBody::BotCode {
            message: message.into(),
            code_info,
            exec_info,
        })
    }

    /// Empty streaming placeholder for a bot chat reply
    pub fn partial_bot_chat() -> Self {
        Self::bot_chat("", None, BotExecInfo::default()).with_state(JouleState::Partial)
    }

    /// Empty streaming placeholder for a bot code edit
    pub fn partial_bot_code() -> Self {
        Self::bot_code("", CodeInfo::default(), BotExecInfo::default())
            .with_state(JouleState::Partial)
    }

    #[must_use]
    pub fn with_state(mut self, state: JouleState) -> Self {
        self.state = state;
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<JouleId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn id(&self) -> &JouleId {
        &self.id
    }

    pub fn state(&self) -> JouleState {
        self.state
    }

    pub fn body(&self) -> &JouleBody {
        &self.body
    }

    pub fn joule_type(&self) -> JouleType {
        self.body.joule_type()
    }

    pub fn is_partial(&self) -> bool {
        self.state == JouleState::Partial
    }

    /// Text of the joule, if the variant carries one
    pub fn message(&self) -> Option<&str> {
        match &self.body {
            JouleBody::HumanChat { message, .. }
            | JouleBody::BotChat { message, .. }
            | JouleBody::BotCode { message, .. } => Some(message),
            JouleBody::HumanConfirmCode { .. } => None,
        }
    }

    pub fn code_info(&self) -> Option<&CodeInfo> {
        match &self.body {
            JouleBody::HumanChat { code_info, .. } => code_info.as_ref(),
            JouleBody::BotCode { code_info, .. } => Some(code_info),
            JouleBody::HumanConfirmCode { .. } | JouleBody::BotChat { .. } => None,
        }
    }

    /// View this joule as eligible for transition decisions.
    ///
    /// Returns `None` while the joule is still partial.
    pub fn settled(&self) -> Option<Settled<'_>> {
        let outcome = match self.state {
            JouleState::Complete => Outcome::Complete,
            JouleState::Error => Outcome::Error,
            JouleState::Partial => return None,
        };
        Some(Settled {
            joule: self,
            outcome,
        })
    }
}

/// How a settled joule ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Complete,
    Error,
}

/// A joule that is `Complete` or `Error`, never `Partial`
#[derive(Debug, Clone, Copy)]
pub struct Settled<'a> {
    joule: &'a Joule,
    outcome: Outcome,
}

impl Settled<'_> {
    pub fn outcome(self) -> Outcome {
        self.outcome
    }
}

impl Deref for Settled<'_> {
    type Target = Joule;

    fn deref(&self) -> &Joule {
        self.joule
    }
}
