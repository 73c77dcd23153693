//! Request and response types exchanged with dialog plugins.
//!
//! Every type here is serialisable so the same values travel unchanged
//! between a host and a guest process.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::services::{EntityContext, SideEffects};

/// A recognised intent with its slot values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognizedIntent {
    /// Linguistic domain that owns the intent.
    pub domain: String,
    /// Intent name within the domain.
    pub intent: String,
    /// Recogniser confidence in `[0, 1]`.
    pub confidence: f32,
    /// Utterance the intent was recognised from.
    pub utterance: String,
    /// Tagged slot values.
    #[serde(default)]
    pub slots: Vec<SlotValue>,
}

impl RecognizedIntent {
    /// Creates an intent with full confidence and no slots.
    #[must_use]
    pub fn new(domain: impl Into<String>, intent: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            intent: intent.into(),
            confidence: 1.0,
            utterance: String::new(),
            slots: Vec::new(),
        }
    }

    /// Sets the source utterance.
    #[must_use]
    pub fn with_utterance(mut self, utterance: impl Into<String>) -> Self {
        self.utterance = utterance.into();
        self
    }

    /// Adds a slot value.
    #[must_use]
    pub fn with_slot(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.slots.push(SlotValue::new(name, value));
        self
    }

    /// Looks up a slot value by name.
    #[must_use]
    pub fn slot(&self, name: &str) -> Option<&str> {
        self.slots
            .iter()
            .find(|slot| slot.name == name)
            .map(|slot| slot.value.as_str())
    }
}

/// A named slot value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotValue {
    /// Slot name.
    pub name: String,
    /// Slot text.
    pub value: String,
}

impl SlotValue {
    /// Creates a slot value.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Facts about the client that sent the turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientContext {
    /// Client identifier.
    pub client_id: String,
    /// User identifier.
    pub user_id: String,
    /// BCP 47 locale, for example `en-GB`.
    pub locale: String,
}

/// One conversational turn as presented to a plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryWithContext {
    /// Top recognition result for this turn.
    pub understanding: RecognizedIntent,
    /// Client that sent the turn.
    pub client: ClientContext,
    /// Earlier turns of the conversation, oldest first.
    #[serde(default)]
    pub past_turns: Vec<RecognizedIntent>,
    /// Set when the orchestrator is replaying a turn after a failure.
    #[serde(default)]
    pub is_retry: bool,
}

impl QueryWithContext {
    /// Creates a query for `understanding` with an empty client context.
    #[must_use]
    pub fn new(understanding: RecognizedIntent) -> Self {
        Self {
            understanding,
            ..Self::default()
        }
    }

    /// Sets the client context.
    #[must_use]
    pub fn with_client(mut self, client: ClientContext) -> Self {
        self.client = client;
        self
    }

    /// Marks the query as a retry.
    #[must_use]
    pub const fn retried(mut self) -> Self {
        self.is_retry = true;
        self
    }
}

/// Outcome a plugin reports for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogOutcome {
    /// The plugin handled the turn.
    Success,
    /// The plugin declined the turn; the orchestrator may try another.
    Skip,
    /// The turn failed.
    Failure,
}

/// How the conversation continues after a turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiTurnBehavior {
    /// The conversation ends with this turn.
    #[default]
    EndConversation,
    /// The plugin accepts a follow-up but does not prompt for one.
    ContinuePassively,
    /// The plugin prompts for a single follow-up.
    ContinueBasic,
    /// The plugin keeps the conversation open until it ends it.
    ContinueUnlimited,
}

impl MultiTurnBehavior {
    /// Reports whether another turn is expected.
    #[must_use]
    pub const fn continues(self) -> bool {
        !matches!(self, Self::EndConversation)
    }
}

/// What a plugin returns from an entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginResult {
    outcome: DialogOutcome,
    #[serde(default)]
    response_text: Option<String>,
    #[serde(default)]
    response_ssml: Option<String>,
    #[serde(default)]
    multi_turn: MultiTurnBehavior,
    #[serde(default)]
    continuation: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    response_data: BTreeMap<String, String>,
}

impl PluginResult {
    fn with_outcome(outcome: DialogOutcome) -> Self {
        Self {
            outcome,
            response_text: None,
            response_ssml: None,
            multi_turn: MultiTurnBehavior::EndConversation,
            continuation: None,
            error_message: None,
            response_data: BTreeMap::new(),
        }
    }

    /// A successful result.
    #[must_use]
    pub fn success() -> Self {
        Self::with_outcome(DialogOutcome::Success)
    }

    /// A result declining the turn.
    #[must_use]
    pub fn skip() -> Self {
        Self::with_outcome(DialogOutcome::Skip)
    }

    /// A failed result carrying a diagnostic message.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        let mut result = Self::with_outcome(DialogOutcome::Failure);
        result.error_message = Some(message.into());
        result
    }

    /// Sets the display and spoken text.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.response_text = Some(text.into());
        self
    }

    /// Sets SSML for speech output.
    #[must_use]
    pub fn with_ssml(mut self, ssml: impl Into<String>) -> Self {
        self.response_ssml = Some(ssml.into());
        self
    }

    /// Names the entry point that handles the next turn and keeps the
    /// conversation open.
    ///
    /// The name is stored in conversation state by the orchestrator and
    /// handed back to `launch` on a later turn.
    #[must_use]
    pub fn with_continuation(mut self, entry_point: impl Into<String>) -> Self {
        self.continuation = Some(entry_point.into());
        if !self.multi_turn.continues() {
            self.multi_turn = MultiTurnBehavior::ContinueBasic;
        }
        self
    }

    /// Overrides the multi-turn behaviour.
    #[must_use]
    pub const fn with_multi_turn(mut self, behavior: MultiTurnBehavior) -> Self {
        self.multi_turn = behavior;
        self
    }

    /// Adds a key/value pair for the client.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.response_data.insert(key.into(), value.into());
        self
    }

    /// Reported outcome.
    #[must_use]
    pub const fn outcome(&self) -> DialogOutcome {
        self.outcome
    }

    /// Reports whether the outcome is [`DialogOutcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome == DialogOutcome::Success
    }

    /// Display text, if any.
    #[must_use]
    pub fn response_text(&self) -> Option<&str> {
        self.response_text.as_deref()
    }

    /// SSML, if any.
    #[must_use]
    pub fn response_ssml(&self) -> Option<&str> {
        self.response_ssml.as_deref()
    }

    /// Multi-turn behaviour.
    #[must_use]
    pub const fn multi_turn(&self) -> MultiTurnBehavior {
        self.multi_turn
    }

    /// Entry point for the next turn, if any.
    #[must_use]
    pub fn continuation(&self) -> Option<&str> {
        self.continuation.as_deref()
    }

    /// Diagnostic message for failed results.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Client key/value data.
    #[must_use]
    pub const fn response_data(&self) -> &BTreeMap<String, String> {
        &self.response_data
    }
}

/// Envelope returned by a launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogProcessingResponse {
    /// Result returned by the plugin or synthesised by the executor.
    pub result: PluginResult,
    /// State the plugin wrote through its services. Absent when plugin code
    /// did not return normally.
    pub side_effects: Option<SideEffects>,
}

impl DialogProcessingResponse {
    /// Wraps a result.
    #[must_use]
    pub const fn new(result: PluginResult, side_effects: Option<SideEffects>) -> Self {
        Self {
            result,
            side_effects,
        }
    }
}

/// How strongly a trigger claims the turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// No opinion.
    #[default]
    Default,
    /// Prefer this plugin's interpretation of the turn.
    Boost,
    /// Suppress this plugin for the turn.
    Suppress,
}

/// Result of a plugin's trigger hook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerResult {
    /// Claim strength.
    pub kind: TriggerKind,
    /// Short description shown when disambiguating between plugins.
    #[serde(default)]
    pub action_description: Option<String>,
}

impl TriggerResult {
    /// A result with `kind` and no description.
    #[must_use]
    pub const fn new(kind: TriggerKind) -> Self {
        Self {
            kind,
            action_description: None,
        }
    }

    /// Sets the disambiguation description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.action_description = Some(description.into());
        self
    }
}

/// Envelope returned by a trigger call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerProcessingResponse {
    /// The plugin's verdict. Absent when the plugin had none or faulted.
    pub result: Option<TriggerResult>,
    /// State the plugin wrote through its services.
    pub side_effects: Option<SideEffects>,
}

/// What a target domain is asked to take over.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossDomainContext {
    /// Domain asked to continue the conversation.
    pub requested_domain: String,
    /// Intent in that domain.
    pub requested_intent: String,
    /// Slots the calling domain fills in.
    #[serde(default)]
    pub slots: Vec<SlotValue>,
    /// Conversation history so far.
    #[serde(default)]
    pub past_turns: Vec<RecognizedIntent>,
}

/// Slots a target domain wants before accepting a hand-off.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossDomainRequestData {
    /// Names of the slots requested from the calling domain.
    pub requested_slots: Vec<String>,
}

/// A target domain's answer to a hand-off.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossDomainResponseData {
    /// Intent the orchestrator should route the next turn to.
    pub callback_intent: String,
    /// Slots returned to the calling domain.
    #[serde(default)]
    pub filled_slots: Vec<SlotValue>,
}

/// Provider-level answer to a cross-domain response call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossDomainResponseResponse {
    /// The plugin's answer, absent if it had none or faulted.
    pub plugin_response: Option<CrossDomainResponseData>,
    /// Entity context after the plugin ran.
    pub out_entity_context: EntityContext,
}
