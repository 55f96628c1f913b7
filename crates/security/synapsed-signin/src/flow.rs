//! Per-user flow state persisted in turn state
//!
//! `active_handler` is set iff a flow is in progress, and the banked
//! continuation only exists while it is set.

use crate::activity::Activity;
use crate::handler::{SignInResponse, TokenExchange};
use crate::storage::TurnState;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Turn state property holding the active handler name
pub const ACTIVE_FLOW_KEY: &str = "active-flow";

/// Turn state property holding the banked continuation
pub const CONTINUATION_KEY: &str = "continuation-activity";

/// Default name of the synthetic completion event
pub const DEFAULT_COMPLETION_EVENT_NAME: &str = "application/vnd.synapsed.signin.completion";

/// Synthetic payload carrying an explicit sign-in across the turn boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInCompletionEvent {
    /// Handler that ran the flow
    pub handler_name: String,
    /// Final dispatcher response, filled in once the flow ends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<SignInResponse>,
    /// Activity that called the explicit sign-in
    pub initiating_activity: Activity,
    /// Token exchange connection forwarded on every continuation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_connection_name: Option<String>,
    /// Token exchange scopes forwarded on every continuation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_scopes: Option<Vec<String>>,
}

impl SignInCompletionEvent {
    /// Event for a flow that has just gone pending
    pub fn new(
        handler_name: impl Into<String>,
        exchange: Option<&TokenExchange>,
        initiating_activity: Activity,
    ) -> Self {
        Self {
            handler_name: handler_name.into(),
            response: None,
            initiating_activity,
            exchange_connection_name: exchange.and_then(|e| e.connection_name.clone()),
            exchange_scopes: exchange
                .filter(|e| !e.scopes.is_empty())
                .map(|e| e.scopes.clone()),
        }
    }

    /// Exchange parameters to forward to the dispatcher, if any were carried
    pub fn exchange(&self) -> Option<TokenExchange> {
        let exchange = TokenExchange {
            connection_name: self.exchange_connection_name.clone(),
            scopes: self.exchange_scopes.clone().unwrap_or_default(),
        };
        (!exchange.is_empty()).then_some(exchange)
    }

    /// Record the flow's outcome
    #[must_use]
    pub fn with_result(mut self, handler_name: &str, response: SignInResponse) -> Self {
        self.handler_name = handler_name.to_string();
        self.response = Some(response);
        self
    }

    /// Wrap into an event activity addressed like the initiating activity
    pub fn into_activity(self, event_name: &str) -> Result<Activity> {
        let initiating = &self.initiating_activity;
        let mut activity = Activity::event(
            initiating.channel_id.clone(),
            initiating.from.id.clone(),
            initiating.conversation.id.clone(),
            event_name,
            serde_json::Value::Null,
        );
        activity.from = initiating.from.clone();
        activity.recipient = initiating.recipient.clone();
        activity.value = Some(serde_json::to_value(&self)?);
        Ok(activity)
    }

    /// Decode the payload of a completion event activity
    pub fn from_activity(activity: &Activity) -> Result<Self> {
        let value = activity
            .value
            .clone()
            .ok_or_else(|| Error::InvalidCompletionEvent("event has no value".into()))?;
        serde_json::from_value(value).map_err(|e| Error::InvalidCompletionEvent(e.to_string()))
    }
}

/// What was banked for redelivery when the flow concludes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "camelCase")]
pub enum BankedActivity {
    /// The real activity that triggered an automatic sign-in
    Activity(Activity),
    /// Continuation context for an explicit sign-in
    Completion(SignInCompletionEvent),
}

impl BankedActivity {
    /// The activity that started the flow
    pub fn initiating_activity(&self) -> &Activity {
        match self {
            Self::Activity(activity) => activity,
            Self::Completion(event) => &event.initiating_activity,
        }
    }

    /// Consume into the activity that started the flow
    pub fn into_initiating_activity(self) -> Activity {
        match self {
            Self::Activity(activity) => activity,
            Self::Completion(event) => event.initiating_activity,
        }
    }
}

/// Flow state for one user
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowState {
    active_handler: Option<String>,
    continuation: Option<BankedActivity>,
}

impl FlowState {
    /// Read the flow state out of turn state
    pub fn load(state: &TurnState) -> Result<Self> {
        let active_handler: Option<String> = state.get(ACTIVE_FLOW_KEY)?;
        let continuation = match active_handler {
            Some(_) => state.get(CONTINUATION_KEY)?,
            None => None,
        };
        Ok(Self {
            active_handler,
            continuation,
        })
    }

    /// Write the flow state back into turn state
    pub fn store(&self, state: &mut TurnState) -> Result<()> {
        match &self.active_handler {
            Some(handler) => {
                state.set(ACTIVE_FLOW_KEY, handler)?;
                match &self.continuation {
                    Some(banked) => state.set(CONTINUATION_KEY, banked)?,
                    None => state.delete(CONTINUATION_KEY),
                }
            }
            None => {
                state.delete(ACTIVE_FLOW_KEY);
                state.delete(CONTINUATION_KEY);
            }
        }
        Ok(())
    }

    /// Whether a flow is in progress
    pub fn is_active(&self) -> bool {
        self.active_handler.is_some()
    }

    /// Handler owning the in-progress flow
    pub fn active_handler(&self) -> Option<&str> {
        self.active_handler.as_deref()
    }

    /// Banked continuation
    pub fn continuation(&self) -> Option<&BankedActivity> {
        self.continuation.as_ref()
    }

    /// Start a flow and bank its continuation
    pub fn begin(&mut self, handler: impl Into<String>, banked: BankedActivity) {
        self.active_handler = Some(handler.into());
        self.continuation = Some(banked);
    }

    /// End the flow, handing back whatever was banked
    pub fn finish(&mut self) -> Option<BankedActivity> {
        self.active_handler = None;
        self.continuation.take()
    }
}
