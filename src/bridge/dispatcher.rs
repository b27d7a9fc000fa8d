//! Single-flight device operations.
//!
//! At most one device operation is outstanding at a time. Submitting a new
//! one supersedes the previous: its subscription is cancelled and its caller
//! gets an aborted failure reply. An operation is either queued (waiting
//! for a ready session) or running (draining a device-action stream).
//!
//! # Terminal States
//!
//! | State | Reply |
//! |-------|-------|
//! | `completed` | Success with the output; signatures normalized |
//! | `error` | Failure with the device error verbatim |
//! | `stopped` | Aborted failure |
//!
//! Structured-data signing retries once with locally computed hashes when
//! the device rejects the structured form for any reason other than the
//! user cancelling.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::eip712::TypedData;
use crate::error::{Error, Result};
use crate::identifiers::SubscriptionId;
use crate::protocol::params::{self, normalize_hd_path};
use crate::protocol::{
    Action, AddressParams, PersonalMessageParams, TransactionParams, TypedDataParams,
};
use crate::status::{ACTION_NONE, StatusEvent};
use crate::transport::{
    DeviceAction, DeviceActionState, DeviceError, Signer, Subscription, TransactionOptions,
};

use super::context::{BridgeEvent, ReplyTarget, SessionContext};

// ============================================================================
// OperationInput
// ============================================================================

/// Validated input of a device operation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum OperationInput {
    /// Address retrieval.
    Address { path: String },
    /// Transaction signing.
    Transaction { path: String, transaction: Vec<u8> },
    /// Personal message signing.
    PersonalMessage { path: String, text: String },
    /// Structured data signing.
    TypedData { path: String, data: Box<TypedData> },
    /// Application name and version.
    AppInfo,
}

impl OperationInput {
    /// Parses and validates request params for a device action.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for missing or malformed params.
    pub(crate) fn from_request(action: &Action, raw: &Value) -> Result<Self> {
        match action {
            Action::Unlock => {
                let p: AddressParams = params::parse(raw)?;
                Ok(Self::Address {
                    path: normalize_hd_path(&p.hd_path).to_string(),
                })
            }
            Action::SignTransaction => {
                let p: TransactionParams = params::parse(raw)?;
                Ok(Self::Transaction {
                    path: normalize_hd_path(&p.hd_path).to_string(),
                    transaction: params::decode_hex(&p.tx)?,
                })
            }
            Action::SignPersonalMessage => {
                let p: PersonalMessageParams = params::parse(raw)?;
                Ok(Self::PersonalMessage {
                    path: normalize_hd_path(&p.hd_path).to_string(),
                    text: params::hex_to_ascii(&p.message)?,
                })
            }
            Action::SignTypedData => {
                let p: TypedDataParams = params::parse(raw)?;
                Ok(Self::TypedData {
                    path: normalize_hd_path(&p.hd_path).to_string(),
                    data: Box::new(p.typed_data()?),
                })
            }
            Action::GetAppNameAndVersion => Ok(Self::AppInfo),
            other => Err(Error::invalid_argument(format!(
                "{other} is not a device operation"
            ))),
        }
    }

    /// Action-state label shown while the operation runs.
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Self::Address { .. } => "getAccount",
            Self::Transaction { .. } => "sign Transaction",
            Self::PersonalMessage { .. } => "sign Personal Message",
            Self::TypedData { .. } => "sign Typed Data",
            Self::AppInfo => "getAppNameAndVersion",
        }
    }

    /// Returns `true` if the output is a signature.
    pub(crate) fn produces_signature(&self) -> bool {
        matches!(
            self,
            Self::Transaction { .. } | Self::PersonalMessage { .. } | Self::TypedData { .. }
        )
    }
}

// ============================================================================
// Operation
// ============================================================================

/// Which signer call the running stream belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    /// The operation's own signer call.
    Primary,
    /// Hashed retry of structured-data signing.
    Fallback,
}

/// The single outstanding device operation.
pub(crate) struct Operation {
    /// Validated input.
    input: OperationInput,
    /// Where the reply goes.
    target: ReplyTarget,
    /// Running stream, `None` while queued.
    running: Option<(Subscription, Stage)>,
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("label", &self.input.label())
            .field("target", &self.target)
            .field("stage", &self.running.as_ref().map(|(_, stage)| *stage))
            .finish()
    }
}

impl Operation {
    /// Creates a queued operation.
    pub(crate) fn new(input: OperationInput, target: ReplyTarget) -> Self {
        Self {
            input,
            target,
            running: None,
        }
    }

    /// Returns `true` while waiting for a session.
    #[inline]
    pub(crate) fn is_queued(&self) -> bool {
        self.running.is_none()
    }

    fn subscription_id(&self) -> Option<SubscriptionId> {
        self.running.as_ref().map(|(subscription, _)| subscription.id())
    }

    fn stage(&self) -> Option<Stage> {
        self.running.as_ref().map(|(_, stage)| *stage)
    }
}

// ============================================================================
// Signer Calls
// ============================================================================

/// Starts the primary signer call for an input.
fn invoke(
    signer: &dyn Signer,
    input: &OperationInput,
    context: &SessionContext,
) -> DeviceAction {
    match input {
        OperationInput::Address { path } => signer.get_address(path, context.options.address),
        OperationInput::Transaction { path, transaction } => signer.sign_transaction(
            path,
            transaction.clone(),
            TransactionOptions {
                domain: context.options.transaction_domain.clone(),
            },
        ),
        OperationInput::PersonalMessage { path, text } => signer.sign_message(path, text),
        OperationInput::TypedData { path, data } => signer.sign_typed_data(path, data),
        OperationInput::AppInfo => signer.app_name_and_version(),
    }
}

/// Strips `0x` from `r` and `s` and turns `v` into a string.
pub(crate) fn normalize_signature(mut output: Value) -> Value {
    if let Some(fields) = output.as_object_mut() {
        for key in ["r", "s"] {
            if let Some(Value::String(component)) = fields.get_mut(key)
                && let Some(stripped) = component.strip_prefix("0x")
            {
                *component = stripped.to_string();
            }
        }
        if let Some(v) = fields.get_mut("v")
            && !v.is_string()
            && !v.is_null()
        {
            *v = Value::String(v.to_string());
        }
    }
    output
}

// ============================================================================
// SessionContext - Operations
// ============================================================================

impl SessionContext {
    /// Accepts a device operation, superseding any outstanding one.
    pub(crate) fn submit_operation(&mut self, input: OperationInput, target: ReplyTarget) {
        self.supersede_operation();
        debug!(operation = input.label(), action = %target.action, "Operation submitted");
        self.operation = Some(Operation::new(input, target));

        if self.session.is_some() {
            self.start_operation();
        } else {
            self.ensure_session();
        }
    }

    /// Starts the queued operation against the open session.
    pub(crate) fn start_operation(&mut self) {
        let Some(operation) = self.operation.as_ref() else {
            return;
        };
        if !operation.is_queued() {
            return;
        }
        let Some(signer) = self.session.as_ref().map(|s| Arc::clone(&s.signer)) else {
            self.finish_operation(Err(Error::NoSession));
            return;
        };

        let label = operation.input.label();
        self.publish(StatusEvent::action_state(label));
        let stream = invoke(signer.as_ref(), &operation.input, self);
        let subscription = self.forward_device_action(stream);
        debug!(operation = label, id = %subscription.id(), "Operation started");

        if let Some(operation) = self.operation.as_mut() {
            operation.running = Some((subscription, Stage::Primary));
        }
    }

    /// Handles one item of the running device-action stream.
    pub(crate) fn on_device_action(&mut self, id: SubscriptionId, item: Option<DeviceActionState>) {
        let current = self.operation.as_ref().and_then(Operation::subscription_id);
        if current != Some(id) {
            trace!(%id, "Dropping stale device-action event");
            return;
        }

        let Some(state) = item else {
            warn!(%id, "Device action ended without a terminal state");
            return;
        };

        match state {
            DeviceActionState::Completed { output } => self.finish_operation(Ok(output)),
            DeviceActionState::Error { error } => self.on_device_error(error),
            DeviceActionState::Stopped => {
                self.finish_operation(Err(Error::aborted("Device action stopped")));
            }
            progress => {
                trace!(status = progress.status(), "Device action progress");
                self.publish(StatusEvent::DeviceAction(progress));
            }
        }
    }

    /// Cancels the outstanding operation with an aborted reply.
    pub(crate) fn supersede_operation(&mut self) {
        if let Some(previous) = self.operation.take() {
            debug!(operation = previous.input.label(), "Superseding outstanding operation");
            let reply = previous.target.failure(&Error::aborted("Superseded by a newer request"));
            self.reply(previous.target, reply);
        }
    }

    /// Aborts the outstanding operation because its session went away.
    pub(crate) fn abort_operation(&mut self, reason: &str) {
        if let Some(operation) = self.operation.take() {
            debug!(operation = operation.input.label(), reason, "Aborting operation");
            let reply = operation.target.failure(&Error::aborted(reason));
            self.reply(operation.target, reply);
            self.publish(StatusEvent::action_state(ACTION_NONE));
        }
    }

    /// Fails a queued operation because no session could be opened.
    pub(crate) fn fail_queued_operation(&mut self, error: &Error) {
        if self.operation.as_ref().is_some_and(Operation::is_queued)
            && let Some(operation) = self.operation.take()
        {
            let reply = operation.target.failure(error);
            self.reply(operation.target, reply);
        }
    }

    fn on_device_error(&mut self, error: DeviceError) {
        let retry_hashed = self.operation.as_ref().is_some_and(|op| {
            op.stage() == Some(Stage::Primary)
                && matches!(op.input, OperationInput::TypedData { .. })
        }) && !error.is_user_cancellation();

        if retry_hashed {
            debug!(error = %error.message, "Structured signing failed, retrying with hashes");
            if let Err(e) = self.start_hashed_fallback() {
                self.finish_operation(Err(e));
            }
            return;
        }
        self.finish_operation(Err(Error::device(error)));
    }

    fn start_hashed_fallback(&mut self) -> Result<()> {
        let Some(OperationInput::TypedData { path, data }) =
            self.operation.as_ref().map(|op| &op.input)
        else {
            return Err(Error::typed_data("No structured data to hash"));
        };
        let domain_separator = data.domain_separator()?;
        let message_hash = data.message_hash()?;
        let signer = self
            .session
            .as_ref()
            .map(|s| Arc::clone(&s.signer))
            .ok_or(Error::NoSession)?;

        let stream = signer.sign_typed_data_hash(path, domain_separator, message_hash);
        let subscription = self.forward_device_action(stream);
        if let Some(operation) = self.operation.as_mut() {
            operation.running = Some((subscription, Stage::Fallback));
        }
        Ok(())
    }

    fn finish_operation(&mut self, outcome: Result<Value>) {
        let Some(operation) = self.operation.take() else {
            return;
        };
        self.publish(StatusEvent::action_state(ACTION_NONE));

        let reply = match outcome {
            Ok(output) => {
                debug!(operation = operation.input.label(), "Operation completed");
                let payload = if operation.input.produces_signature() {
                    normalize_signature(output)
                } else {
                    output
                };
                operation.target.success(Some(payload))
            }
            Err(e) => {
                debug!(operation = operation.input.label(), error = %e, "Operation failed");
                operation.target.failure(&e)
            }
        };
        self.reply(operation.target, reply);
    }

    fn forward_device_action(&self, stream: DeviceAction) -> Subscription {
        Subscription::forward(
            "device-action",
            stream,
            self.events.clone(),
            |id, item| BridgeEvent::DeviceAction { id, item },
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
