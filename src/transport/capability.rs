//! Capability traits implemented by the device stack.
//!
//! The bridge never talks USB, BLE or APDUs. It consumes these two traits
//! and treats everything behind them as opaque.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::eip712::TypedData;
use crate::error::Result;
use crate::identifiers::SessionId;

use super::action::DeviceAction;
use super::device::{ConnectedDevice, DeviceSessionState, DiscoveredDevice, TransportType};

// ============================================================================
// Options
// ============================================================================

/// Flags for address retrieval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressOptions {
    /// Ask the user to verify the address on the device screen.
    pub check_on_device: bool,
    /// Include the BIP32 chain code in the output.
    pub return_chain_code: bool,
}

/// Options for transaction signing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOptions {
    /// Origin domain shown to the clear-signing context.
    pub domain: String,
}

// ============================================================================
// DeviceManager
// ============================================================================

/// Discovery, connection and session state for one device stack.
#[async_trait]
pub trait DeviceManager: Send + Sync {
    /// Starts discovering devices on the given transport.
    ///
    /// The stream is lazy; dropping it stops discovery.
    fn start_discovering(
        &self,
        transport: TransportType,
    ) -> BoxStream<'static, Result<DiscoveredDevice>>;

    /// Opens a session with a discovered device.
    async fn connect(&self, device: DiscoveredDevice) -> Result<ConnectedDevice>;

    /// Streams state changes of an open session.
    fn session_state(&self, session_id: &SessionId)
    -> BoxStream<'static, Result<DeviceSessionState>>;

    /// Returns the signer bound to an open session.
    fn signer(&self, session_id: &SessionId) -> Result<Arc<dyn Signer>>;

    /// Closes an open session.
    async fn disconnect(&self, session_id: &SessionId) -> Result<()>;

    /// Releases the device stack. Called once on bridge teardown.
    async fn close(&self) {}
}

// ============================================================================
// Signer
// ============================================================================

/// Ethereum operations bound to one device session.
///
/// Derivation paths arrive without the leading `m/`.
pub trait Signer: Send + Sync {
    /// Retrieves the address at a derivation path.
    fn get_address(&self, derivation_path: &str, options: AddressOptions) -> DeviceAction;

    /// Signs a serialized transaction.
    fn sign_transaction(
        &self,
        derivation_path: &str,
        transaction: Vec<u8>,
        options: TransactionOptions,
    ) -> DeviceAction;

    /// Signs a personal message given as clear text.
    fn sign_message(&self, derivation_path: &str, message: &str) -> DeviceAction;

    /// Signs structured data directly.
    fn sign_typed_data(&self, derivation_path: &str, data: &TypedData) -> DeviceAction;

    /// Signs pre-hashed structured data.
    fn sign_typed_data_hash(
        &self,
        derivation_path: &str,
        domain_separator: [u8; 32],
        message_hash: [u8; 32],
    ) -> DeviceAction;

    /// Reads the name and version of the open device application.
    fn app_name_and_version(&self) -> DeviceAction;
}
