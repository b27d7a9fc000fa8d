//! Test doubles for the device stack and a harness driving a live bridge.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::bridge::{Bridge, BridgeOptions};
use crate::channel::{FrameHost, MessageEvent};
use crate::eip712::TypedData;
use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::status::StatusEvent;
use crate::transport::{
    AddressOptions, ConnectedDevice, DeviceAction, DeviceActionState, DeviceManager,
    DeviceSessionState, DeviceStatus, DiscoveredDevice, Signer, TransactionOptions, TransportType,
};

// ============================================================================
// Constants
// ============================================================================

/// How long the harness waits for an expected message.
const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Helpers
// ============================================================================

/// Routes bridge logs to the test output. `RUST_LOG` overrides the filter.
pub(crate) fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ledger_bridge=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_test_writer()
        .try_init();
}

/// Turns an unbounded receiver into a stream.
fn receiver_stream<T: Send + 'static>(rx: mpsc::UnboundedReceiver<T>) -> BoxStream<'static, T> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}

// ============================================================================
// FakeSigner
// ============================================================================

/// A recorded signer call.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SignerCall {
    GetAddress {
        path: String,
        options: AddressOptions,
    },
    SignTransaction {
        path: String,
        transaction: Vec<u8>,
        domain: String,
    },
    SignMessage {
        path: String,
        message: String,
    },
    SignTypedData {
        path: String,
    },
    SignTypedDataHash {
        path: String,
        domain_separator: [u8; 32],
        message_hash: [u8; 32],
    },
    AppNameAndVersion,
}

#[derive(Default)]
struct SignerState {
    calls: Vec<SignerCall>,
    scripts: VecDeque<Vec<DeviceActionState>>,
    streams: Vec<mpsc::UnboundedSender<DeviceActionState>>,
}

/// Signer whose device actions are scripted or driven by the test.
///
/// Each call consumes the next script, if any. The stream stays open after
/// the script so tests can emit further states.
#[derive(Clone, Default)]
pub(crate) struct FakeSigner {
    state: Arc<Mutex<SignerState>>,
}

impl FakeSigner {
    /// Queues the states the next call emits.
    pub(crate) fn script(&self, states: Vec<DeviceActionState>) {
        self.state.lock().scripts.push_back(states);
    }

    /// Returns the calls made so far.
    pub(crate) fn calls(&self) -> Vec<SignerCall> {
        self.state.lock().calls.clone()
    }

    /// Emits a state on the stream returned by call `index`.
    pub(crate) fn emit(&self, index: usize, state: DeviceActionState) {
        if let Some(tx) = self.state.lock().streams.get(index) {
            let _ = tx.send(state);
        }
    }

    fn record(&self, call: SignerCall) -> DeviceAction {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        state.calls.push(call);
        if let Some(script) = state.scripts.pop_front() {
            for item in script {
                let _ = tx.send(item);
            }
        }
        state.streams.push(tx);
        receiver_stream(rx)
    }
}

impl Signer for FakeSigner {
    fn get_address(&self, derivation_path: &str, options: AddressOptions) -> DeviceAction {
        self.record(SignerCall::GetAddress {
            path: derivation_path.to_string(),
            options,
        })
    }

    fn sign_transaction(
        &self,
        derivation_path: &str,
        transaction: Vec<u8>,
        options: TransactionOptions,
    ) -> DeviceAction {
        self.record(SignerCall::SignTransaction {
            path: derivation_path.to_string(),
            transaction,
            domain: options.domain,
        })
    }

    fn sign_message(&self, derivation_path: &str, message: &str) -> DeviceAction {
        self.record(SignerCall::SignMessage {
            path: derivation_path.to_string(),
            message: message.to_string(),
        })
    }

    fn sign_typed_data(&self, derivation_path: &str, _data: &TypedData) -> DeviceAction {
        self.record(SignerCall::SignTypedData {
            path: derivation_path.to_string(),
        })
    }

    fn sign_typed_data_hash(
        &self,
        derivation_path: &str,
        domain_separator: [u8; 32],
        message_hash: [u8; 32],
    ) -> DeviceAction {
        self.record(SignerCall::SignTypedDataHash {
            path: derivation_path.to_string(),
            domain_separator,
            message_hash,
        })
    }

    fn app_name_and_version(&self) -> DeviceAction {
        self.record(SignerCall::AppNameAndVersion)
    }
}

// ============================================================================
// FakeDeviceManager
// ============================================================================

/// What discovery yields.
#[derive(Debug, Clone, Default)]
pub(crate) enum DiscoveryScript {
    /// One device, then nothing until cancelled.
    #[default]
    Device,
    /// An error.
    Error(String),
    /// Completes without a device.
    Empty,
    /// Never yields.
    Pending,
}

#[derive(Default)]
struct ManagerState {
    discovery: DiscoveryScript,
    connect_error: Option<String>,
    initial_status: Option<DeviceStatus>,
    discovered: Vec<TransportType>,
    connects: usize,
    disconnects: Vec<SessionId>,
    closes: usize,
    status_streams: Vec<mpsc::UnboundedSender<Result<DeviceSessionState>>>,
}

/// In-memory device stack.
#[derive(Clone)]
pub(crate) struct FakeDeviceManager {
    state: Arc<Mutex<ManagerState>>,
    signer: FakeSigner,
}

impl FakeDeviceManager {
    /// Creates a stack that discovers one device which reports `CONNECTED`.
    pub(crate) fn new() -> Self {
        let state = ManagerState {
            initial_status: Some(DeviceStatus::Connected),
            ..ManagerState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            signer: FakeSigner::default(),
        }
    }

    pub(crate) fn set_discovery(&self, script: DiscoveryScript) {
        self.state.lock().discovery = script;
    }

    pub(crate) fn set_connect_error(&self, message: impl Into<String>) {
        self.state.lock().connect_error = Some(message.into());
    }

    pub(crate) fn set_initial_status(&self, status: Option<DeviceStatus>) {
        self.state.lock().initial_status = status;
    }

    /// Pushes a status onto every open session state stream.
    pub(crate) fn push_status(&self, status: DeviceStatus) {
        for tx in &self.state.lock().status_streams {
            let _ = tx.send(Ok(DeviceSessionState::new(status)));
        }
    }

    /// Pushes an error onto every open session state stream.
    pub(crate) fn fail_status(&self, message: &str) {
        for tx in &self.state.lock().status_streams {
            let _ = tx.send(Err(Error::transport(message)));
        }
    }

    /// Ends every open session state stream.
    pub(crate) fn end_status(&self) {
        self.state.lock().status_streams.clear();
    }

    pub(crate) fn signer(&self) -> &FakeSigner {
        &self.signer
    }

    pub(crate) fn discovered_transports(&self) -> Vec<TransportType> {
        self.state.lock().discovered.clone()
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.state.lock().connects
    }

    pub(crate) fn disconnects(&self) -> Vec<SessionId> {
        self.state.lock().disconnects.clone()
    }

    pub(crate) fn close_count(&self) -> usize {
        self.state.lock().closes
    }
}

#[async_trait]
impl DeviceManager for FakeDeviceManager {
    fn start_discovering(
        &self,
        transport: TransportType,
    ) -> BoxStream<'static, Result<DiscoveredDevice>> {
        let mut state = self.state.lock();
        state.discovered.push(transport);
        match state.discovery.clone() {
            DiscoveryScript::Device => {
                let device = DiscoveredDevice {
                    id: "device-1".into(),
                    name: "Nano X".into(),
                    model: Some("nanoX".into()),
                    transport,
                };
                stream::iter([Ok(device)]).chain(stream::pending()).boxed()
            }
            DiscoveryScript::Error(message) => {
                stream::iter([Err(Error::transport(message))]).boxed()
            }
            DiscoveryScript::Empty => stream::empty().boxed(),
            DiscoveryScript::Pending => stream::pending().boxed(),
        }
    }

    async fn connect(&self, device: DiscoveredDevice) -> Result<ConnectedDevice> {
        let mut state = self.state.lock();
        state.connects += 1;
        if let Some(message) = state.connect_error.clone() {
            return Err(Error::transport(message));
        }
        Ok(ConnectedDevice {
            session_id: SessionId::new(format!("session-{}", state.connects)),
            id: device.id,
            name: device.name,
            model: device.model,
            transport: device.transport,
        })
    }

    fn session_state(
        &self,
        _session_id: &SessionId,
    ) -> BoxStream<'static, Result<DeviceSessionState>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        if let Some(status) = state.initial_status {
            let _ = tx.send(Ok(DeviceSessionState::new(status)));
        }
        state.status_streams.push(tx);
        receiver_stream(rx)
    }

    fn signer(&self, _session_id: &SessionId) -> Result<Arc<dyn Signer>> {
        Ok(Arc::new(self.signer.clone()))
    }

    async fn disconnect(&self, session_id: &SessionId) -> Result<()> {
        let mut state = self.state.lock();
        state.disconnects.push(session_id.clone());
        state.status_streams.clear();
        Ok(())
    }

    async fn close(&self) {
        self.state.lock().closes += 1;
    }
}

// ============================================================================
// RecordingHost
// ============================================================================

/// Frame host counting close requests.
#[derive(Default)]
pub(crate) struct RecordingHost {
    closes: AtomicUsize,
}

impl RecordingHost {
    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl FrameHost for RecordingHost {
    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Configures a [`Harness`].
pub(crate) struct HarnessBuilder {
    manager: FakeDeviceManager,
    options: BridgeOptions,
}

impl HarnessBuilder {
    pub(crate) fn discovery(self, script: DiscoveryScript) -> Self {
        self.manager.set_discovery(script);
        self
    }

    pub(crate) fn connect_error(self, message: &str) -> Self {
        self.manager.set_connect_error(message);
        self
    }

    pub(crate) fn initial_status(self, status: Option<DeviceStatus>) -> Self {
        self.manager.set_initial_status(status);
        self
    }

    pub(crate) fn options(mut self, options: BridgeOptions) -> Self {
        self.options = options;
        self
    }

    pub(crate) async fn spawn(self) -> Harness {
        init_tracing();
        let (replies_tx, replies) = mpsc::unbounded_channel();
        let (status_tx, status) = mpsc::unbounded_channel();
        let host = Arc::new(RecordingHost::default());

        let bridge = Bridge::builder()
            .device_manager(self.manager.clone())
            .status_sink(status_tx)
            .shared_frame_host(Arc::clone(&host) as Arc<dyn FrameHost>)
            .options(self.options)
            .spawn()
            .expect("spawn bridge");

        Harness {
            bridge,
            manager: self.manager,
            host,
            replies_tx,
            replies,
            status,
        }
    }
}

/// A live bridge wired to fakes, posting as a single host window.
pub(crate) struct Harness {
    pub bridge: Bridge,
    pub manager: FakeDeviceManager,
    pub host: Arc<RecordingHost>,
    replies_tx: mpsc::UnboundedSender<Value>,
    replies: mpsc::UnboundedReceiver<Value>,
    status: mpsc::UnboundedReceiver<StatusEvent>,
}

impl Harness {
    /// Options with an auto-close long enough to never fire in a test.
    pub(crate) fn quiet_options() -> BridgeOptions {
        BridgeOptions::new().with_auto_close_timeout(Duration::from_secs(3600))
    }

    pub(crate) fn builder() -> HarnessBuilder {
        HarnessBuilder {
            manager: FakeDeviceManager::new(),
            options: Self::quiet_options(),
        }
    }

    pub(crate) async fn new() -> Self {
        Self::builder().spawn().await
    }

    pub(crate) async fn with_options(options: BridgeOptions) -> Self {
        Self::builder().options(options).spawn().await
    }

    /// Posts a request envelope from the harness window.
    pub(crate) fn post(&self, action: &str, params: Value, message_id: Value) {
        self.post_raw(json!({
            "target": "LEDGER-IFRAME",
            "action": action,
            "params": params,
            "messageId": message_id
        }));
    }

    /// Posts arbitrary data from the harness window.
    pub(crate) fn post_raw(&self, data: Value) {
        self.bridge
            .post_message(MessageEvent::from_sender(data, self.replies_tx.clone()))
            .expect("bridge open");
    }

    /// Waits for the next message delivered to the harness window.
    pub(crate) async fn next_reply(&mut self) -> Value {
        tokio::time::timeout(WAIT, self.replies.recv())
            .await
            .expect("reply in time")
            .expect("reply channel open")
    }

    /// Returns an already delivered message, if any.
    pub(crate) fn try_reply(&mut self) -> Option<Value> {
        self.replies.try_recv().ok()
    }

    /// Returns every status event published so far.
    pub(crate) fn drain_status(&mut self) -> Vec<StatusEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.status.try_recv() {
            events.push(event);
        }
        events
    }

    /// Waits for a status event matching `predicate`.
    pub(crate) async fn wait_for_status(&mut self, predicate: impl Fn(&StatusEvent) -> bool) {
        tokio::time::timeout(WAIT, async {
            while let Some(event) = self.status.recv().await {
                if predicate(&event) {
                    return;
                }
            }
        })
        .await
        .expect("status event in time");
    }

    /// Waits until the signer has seen `count` calls.
    pub(crate) async fn wait_for_signer_calls(&self, count: usize) -> Vec<SignerCall> {
        tokio::time::timeout(WAIT, async {
            loop {
                let calls = self.manager.signer().calls();
                if calls.len() >= count {
                    return calls;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("signer calls in time")
    }

    /// Lets the bridge process everything already queued.
    pub(crate) async fn settle(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
