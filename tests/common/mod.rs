//! Shared test utilities for integration tests.
//!
//! Provides a scripted `Connector` / `Transport` pair so registry and
//! supervisor behaviour can be exercised without a real SSH server.

// Allow unused items - not every test file uses every helper
#![allow(dead_code)]

mod sftp_server;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use shellmaster_core::models::{AppSettings, HostData, OutputEntry, OutputKind};
use shellmaster_core::services::credentials::{CredentialStore, MemoryCredentialStore, Secret};
use shellmaster_core::services::storage::Storage;
use shellmaster_core::ssh::{
    BoxedStream, ConnectRequest, ConnectionEvent, ConnectionStage, Connector, ExecStream,
    OutputChunk, PtyRequest, ShellChannel, SshError, Transport,
};
use shellmaster_core::{SessionEvent, SessionRegistry};

// Re-exports for convenience
pub use sftp_server::{MemoryFs, HOME};
pub use tempfile::{tempdir, TempDir};

/// Default timeout for async test operations
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Mock Transport
// ============================================================================

/// Scripted transport: commands answer from a response table, everything
/// else echoes the command and exits 0. The "sftp" subsystem is served
/// from the connector's in-memory file tree.
pub struct MockTransport {
    pub serial: usize,
    alive: AtomicBool,
    closed: AtomicBool,
    responses: HashMap<String, Vec<OutputChunk>>,
    /// Commands whose output stream never ends
    hanging: HashSet<String>,
    executed: Mutex<Vec<String>>,
    fs: MemoryFs,
}

impl MockTransport {
    fn new(
        serial: usize,
        responses: HashMap<String, Vec<OutputChunk>>,
        hanging: HashSet<String>,
        fs: MemoryFs,
    ) -> Self {
        Self {
            serial,
            alive: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            responses,
            hanging,
            executed: Mutex::new(Vec::new()),
            fs,
        }
    }

    /// Simulate the connection dropping underneath the session
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Whether `disconnect` was called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.is_closed()
    }

    async fn open_shell(&self, _pty: PtyRequest) -> Result<Arc<dyn ShellChannel>, SshError> {
        if !self.is_alive() {
            return Err(SshError::Disconnected("mock transport is down".into()));
        }
        Ok(Arc::new(MockShell::default()))
    }

    async fn execute(&self, command: &str) -> Result<ExecStream, SshError> {
        if !self.is_alive() {
            return Err(SshError::Disconnected("mock transport is down".into()));
        }
        self.executed.lock().push(command.to_string());

        let chunks = self.responses.get(command).cloned().unwrap_or_else(|| {
            vec![
                OutputChunk::Stdout(format!("{}\n", command).into_bytes()),
                OutputChunk::Exit(0),
            ]
        });
        let hang = self.hanging.contains(command);

        let (tx, stream) = ExecStream::channel(16);
        tokio::spawn(async move {
            for chunk in chunks {
                if tx.send(chunk).await.is_err() {
                    return;
                }
            }
            if hang {
                // keep the sender alive so the stream never ends
                tx.closed().await;
            }
        });
        Ok(stream)
    }

    async fn open_subsystem(&self, name: &str) -> Result<BoxedStream, SshError> {
        if !self.is_alive() {
            return Err(SshError::Disconnected("mock transport is down".into()));
        }
        if name != "sftp" {
            return Err(SshError::Channel(format!(
                "subsystem '{}' not supported by mock",
                name
            )));
        }
        Ok(self.fs.serve().await)
    }

    async fn disconnect(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Shell that echoes every write back as output
#[derive(Default)]
pub struct MockShell {
    pending: Mutex<VecDeque<Vec<u8>>>,
    notify: tokio::sync::Notify,
    closed: AtomicBool,
}

#[async_trait]
impl ShellChannel for MockShell {
    async fn write(&self, data: &[u8]) -> Result<(), SshError> {
        self.pending.lock().push_back(data.to_vec());
        self.notify.notify_one();
        Ok(())
    }

    async fn read(&self) -> Result<Option<Vec<u8>>, SshError> {
        loop {
            if let Some(data) = self.pending.lock().pop_front() {
                return Ok(Some(data));
            }
            if self.closed.load(Ordering::SeqCst) {
                return Ok(None);
            }
            self.notify.notified().await;
        }
    }

    async fn resize(&self, _cols: u32, _rows: u32) -> Result<(), SshError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), SshError> {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_one();
        Ok(())
    }
}

// ============================================================================
// Mock Connector
// ============================================================================

#[derive(Default)]
pub struct MockConnector {
    attempts: AtomicUsize,
    failures: Mutex<VecDeque<SshError>>,
    transports: Mutex<Vec<Arc<MockTransport>>>,
    delay: Mutex<Duration>,
    responses: Mutex<HashMap<String, Vec<OutputChunk>>>,
    hanging: Mutex<HashSet<String>>,
    secrets: Mutex<Vec<Option<Secret>>>,
    trusted: Mutex<Vec<(String, String, String)>>,
    fs: MemoryFs,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of connect attempts made so far
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Queue an error for the next connect attempt
    pub fn fail_next(&self, error: SshError) {
        self.failures.lock().push_back(error);
    }

    /// Delay every connect attempt
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Script the output of a command on transports created from now on
    pub fn respond(&self, command: &str, chunks: Vec<OutputChunk>) {
        self.responses.lock().insert(command.to_string(), chunks);
    }

    /// Make a command's output stream never finish
    pub fn hang_on(&self, command: &str) {
        self.hanging.lock().insert(command.to_string());
    }

    pub fn transports(&self) -> Vec<Arc<MockTransport>> {
        self.transports.lock().clone()
    }

    pub fn last_transport(&self) -> Option<Arc<MockTransport>> {
        self.transports.lock().last().cloned()
    }

    pub fn secrets(&self) -> Vec<Option<Secret>> {
        self.secrets.lock().clone()
    }

    pub fn trusted(&self) -> Vec<(String, String, String)> {
        self.trusted.lock().clone()
    }

    /// File tree behind every transport's sftp subsystem
    pub fn fs(&self) -> MemoryFs {
        self.fs.clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        request: ConnectRequest,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<Arc<dyn Transport>, SshError> {
        let serial = self.attempts.fetch_add(1, Ordering::SeqCst);
        self.secrets.lock().push(request.secret.clone());

        let _ = events.send(ConnectionEvent::StageChanged(ConnectionStage::ConnectingHost));

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failures.lock().pop_front();
        if let Some(error) = failure {
            let _ = events.send(ConnectionEvent::Failed {
                error: error.to_string(),
            });
            return Err(error);
        }

        let transport = Arc::new(MockTransport::new(
            serial,
            self.responses.lock().clone(),
            self.hanging.lock().clone(),
            self.fs.clone(),
        ));
        self.transports.lock().push(transport.clone());

        let _ = events.send(ConnectionEvent::StageChanged(ConnectionStage::Connected));
        let _ = events.send(ConnectionEvent::Connected {
            session_id: request.session_id,
        });
        Ok(transport)
    }

    fn trust_host_key(&self, host: &HostData, key_type: &str, fingerprint: &str) {
        self.trusted.lock().push((
            host.id.clone(),
            key_type.to_string(),
            fingerprint.to_string(),
        ));
    }
}

// ============================================================================
// Test Environment Setup
// ============================================================================

/// Isolated storage directory plus helpers to build registries on it.
pub struct TestEnv {
    /// Temporary directory for test files
    pub temp_dir: TempDir,
    pub storage: Storage,
    pub credentials: Arc<MemoryCredentialStore>,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = tempdir().expect("Failed to create temp directory");
        let storage =
            Storage::new(temp_dir.path().join("shellmaster")).expect("Failed to create storage");
        Self {
            temp_dir,
            storage,
            credentials: Arc::new(MemoryCredentialStore::new()),
        }
    }

    /// Settings tuned for tests: no waiting between reconnect attempts
    pub fn settings() -> AppSettings {
        let mut settings = AppSettings::default();
        settings.connection.reconnect_interval_secs = 0;
        settings.connection.reconnect_max_backoff_secs = 0;
        settings
    }

    pub fn registry(&self, connector: Arc<MockConnector>) -> SessionRegistry {
        self.registry_with(connector, Self::settings())
    }

    pub fn registry_with(
        &self,
        connector: Arc<MockConnector>,
        settings: AppSettings,
    ) -> SessionRegistry {
        SessionRegistry::load(
            self.storage.clone(),
            settings,
            connector,
            self.credentials.clone(),
        )
        .expect("Failed to load registry")
    }

    /// Whether the credential store no longer holds a secret for the host
    pub fn credentials_removed(&self, host_id: &str) -> bool {
        self.credentials.retrieve(host_id).is_none()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Host "test.local:22", user "alice", password auth
pub fn add_test_host(registry: &SessionRegistry) -> HostData {
    registry
        .add_host(
            HostData::with_password("test", "test.local", 22, "alice"),
            Some(Secret::new("pw")),
        )
        .expect("Failed to add host")
}

/// Drain every event currently buffered on a receiver
pub fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Status changes for one session, in order
pub fn statuses(
    events: &[SessionEvent],
    session_id: &str,
) -> Vec<shellmaster_core::models::SessionStatus> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::StatusChanged {
                session_id: id,
                status,
            } if id == session_id => Some(*status),
            _ => None,
        })
        .collect()
}

pub fn kinds(entries: &[OutputEntry]) -> Vec<OutputKind> {
    entries.iter().map(|e| e.kind).collect()
}

pub fn count_kind(entries: &[OutputEntry], kind: OutputKind) -> usize {
    entries.iter().filter(|e| e.kind == kind).count()
}

/// Poll `check` until it holds or the timeout expires
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
