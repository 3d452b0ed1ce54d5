// 会话注册表
//
// 会话 id -> 至多一个存活连接。连接生命周期与界面焦点无关：
// set_active 只改变激活标记，断开只能由 disconnect / delete 触发。

mod error;
mod event;
mod sftp;
mod slot;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Local;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::models::{
    AppSettings, HostData, OutputEntry, SessionData, SessionStatus, Utf8Decoder,
};
use crate::services::credentials::{CredentialStore, Secret};
use crate::services::sftp::SftpHandler;
use crate::services::storage::Storage;
use crate::ssh::{
    ConnectRequest, ConnectionEvent, Connector, LogLevel, OutputChunk, PtyRequest, SshError,
    Transport,
};
use crate::supervisor::ReconnectPolicy;

pub use error::RegistryError;
pub use event::SessionEvent;
pub use sftp::SessionSftp;
use slot::{SessionSlot, ShellState};

/// 事件广播缓冲
const EVENT_CAPACITY: usize = 256;

/// 一次恢复检查的结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// 不需要处理（未连接、连接正常、正在被其他操作占用、已删除）
    Skipped,
    /// 重连成功
    Recovered,
    /// 重连失败，会话进入 Error
    Failed,
    /// 被用户断开或删除打断
    Cancelled,
}

struct RegistryInner {
    storage: Storage,
    settings: AppSettings,
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialStore>,
    hosts: RwLock<Vec<HostData>>,
    sessions: RwLock<Vec<SessionData>>,
    slots: RwLock<HashMap<String, Arc<SessionSlot>>>,
    /// 保证快照按顺序写盘
    persist_lock: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
}

/// 会话注册表（克隆开销很小，内部共享）
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    /// 从存储加载主机和会话
    ///
    /// 会话状态一律重置为 Disconnected，激活标记至多保留一个。
    pub fn load(
        storage: Storage,
        settings: AppSettings,
        connector: Arc<dyn Connector>,
        credentials: Arc<dyn CredentialStore>,
    ) -> anyhow::Result<Self> {
        let hosts = storage.load_hosts()?;
        let mut sessions = storage.load_sessions()?;

        let mut seen_active = false;
        for session in &mut sessions {
            if session.is_active && seen_active {
                session.is_active = false;
            }
            seen_active |= session.is_active;
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let max_output = settings.output.max_entries;
        let slots = sessions
            .iter()
            .map(|s| {
                (
                    s.id.clone(),
                    Arc::new(SessionSlot::new(s.id.clone(), max_output, events.clone())),
                )
            })
            .collect();

        info!(
            "[Registry] Loaded {} hosts and {} sessions from {}",
            hosts.len(),
            sessions.len(),
            storage.dir().display()
        );

        Ok(Self {
            inner: Arc::new(RegistryInner {
                storage,
                settings,
                connector,
                credentials,
                hosts: RwLock::new(hosts),
                sessions: RwLock::new(sessions),
                slots: RwLock::new(slots),
                persist_lock: Mutex::new(()),
                events,
            }),
        })
    }

    pub fn settings(&self) -> &AppSettings {
        &self.inner.settings
    }

    /// 订阅会话事件
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.inner.events.send(event);
    }

    fn slot(&self, session_id: &str) -> Result<Arc<SessionSlot>, RegistryError> {
        self.inner
            .slots
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| RegistryError::SessionNotFound(session_id.to_string()))
    }

    // ======================== 持久化 ========================

    fn persist_hosts(&self) -> Result<(), RegistryError> {
        let _guard = self.inner.persist_lock.lock();
        let snapshot = self.inner.hosts.read().clone();
        self.inner.storage.save_hosts(&snapshot)?;
        Ok(())
    }

    fn persist_sessions(&self) -> Result<(), RegistryError> {
        let _guard = self.inner.persist_lock.lock();
        let snapshot = self.inner.sessions.read().clone();
        self.inner.storage.save_sessions(&snapshot)?;
        Ok(())
    }

    /// 状态类更新：写盘失败只记录日志，不影响内存状态
    fn persist_sessions_logged(&self) {
        if let Err(e) = self.persist_sessions() {
            error!("[Registry] Failed to save sessions: {}", e);
        }
    }

    // ======================== 主机 ========================

    pub fn hosts(&self) -> Vec<HostData> {
        self.inner.hosts.read().clone()
    }

    pub fn host(&self, host_id: &str) -> Option<HostData> {
        self.inner
            .hosts
            .read()
            .iter()
            .find(|h| h.id == host_id)
            .cloned()
    }

    /// 添加或更新主机；secret 为密码或私钥口令，只写入凭据存储
    pub fn add_host(
        &self,
        mut host: HostData,
        secret: Option<Secret>,
    ) -> Result<HostData, RegistryError> {
        if host.id.is_empty() {
            host.id = uuid::Uuid::new_v4().to_string();
        }
        if let Some(secret) = secret {
            self.inner.credentials.store(&host.id, secret);
        }

        {
            let mut hosts = self.inner.hosts.write();
            match hosts.iter_mut().find(|h| h.id == host.id) {
                Some(existing) => *existing = host.clone(),
                None => hosts.push(host.clone()),
            }
        }
        self.persist_hosts()?;

        info!(
            "[Registry] Saved host '{}' ({})",
            host.label,
            host.display_target()
        );
        self.emit(SessionEvent::HostsChanged);
        Ok(host)
    }

    /// 删除主机及其所有会话
    pub async fn remove_host(&self, host_id: &str) -> Result<(), RegistryError> {
        if self.host(host_id).is_none() {
            return Err(RegistryError::HostNotFound(host_id.to_string()));
        }

        let session_ids: Vec<String> = self
            .inner
            .sessions
            .read()
            .iter()
            .filter(|s| s.host_id == host_id)
            .map(|s| s.id.clone())
            .collect();
        for session_id in session_ids {
            match self.delete_session(&session_id).await {
                Ok(()) | Err(RegistryError::SessionNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        self.inner.hosts.write().retain(|h| h.id != host_id);
        self.inner.credentials.remove(host_id);
        self.persist_hosts()?;

        info!("[Registry] Removed host {}", host_id);
        self.emit(SessionEvent::HostsChanged);
        Ok(())
    }

    /// 用户确认后信任主机的新密钥
    pub fn trust_host_key(
        &self,
        host_id: &str,
        key_type: &str,
        fingerprint: &str,
    ) -> Result<(), RegistryError> {
        let host = self
            .host(host_id)
            .ok_or_else(|| RegistryError::HostNotFound(host_id.to_string()))?;
        self.inner
            .connector
            .trust_host_key(&host, key_type, fingerprint);
        Ok(())
    }

    fn mark_host_connected(&self, host_id: &str) {
        let updated = {
            let mut hosts = self.inner.hosts.write();
            match hosts.iter_mut().find(|h| h.id == host_id) {
                Some(host) => {
                    host.last_connected_at = Some(Local::now());
                    true
                }
                None => false,
            }
        };
        if updated {
            if let Err(e) = self.persist_hosts() {
                error!("[Registry] Failed to save hosts: {}", e);
            }
        }
    }

    // ======================== 会话 ========================

    pub fn sessions(&self) -> Vec<SessionData> {
        self.inner.sessions.read().clone()
    }

    pub fn session(&self, session_id: &str) -> Option<SessionData> {
        self.inner
            .sessions
            .read()
            .iter()
            .find(|s| s.id == session_id)
            .cloned()
    }

    pub fn status(&self, session_id: &str) -> Option<SessionStatus> {
        self.session(session_id).map(|s| s.status)
    }

    /// 为主机创建新会话（未连接）
    pub fn create_session(
        &self,
        host_id: &str,
        name: impl Into<String>,
    ) -> Result<SessionData, RegistryError> {
        if self.host(host_id).is_none() {
            return Err(RegistryError::HostNotFound(host_id.to_string()));
        }

        let session = SessionData::new(host_id, name);
        let slot = Arc::new(SessionSlot::new(
            session.id.clone(),
            self.inner.settings.output.max_entries,
            self.inner.events.clone(),
        ));
        self.inner.slots.write().insert(session.id.clone(), slot);
        self.inner.sessions.write().push(session.clone());
        self.persist_sessions()?;

        info!(
            "[Registry] Created session {} ('{}') for host {}",
            session.id, session.name, host_id
        );
        self.emit(SessionEvent::SessionsChanged);
        Ok(session)
    }

    /// 状态迁移（非法迁移被拒绝）
    fn set_status(&self, session_id: &str, next: SessionStatus) -> Result<(), RegistryError> {
        {
            let mut sessions = self.inner.sessions.write();
            let session = sessions
                .iter_mut()
                .find(|s| s.id == session_id)
                .ok_or_else(|| RegistryError::SessionNotFound(session_id.to_string()))?;

            if session.status == next {
                return Ok(());
            }
            if !session.status.can_transition_to(next) {
                warn!(
                    "[Registry] Refusing transition {} -> {} for session {}",
                    session.status, next, session_id
                );
                return Err(RegistryError::InvalidTransition {
                    session_id: session_id.to_string(),
                    from: session.status,
                    to: next,
                });
            }

            debug!(
                "[Registry] Session {}: {} -> {}",
                session_id, session.status, next
            );
            session.status = next;
            session.touch();
        }

        self.persist_sessions_logged();
        self.emit(SessionEvent::StatusChanged {
            session_id: session_id.to_string(),
            status: next,
        });
        Ok(())
    }

    /// 后台路径上的状态迁移：没有调用方接收错误，只记录日志
    fn set_status_logged(&self, session_id: &str, next: SessionStatus) {
        if let Err(e) = self.set_status(session_id, next) {
            warn!(
                "[Registry] Failed to move session {} to {}: {}",
                session_id, next, e
            );
        }
    }

    fn touch_session(&self, session_id: &str) {
        if let Some(session) = self
            .inner
            .sessions
            .write()
            .iter_mut()
            .find(|s| s.id == session_id)
        {
            session.touch();
        }
    }

    /// 设置激活会话（None 表示清除）；不影响任何连接和状态
    pub fn set_active(&self, session_id: Option<&str>) -> Result<(), RegistryError> {
        {
            let mut sessions = self.inner.sessions.write();
            if let Some(id) = session_id {
                if !sessions.iter().any(|s| s.id == id) {
                    return Err(RegistryError::SessionNotFound(id.to_string()));
                }
            }
            for session in sessions.iter_mut() {
                session.is_active = Some(session.id.as_str()) == session_id;
                if session.is_active {
                    session.touch();
                }
            }
        }

        self.persist_sessions()?;
        self.emit(SessionEvent::ActiveChanged {
            session_id: session_id.map(str::to_string),
        });
        Ok(())
    }

    pub fn active_session(&self) -> Option<SessionData> {
        self.inner
            .sessions
            .read()
            .iter()
            .find(|s| s.is_active)
            .cloned()
    }

    // ======================== 连接 ========================

    /// 连接会话
    ///
    /// 并发调用会合并到正在进行的那次尝试上，并拿到同一个结果。
    pub async fn connect(&self, session_id: &str) -> Result<(), RegistryError> {
        let slot = self.slot(session_id)?;
        let observed = slot.connect_generation();
        let _guard = slot.op_lock.lock().await;

        if slot.is_deleted() {
            return Err(RegistryError::SessionNotFound(session_id.to_string()));
        }
        if slot.connect_generation() != observed {
            if let Some(outcome) = slot.last_connect() {
                debug!(
                    "[Registry] Connect for session {} coalesced onto previous attempt",
                    session_id
                );
                return outcome;
            }
        }

        let session = self
            .session(session_id)
            .ok_or_else(|| RegistryError::SessionNotFound(session_id.to_string()))?;

        if session.status == SessionStatus::Connected {
            if slot.live_transport().is_some() {
                return Ok(());
            }
            // 连接已失效但 supervisor 尚未处理：先清理再重新连接
            slot.teardown().await;
            self.set_status(session_id, SessionStatus::Disconnected)?;
        }

        let host = self
            .host(&session.host_id)
            .ok_or_else(|| RegistryError::HostNotFound(session.host_id.clone()))?;

        let token = slot.token();
        if token.is_cancelled() {
            return Err(RegistryError::ssh(session_id, SshError::Cancelled));
        }

        self.set_status(session_id, SessionStatus::Connecting)?;
        info!(
            "[Registry] Connecting session {} to {}",
            session_id,
            host.display_target()
        );

        let outcome = match self.establish(session_id, &host, &token).await {
            Ok(transport) => {
                slot.set_transport(transport);
                self.set_status(session_id, SessionStatus::Connected)?;
                slot.record(OutputEntry::system(format!(
                    "Connected to {}",
                    host.display_target()
                )));
                self.mark_host_connected(&host.id);
                Ok(())
            }
            // 由 disconnect / delete 负责后续状态
            Err(SshError::Cancelled) => {
                info!("[Registry] Connect for session {} cancelled", session_id);
                Err(RegistryError::ssh(session_id, SshError::Cancelled))
            }
            Err(e) => {
                warn!(
                    "[Registry] Session {} failed to connect: {}",
                    session_id, e
                );
                slot.record(OutputEntry::error(format!("Connection failed: {}", e)));
                self.report_host_key_rejection(session_id, &host, &e);
                self.set_status(session_id, SessionStatus::Error)?;
                Err(RegistryError::ssh(session_id, e))
            }
        };

        slot.finish_connect(&outcome);
        outcome
    }

    /// 发起一次连接，连接过程事件转发给观察者
    async fn establish(
        &self,
        session_id: &str,
        host: &HostData,
        token: &tokio_util::sync::CancellationToken,
    ) -> Result<Arc<dyn Transport>, SshError> {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        let events = self.inner.events.clone();
        let forward_id = session_id.to_string();
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                match event {
                    ConnectionEvent::StageChanged(stage) => {
                        let _ = events.send(SessionEvent::Stage {
                            session_id: forward_id.clone(),
                            stage,
                        });
                    }
                    ConnectionEvent::Log(entry) => match entry.level {
                        LogLevel::Warn | LogLevel::Error => {
                            warn!("[SSH] [{}] {}", forward_id, entry.message)
                        }
                        _ => debug!("[SSH] [{}] {}", forward_id, entry.message),
                    },
                    ConnectionEvent::Connected { .. } => {
                        let _ = events.send(SessionEvent::Connected {
                            session_id: forward_id.clone(),
                        });
                    }
                    ConnectionEvent::Failed { error } => {
                        let _ = events.send(SessionEvent::ConnectFailed {
                            session_id: forward_id.clone(),
                            error,
                        });
                    }
                }
            }
        });

        let request = ConnectRequest {
            session_id: session_id.to_string(),
            host: host.clone(),
            secret: self.inner.credentials.retrieve(&host.id),
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(SshError::Cancelled),
            result = self.inner.connector.connect(request, event_tx) => result,
        }
    }

    fn report_host_key_rejection(&self, session_id: &str, host: &HostData, error: &SshError) {
        let (key_type, fingerprint, expected) = match error {
            SshError::HostKeyMismatch {
                key_type,
                expected,
                actual,
                ..
            } => (key_type, actual, Some(expected.clone())),
            SshError::HostKeyUnknown {
                key_type,
                fingerprint,
                ..
            } => (key_type, fingerprint, None),
            _ => return,
        };
        self.emit(SessionEvent::HostKeyRejected {
            session_id: session_id.to_string(),
            host_id: host.id.clone(),
            key_type: key_type.clone(),
            fingerprint: fingerprint.clone(),
            expected,
        });
    }

    /// 断开会话；可重复调用
    pub async fn disconnect(&self, session_id: &str) -> Result<(), RegistryError> {
        let slot = self.slot(session_id)?;
        // 先取消，进行中的 connect / execute / 重连退避才会尽快释放锁
        slot.cancel_pending();
        let _guard = slot.op_lock.lock().await;
        slot.reset_token();
        slot.forget_connect();

        if slot.is_deleted() {
            return Err(RegistryError::SessionNotFound(session_id.to_string()));
        }

        let status = self
            .status(session_id)
            .ok_or_else(|| RegistryError::SessionNotFound(session_id.to_string()))?;
        let had_transport = slot.has_transport();
        slot.teardown().await;

        if status == SessionStatus::Disconnected && !had_transport {
            return Ok(());
        }

        self.set_status(session_id, SessionStatus::Disconnected)?;
        slot.record(OutputEntry::system("Disconnected"));
        info!("[Registry] Session {} disconnected", session_id);
        Ok(())
    }

    /// 删除会话：先断开，再移除记录、输出日志和 slot
    pub async fn delete_session(&self, session_id: &str) -> Result<(), RegistryError> {
        let slot = self.slot(session_id)?;
        slot.cancel_pending();
        let _guard = slot.op_lock.lock().await;

        if slot.is_deleted() {
            return Err(RegistryError::SessionNotFound(session_id.to_string()));
        }
        // 之后拿到这个 slot 的操作都会看到删除标记
        slot.mark_deleted();
        self.inner.slots.write().remove(session_id);

        slot.teardown().await;
        slot.clear_output();

        let was_active = {
            let mut sessions = self.inner.sessions.write();
            let was_active = sessions
                .iter()
                .any(|s| s.id == session_id && s.is_active);
            sessions.retain(|s| s.id != session_id);
            was_active
        };
        self.persist_sessions()?;

        info!("[Registry] Deleted session {}", session_id);
        self.emit(SessionEvent::SessionsChanged);
        if was_active {
            self.emit(SessionEvent::ActiveChanged { session_id: None });
        }
        Ok(())
    }

    /// 断开所有会话（退出时调用）
    pub async fn disconnect_all(&self) {
        let ids: Vec<String> = self.inner.slots.read().keys().cloned().collect();
        let tasks = ids.iter().map(|id| self.disconnect(id));
        for (id, result) in ids.iter().zip(futures::future::join_all(tasks).await) {
            if let Err(e) = result {
                warn!("[Registry] Failed to disconnect session {}: {}", id, e);
            }
        }
    }

    /// 存活连接数
    pub fn live_transport_count(&self) -> usize {
        self.inner
            .slots
            .read()
            .values()
            .filter(|slot| slot.live_transport().is_some())
            .count()
    }

    /// 会话当前是否持有连接（不论是否存活）
    pub fn has_transport(&self, session_id: &str) -> bool {
        self.slot(session_id)
            .map(|slot| slot.has_transport())
            .unwrap_or(false)
    }

    // ======================== 命令 ========================

    /// 在会话上执行命令，输出按到达顺序写入日志；返回退出码
    ///
    /// 命令失败只记录在日志中，不改变会话状态。
    pub async fn execute_command(
        &self,
        session_id: &str,
        command: &str,
    ) -> Result<Option<u32>, RegistryError> {
        let slot = self.slot(session_id)?;
        let _guard = slot.op_lock.lock().await;

        if slot.is_deleted() {
            return Err(RegistryError::SessionNotFound(session_id.to_string()));
        }

        let Some(transport) = slot.live_transport() else {
            warn!(
                "[Registry] Command on session {} rejected: not connected",
                session_id
            );
            slot.record(OutputEntry::error(format!(
                "Not connected, command not sent: {}",
                command
            )));
            return Err(RegistryError::NotConnected(session_id.to_string()));
        };

        self.touch_session(session_id);
        slot.record(OutputEntry::command(command));

        let token = slot.token();
        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => Err(SshError::Cancelled),
            stream = transport.execute(command) => stream,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                warn!(
                    "[Registry] Command on session {} failed: {}",
                    session_id, e
                );
                slot.record(OutputEntry::error(format!("Command failed: {}", e)));
                return Err(RegistryError::ssh(session_id, e));
            }
        };

        let mut exit_code = None;
        let mut stdout = Utf8Decoder::new();
        let mut stderr = Utf8Decoder::new();
        loop {
            let chunk = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    slot.record(OutputEntry::error("Command interrupted"));
                    return Err(RegistryError::ssh(session_id, SshError::Cancelled));
                }
                chunk = stream.next() => chunk,
            };
            match chunk {
                Some(OutputChunk::Stdout(data)) => {
                    let text = stdout.decode(&data);
                    if !text.is_empty() {
                        slot.record(OutputEntry::stdout(text));
                    }
                }
                Some(OutputChunk::Stderr(data)) => {
                    let text = stderr.decode(&data);
                    if !text.is_empty() {
                        slot.record(OutputEntry::stderr(text));
                    }
                }
                Some(OutputChunk::Exit(code)) => exit_code = Some(code),
                None => break,
            }
        }

        // 流结束时残留的不完整字符
        let rest = stdout.finish();
        if !rest.is_empty() {
            slot.record(OutputEntry::stdout(rest));
        }
        let rest = stderr.finish();
        if !rest.is_empty() {
            slot.record(OutputEntry::stderr(rest));
        }

        match exit_code {
            Some(0) => {}
            Some(code) => slot.record(OutputEntry::system(format!(
                "Process exited with code {}",
                code
            ))),
            None if !transport.is_alive() => {
                let e = SshError::Disconnected("Connection lost during command".to_string());
                slot.record(OutputEntry::error(e.to_string()));
                return Err(RegistryError::ssh(session_id, e));
            }
            None => {}
        }
        Ok(exit_code)
    }

    pub fn output(&self, session_id: &str) -> Result<Vec<OutputEntry>, RegistryError> {
        Ok(self.slot(session_id)?.output())
    }

    pub fn clear_output(&self, session_id: &str) -> Result<(), RegistryError> {
        self.slot(session_id)?.clear_output();
        Ok(())
    }

    // ======================== Shell ========================

    /// 打开交互式 Shell，输出以 Stdout 条目写入日志
    pub async fn open_shell(&self, session_id: &str, pty: PtyRequest) -> Result<(), RegistryError> {
        let slot = self.slot(session_id)?;
        let _guard = slot.op_lock.lock().await;

        let transport = slot
            .live_transport()
            .filter(|_| !slot.is_deleted())
            .ok_or_else(|| RegistryError::NotConnected(session_id.to_string()))?;

        let channel = transport
            .open_shell(pty)
            .await
            .map_err(|e| RegistryError::ssh(session_id, e))?;

        let token = slot.token();
        let pump_slot = slot.clone();
        let pump_channel = channel.clone();
        let pump_id = session_id.to_string();
        let pump = tokio::spawn(async move {
            let mut decoder = Utf8Decoder::new();
            loop {
                let read = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    read = pump_channel.read() => read,
                };
                match read {
                    Ok(Some(data)) => {
                        let text = decoder.decode(&data);
                        if !text.is_empty() {
                            pump_slot.record(OutputEntry::stdout(text));
                        }
                    }
                    Ok(None) => {
                        debug!("[Registry] Shell of session {} closed", pump_id);
                        let rest = decoder.finish();
                        if !rest.is_empty() {
                            pump_slot.record(OutputEntry::stdout(rest));
                        }
                        break;
                    }
                    Err(e) => {
                        pump_slot.record(OutputEntry::error(format!("Shell error: {}", e)));
                        break;
                    }
                }
            }
        });

        if let Some(previous) = slot.set_shell(ShellState { channel, pump }) {
            previous.pump.abort();
            let _ = previous.channel.close().await;
        }
        info!("[Registry] Shell opened for session {}", session_id);
        Ok(())
    }

    pub async fn write_shell(&self, session_id: &str, data: &[u8]) -> Result<(), RegistryError> {
        let channel = self
            .slot(session_id)?
            .shell_channel()
            .ok_or_else(|| RegistryError::NotConnected(session_id.to_string()))?;
        channel
            .write(data)
            .await
            .map_err(|e| RegistryError::ssh(session_id, e))
    }

    pub async fn resize_shell(
        &self,
        session_id: &str,
        cols: u32,
        rows: u32,
    ) -> Result<(), RegistryError> {
        let channel = self
            .slot(session_id)?
            .shell_channel()
            .ok_or_else(|| RegistryError::NotConnected(session_id.to_string()))?;
        channel
            .resize(cols, rows)
            .await
            .map_err(|e| RegistryError::ssh(session_id, e))
    }

    // ======================== SFTP ========================

    /// 在会话连接上打开 SFTP；会话断开时该连接上的操作返回 Cancelled
    ///
    /// 之后每个操作的失败都会写入该会话的输出日志。
    pub async fn open_sftp(&self, session_id: &str) -> Result<SessionSftp, RegistryError> {
        let slot = self.slot(session_id)?;
        let Some(transport) = slot.live_transport().filter(|_| !slot.is_deleted()) else {
            warn!(
                "[Registry] SFTP on session {} rejected: not connected",
                session_id
            );
            slot.record(OutputEntry::error("Not connected, SFTP unavailable"));
            return Err(RegistryError::NotConnected(session_id.to_string()));
        };

        let handler = SftpHandler::open(
            session_id,
            transport.as_ref(),
            self.inner.settings.sftp.chunk_size,
            slot.token().child_token(),
        )
        .await
        .map_err(|e| {
            warn!(
                "[Registry] Failed to open SFTP for session {}: {}",
                session_id, e
            );
            slot.record(OutputEntry::error(format!("SFTP unavailable: {}", e)));
            RegistryError::sftp(session_id, e)
        })?;

        Ok(SessionSftp::new(handler, slot))
    }

    // ======================== 恢复 ========================

    /// 需要 supervisor 检查的会话：状态为 Connected 且连接已失效
    pub fn dead_sessions(&self) -> Vec<String> {
        let connected: Vec<String> = self
            .inner
            .sessions
            .read()
            .iter()
            .filter(|s| s.status == SessionStatus::Connected)
            .map(|s| s.id.clone())
            .collect();

        let slots = self.inner.slots.read();
        connected
            .into_iter()
            .filter(|id| {
                slots
                    .get(id)
                    .map(|slot| slot.live_transport().is_none())
                    .unwrap_or(false)
            })
            .collect()
    }

    /// 恢复失效的连接（由 supervisor 调用）
    ///
    /// 会话正被其他操作占用时直接跳过，下一轮再检查。
    pub async fn recover(&self, session_id: &str, policy: &ReconnectPolicy) -> RecoveryOutcome {
        let Ok(slot) = self.slot(session_id) else {
            return RecoveryOutcome::Skipped;
        };
        let Ok(_guard) = slot.op_lock.try_lock() else {
            return RecoveryOutcome::Skipped;
        };
        if slot.is_deleted() || self.status(session_id) != Some(SessionStatus::Connected) {
            return RecoveryOutcome::Skipped;
        }
        if slot.live_transport().is_some() {
            return RecoveryOutcome::Skipped;
        }

        warn!("[Reconnect] Session {} lost its connection", session_id);
        slot.teardown().await;

        let host = self
            .session(session_id)
            .and_then(|s| self.host(&s.host_id));
        let Some(host) = host.filter(|_| self.inner.settings.connection.auto_reconnect) else {
            // 不自动重连：按断开处理，由用户手动重新连接
            slot.record(OutputEntry::error("Connection lost"));
            self.set_status_logged(session_id, SessionStatus::Disconnected);
            return RecoveryOutcome::Failed;
        };

        if self
            .set_status(session_id, SessionStatus::Reconnecting)
            .is_err()
        {
            return RecoveryOutcome::Skipped;
        }
        slot.record(OutputEntry::system("Connection lost, reconnecting..."));

        let token = slot.token();
        let mut last_error = None;

        for attempt in 1..=policy.max_attempts {
            if attempt > 1 {
                let delay = policy.delay(attempt - 1);
                debug!(
                    "[Reconnect] Waiting {:?} before next attempt for session {}",
                    delay, session_id
                );
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return RecoveryOutcome::Cancelled,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            info!(
                "[Reconnect] [{}] Attempt {}/{}",
                session_id, attempt, policy.max_attempts
            );

            match self.establish(session_id, &host, &token).await {
                Ok(transport) => {
                    slot.set_transport(transport);
                    if self
                        .set_status(session_id, SessionStatus::Connected)
                        .is_err()
                    {
                        slot.teardown().await;
                        return RecoveryOutcome::Cancelled;
                    }
                    slot.record(OutputEntry::system(format!(
                        "Reconnected to {}",
                        host.display_target()
                    )));
                    self.mark_host_connected(&host.id);
                    info!("[Reconnect] [{}] Successfully reconnected", session_id);
                    return RecoveryOutcome::Recovered;
                }
                Err(SshError::Cancelled) => return RecoveryOutcome::Cancelled,
                Err(e) if !e.is_retryable() => {
                    warn!("[Reconnect] [{}] Giving up: {}", session_id, e);
                    self.report_host_key_rejection(session_id, &host, &e);
                    last_error = Some(e);
                    break;
                }
                Err(e) => {
                    warn!(
                        "[Reconnect] [{}] Attempt {}/{} failed: {}",
                        session_id, attempt, policy.max_attempts, e
                    );
                    last_error = Some(e);
                }
            }
        }

        error!("[Reconnect] [{}] Reconnection failed", session_id);
        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts configured".to_string());
        slot.record(OutputEntry::error(format!("Reconnection failed: {}", reason)));
        self.set_status_logged(session_id, SessionStatus::Error);
        RecoveryOutcome::Failed
    }
}
