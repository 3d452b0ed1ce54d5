// 单个会话的运行时状态
//
// 连接、Shell、输出日志都挂在 slot 上；状态变更操作由 op_lock 串行化。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::models::{OutputEntry, OutputLog};
use crate::ssh::{ShellChannel, Transport};

use super::error::RegistryError;
use super::event::SessionEvent;

/// 交互式 Shell 及其读取任务
pub(crate) struct ShellState {
    pub channel: Arc<dyn ShellChannel>,
    pub pump: JoinHandle<()>,
}

pub(crate) struct SessionSlot {
    session_id: String,
    /// 串行化 connect / disconnect / delete / execute / recover
    pub op_lock: tokio::sync::Mutex<()>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    shell: Mutex<Option<ShellState>>,
    output: Mutex<OutputLog>,
    cancel: Mutex<CancellationToken>,
    deleted: AtomicBool,
    /// 每完成一次连接尝试加一，用于合并并发的 connect
    connect_generation: AtomicU64,
    last_connect: Mutex<Option<Result<(), RegistryError>>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionSlot {
    pub fn new(
        session_id: String,
        max_output: usize,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            session_id,
            op_lock: tokio::sync::Mutex::new(()),
            transport: RwLock::new(None),
            shell: Mutex::new(None),
            output: Mutex::new(OutputLog::new(max_output)),
            cancel: Mutex::new(CancellationToken::new()),
            deleted: AtomicBool::new(false),
            connect_generation: AtomicU64::new(0),
            last_connect: Mutex::new(None),
            events,
        }
    }

    // ======================== 连接 ========================

    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.read().clone()
    }

    /// 当前存活的连接
    pub fn live_transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport().filter(|t| t.is_alive())
    }

    pub fn set_transport(&self, transport: Arc<dyn Transport>) {
        *self.transport.write() = Some(transport);
    }

    pub fn has_transport(&self) -> bool {
        self.transport.read().is_some()
    }

    pub fn set_shell(&self, shell: ShellState) -> Option<ShellState> {
        self.shell.lock().replace(shell)
    }

    pub fn shell_channel(&self) -> Option<Arc<dyn ShellChannel>> {
        self.shell.lock().as_ref().map(|s| s.channel.clone())
    }

    /// 关闭 Shell 并断开连接（不改变状态）
    pub async fn teardown(&self) {
        let shell = self.shell.lock().take();
        if let Some(shell) = shell {
            shell.pump.abort();
            if let Err(e) = shell.channel.close().await {
                debug!(
                    "[Registry] Closing shell of session {} failed: {}",
                    self.session_id, e
                );
            }
        }

        let transport = self.transport.write().take();
        if let Some(transport) = transport {
            transport.disconnect().await;
        }
    }

    // ======================== 取消 ========================

    /// 当前操作使用的取消令牌
    pub fn token(&self) -> CancellationToken {
        self.cancel.lock().clone()
    }

    /// 取消进行中的操作（在获取 op_lock 之前调用）
    pub fn cancel_pending(&self) {
        self.cancel.lock().cancel();
    }

    /// 取消完成后换上新的令牌
    pub fn reset_token(&self) {
        let mut cancel = self.cancel.lock();
        if cancel.is_cancelled() {
            *cancel = CancellationToken::new();
        }
    }

    // ======================== 删除标记 ========================

    pub fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::SeqCst);
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    // ======================== 连接合并 ========================

    pub fn connect_generation(&self) -> u64 {
        self.connect_generation.load(Ordering::SeqCst)
    }

    /// 记录一次连接尝试的结果
    pub fn finish_connect(&self, outcome: &Result<(), RegistryError>) {
        *self.last_connect.lock() = Some(outcome.clone());
        self.connect_generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn last_connect(&self) -> Option<Result<(), RegistryError>> {
        self.last_connect.lock().clone()
    }

    /// 断开后丢弃上次结果，之后排队的 connect 不再合并到被取消的尝试上
    pub fn forget_connect(&self) {
        self.last_connect.lock().take();
    }

    // ======================== 输出 ========================

    /// 追加输出并通知观察者
    pub fn record(&self, entry: OutputEntry) {
        self.output.lock().push(entry.clone());
        let _ = self.events.send(SessionEvent::Output {
            session_id: self.session_id.clone(),
            entry,
        });
    }

    pub fn output(&self) -> Vec<OutputEntry> {
        self.output.lock().snapshot()
    }

    pub fn clear_output(&self) {
        self.output.lock().clear();
    }
}
