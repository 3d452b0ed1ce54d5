// 自动重连监督
//
// 定期检查所有 Connected 会话的连接是否存活，失效时交给 SessionRegistry::recover 处理。

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::models::ConnectionSettings;
use crate::registry::{RecoveryOutcome, SessionRegistry};

/// 重连退避策略：第 n 次重试前等待 base * 2^(n-1)，不超过 max_backoff
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub max_backoff: Duration,
}

impl ReconnectPolicy {
    pub fn from_settings(settings: &ConnectionSettings) -> Self {
        Self {
            max_attempts: settings.reconnect_attempts,
            base: Duration::from_secs(settings.reconnect_interval_secs as u64),
            max_backoff: Duration::from_secs(settings.reconnect_max_backoff_secs as u64),
        }
    }

    /// 第 retry 次重试前的等待时间（retry 从 1 开始）
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 1u32
            .checked_shl(retry.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max_backoff)
    }
}

/// 重连监督器
pub struct ReconnectSupervisor {
    registry: SessionRegistry,
    interval: Duration,
    policy: ReconnectPolicy,
}

impl ReconnectSupervisor {
    pub fn new(registry: SessionRegistry, settings: &ConnectionSettings) -> Self {
        Self {
            registry,
            interval: Duration::from_secs(settings.supervisor_interval_secs.max(1) as u64),
            policy: ReconnectPolicy::from_settings(settings),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// 执行一轮检查并等待所有恢复完成
    pub async fn check_once(&self) -> Vec<(String, RecoveryOutcome)> {
        let dead = self.registry.dead_sessions();
        if dead.is_empty() {
            return Vec::new();
        }
        debug!("[Reconnect] {} session(s) need recovery", dead.len());

        let tasks = dead
            .iter()
            .map(|id| self.registry.recover(id, &self.policy));
        let outcomes = futures::future::join_all(tasks).await;
        dead.into_iter().zip(outcomes).collect()
    }

    /// 在后台运行检查循环
    pub fn spawn(self) -> SupervisorHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run_loop(stop_rx));
        SupervisorHandle {
            stop_tx: Some(stop_tx),
            task_handle: Some(task),
        }
    }

    async fn run_loop(self, mut stop_rx: watch::Receiver<bool>) {
        info!(
            "[Reconnect] Supervisor started (interval {:?}, max {} attempts)",
            self.interval, self.policy.max_attempts
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // 跳过第一个即时触发
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    // 每个会话的恢复单独运行，慢主机不会拖住其他会话的检查
                    for session_id in self.registry.dead_sessions() {
                        let registry = self.registry.clone();
                        let policy = self.policy.clone();
                        tokio::spawn(async move {
                            let outcome = registry.recover(&session_id, &policy).await;
                            debug!("[Reconnect] Session {}: {:?}", session_id, outcome);
                        });
                    }
                }
            }
        }

        info!("[Reconnect] Supervisor stopped");
    }
}

/// 后台监督任务句柄，drop 时停止
pub struct SupervisorHandle {
    stop_tx: Option<watch::Sender<bool>>,
    task_handle: Option<JoinHandle<()>>,
}

impl SupervisorHandle {
    /// 停止监督
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }

    /// 是否正在运行
    pub fn is_running(&self) -> bool {
        self.task_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for SupervisorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
