// Session 数据结构与状态机

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// 会话连接状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SessionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

impl SessionStatus {
    /// 检查状态迁移是否合法
    ///
    /// 任何状态都可以被用户显式断开；其余迁移只允许沿着一次连接尝试单向推进。
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, next) {
            (_, Disconnected) => true,
            (Disconnected | Error, Connecting) => true,
            (Connecting, Connected | Error) => true,
            (Connected, Reconnecting) => true,
            (Reconnecting, Connected | Error) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 会话数据（持久化用）
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionData {
    pub id: String,
    /// 所属主机 ID（仅引用，不持有）
    pub host_id: String,
    pub name: String,
    pub created_at: DateTime<Local>,
    pub last_active_at: DateTime<Local>,
    /// 是否为当前激活会话（全局至多一个）
    pub is_active: bool,
    pub status: SessionStatus,
}

impl SessionData {
    /// 创建新的会话（默认未连接）
    pub fn new(host_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Local::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            host_id: host_id.into(),
            name: name.into(),
            created_at: now,
            last_active_at: now,
            is_active: false,
            status: SessionStatus::Disconnected,
        }
    }

    /// 更新最后活动时间
    pub fn touch(&mut self) {
        self.last_active_at = Local::now();
    }
}

/// 会话列表（用于存储到文件）
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct SessionsConfig {
    pub sessions: Vec<SessionData>,
}

impl SessionsConfig {
    /// 进程重启后不可能有存活的连接，所有状态归为 Disconnected
    pub fn normalize(&mut self) {
        for session in &mut self.sessions {
            session.status = SessionStatus::Disconnected;
        }
    }
}
