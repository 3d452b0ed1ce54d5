// SSH 错误类型定义

use thiserror::Error;

/// 错误分类（决定重试策略）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 不可达、超时、连接重置，可由 supervisor 重试
    Network,
    /// 凭据错误，不自动重试
    Auth,
    /// 主机密钥校验失败，需要用户显式信任
    HostKey,
    /// 服务器行为异常
    Protocol,
    /// 本地配置或密钥问题
    Local,
    /// 通道级错误，不影响连接本身
    Channel,
    Cancelled,
}

/// SSH 错误类型
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SshError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// 网络错误（不可达、重置等）
    #[error("Network error: {0}")]
    Network(String),

    /// 连接超时
    #[error("Connection timeout after {0}s")]
    Timeout(u64),

    /// 认证失败
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// 主机密钥与已记录的不一致
    #[error("Host key mismatch for {host}: expected {expected}, got {actual}")]
    HostKeyMismatch {
        host: String,
        key_type: String,
        expected: String,
        actual: String,
    },

    /// 未知主机（严格模式下拒绝）
    #[error("Unknown host key for {host}: {fingerprint}")]
    HostKeyUnknown {
        host: String,
        key_type: String,
        fingerprint: String,
    },

    /// SSH 协议错误
    #[error("SSH protocol error: {0}")]
    Protocol(String),

    /// 密钥错误
    #[error("Key error: {0}")]
    Key(String),

    /// 通道错误
    #[error("Channel error: {0}")]
    Channel(String),

    /// 会话已断开
    #[error("Session disconnected: {0}")]
    Disconnected(String),

    /// 操作已取消
    #[error("Operation cancelled")]
    Cancelled,
}

impl SshError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::Disconnected(_) => ErrorKind::Network,
            Self::Auth(_) => ErrorKind::Auth,
            Self::HostKeyMismatch { .. } | Self::HostKeyUnknown { .. } => ErrorKind::HostKey,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Config(_) | Self::Key(_) => ErrorKind::Local,
            Self::Channel(_) => ErrorKind::Channel,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// 仅网络类错误允许自动重连
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Network
    }
}

impl From<std::io::Error> for SshError {
    fn from(e: std::io::Error) -> Self {
        SshError::Network(e.to_string())
    }
}

impl From<russh::Error> for SshError {
    fn from(e: russh::Error) -> Self {
        let message = e.to_string();
        match e {
            russh::Error::IO(_)
            | russh::Error::KeepaliveTimeout
            | russh::Error::InactivityTimeout => SshError::Network(message),
            russh::Error::Disconnect => SshError::Disconnected(message),
            _ => SshError::Protocol(message),
        }
    }
}

impl From<russh::keys::Error> for SshError {
    fn from(e: russh::keys::Error) -> Self {
        SshError::Key(e.to_string())
    }
}
