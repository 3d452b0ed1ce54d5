// SSH 连接事件定义

use chrono::{DateTime, Local};

/// 连接过程事件（由 SshClient 发出）
#[derive(Clone, Debug)]
pub enum ConnectionEvent {
    /// 阶段变化
    StageChanged(ConnectionStage),
    /// 日志消息
    Log(LogEntry),
    /// 连接成功
    Connected { session_id: String },
    /// 连接失败
    Failed { error: String },
}

/// 连接阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionStage {
    /// 初始化（解析地址）
    Initializing = 0,
    /// TCP 连接目标主机
    ConnectingHost = 1,
    /// SSH 握手（版本交换、密钥交换、主机密钥校验）
    Handshaking = 2,
    /// 身份认证
    Authenticating = 3,
    /// 连接完成
    Connected = 4,
}

impl ConnectionStage {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::ConnectingHost => "Connecting to host",
            Self::Handshaking => "SSH handshake",
            Self::Authenticating => "Authenticating",
            Self::Connected => "Connected",
        }
    }

    /// 获取进度百分比 (0.0 - 1.0)
    pub fn progress(&self) -> f32 {
        match self {
            Self::Initializing => 0.0,
            Self::ConnectingHost => 0.25,
            Self::Handshaking => 0.5,
            Self::Authenticating => 0.75,
            Self::Connected => 1.0,
        }
    }
}

/// 日志级别
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// 日志条目
#[derive(Clone, Debug)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            message: message.into(),
        }
    }

    pub fn debug(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Debug, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, message)
    }
}
