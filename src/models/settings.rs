// Settings 配置数据结构

use serde::{Deserialize, Serialize};

// ======================== 主配置结构 ========================

/// 应用设置（持久化用）
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppSettings {
    pub connection: ConnectionSettings,
    pub sftp: SftpSettings,
    pub output: OutputSettings,
}

// ======================== 连接设置 ========================

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    // SSH
    pub connection_timeout_secs: u32,
    pub keepalive_interval_secs: u32,
    pub keepalive_max: u32,
    pub strict_host_key_checking: bool,
    // 自动重连
    pub auto_reconnect: bool,
    pub reconnect_attempts: u32,
    /// 首次重试等待时间，之后按指数退避
    pub reconnect_interval_secs: u32,
    pub reconnect_max_backoff_secs: u32,
    /// 存活检查周期
    pub supervisor_interval_secs: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connection_timeout_secs: 30,
            keepalive_interval_secs: 60,
            keepalive_max: 3,
            strict_host_key_checking: false,
            auto_reconnect: true,
            reconnect_attempts: 3,
            reconnect_interval_secs: 5,
            reconnect_max_backoff_secs: 60,
            supervisor_interval_secs: 5,
        }
    }
}

// ======================== SFTP 设置 ========================

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SftpSettings {
    /// 传输分块大小（字节）
    pub chunk_size: usize,
}

impl Default for SftpSettings {
    fn default() -> Self {
        Self {
            chunk_size: 32 * 1024,
        }
    }
}

// ======================== 输出日志设置 ========================

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// 每个会话最多保留的输出条目
    pub max_entries: usize,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self { max_entries: 5000 }
    }
}
