// Host 数据结构

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// 认证方式
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum AuthType {
    #[default]
    Password,
    PublicKey,
}

/// 主机数据（持久化用）
///
/// 密码和私钥口令不在这里保存，统一放在 CredentialStore 中，以 host id 为账户键。
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HostData {
    pub id: String,
    pub label: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth_type: AuthType,
    /// 私钥文件路径（仅公钥认证）
    pub private_key_path: Option<String>,
    pub created_at: DateTime<Local>,
    pub last_connected_at: Option<DateTime<Local>>,
}

impl Default for HostData {
    fn default() -> Self {
        Self {
            id: String::new(),
            label: String::new(),
            host: String::new(),
            port: 22,
            username: String::new(),
            auth_type: AuthType::Password,
            private_key_path: None,
            created_at: Local::now(),
            last_connected_at: None,
        }
    }
}

impl HostData {
    /// 创建使用密码认证的主机
    pub fn with_password(
        label: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            label: label.into(),
            host: host.into(),
            port,
            username: username.into(),
            ..Default::default()
        }
    }

    /// 创建使用私钥认证的主机
    pub fn with_public_key(
        label: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        key_path: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            label: label.into(),
            host: host.into(),
            port,
            username: username.into(),
            auth_type: AuthType::PublicKey,
            private_key_path: Some(key_path.into()),
            ..Default::default()
        }
    }

    /// user@host:port
    pub fn display_target(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

/// 主机列表（用于存储到文件）
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct HostsConfig {
    pub hosts: Vec<HostData>,
}
