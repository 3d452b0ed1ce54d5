// SSH 连接配置

use std::path::PathBuf;
use std::time::Duration;

use crate::models::{AuthType, ConnectionSettings, HostData};
use crate::services::credentials::Secret;

use super::error::SshError;

/// SSH 连接配置
#[derive(Clone, Debug)]
pub struct SshConfig {
    /// 目标主机
    pub host: String,
    /// 端口
    pub port: u16,
    /// 用户名
    pub username: String,
    /// 认证方式
    pub auth: AuthMethod,
    /// 连接超时（秒）
    pub connect_timeout: u64,
    /// 心跳配置
    pub keepalive: KeepaliveConfig,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            username: String::new(),
            auth: AuthMethod::Password(Secret::new("")),
            connect_timeout: 30,
            keepalive: KeepaliveConfig::default(),
        }
    }
}

/// 认证方式
#[derive(Clone, Debug)]
pub enum AuthMethod {
    /// 密码认证
    Password(Secret),
    /// 公钥认证
    PublicKey {
        /// 私钥文件路径
        key_path: PathBuf,
        /// 私钥密码（如果有）
        passphrase: Option<Secret>,
    },
}

/// 心跳配置
#[derive(Clone, Debug)]
pub struct KeepaliveConfig {
    /// 是否启用心跳
    pub enabled: bool,
    /// 心跳间隔（秒）
    pub interval: u64,
    /// 连续无响应多少次后判定连接已断
    pub max_retries: u32,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: 60,
            max_retries: 3,
        }
    }
}

impl SshConfig {
    /// 从主机记录、凭据和连接设置构建配置
    pub fn from_host(
        host: &HostData,
        secret: Option<Secret>,
        settings: &ConnectionSettings,
    ) -> Result<Self, SshError> {
        let auth = match host.auth_type {
            AuthType::Password => AuthMethod::Password(secret.ok_or_else(|| {
                SshError::Auth(format!("No stored password for host '{}'", host.label))
            })?),
            AuthType::PublicKey => {
                let key_path = host
                    .private_key_path
                    .as_deref()
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| {
                        SshError::Config(format!(
                            "Host '{}' uses public key auth but has no key path",
                            host.label
                        ))
                    })?;
                AuthMethod::PublicKey {
                    key_path: PathBuf::from(key_path),
                    passphrase: secret,
                }
            }
        };

        if host.host.is_empty() {
            return Err(SshError::Config("Host name is empty".to_string()));
        }

        Ok(Self {
            host: host.host.clone(),
            port: host.port,
            username: host.username.clone(),
            auth,
            connect_timeout: settings.connection_timeout_secs as u64,
            keepalive: KeepaliveConfig {
                enabled: settings.keepalive_interval_secs > 0,
                interval: settings.keepalive_interval_secs as u64,
                max_retries: settings.keepalive_max,
            },
        })
    }

    /// 构建 russh 配置
    pub fn to_russh_config(&self) -> russh::client::Config {
        let mut config = russh::client::Config::default();
        // 心跳失败由 russh 自行关闭连接，Handle::is_closed() 随之反映真实状态
        if self.keepalive.enabled {
            config.keepalive_interval = Some(Duration::from_secs(self.keepalive.interval));
            config.keepalive_max = self.keepalive.max_retries as usize;
        }
        config
    }
}
