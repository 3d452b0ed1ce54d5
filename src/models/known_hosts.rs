// Known Hosts 数据模型
// 用于存储和验证 SSH 服务器公钥指纹

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// 已知主机条目
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct KnownHost {
    /// 主机地址（host:port 格式）
    pub host: String,
    /// 密钥类型（ssh-ed25519, ssh-rsa 等）
    pub key_type: String,
    /// SHA256 指纹
    pub fingerprint: String,
    pub first_seen: DateTime<Local>,
    pub last_used: DateTime<Local>,
}

/// Known Hosts 配置
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KnownHostsConfig {
    pub hosts: Vec<KnownHost>,
}

impl KnownHostsConfig {
    /// 生成 host:port 键
    pub fn key(host: &str, port: u16) -> String {
        format!("{}:{}", host, port)
    }

    pub fn find(&self, host: &str, port: u16) -> Option<&KnownHost> {
        let key = Self::key(host, port);
        self.hosts.iter().find(|h| h.host == key)
    }

    pub fn find_mut(&mut self, host: &str, port: u16) -> Option<&mut KnownHost> {
        let key = Self::key(host, port);
        self.hosts.iter_mut().find(|h| h.host == key)
    }

    /// 写入（或替换）一条记录
    pub fn upsert(&mut self, host: &str, port: u16, key_type: &str, fingerprint: &str) {
        let now = Local::now();
        match self.find_mut(host, port) {
            Some(entry) => {
                entry.key_type = key_type.to_string();
                entry.fingerprint = fingerprint.to_string();
                entry.last_used = now;
            }
            None => self.hosts.push(KnownHost {
                host: Self::key(host, port),
                key_type: key_type.to_string(),
                fingerprint: fingerprint.to_string(),
                first_seen: now,
                last_used: now,
            }),
        }
    }
}
