// 主机密钥校验
//
// 首次连接时记录指纹（TOFU），之后必须一致；严格模式下拒绝未知主机。

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::models::KnownHostsConfig;
use crate::services::storage::Storage;

use super::error::SshError;

/// 校验结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostKeyVerdict {
    /// 与记录一致
    Trusted,
    /// 首次见到，已记录
    Pinned,
    /// 未知主机（严格模式）
    Unknown,
    /// 与记录不一致
    Mismatch { expected: String },
}

impl HostKeyVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Trusted | Self::Pinned)
    }

    /// 被拒绝时转换为对应的错误
    pub fn into_error(self, host: &str, port: u16, key_type: &str, actual: &str) -> Option<SshError> {
        let host = KnownHostsConfig::key(host, port);
        match self {
            Self::Trusted | Self::Pinned => None,
            Self::Unknown => Some(SshError::HostKeyUnknown {
                host,
                key_type: key_type.to_string(),
                fingerprint: actual.to_string(),
            }),
            Self::Mismatch { expected } => Some(SshError::HostKeyMismatch {
                host,
                key_type: key_type.to_string(),
                expected,
                actual: actual.to_string(),
            }),
        }
    }
}

/// 主机密钥校验器（持有 known_hosts 列表）
pub struct HostKeyVerifier {
    known_hosts: Mutex<KnownHostsConfig>,
    storage: Option<Storage>,
    strict: bool,
}

impl HostKeyVerifier {
    /// 从存储加载已知主机
    pub fn load(storage: Storage, strict: bool) -> anyhow::Result<Self> {
        let known_hosts = storage.load_known_hosts()?;
        Ok(Self {
            known_hosts: Mutex::new(known_hosts),
            storage: Some(storage),
            strict,
        })
    }

    /// 仅内存中的校验器（不落盘）
    pub fn in_memory(strict: bool) -> Self {
        Self {
            known_hosts: Mutex::new(KnownHostsConfig::default()),
            storage: None,
            strict,
        }
    }

    pub fn verify(&self, host: &str, port: u16, key_type: &str, fingerprint: &str) -> HostKeyVerdict {
        let mut known_hosts = self.known_hosts.lock();

        let verdict = match known_hosts.find_mut(host, port) {
            Some(entry) if entry.fingerprint == fingerprint => {
                entry.last_used = chrono::Local::now();
                HostKeyVerdict::Trusted
            }
            Some(entry) => {
                warn!(
                    "[SSH] Host key mismatch for {}:{}! Expected: {}, Got: {}",
                    host, port, entry.fingerprint, fingerprint
                );
                return HostKeyVerdict::Mismatch {
                    expected: entry.fingerprint.clone(),
                };
            }
            None if self.strict => {
                warn!(
                    "[SSH] Rejecting unknown host {}:{} ({}) {}",
                    host, port, key_type, fingerprint
                );
                return HostKeyVerdict::Unknown;
            }
            None => {
                info!(
                    "[SSH] Pinning new host key for {}:{} ({}) {}",
                    host, port, key_type, fingerprint
                );
                known_hosts.upsert(host, port, key_type, fingerprint);
                HostKeyVerdict::Pinned
            }
        };

        self.persist(&known_hosts);
        verdict
    }

    /// 用户显式信任（替换已有记录）
    pub fn trust(&self, host: &str, port: u16, key_type: &str, fingerprint: &str) {
        let mut known_hosts = self.known_hosts.lock();
        known_hosts.upsert(host, port, key_type, fingerprint);
        info!("[SSH] Host key for {}:{} trusted by user", host, port);
        self.persist(&known_hosts);
    }

    pub fn fingerprint_of(&self, host: &str, port: u16) -> Option<String> {
        self.known_hosts
            .lock()
            .find(host, port)
            .map(|h| h.fingerprint.clone())
    }

    fn persist(&self, known_hosts: &KnownHostsConfig) {
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.save_known_hosts(known_hosts) {
                warn!("[SSH] Failed to save known hosts: {:#}", e);
            }
        }
    }
}
