// 凭据存储接口
//
// 密码、私钥口令只通过此接口读写，持久化记录中不出现明文。
// 平台钥匙串由外部实现，这里只提供进程内实现。

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;

/// 敏感字符串，Debug 输出时打码
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// 安全凭据存储
pub trait CredentialStore: Send + Sync {
    fn store(&self, account_id: &str, secret: Secret);
    fn retrieve(&self, account_id: &str) -> Option<Secret>;
    fn remove(&self, account_id: &str);
}

/// 进程内凭据存储
#[derive(Default)]
pub struct MemoryCredentialStore {
    secrets: RwLock<HashMap<String, Secret>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn store(&self, account_id: &str, secret: Secret) {
        self.secrets.write().insert(account_id.to_string(), secret);
    }

    fn retrieve(&self, account_id: &str) -> Option<Secret> {
        self.secrets.read().get(account_id).cloned()
    }

    fn remove(&self, account_id: &str) {
        self.secrets.write().remove(account_id);
    }
}
