// 本地数据持久化服务

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::models::{
    AppSettings, HostData, HostsConfig, KnownHostsConfig, SessionData, SessionsConfig,
};

const HOSTS_FILE: &str = "hosts.json";
const SESSIONS_FILE: &str = "sessions.json";
const KNOWN_HOSTS_FILE: &str = "known_hosts.json";
const SETTINGS_FILE: &str = "settings.json";

/// JSON 文件存储
///
/// 每个列表独立保存为一个文件，每次修改后整体重写。
#[derive(Clone, Debug)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    /// 使用指定目录（不存在时创建）
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir).context("无法创建配置目录")?;
        }
        Ok(Self { dir })
    }

    /// 系统默认配置目录
    /// macOS: ~/Library/Application Support/shellmaster
    /// Linux: ~/.config/shellmaster
    /// Windows: C:\Users\<用户名>\AppData\Roaming\shellmaster
    pub fn default_location() -> Result<Self> {
        let dir = dirs::config_dir()
            .context("无法获取系统配置目录")?
            .join("shellmaster");
        Self::new(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_json<T: DeserializeOwned + Default>(&self, file: &str) -> Result<T> {
        let path = self.dir.join(file);
        if !path.exists() {
            return Ok(T::default());
        }
        let content =
            fs::read_to_string(&path).with_context(|| format!("无法读取 {}", file))?;
        let value = serde_json::from_str(&content).with_context(|| format!("无法解析 {}", file))?;
        Ok(value)
    }

    fn write_json<T: Serialize>(&self, file: &str, value: &T) -> Result<()> {
        let path = self.dir.join(file);
        let content =
            serde_json::to_string_pretty(value).with_context(|| format!("无法序列化 {}", file))?;
        fs::write(&path, content).with_context(|| format!("无法写入 {}", file))?;
        debug!("[Storage] Wrote {}", path.display());
        Ok(())
    }

    // ======================== Hosts ========================

    pub fn load_hosts(&self) -> Result<Vec<HostData>> {
        let config: HostsConfig = self.read_json(HOSTS_FILE)?;
        Ok(config.hosts)
    }

    pub fn save_hosts(&self, hosts: &[HostData]) -> Result<()> {
        self.write_json(
            HOSTS_FILE,
            &HostsConfig {
                hosts: hosts.to_vec(),
            },
        )
    }

    // ======================== Sessions ========================

    /// 加载会话列表，状态统一归为 Disconnected
    pub fn load_sessions(&self) -> Result<Vec<SessionData>> {
        let mut config: SessionsConfig = self.read_json(SESSIONS_FILE)?;
        config.normalize();
        Ok(config.sessions)
    }

    pub fn save_sessions(&self, sessions: &[SessionData]) -> Result<()> {
        self.write_json(
            SESSIONS_FILE,
            &SessionsConfig {
                sessions: sessions.to_vec(),
            },
        )
    }

    // ======================== Known Hosts ========================

    pub fn load_known_hosts(&self) -> Result<KnownHostsConfig> {
        self.read_json(KNOWN_HOSTS_FILE)
    }

    pub fn save_known_hosts(&self, config: &KnownHostsConfig) -> Result<()> {
        self.write_json(KNOWN_HOSTS_FILE, config)
    }

    // ======================== Settings ========================

    pub fn load_settings(&self) -> Result<AppSettings> {
        self.read_json(SETTINGS_FILE)
    }

    pub fn save_settings(&self, settings: &AppSettings) -> Result<()> {
        self.write_json(SETTINGS_FILE, settings)
    }
}
