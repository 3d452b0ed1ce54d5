// 数据模型模块

pub mod host;
pub mod known_hosts;
pub mod output;
pub mod session;
pub mod settings;
pub mod sftp;

pub use host::{AuthType, HostData, HostsConfig};
pub use known_hosts::{KnownHost, KnownHostsConfig};
pub use output::{OutputEntry, OutputKind, OutputLog, Utf8Decoder};
pub use session::{SessionData, SessionStatus, SessionsConfig};
pub use settings::{AppSettings, ConnectionSettings, OutputSettings, SftpSettings};
