// SSH 连接模块
//
// 模块结构:
// - config: 连接配置 (SshConfig, AuthMethod)
// - error: 错误类型 (SshError)
// - event: 连接事件 (ConnectionEvent, ConnectionStage, LogEntry)
// - handler: russh Handler 实现
// - host_key: 主机密钥校验 (known_hosts)
// - client: SSH 客户端核心
// - session: SSH 会话 (SshSession, TerminalChannel)
// - transport: 传输层 trait (Transport, Connector, ShellChannel)
// - connector: 基于 russh 的 Connector 实现

pub mod client;
pub mod config;
pub mod connector;
pub mod error;
pub mod event;
pub mod handler;
pub mod host_key;
pub mod session;
pub mod transport;

// 公开导出
pub use client::SshClient;
pub use config::{AuthMethod, KeepaliveConfig, SshConfig};
pub use connector::RusshConnector;
pub use error::{ErrorKind, SshError};
pub use event::{ConnectionEvent, ConnectionStage, LogEntry, LogLevel};
pub use host_key::{HostKeyVerdict, HostKeyVerifier};
pub use session::{PtyRequest, SshSession, TerminalChannel};
pub use transport::{
    BoxedStream, ConnectRequest, Connector, ExecStream, OutputChunk, ShellChannel, Transport,
};
