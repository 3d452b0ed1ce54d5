// 传输层抽象
//
// SessionRegistry 只通过这些 trait 使用连接，russh 实现见 session.rs / connector.rs。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::models::HostData;
use crate::services::credentials::Secret;

use super::error::SshError;
use super::event::ConnectionEvent;
use super::session::PtyRequest;

/// 命令输出片段
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputChunk {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    /// 命令结束（退出码）
    Exit(u32),
}

/// 单条命令的输出流，按到达顺序产出，通道 EOF 或退出后结束
pub struct ExecStream {
    rx: mpsc::Receiver<OutputChunk>,
}

impl ExecStream {
    /// 创建一对发送端与输出流
    pub fn channel(buffer: usize) -> (mpsc::Sender<OutputChunk>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self { rx })
    }

    /// 下一个片段；None 表示流已结束
    pub async fn next(&mut self) -> Option<OutputChunk> {
        self.rx.recv().await
    }
}

/// 可供 SFTP 使用的子系统字节流
pub trait SubsystemStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SubsystemStream for T {}

pub type BoxedStream = Box<dyn SubsystemStream>;

/// 交互式 Shell 通道（连续字节流，没有命令边界）
#[async_trait]
pub trait ShellChannel: Send + Sync {
    async fn write(&self, data: &[u8]) -> Result<(), SshError>;
    /// 读取输出；None 表示通道已关闭
    async fn read(&self) -> Result<Option<Vec<u8>>, SshError>;
    async fn resize(&self, cols: u32, rows: u32) -> Result<(), SshError>;
    async fn close(&self) -> Result<(), SshError>;
}

/// 一条已认证的 SSH 连接
#[async_trait]
pub trait Transport: Send + Sync {
    /// 反映真实传输状态：连接关闭或出现 I/O 错误后为 false
    fn is_alive(&self) -> bool;

    async fn open_shell(&self, pty: PtyRequest) -> Result<Arc<dyn ShellChannel>, SshError>;

    /// 在独立的 exec 通道上执行命令
    async fn execute(&self, command: &str) -> Result<ExecStream, SshError>;

    /// 打开子系统通道（如 "sftp"）
    async fn open_subsystem(&self, name: &str) -> Result<BoxedStream, SshError>;

    /// 关闭连接，可重复调用
    async fn disconnect(&self);
}

/// 一次连接请求
#[derive(Clone, Debug)]
pub struct ConnectRequest {
    pub session_id: String,
    pub host: HostData,
    pub secret: Option<Secret>,
}

/// 建立连接的工厂
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        request: ConnectRequest,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<Arc<dyn Transport>, SshError>;

    /// 用户显式信任某个主机密钥
    fn trust_host_key(&self, _host: &HostData, _key_type: &str, _fingerprint: &str) {}
}
