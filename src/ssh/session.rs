// SSH 会话
// 连接成功后的会话对象，提供 Shell / Exec / 子系统通道

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{Handle, Msg};
use russh::ChannelMsg;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::error::SshError;
use super::handler::SshClientHandler;
use super::transport::{BoxedStream, ExecStream, OutputChunk, ShellChannel, Transport};

/// exec 输出缓冲的片段数
const EXEC_BUFFER: usize = 64;

/// PTY 请求参数
#[derive(Clone, Debug)]
pub struct PtyRequest {
    /// 终端类型
    pub term: String,
    /// 列数
    pub col_width: u32,
    /// 行数
    pub row_height: u32,
    /// 像素宽度
    pub pix_width: u32,
    /// 像素高度
    pub pix_height: u32,
    /// 终端模式
    pub modes: Vec<(russh::Pty, u32)>,
}

impl Default for PtyRequest {
    fn default() -> Self {
        Self {
            term: "xterm-256color".to_string(),
            col_width: 80,
            row_height: 24,
            pix_width: 0,
            pix_height: 0,
            modes: vec![],
        }
    }
}

/// SSH 会话（连接成功后）
/// 内部持有 Handle，支持并发打开多个通道
pub struct SshSession {
    /// 会话 ID
    id: String,
    /// 共享的 russh Handle
    handle: Arc<Handle<SshClientHandler>>,
    host: String,
    username: String,
    /// 任一通道出现 I/O 错误或主动断开后置为 false
    alive: Arc<AtomicBool>,
}

impl SshSession {
    pub fn new(
        id: String,
        handle: Handle<SshClientHandler>,
        host: String,
        username: String,
    ) -> Self {
        Self {
            id,
            handle: Arc::new(handle),
            host,
            username,
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// 标记会话断开
    pub fn mark_disconnected(&self) {
        self.alive.store(false, Ordering::Relaxed);
    }

    fn ensure_alive(&self) -> Result<(), SshError> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(SshError::Disconnected("Session is disconnected".to_string()))
        }
    }

    /// 通道操作失败时区分：连接已断 → 标记失效；否则只是通道错误
    fn channel_failure(&self, e: russh::Error) -> SshError {
        if self.handle.is_closed() {
            self.mark_disconnected();
            SshError::from(e)
        } else {
            SshError::Channel(e.to_string())
        }
    }

    async fn open_channel(&self) -> Result<russh::Channel<Msg>, SshError> {
        self.ensure_alive()?;
        self.handle
            .channel_open_session()
            .await
            .map_err(|e| self.channel_failure(e))
    }
}

#[async_trait]
impl Transport for SshSession {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed) && !self.handle.is_closed()
    }

    async fn open_shell(&self, pty: PtyRequest) -> Result<Arc<dyn ShellChannel>, SshError> {
        let channel = self.open_channel().await?;

        // 请求 PTY
        channel
            .request_pty(
                false,
                &pty.term,
                pty.col_width,
                pty.row_height,
                pty.pix_width,
                pty.pix_height,
                &pty.modes,
            )
            .await
            .map_err(|e| self.channel_failure(e))?;

        // 请求 Shell
        channel
            .request_shell(false)
            .await
            .map_err(|e| self.channel_failure(e))?;

        debug!("[SSH] Shell opened for session {}", self.id);
        Ok(Arc::new(TerminalChannel::new(
            channel,
            self.handle.clone(),
            self.alive.clone(),
        )))
    }

    async fn execute(&self, command: &str) -> Result<ExecStream, SshError> {
        let mut channel = self.open_channel().await?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| self.channel_failure(e))?;

        let (tx, stream) = ExecStream::channel(EXEC_BUFFER);
        let handle = self.handle.clone();
        let alive = self.alive.clone();
        let session_id = self.id.clone();

        // 读取循环：按到达顺序转发，直到通道关闭
        tokio::spawn(async move {
            let mut exited = false;
            loop {
                let chunk = match channel.wait().await {
                    Some(ChannelMsg::Data { data }) => OutputChunk::Stdout(data.to_vec()),
                    Some(ChannelMsg::ExtendedData { data, ext }) => {
                        if ext == 1 {
                            OutputChunk::Stderr(data.to_vec())
                        } else {
                            OutputChunk::Stdout(data.to_vec())
                        }
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        exited = true;
                        OutputChunk::Exit(exit_status)
                    }
                    Some(ChannelMsg::Close) | None => break,
                    Some(_) => continue,
                };
                if tx.send(chunk).await.is_err() {
                    // 接收方已放弃（取消）
                    let _ = channel.close().await;
                    return;
                }
            }

            if !exited && handle.is_closed() {
                warn!(
                    "[SSH] Connection lost while running command on session {}",
                    session_id
                );
                alive.store(false, Ordering::Relaxed);
            }
        });

        Ok(stream)
    }

    async fn open_subsystem(&self, name: &str) -> Result<BoxedStream, SshError> {
        let channel = self.open_channel().await?;
        channel
            .request_subsystem(true, name)
            .await
            .map_err(|e| self.channel_failure(e))?;
        debug!("[SSH] Subsystem '{}' opened for session {}", name, self.id);
        Ok(Box::new(channel.into_stream()))
    }

    async fn disconnect(&self) {
        let was_alive = self.alive.swap(false, Ordering::Relaxed);
        if self.handle.is_closed() {
            return;
        }
        if let Err(e) = self
            .handle
            .disconnect(russh::Disconnect::ByApplication, "", "English")
            .await
        {
            debug!("[SSH] Disconnect for session {} failed: {}", self.id, e);
        }
        if was_alive {
            info!(
                "[SSH] Session {} ({}@{}) closed",
                self.id, self.username, self.host
            );
        }
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        debug!("[SSH] Dropping session {}", self.id);
    }
}

/// 终端通道
/// 分离读写路径以避免死锁：
/// - 读：需要 channel.wait()，会持有 channel 锁
/// - 写：直接使用 handle.data()，不需要持有 channel 锁
pub struct TerminalChannel {
    id: russh::ChannelId,
    handle: Arc<Handle<SshClientHandler>>,
    channel: Mutex<russh::Channel<Msg>>,
    alive: Arc<AtomicBool>,
}

impl TerminalChannel {
    fn new(
        channel: russh::Channel<Msg>,
        handle: Arc<Handle<SshClientHandler>>,
        alive: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id: channel.id(),
            channel: Mutex::new(channel),
            handle,
            alive,
        }
    }

    fn check_connection(&self) {
        if self.handle.is_closed() {
            self.alive.store(false, Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl ShellChannel for TerminalChannel {
    async fn write(&self, data: &[u8]) -> Result<(), SshError> {
        self.handle
            .data(self.id, data.to_vec().into())
            .await
            .map_err(|_| {
                self.check_connection();
                SshError::Channel("Failed to send data to channel".to_string())
            })
    }

    async fn read(&self) -> Result<Option<Vec<u8>>, SshError> {
        let mut channel = self.channel.lock().await;
        match channel.wait().await {
            Some(ChannelMsg::Data { data }) => Ok(Some(data.to_vec())),
            Some(ChannelMsg::ExtendedData { data, .. }) => Ok(Some(data.to_vec())),
            Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) => Ok(None),
            Some(_) => Ok(Some(vec![])),
            None => {
                self.check_connection();
                Ok(None)
            }
        }
    }

    async fn resize(&self, cols: u32, rows: u32) -> Result<(), SshError> {
        let channel = self.channel.lock().await;
        channel
            .window_change(cols, rows, 0, 0)
            .await
            .map_err(|e| SshError::Channel(e.to_string()))
    }

    async fn close(&self) -> Result<(), SshError> {
        let channel = self.channel.lock().await;
        channel
            .eof()
            .await
            .map_err(|e| SshError::Channel(e.to_string()))
    }
}
