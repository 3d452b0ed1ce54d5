// SSH 客户端 Handler 实现
// 实现 russh::client::Handler trait

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use russh::keys::PublicKey;
use tokio::sync::mpsc;

use super::error::SshError;
use super::event::{ConnectionEvent, LogEntry};
use super::host_key::HostKeyVerifier;

/// SSH 客户端 Handler
/// 处理 SSH 连接过程中的各种回调
pub struct SshClientHandler {
    /// 事件发送器
    event_sender: mpsc::UnboundedSender<ConnectionEvent>,
    host: String,
    port: u16,
    verifier: Arc<HostKeyVerifier>,
    /// 主机密钥被拒绝时记录原因，握手失败后由 SshClient 读取
    rejection: Arc<Mutex<Option<SshError>>>,
}

impl SshClientHandler {
    pub fn new(
        event_sender: mpsc::UnboundedSender<ConnectionEvent>,
        host: String,
        port: u16,
        verifier: Arc<HostKeyVerifier>,
        rejection: Arc<Mutex<Option<SshError>>>,
    ) -> Self {
        Self {
            event_sender,
            host,
            port,
            verifier,
            rejection,
        }
    }

    /// 发送日志事件
    fn log(&self, entry: LogEntry) {
        let _ = self.event_sender.send(ConnectionEvent::Log(entry));
    }
}

impl russh::client::Handler for SshClientHandler {
    type Error = russh::Error;

    /// 检查服务器公钥
    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        let fingerprint = server_public_key
            .fingerprint(russh::keys::ssh_key::HashAlg::Sha256)
            .to_string();
        let key_type = server_public_key.algorithm().to_string();

        self.log(LogEntry::info(format!(
            "Server key fingerprint: {} ({})",
            fingerprint, key_type
        )));

        let verdict = self
            .verifier
            .verify(&self.host, self.port, &key_type, &fingerprint);
        let accepted = verdict.is_accepted();

        if let Some(err) = verdict.into_error(&self.host, self.port, &key_type, &fingerprint) {
            self.log(LogEntry::warn(err.to_string()));
            *self.rejection.lock() = Some(err);
        }

        async move { Ok(accepted) }
    }
}
