// SSH 客户端核心实现

use std::net::ToSocketAddrs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use russh::client::{AuthResult, Handle};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::config::{AuthMethod, SshConfig};
use super::error::SshError;
use super::event::{ConnectionEvent, ConnectionStage, LogEntry};
use super::handler::SshClientHandler;
use super::host_key::HostKeyVerifier;
use super::session::SshSession;

/// SSH 客户端
/// 负责建立 SSH 连接并返回 SshSession
pub struct SshClient {
    /// 连接配置
    config: SshConfig,
    /// 事件发送器
    event_sender: mpsc::UnboundedSender<ConnectionEvent>,
    /// 主机密钥校验器
    verifier: Arc<HostKeyVerifier>,
}

impl SshClient {
    /// 创建新的 SSH 客户端
    pub fn new(
        config: SshConfig,
        event_sender: mpsc::UnboundedSender<ConnectionEvent>,
        verifier: Arc<HostKeyVerifier>,
    ) -> Self {
        Self {
            config,
            event_sender,
            verifier,
        }
    }

    /// 发送阶段变化事件
    fn emit_stage(&self, stage: ConnectionStage) {
        let _ = self.event_sender.send(ConnectionEvent::StageChanged(stage));
    }

    /// 发送日志事件
    fn log(&self, entry: LogEntry) {
        let _ = self.event_sender.send(ConnectionEvent::Log(entry));
    }

    /// 执行连接（异步）
    /// 返回 SshSession 用于后续操作
    pub async fn connect(&self, session_id: String) -> Result<SshSession, SshError> {
        // 阶段 1: 初始化
        self.emit_stage(ConnectionStage::Initializing);
        self.log(LogEntry::info("Starting SSH connection..."));
        self.log(LogEntry::debug(format!(
            "Target: {}@{}:{}",
            self.config.username, self.config.host, self.config.port
        )));

        // 解析地址
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let socket_addr = addr
            .to_socket_addrs()
            .map_err(|e| SshError::Network(format!("Failed to resolve address: {}", e)))?
            .next()
            .ok_or_else(|| SshError::Config("No valid address found".to_string()))?;

        // 阶段 2: TCP 连接
        self.emit_stage(ConnectionStage::ConnectingHost);
        self.log(LogEntry::info(format!("Connecting to {}...", socket_addr)));

        let connect_timeout = Duration::from_secs(self.config.connect_timeout);
        let tcp_stream = timeout(connect_timeout, TcpStream::connect(socket_addr))
            .await
            .map_err(|_| SshError::Timeout(self.config.connect_timeout))??;

        self.log(LogEntry::info("TCP connection established"));

        // 阶段 3: SSH 握手
        self.emit_stage(ConnectionStage::Handshaking);
        self.log(LogEntry::info("Starting SSH handshake..."));

        let russh_config = Arc::new(self.config.to_russh_config());
        let rejection = Arc::new(Mutex::new(None));

        let handler = SshClientHandler::new(
            self.event_sender.clone(),
            self.config.host.clone(),
            self.config.port,
            self.verifier.clone(),
            rejection.clone(),
        );

        let handshake = timeout(
            connect_timeout,
            russh::client::connect_stream(russh_config, tcp_stream, handler),
        )
        .await
        .map_err(|_| SshError::Timeout(self.config.connect_timeout))?;

        let mut handle = match handshake {
            Ok(handle) => handle,
            // 主机密钥被拒绝时 russh 只返回 UnknownKey，真正原因在 rejection 中
            Err(e) => return Err(rejection.lock().take().unwrap_or_else(|| SshError::from(e))),
        };

        self.log(LogEntry::info("SSH handshake completed"));

        // 阶段 4: 认证
        self.emit_stage(ConnectionStage::Authenticating);
        self.log(LogEntry::info(format!(
            "Authenticating as '{}'...",
            self.config.username
        )));

        self.authenticate(&mut handle).await?;

        self.log(LogEntry::info("Authentication successful"));

        // 阶段 5: 连接完成
        self.emit_stage(ConnectionStage::Connected);
        self.log(LogEntry::info("SSH connection established successfully!"));

        Ok(SshSession::new(
            session_id,
            handle,
            self.config.host.clone(),
            self.config.username.clone(),
        ))
    }

    /// 执行认证
    async fn authenticate(&self, handle: &mut Handle<SshClientHandler>) -> Result<(), SshError> {
        let (method, auth_result) = match &self.config.auth {
            AuthMethod::Password(password) => {
                self.log(LogEntry::debug("Using password authentication"));

                let result = handle
                    .authenticate_password(&self.config.username, password.expose())
                    .await?;
                ("Password", result)
            }
            AuthMethod::PublicKey {
                key_path,
                passphrase,
            } => {
                self.log(LogEntry::debug(format!(
                    "Using public key authentication: {:?}",
                    key_path
                )));

                let key = self
                    .load_private_key(key_path, passphrase.as_ref().map(|p| p.expose()))
                    .await?;

                let key_with_alg = russh::keys::PrivateKeyWithHashAlg::new(Arc::new(key), None);

                let result = handle
                    .authenticate_publickey(&self.config.username, key_with_alg)
                    .await?;
                ("Public key", result)
            }
        };

        match auth_result {
            AuthResult::Success => Ok(()),
            AuthResult::Failure {
                partial_success: true,
                ..
            } => Err(SshError::Auth(
                "Partial authentication - additional auth required".to_string(),
            )),
            AuthResult::Failure {
                remaining_methods, ..
            } => Err(SshError::Auth(format!(
                "{} authentication failed. Server suggests: {:?}",
                method, remaining_methods
            ))),
        }
    }

    /// 加载私钥文件
    async fn load_private_key(
        &self,
        key_path: &Path,
        passphrase: Option<&str>,
    ) -> Result<russh::keys::PrivateKey, SshError> {
        self.log(LogEntry::debug(format!(
            "Loading private key from {:?}",
            key_path
        )));

        // 读取密钥文件
        let key_data = tokio::fs::read(key_path)
            .await
            .map_err(|e| SshError::Key(format!("Failed to read key file: {}", e)))?;

        let key = russh::keys::decode_secret_key(&String::from_utf8_lossy(&key_data), passphrase)
            .map_err(|e| SshError::Key(format!("Failed to decode key: {}", e)))?;

        self.log(LogEntry::debug("Private key loaded successfully"));
        Ok(key)
    }
}
