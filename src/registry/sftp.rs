// 会话上的 SFTP 操作
//
// 包装 SftpHandler：失败时带上会话 ID，写入该会话的输出日志并记录 warn。

use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::models::sftp::FileEntry;
use crate::models::OutputEntry;
use crate::services::sftp::{SftpError, SftpHandler};

use super::error::RegistryError;
use super::slot::SessionSlot;

/// 绑定到某个会话的 SFTP 连接（由 `SessionRegistry::open_sftp` 创建）
pub struct SessionSftp {
    handler: SftpHandler,
    slot: Arc<SessionSlot>,
}

impl SessionSftp {
    pub(crate) fn new(handler: SftpHandler, slot: Arc<SessionSlot>) -> Self {
        Self { handler, slot }
    }

    pub fn session_id(&self) -> &str {
        self.handler.session_id()
    }

    /// 底层 handler，不经过日志记录
    pub fn handler(&self) -> &SftpHandler {
        &self.handler
    }

    async fn report<T>(
        &self,
        action: &str,
        target: &str,
        op: impl Future<Output = Result<T, SftpError>>,
    ) -> Result<T, RegistryError> {
        op.await.map_err(|e| {
            let session_id = self.session_id();
            match &e {
                SftpError::Cancelled => {
                    info!("[SFTP] [{}] {} {} cancelled", session_id, action, target);
                    self.slot.record(OutputEntry::system(format!(
                        "SFTP {} cancelled: {}",
                        action, target
                    )));
                }
                _ => {
                    warn!("[SFTP] [{}] {} {} failed: {}", session_id, action, target, e);
                    self.slot
                        .record(OutputEntry::error(format!("SFTP {} failed: {}", action, e)));
                }
            }
            RegistryError::sftp(session_id, e)
        })
    }

    pub async fn home_dir(&self) -> Result<String, RegistryError> {
        self.report("home", ".", self.handler.home_dir()).await
    }

    pub async fn list(&self, path: &str) -> Result<Vec<FileEntry>, RegistryError> {
        self.report("list", path, self.handler.list(path)).await
    }

    pub async fn stat(&self, path: &str) -> Result<FileEntry, RegistryError> {
        self.report("stat", path, self.handler.stat(path)).await
    }

    pub async fn upload<R, F>(
        &self,
        local: &mut R,
        remote_path: &str,
        cancel: &CancellationToken,
        progress: F,
    ) -> Result<u64, RegistryError>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
        F: FnMut(u64) + Send,
    {
        self.report(
            "upload",
            remote_path,
            self.handler.upload(local, remote_path, cancel, progress),
        )
        .await
    }

    pub async fn download<W, F>(
        &self,
        remote_path: &str,
        local: &mut W,
        cancel: &CancellationToken,
        progress: F,
    ) -> Result<u64, RegistryError>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
        F: FnMut(u64) + Send,
    {
        self.report(
            "download",
            remote_path,
            self.handler.download(remote_path, local, cancel, progress),
        )
        .await
    }

    pub async fn delete(&self, path: &str) -> Result<(), RegistryError> {
        self.report("delete", path, self.handler.delete(path)).await
    }

    pub async fn mkdir(&self, parent: &str, name: &str) -> Result<String, RegistryError> {
        self.report("mkdir", parent, self.handler.mkdir(parent, name)).await
    }
}
