// SFTP 服务 - 封装 russh-sftp 客户端

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use russh_sftp::client::SftpSession;
use russh_sftp::protocol::FileAttributes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::sftp::{is_valid_name, join_path, sort_entries, FileEntry, FileType};
use crate::ssh::Transport;

use super::error::SftpError;
use super::transfer::copy_chunked;

/// SFTP 处理器
/// 每个实例独占一个 sftp 子系统通道，会话断开时随取消令牌一起失效
pub struct SftpHandler {
    /// 会话 ID
    session_id: String,
    /// russh-sftp 客户端会话（线程安全）
    sftp: Arc<SftpSession>,
    /// 传输分块大小
    chunk_size: usize,
    /// 会话级取消令牌（断开连接时取消）
    cancel: CancellationToken,
}

impl SftpHandler {
    /// 在已认证的连接上打开 SFTP 子系统
    pub async fn open(
        session_id: impl Into<String>,
        transport: &dyn Transport,
        chunk_size: usize,
        cancel: CancellationToken,
    ) -> Result<Self, SftpError> {
        let session_id = session_id.into();
        info!("[SFTP] Opening SFTP subsystem for session {}", session_id);

        let open = async {
            let stream = transport.open_subsystem("sftp").await?;
            SftpSession::new(stream)
                .await
                .map_err(|e| SftpError::Protocol(format!("Failed to create SFTP session: {}", e)))
        };
        let sftp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SftpError::Cancelled),
            sftp = open => sftp?,
        };

        info!("[SFTP] SFTP ready for session {}", session_id);
        Ok(Self {
            session_id,
            sftp: Arc::new(sftp),
            chunk_size: chunk_size.max(1),
            cancel,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// 会话断开后所有操作立即返回 Cancelled
    async fn guarded<T>(
        &self,
        op: impl Future<Output = Result<T, SftpError>>,
    ) -> Result<T, SftpError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SftpError::Cancelled),
            result = op => result,
        }
    }

    /// 获取用户主目录
    pub async fn home_dir(&self) -> Result<String, SftpError> {
        let result = self
            .guarded(async {
                self.sftp
                    .canonicalize(".")
                    .await
                    .map_err(|e| SftpError::from_sftp(".", e))
            })
            .await;

        match result {
            Ok(path) => {
                debug!("[SFTP] Home directory: {}", path);
                Ok(path)
            }
            Err(SftpError::Cancelled) => Err(SftpError::Cancelled),
            Err(e) => {
                // 部分服务器不支持 realpath(".")，回退到根目录
                warn!("[SFTP] Failed to get home directory: {}", e);
                Ok("/".to_string())
            }
        }
    }

    /// 读取目录内容（目录在前，按名称排序）
    pub async fn list(&self, path: &str) -> Result<Vec<FileEntry>, SftpError> {
        debug!("[SFTP] Reading directory: {}", path);

        let dir = self
            .guarded(async {
                self.sftp
                    .read_dir(path)
                    .await
                    .map_err(|e| SftpError::from_sftp(path, e))
            })
            .await?;

        let mut entries: Vec<FileEntry> = dir
            .filter_map(|entry| {
                let name = entry.file_name();
                // 跳过 . 和 ..
                if name == "." || name == ".." {
                    return None;
                }
                let full_path = join_path(path, &name);
                Some(entry_from_attrs(name, full_path, &entry.metadata()))
            })
            .collect();

        sort_entries(&mut entries);
        debug!("[SFTP] Read {} entries from {}", entries.len(), path);
        Ok(entries)
    }

    /// 获取文件/目录属性
    pub async fn stat(&self, path: &str) -> Result<FileEntry, SftpError> {
        let attrs = self
            .guarded(async {
                self.sftp
                    .metadata(path)
                    .await
                    .map_err(|e| SftpError::from_sftp(path, e))
            })
            .await?;

        let name = path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|n| !n.is_empty())
            .unwrap_or("/")
            .to_string();
        Ok(entry_from_attrs(name, path.to_string(), &attrs))
    }

    /// 上传：从本地 reader 分块写入远程文件，返回写入字节数
    ///
    /// 取消时已写入的部分保留在远程。
    pub async fn upload<R, F>(
        &self,
        local: &mut R,
        remote_path: &str,
        cancel: &CancellationToken,
        progress: F,
    ) -> Result<u64, SftpError>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
        F: FnMut(u64) + Send,
    {
        info!("[SFTP] Uploading to {}", remote_path);

        let mut file = self
            .guarded(async {
                self.sftp
                    .create(remote_path)
                    .await
                    .map_err(|e| SftpError::from_sftp(remote_path, e))
            })
            .await?;

        let written = self
            .guarded(copy_chunked(local, &mut file, self.chunk_size, cancel, progress))
            .await
            .inspect_err(|e| warn!("[SFTP] Upload to {} stopped: {}", remote_path, e))?;

        file.shutdown().await?;
        info!("[SFTP] Uploaded {} bytes to {}", written, remote_path);
        Ok(written)
    }

    /// 下载：分块读取远程文件写入本地 writer，返回读取字节数
    pub async fn download<W, F>(
        &self,
        remote_path: &str,
        local: &mut W,
        cancel: &CancellationToken,
        progress: F,
    ) -> Result<u64, SftpError>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
        F: FnMut(u64) + Send,
    {
        info!("[SFTP] Downloading {}", remote_path);

        let mut file = self
            .guarded(async {
                self.sftp
                    .open(remote_path)
                    .await
                    .map_err(|e| SftpError::from_sftp(remote_path, e))
            })
            .await?;

        let read = self
            .guarded(copy_chunked(&mut file, local, self.chunk_size, cancel, progress))
            .await
            .inspect_err(|e| warn!("[SFTP] Download of {} stopped: {}", remote_path, e))?;

        info!("[SFTP] Downloaded {} bytes from {}", read, remote_path);
        Ok(read)
    }

    /// 删除文件或空目录
    pub async fn delete(&self, path: &str) -> Result<(), SftpError> {
        info!("[SFTP] Removing {}", path);

        self.guarded(async {
            let attrs = self
                .sftp
                .symlink_metadata(path)
                .await
                .map_err(|e| SftpError::from_sftp(path, e))?;

            let removed = if attrs.is_dir() {
                self.sftp.remove_dir(path).await
            } else {
                self.sftp.remove_file(path).await
            };
            removed.map_err(|e| SftpError::from_sftp(path, e))
        })
        .await
    }

    /// 在 parent 下创建目录，返回新目录路径
    pub async fn mkdir(&self, parent: &str, name: &str) -> Result<String, SftpError> {
        if !is_valid_name(name) {
            return Err(SftpError::InvalidPath(name.to_string()));
        }
        let path = join_path(parent, name);
        info!("[SFTP] Creating directory: {}", path);

        self.guarded(async {
            // SFTP v3 没有独立的“已存在”状态码，先检查
            if self.sftp.symlink_metadata(path.as_str()).await.is_ok() {
                return Err(SftpError::AlreadyExists(path.clone()));
            }
            self.sftp
                .create_dir(path.as_str())
                .await
                .map_err(|e| SftpError::from_sftp(&path, e))
        })
        .await?;

        Ok(path)
    }
}

impl Drop for SftpHandler {
    fn drop(&mut self) {
        debug!(
            "[SFTP] Dropping SFTP handler for session {}",
            self.session_id
        );
    }
}

/// 由远程属性构建文件条目
fn entry_from_attrs(name: String, path: String, attrs: &FileAttributes) -> FileEntry {
    let file_type = if attrs.is_dir() {
        FileType::Directory
    } else if attrs.is_symlink() {
        FileType::Symlink
    } else {
        // russh-sftp 没有 is_file()，默认为普通文件
        FileType::File
    };

    let mut entry = FileEntry::new(name, path, file_type);
    entry.size = attrs.size.unwrap_or(0);
    entry.permissions = attrs.permissions.unwrap_or(0) & 0o7777;

    // 服务器提供名称时用名称，否则用数字 id
    if let Some(owner) = attrs.user.clone().or_else(|| attrs.uid.map(|u| u.to_string())) {
        entry.owner = owner;
    }
    if let Some(group) = attrs.group.clone().or_else(|| attrs.gid.map(|g| g.to_string())) {
        entry.group = group;
    }

    if let Some(mtime) = attrs.mtime {
        entry.modified = Some(UNIX_EPOCH + Duration::from_secs(mtime as u64));
    }

    entry
}
