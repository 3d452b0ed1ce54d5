// SFTP 错误类型

use russh_sftp::protocol::StatusCode;
use thiserror::Error;

use crate::ssh::SshError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SftpError {
    #[error("No such file or directory: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// 非法的文件名或路径
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Transfer cancelled")]
    Cancelled,

    /// 本地读写错误
    #[error("I/O error: {0}")]
    Io(String),

    #[error("SFTP protocol error: {0}")]
    Protocol(String),

    /// 底层 SSH 连接错误
    #[error(transparent)]
    Transport(#[from] SshError),
}

impl SftpError {
    /// 把 russh-sftp 错误按状态码归类，path 用于错误信息
    pub fn from_sftp(path: &str, e: russh_sftp::client::error::Error) -> Self {
        use russh_sftp::client::error::Error;

        match e {
            Error::Status(status) => match status.status_code {
                StatusCode::NoSuchFile => Self::NotFound(path.to_string()),
                StatusCode::PermissionDenied => Self::Permission(path.to_string()),
                StatusCode::NoConnection | StatusCode::ConnectionLost => {
                    Self::Transport(SshError::Disconnected(status.error_message))
                }
                _ => Self::Protocol(format!("{}: {}", path, status.error_message)),
            },
            Error::IO(message) => Self::Io(message),
            other => Self::Protocol(format!("{}: {}", path, other)),
        }
    }
}

impl From<std::io::Error> for SftpError {
    fn from(e: std::io::Error) -> Self {
        SftpError::Io(e.to_string())
    }
}
