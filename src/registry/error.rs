// 会话注册表错误类型

use thiserror::Error;

use crate::models::SessionStatus;
use crate::services::sftp::SftpError;
use crate::ssh::SshError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RegistryError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Host not found: {0}")]
    HostNotFound(String),

    /// 会话没有可用的连接
    #[error("Session {0} is not connected")]
    NotConnected(String),

    #[error("SSH error on session {session_id}: {source}")]
    Ssh {
        session_id: String,
        #[source]
        source: SshError,
    },

    #[error("SFTP error on session {session_id}: {source}")]
    Sftp {
        session_id: String,
        #[source]
        source: SftpError,
    },

    /// 持久化失败
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid status transition for session {session_id}: {from} -> {to}")]
    InvalidTransition {
        session_id: String,
        from: SessionStatus,
        to: SessionStatus,
    },
}

impl RegistryError {
    pub fn ssh(session_id: &str, source: SshError) -> Self {
        Self::Ssh {
            session_id: session_id.to_string(),
            source,
        }
    }

    pub fn sftp(session_id: &str, source: SftpError) -> Self {
        Self::Sftp {
            session_id: session_id.to_string(),
            source,
        }
    }

    /// 若为 SSH 错误，返回其来源
    pub fn ssh_source(&self) -> Option<&SshError> {
        match self {
            Self::Ssh { source, .. } => Some(source),
            _ => None,
        }
    }

    /// 若为 SFTP 错误，返回其来源
    pub fn sftp_source(&self) -> Option<&SftpError> {
        match self {
            Self::Sftp { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for RegistryError {
    fn from(e: anyhow::Error) -> Self {
        RegistryError::Storage(format!("{:#}", e))
    }
}
