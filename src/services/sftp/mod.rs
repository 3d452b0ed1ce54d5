// SFTP 后端服务

mod error;
mod service;
mod transfer;

pub use error::SftpError;
pub use service::SftpHandler;
pub use transfer::{copy_chunked, DEFAULT_CHUNK_SIZE};
