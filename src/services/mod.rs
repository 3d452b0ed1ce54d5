// 服务层：持久化、凭据、SFTP

pub mod credentials;
pub mod sftp;
pub mod storage;
