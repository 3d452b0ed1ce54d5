// ShellMaster 核心库
// SSH/SFTP 会话与连接管理，不依赖任何界面框架

pub mod models;
pub mod registry;
pub mod services;
pub mod ssh;
pub mod supervisor;

pub use registry::{RecoveryOutcome, RegistryError, SessionEvent, SessionRegistry, SessionSftp};
pub use services::sftp;
pub use supervisor::{ReconnectPolicy, ReconnectSupervisor, SupervisorHandle};
