// 会话注册表事件（广播给观察者）

use crate::models::{OutputEntry, SessionStatus};
use crate::ssh::ConnectionStage;

#[derive(Clone, Debug)]
pub enum SessionEvent {
    /// 主机列表变化
    HostsChanged,
    /// 会话列表变化（创建、删除）
    SessionsChanged,
    /// 会话状态变化
    StatusChanged {
        session_id: String,
        status: SessionStatus,
    },
    /// 激活会话变化
    ActiveChanged { session_id: Option<String> },
    /// 新的输出条目
    Output {
        session_id: String,
        entry: OutputEntry,
    },
    /// 连接阶段
    Stage {
        session_id: String,
        stage: ConnectionStage,
    },
    /// 连接器报告握手和认证完成
    Connected { session_id: String },
    /// 连接器报告本次尝试失败
    ConnectFailed { session_id: String, error: String },
    /// 主机密钥被拒绝，需要用户确认后调用 trust_host_key
    HostKeyRejected {
        session_id: String,
        host_id: String,
        key_type: String,
        fingerprint: String,
        /// 已记录的指纹（不一致时）
        expected: Option<String>,
    },
}
