// SSH 连接启动器
// 把主机记录转换为 SshConfig，发起连接并上报结果

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::models::{ConnectionSettings, HostData};

use super::client::SshClient;
use super::config::SshConfig;
use super::error::SshError;
use super::event::ConnectionEvent;
use super::host_key::HostKeyVerifier;
use super::transport::{ConnectRequest, Connector, Transport};

/// 基于 russh 的连接工厂
pub struct RusshConnector {
    verifier: Arc<HostKeyVerifier>,
    settings: ConnectionSettings,
}

impl RusshConnector {
    pub fn new(verifier: Arc<HostKeyVerifier>, settings: ConnectionSettings) -> Self {
        Self { verifier, settings }
    }

    pub fn verifier(&self) -> &Arc<HostKeyVerifier> {
        &self.verifier
    }
}

#[async_trait]
impl Connector for RusshConnector {
    async fn connect(
        &self,
        request: ConnectRequest,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<Arc<dyn Transport>, SshError> {
        let ConnectRequest {
            session_id,
            host,
            secret,
        } = request;

        let result = match SshConfig::from_host(&host, secret, &self.settings) {
            Ok(config) => {
                let client = SshClient::new(config, events.clone(), self.verifier.clone());
                client.connect(session_id.clone()).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(session) => {
                info!(
                    "[SSH] Session {} connected to {}",
                    session_id,
                    host.display_target()
                );
                let _ = events.send(ConnectionEvent::Connected {
                    session_id: session_id.clone(),
                });
                Ok(Arc::new(session))
            }
            Err(e) => {
                error!(
                    "[SSH] Session {} failed to connect to {}: {}",
                    session_id,
                    host.display_target(),
                    e
                );
                let _ = events.send(ConnectionEvent::Failed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn trust_host_key(&self, host: &HostData, key_type: &str, fingerprint: &str) {
        self.verifier
            .trust(&host.host, host.port, key_type, fingerprint);
    }
}
