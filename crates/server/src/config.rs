use tokio::time::Duration;

use cachenode_common::{IO_TIMEOUT, SWEEP_INTERVAL};

use crate::replication::ReplicationOptions;

/// Configuração de um nó, montada uma vez na inicialização.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: String,
    /// Endereço de escuta, `host:porta`.
    pub listen_addr: String,
    /// Endereços (`host:porta`) discados na inicialização.
    pub peers: Vec<String>,
    pub sweep_interval: Duration,
    /// Prazo para dial, handshake de join e escritas.
    pub io_timeout: Duration,
    pub replication: ReplicationOptions,
}

impl NodeConfig {
    pub fn new(node_id: impl Into<String>, listen_addr: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            listen_addr: listen_addr.into(),
            peers: Vec::new(),
            sweep_interval: SWEEP_INTERVAL,
            io_timeout: IO_TIMEOUT,
            replication: ReplicationOptions::default(),
        }
    }

    pub fn with_peers(mut self, peers: Vec<String>) -> Self {
        self.peers = peers;
        self
    }
}
