use clap::Parser;
use tokio::signal;
use tokio::time::Duration;
use tracing::info;

use cachenode_common::{DEFAULT_HOST, IO_TIMEOUT, REPLICATION_TIMEOUT, SWEEP_INTERVAL};
use cachenode_server::{FanoutPolicy, Node, NodeConfig, ReplicationOptions, Server};

#[derive(Parser, Debug)]
#[command(
    name = "cache-node",
    about = "Nó de cache distribuído em memória com replicação entre peers"
)]
struct Args {
    /// Id deste nó, enviado no join aos peers
    node_id: String,
    /// Porta de escuta
    port: u16,
    /// Endereços dos peers (host:porta) discados na inicialização
    peers: Vec<String>,

    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
    #[arg(long, default_value_t = SWEEP_INTERVAL.as_secs())]
    sweep_interval_secs: u64,
    #[arg(long, default_value_t = REPLICATION_TIMEOUT.as_millis() as u64)]
    replication_timeout_ms: u64,
    #[arg(long, default_value_t = IO_TIMEOUT.as_millis() as u64)]
    io_timeout_ms: u64,
    /// Interrompe a replicação no primeiro peer que falhar
    #[arg(long)]
    fail_fast: bool,
}

impl Args {
    fn into_config(self) -> NodeConfig {
        let mut config = NodeConfig::new(self.node_id, format!("{}:{}", self.host, self.port))
            .with_peers(self.peers);
        config.sweep_interval = Duration::from_secs(self.sweep_interval_secs.max(1));
        config.io_timeout = Duration::from_millis(self.io_timeout_ms);
        config.replication = ReplicationOptions {
            timeout: Duration::from_millis(self.replication_timeout_ms),
            policy: if self.fail_fast {
                FanoutPolicy::FailFast
            } else {
                FanoutPolicy::BestEffort
            },
        };
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cachenode_server=info".into()),
        )
        .init();

    let config = Args::parse().into_config();
    let node = Node::new(config);
    let server = Server::bind(node.clone()).await?;

    let connected = node.connect_to_peers().await;
    info!(
        "{connected} de {} peers conectados: {:?}",
        node.config().peers.len(),
        node.peers().ids()
    );

    server.run(signal::ctrl_c()).await?;

    Ok(())
}
