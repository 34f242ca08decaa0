use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{error, info, warn};

use cachenode_common::{CacheError, CacheResult, ConnectionError, ReplicationError};
use cachenode_protocol::Message;
use cachenode_storage::Store;

use crate::config::NodeConfig;
use crate::connection::Connection;
use crate::handler::handle_connection;
use crate::link::PeerLink;
use crate::registry::{PeerRegistry, Registration};
use crate::replication::replicate;
use crate::sweeper::run_sweeper;

struct NodeInner {
    config: NodeConfig,
    store: Store,
    peers: PeerRegistry,
    shutdown: broadcast::Sender<()>,
}

/// Handle para um nó de cache: store local + peers de replicação.
/// Clonar é barato e compartilha o mesmo estado.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    pub fn new(config: NodeConfig) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(NodeInner {
                config,
                store: Store::new(),
                peers: PeerRegistry::new(),
                shutdown,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.config.node_id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.inner.peers
    }

    // --- Operações de cache ---

    /// Grava localmente e replica para todos os peers. Em erro de replicação o
    /// valor continua gravado localmente.
    pub async fn set(&self, key: String, value: Value, ttl: i64) -> Result<usize, ReplicationError> {
        self.set_from(None, key, value, ttl).await
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.store.get(key)
    }

    /// Remove localmente e replica para todos os peers.
    pub async fn delete(&self, key: String) -> Result<usize, ReplicationError> {
        self.delete_from(None, key).await
    }

    pub(crate) async fn set_from(
        &self,
        origin: Option<&Arc<PeerLink>>,
        key: String,
        value: Value,
        ttl: i64,
    ) -> Result<usize, ReplicationError> {
        self.inner.store.set(key.clone(), value.clone(), ttl);
        let message = Message::Set {
            key,
            value,
            ttl,
            node_id: Some(self.id().to_string()),
        };
        self.replicate(&message, origin).await
    }

    pub(crate) async fn delete_from(
        &self,
        origin: Option<&Arc<PeerLink>>,
        key: String,
    ) -> Result<usize, ReplicationError> {
        self.inner.store.delete(&key);
        let message = Message::Delete {
            key,
            node_id: Some(self.id().to_string()),
        };
        self.replicate(&message, origin).await
    }

    async fn replicate(
        &self,
        message: &Message,
        origin: Option<&Arc<PeerLink>>,
    ) -> Result<usize, ReplicationError> {
        replicate(
            &self.inner.peers,
            message,
            &self.inner.config.replication,
            origin,
        )
        .await
    }

    // --- Peers ---

    /// Registra um peer. Se os dois nós discaram um para o outro, ambos os lados
    /// mantêm o link discado pelo nó de menor id; fora isso o último registro
    /// vence e o link anterior é fechado. Retorna `false` quando `link` foi
    /// descartado (e fechado).
    pub async fn register_peer(&self, id: String, link: Arc<PeerLink>) -> bool {
        let remote = link.remote_addr();
        let dialed_by_self = self.id() < id.as_str();
        let preferred = |candidate: &PeerLink| candidate.is_dialed() == dialed_by_self;

        match self
            .inner
            .peers
            .add_preferring(id.clone(), link.clone(), preferred)
        {
            Registration::Added => {}
            Registration::Replaced(old) => {
                info!(
                    "peer {id} substituído; fechando conexão anterior {}",
                    old.remote_addr()
                );
                old.close().await;
            }
            Registration::Kept => {
                info!("peer {id} já conectado; descartando conexão {remote}");
                link.close().await;
                return false;
            }
        }
        info!("peer {id} registrado ({remote})");
        true
    }

    /// Disca `addr`, envia `join` e, com o ack, registra o peer sob o id que
    /// veio no ack (ou sob `addr`, se o ack não trouxer id). A conexão passa a
    /// ser atendida por um handler como qualquer outra, então o peer também
    /// pode replicar por ela.
    pub async fn connect_to_peer(&self, addr: &str) -> CacheResult<()> {
        let io_timeout = self.inner.config.io_timeout;
        let stream = timeout(io_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ConnectionError::Timeout(io_timeout))??;
        let remote = stream.peer_addr()?;
        let mut conn = Connection::new(stream);

        let reply = timeout(io_timeout, self.join_handshake(&mut conn))
            .await
            .map_err(|_| ConnectionError::Timeout(io_timeout))??;
        let peer_id = match reply {
            Some(Message::Ack {
                success: true,
                node_id,
            }) => node_id.unwrap_or_else(|| addr.to_string()),
            Some(other) => {
                return Err(CacheError::JoinRejected {
                    addr: addr.to_string(),
                    reply: other.kind().to_string(),
                });
            }
            None => return Err(ConnectionError::Closed.into()),
        };

        let (reader, writer) = conn.into_split();
        let link = Arc::new(PeerLink::dialed(remote, writer, io_timeout));
        if !self.register_peer(peer_id, link.clone()).await {
            return Ok(());
        }

        let node = self.clone();
        let mut shutdown = self.subscribe_shutdown();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(reader, link, node, &mut shutdown).await {
                error!("erro na conexão com peer {remote}: {e}");
            }
        });
        Ok(())
    }

    async fn join_handshake(
        &self,
        conn: &mut Connection,
    ) -> Result<Option<Message>, ConnectionError> {
        let join = Message::Join {
            node_id: self.id().to_string(),
        };
        conn.write_message(&join).await?;
        conn.read_message().await
    }

    /// Disca todos os peers da configuração. Falhas são logadas e não
    /// interrompem a inicialização. Retorna quantos conectaram.
    pub async fn connect_to_peers(&self) -> usize {
        let mut connected = 0;
        for addr in &self.inner.config.peers {
            match self.connect_to_peer(addr).await {
                Ok(()) => connected += 1,
                Err(e) => warn!("falha ao conectar no peer {addr}: {e}"),
            }
        }
        connected
    }

    // --- Ciclo de vida ---

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.inner.shutdown.subscribe()
    }

    /// Sinaliza shutdown para todos os handlers e para a varredura.
    pub fn shutdown(&self) {
        let _ = self.inner.shutdown.send(());
    }
}

/// Listener TCP de um nó.
pub struct Server {
    node: Node,
    listener: TcpListener,
}

impl Server {
    /// Escuta em `node.config().listen_addr`.
    pub async fn bind(node: Node) -> CacheResult<Self> {
        let addr = node.config().listen_addr.clone();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| CacheError::Bind { addr, source })?;
        Ok(Self { node, listener })
    }

    pub fn local_addr(&self) -> CacheResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Aceita conexões até `shutdown` completar, uma task por conexão, e mantém
    /// a varredura periódica de expirados. Erro no accept é fatal.
    pub async fn run(self, shutdown: impl Future) -> CacheResult<()> {
        info!(
            "nó {} escutando em {}",
            self.node.id(),
            self.local_addr()?
        );

        let sweeper = tokio::spawn(run_sweeper(
            self.node.store().clone(),
            self.node.config().sweep_interval,
            self.node.subscribe_shutdown(),
        ));

        tokio::pin!(shutdown);
        let result = loop {
            let (socket, addr) = tokio::select! {
                result = self.listener.accept() => match result {
                    Ok(v) => v,
                    Err(e) => break Err(CacheError::Accept(e)),
                },
                _ = &mut shutdown => {
                    info!("shutdown signal recebido");
                    break Ok(());
                }
            };

            info!("nova conexão: {addr}");
            let node = self.node.clone();
            let mut shutdown_rx = node.subscribe_shutdown();

            tokio::spawn(async move {
                let (reader, writer) = Connection::new(socket).into_split();
                let link = Arc::new(PeerLink::new(addr, writer, node.config().io_timeout));
                if let Err(e) = handle_connection(reader, link, node, &mut shutdown_rx).await {
                    error!("erro na conexão {addr}: {e}");
                }
                info!("conexão encerrada: {addr}");
            });
        };

        self.node.shutdown();
        let _ = sweeper.await;
        result
    }
}
