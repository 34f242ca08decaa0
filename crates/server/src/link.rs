use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, Notify, oneshot};
use tokio::time::{Duration, timeout};
use tracing::debug;

use cachenode_common::ConnectionError;
use cachenode_protocol::Message;

use crate::connection::MessageWriter;

/// Lado de escrita de uma conexão, compartilhado entre o handler da conexão
/// (que responde requests) e a replicação (que envia requests e espera ack).
///
/// No máximo um request fica pendente por link; o `ack`/`response` lido pelo
/// handler é entregue ao request via [`PeerLink::complete`]. Fechar o link
/// acorda o handler (ver [`PeerLink::closed`]), que então libera o socket.
pub struct PeerLink {
    remote: SocketAddr,
    writer: AsyncMutex<MessageWriter>,
    in_flight: AsyncMutex<()>,
    pending: Mutex<Option<oneshot::Sender<Message>>>,
    peer_id: Mutex<Option<String>>,
    closed: AtomicBool,
    close_signal: Notify,
    dialed: bool,
    write_timeout: Duration,
}

impl PeerLink {
    /// Link de uma conexão aceita pelo listener.
    pub fn new(remote: SocketAddr, writer: MessageWriter, write_timeout: Duration) -> Self {
        Self::build(remote, writer, write_timeout, false)
    }

    /// Link de uma conexão discada por este nó.
    pub fn dialed(remote: SocketAddr, writer: MessageWriter, write_timeout: Duration) -> Self {
        Self::build(remote, writer, write_timeout, true)
    }

    fn build(
        remote: SocketAddr,
        writer: MessageWriter,
        write_timeout: Duration,
        dialed: bool,
    ) -> Self {
        Self {
            remote,
            writer: AsyncMutex::new(writer),
            in_flight: AsyncMutex::new(()),
            pending: Mutex::new(None),
            peer_id: Mutex::new(None),
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
            dialed,
            write_timeout,
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    /// Id sob o qual o link está registrado como peer, se estiver.
    pub fn peer_id(&self) -> Option<String> {
        self.peer_id.lock().clone()
    }

    pub(crate) fn set_peer_id(&self, id: String) {
        *self.peer_id.lock() = Some(id);
    }

    /// `true` se a conexão foi aberta por este nó.
    pub fn is_dialed(&self) -> bool {
        self.dialed
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Completa quando o link é fechado. Um único waiter (o handler da
    /// conexão); o sinal fica guardado se ninguém estiver esperando.
    pub async fn closed(&self) {
        if self.is_closed() {
            return;
        }
        self.close_signal.notified().await;
    }

    /// Escreve uma mensagem, sem esperar resposta.
    pub async fn send(&self, message: &Message) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        let mut writer = self.writer.lock().await;
        timeout(self.write_timeout, writer.write_message(message))
            .await
            .map_err(|_| ConnectionError::Timeout(self.write_timeout))?
    }

    /// Envia `message` e espera a próxima resposta (`ack`/`response`) do peer.
    ///
    /// Em timeout o link é fechado: uma resposta atrasada não poderia ser
    /// atribuída ao request correto.
    pub async fn request(
        &self,
        message: &Message,
        wait: Duration,
    ) -> Result<Message, ConnectionError> {
        let _in_flight = self.in_flight.lock().await;
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }

        let (tx, rx) = oneshot::channel();
        *self.pending.lock() = Some(tx);

        if let Err(e) = self.send(message).await {
            self.pending.lock().take();
            return Err(e);
        }

        match timeout(wait, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(ConnectionError::Closed),
            Err(_) => {
                self.close().await;
                Err(ConnectionError::Timeout(wait))
            }
        }
    }

    /// Entrega uma resposta ao request pendente. Devolve a mensagem se não
    /// houver ninguém esperando.
    pub fn complete(&self, reply: Message) -> Result<(), Message> {
        match self.pending.lock().take() {
            Some(tx) => tx.send(reply),
            None => Err(reply),
        }
    }

    /// Falha o request pendente (se houver) com `ConnectionError::Closed`.
    pub fn fail_pending(&self) {
        self.pending.lock().take();
    }

    /// Fecha o link: requests futuros falham, o peer recebe EOF e o handler
    /// da conexão é acordado para encerrar.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.close_signal.notify_one();
        self.fail_pending();
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!("erro ao fechar link {}: {e}", self.remote);
        }
    }
}
