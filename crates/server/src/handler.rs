use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use cachenode_common::{ConnectionError, ReplicationError};
use cachenode_protocol::Message;

use crate::connection::MessageReader;
use crate::link::PeerLink;
use crate::node::Node;

/// Loop principal de tratamento de uma conexão (cliente ou peer).
///
/// Termina no EOF, no shutdown, quando o link é fechado (timeout de
/// replicação, link substituído) ou no primeiro erro de leitura/decodificação.
/// Ao terminar, falha o request pendente no link e remove o peer do registro
/// se ele ainda aponta para este link.
pub async fn handle_connection(
    mut reader: MessageReader,
    link: Arc<PeerLink>,
    node: Node,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<(), ConnectionError> {
    let result = serve(&mut reader, &link, &node, shutdown).await;

    link.fail_pending();
    if let Some(id) = link.peer_id()
        && node.peers().remove_link(&id, &link)
    {
        info!("peer {id} desconectado");
    }

    result
}

async fn serve(
    reader: &mut MessageReader,
    link: &Arc<PeerLink>,
    node: &Node,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<(), ConnectionError> {
    loop {
        let message = tokio::select! {
            result = reader.read_message() => result?,
            _ = shutdown.recv() => {
                return Ok(());
            }
            _ = link.closed() => {
                debug!("link {} fechado", link.remote_addr());
                return Ok(());
            }
        };

        let message = match message {
            Some(m) => m,
            None => return Ok(()), // EOF
        };

        debug!("mensagem recebida de {}: {message:?}", link.remote_addr());

        if let Some(response) = dispatch(message, link, node).await? {
            link.send(&response).await?;
        }
    }
}

/// Aplica uma mensagem e retorna a resposta a enviar, se houver.
async fn dispatch(
    message: Message,
    link: &Arc<PeerLink>,
    node: &Node,
) -> Result<Option<Message>, ConnectionError> {
    let response = match message {
        Message::Set {
            key,
            value,
            ttl,
            node_id: Some(origin),
        } => {
            // escrita já replicada: aplica sem novo fan-out
            debug!("set replicado de {origin}: {key}");
            node.store().set(key, value, ttl);
            Some(Message::ack(true))
        }
        Message::Set {
            key,
            value,
            ttl,
            node_id: None,
        } => {
            let result = node.set_from(Some(link), key, value, ttl).await;
            Some(write_ack("set", result))
        }
        Message::Delete {
            key,
            node_id: Some(origin),
        } => {
            debug!("delete replicado de {origin}: {key}");
            node.store().delete(&key);
            Some(Message::ack(true))
        }
        Message::Delete { key, node_id: None } => {
            let result = node.delete_from(Some(link), key).await;
            Some(write_ack("delete", result))
        }
        Message::Get { key } => {
            let value = node.get(&key);
            Some(Message::Response {
                success: value.is_some(),
                value: value.unwrap_or(Value::Null),
            })
        }
        Message::Join { node_id } => {
            // o ack precede o registro: a partir do registro o link pode
            // receber escritas replicadas, e o peer espera o ack primeiro
            link.send(&Message::join_ack(node.id())).await?;
            node.register_peer(node_id, link.clone()).await;
            None
        }
        reply @ (Message::Ack { .. } | Message::Response { .. }) => {
            if let Err(stray) = link.complete(reply) {
                warn!(
                    "{} sem request pendente de {}",
                    stray.kind(),
                    link.remote_addr()
                );
            }
            None
        }
        Message::Unknown { kind } => {
            warn!("tipo de mensagem desconhecido: {kind}");
            None
        }
    };
    Ok(response)
}

/// `ack{success:false}` quando a escrita local foi aplicada mas a replicação falhou.
fn write_ack(op: &str, result: Result<usize, ReplicationError>) -> Message {
    match result {
        Ok(_) => Message::ack(true),
        Err(e) => {
            warn!("{op} aplicado localmente, replicação incerta: {e}");
            Message::ack(false)
        }
    }
}
