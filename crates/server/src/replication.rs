use std::sync::Arc;

use tokio::time::Duration;
use tracing::{debug, warn};

use cachenode_common::{REPLICATION_TIMEOUT, ReplicationError};
use cachenode_protocol::Message;

use crate::link::PeerLink;
use crate::registry::PeerRegistry;

/// O que fazer quando um peer falha no meio do fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FanoutPolicy {
    /// Tenta todos os peers e agrega as falhas.
    #[default]
    BestEffort,
    /// Para no primeiro peer que falhar; os seguintes não são tentados.
    FailFast,
}

#[derive(Debug, Clone)]
pub struct ReplicationOptions {
    /// Prazo para cada peer confirmar a escrita.
    pub timeout: Duration,
    pub policy: FanoutPolicy,
}

impl Default for ReplicationOptions {
    fn default() -> Self {
        Self {
            timeout: REPLICATION_TIMEOUT,
            policy: FanoutPolicy::default(),
        }
    }
}

/// Envia `message` a cada peer registrado e espera `ack{success:true}` de
/// cada um, um peer por vez. `exclude` é o link de onde a escrita veio, que
/// não recebe a própria escrita de volta.
///
/// Retorna quantos peers confirmaram. A escrita local já foi aplicada pelo
/// chamador e não é desfeita em caso de erro.
pub async fn replicate(
    peers: &PeerRegistry,
    message: &Message,
    options: &ReplicationOptions,
    exclude: Option<&Arc<PeerLink>>,
) -> Result<usize, ReplicationError> {
    let targets: Vec<_> = peers
        .snapshot()
        .into_iter()
        .filter(|(_, link)| exclude.is_none_or(|origin| !Arc::ptr_eq(origin, link)))
        .collect();

    let mut attempted = 0;
    let mut failures = Vec::new();

    for (peer, link) in targets {
        attempted += 1;
        match replicate_to_peer(&peer, &link, message, options.timeout).await {
            Ok(()) => debug!("{} replicado para {peer}", message.kind()),
            Err(e) => {
                warn!("replicação para {peer} falhou: {e}");
                failures.push(e);
                if options.policy == FanoutPolicy::FailFast {
                    break;
                }
            }
        }
    }

    if failures.is_empty() {
        Ok(attempted)
    } else {
        Err(ReplicationError::Partial {
            failures,
            attempted,
        })
    }
}

/// Um round-trip com um peer: escreve a mensagem e exige `ack{success:true}`.
pub async fn replicate_to_peer(
    peer: &str,
    link: &PeerLink,
    message: &Message,
    wait: Duration,
) -> Result<(), ReplicationError> {
    let reply = link
        .request(message, wait)
        .await
        .map_err(|source| ReplicationError::Peer {
            peer: peer.to_string(),
            source,
        })?;

    match reply {
        Message::Ack { success: true, .. } => Ok(()),
        Message::Ack { success: false, .. } => Err(ReplicationError::Rejected(peer.to_string())),
        other => Err(ReplicationError::UnexpectedReply {
            peer: peer.to_string(),
            kind: other.kind().to_string(),
        }),
    }
}
