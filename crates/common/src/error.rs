use std::time::Duration;

/// Erros de decodificação do protocolo de linhas JSON.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("linha incompleta")]
    Incomplete,
    #[error("linha excede tamanho máximo ({0} bytes)")]
    LineTooLong(usize),
    #[error("encoding inválido: {0}")]
    InvalidEncoding(String),
    #[error("JSON inválido: {0}")]
    InvalidJson(String),
    #[error("mensagem '{kind}' sem o campo obrigatório '{field}'")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
}

/// Erros de conexão TCP.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("conexão resetada pelo peer")]
    ConnectionReset,
    #[error("conexão fechada")]
    Closed,
    #[error("timeout após {0:?}")]
    Timeout(Duration),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Falhas da replicação para peers.
#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    #[error("peer {peer}: {source}")]
    Peer {
        peer: String,
        #[source]
        source: ConnectionError,
    },
    #[error("peer {0} rejeitou a escrita")]
    Rejected(String),
    #[error("peer {peer} respondeu com '{kind}' em vez de ack")]
    UnexpectedReply { peer: String, kind: String },
    #[error("replicação falhou em {} de {attempted} peers", failures.len())]
    Partial {
        failures: Vec<ReplicationError>,
        attempted: usize,
    },
}

impl ReplicationError {
    /// Peer associado à falha, quando ela se refere a um único peer.
    pub fn peer(&self) -> Option<&str> {
        match self {
            ReplicationError::Peer { peer, .. }
            | ReplicationError::Rejected(peer)
            | ReplicationError::UnexpectedReply { peer, .. } => Some(peer),
            ReplicationError::Partial { .. } => None,
        }
    }
}

/// Erro top-level do nó de cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("falha ao escutar em {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("falha ao aceitar conexão: {0}")]
    Accept(#[source] std::io::Error),
    #[error("peer {addr} recusou o join (resposta: {reply})")]
    JoinRejected { addr: String, reply: String },
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Replication(#[from] ReplicationError),
}

/// Result type alias.
pub type CacheResult<T> = Result<T, CacheError>;

// Conversão implícita de io::Error → CacheError (via ConnectionError)
impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        CacheError::Connection(ConnectionError::Io(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_display() {
        let err = ProtocolError::MissingField {
            kind: "set",
            field: "key",
        };
        assert_eq!(
            err.to_string(),
            "mensagem 'set' sem o campo obrigatório 'key'"
        );
    }

    #[test]
    fn cache_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken");
        let err: CacheError = io_err.into();
        assert!(matches!(
            err,
            CacheError::Connection(ConnectionError::Io(_))
        ));
    }

    #[test]
    fn connection_error_from_protocol() {
        let err: ConnectionError = ProtocolError::Incomplete.into();
        assert!(matches!(
            err,
            ConnectionError::Protocol(ProtocolError::Incomplete)
        ));
    }

    #[test]
    fn partial_replication_display() {
        let err = ReplicationError::Partial {
            failures: vec![
                ReplicationError::Rejected("b".into()),
                ReplicationError::Peer {
                    peer: "c".into(),
                    source: ConnectionError::Closed,
                },
            ],
            attempted: 3,
        };
        assert_eq!(err.to_string(), "replicação falhou em 2 de 3 peers");
        assert_eq!(err.peer(), None);
    }

    #[test]
    fn replication_error_peer() {
        let err = ReplicationError::Peer {
            peer: "node-b".into(),
            source: ConnectionError::Timeout(Duration::from_millis(10)),
        };
        assert_eq!(err.peer(), Some("node-b"));
        assert!(err.to_string().starts_with("peer node-b: timeout"));
    }
}
