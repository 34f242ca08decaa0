use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::link::PeerLink;

/// Resultado de [`PeerRegistry::add_preferring`].
pub enum Registration {
    Added,
    /// O link anterior com o mesmo id foi substituído e deve ser fechado.
    Replaced(Arc<PeerLink>),
    /// O link existente foi mantido; o novo deve ser fechado.
    Kept,
}

/// Peers conhecidos por id. Clonar compartilha o mesmo mapa.
///
/// Iteração sempre sobre uma cópia (`snapshot`), para que a replicação não
/// segure lock do mapa enquanto faz I/O e joins concorrentes não fiquem
/// bloqueados.
#[derive(Clone, Default)]
pub struct PeerRegistry {
    peers: Arc<DashMap<String, Arc<PeerLink>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra o peer. Um id repetido substitui o link anterior (último vence);
    /// o link substituído é retornado para que o chamador o feche.
    pub fn add(&self, id: String, link: Arc<PeerLink>) -> Option<Arc<PeerLink>> {
        match self.add_preferring(id, link, |_| false) {
            Registration::Replaced(old) => Some(old),
            Registration::Added | Registration::Kept => None,
        }
    }

    /// Como [`add`](Self::add), mas mantém o link existente quando ele está
    /// aberto e é `preferred` enquanto o novo não é.
    pub fn add_preferring(
        &self,
        id: String,
        link: Arc<PeerLink>,
        preferred: impl Fn(&PeerLink) -> bool,
    ) -> Registration {
        match self.peers.entry(id) {
            Entry::Vacant(vacant) => {
                link.set_peer_id(vacant.key().clone());
                vacant.insert(link);
                Registration::Added
            }
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                if Arc::ptr_eq(current, &link) {
                    return Registration::Added;
                }
                if !current.is_closed()
                    && preferred(current.as_ref())
                    && !preferred(link.as_ref())
                {
                    return Registration::Kept;
                }
                link.set_peer_id(occupied.key().clone());
                Registration::Replaced(occupied.insert(link))
            }
        }
    }

    pub fn remove(&self, id: &str) -> Option<Arc<PeerLink>> {
        self.peers.remove(id).map(|(_, link)| link)
    }

    /// Remove `id` apenas se ele ainda aponta para `link`. Usado quando uma
    /// conexão termina, sem derrubar um link mais novo com o mesmo id.
    pub fn remove_link(&self, id: &str, link: &Arc<PeerLink>) -> bool {
        self.peers
            .remove_if(id, |_, current| Arc::ptr_eq(current, link))
            .is_some()
    }

    pub fn get(&self, id: &str) -> Option<Arc<PeerLink>> {
        self.peers.get(id).map(|entry| entry.value().clone())
    }

    /// Cópia dos peers atuais.
    pub fn snapshot(&self) -> Vec<(String, Arc<PeerLink>)> {
        self.peers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Aplica `f` a cada peer de um snapshot; nenhum lock fica preso durante `f`.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&str, &Arc<PeerLink>),
    {
        for (id, link) in self.snapshot() {
            f(&id, &link);
        }
    }

    /// Ids registrados, em ordem.
    pub fn ids(&self) -> Vec<String> {
        let mut ids = Vec::with_capacity(self.len());
        self.for_each(|id, _| ids.push(id.to_string()));
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::Duration;

    use crate::connection::Connection;

    async fn link_over_loopback(dialed: bool) -> (Arc<PeerLink>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, remote) = listener.accept().await.unwrap();
        let (_, writer) = Connection::new(server).into_split();
        let link = if dialed {
            PeerLink::dialed(remote, writer, Duration::from_secs(1))
        } else {
            PeerLink::new(remote, writer, Duration::from_secs(1))
        };
        (Arc::new(link), client)
    }

    async fn make_link() -> (Arc<PeerLink>, TcpStream) {
        link_over_loopback(false).await
    }

    async fn make_dialed_link() -> (Arc<PeerLink>, TcpStream) {
        link_over_loopback(true).await
    }

    #[tokio::test]
    async fn add_and_remove() {
        let registry = PeerRegistry::new();
        let (link, _client) = make_link().await;

        assert!(registry.add("node-b".into(), link.clone()).is_none());
        assert_eq!(registry.len(), 1);
        assert_eq!(link.peer_id().as_deref(), Some("node-b"));
        assert!(Arc::ptr_eq(&registry.get("node-b").unwrap(), &link));

        assert!(registry.remove("node-b").is_some());
        assert!(registry.remove("node-b").is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn duplicate_id_replaces_and_returns_old() {
        let registry = PeerRegistry::new();
        let (first, _c1) = make_link().await;
        let (second, _c2) = make_link().await;

        registry.add("node-b".into(), first.clone());
        let superseded = registry.add("node-b".into(), second.clone()).unwrap();
        assert!(Arc::ptr_eq(&superseded, &first));
        assert!(Arc::ptr_eq(&registry.get("node-b").unwrap(), &second));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn re_adding_same_link_is_not_a_replacement() {
        let registry = PeerRegistry::new();
        let (link, _client) = make_link().await;
        registry.add("node-b".into(), link.clone());
        assert!(registry.add("node-b".into(), link).is_none());
    }

    #[tokio::test]
    async fn preferred_link_is_kept() {
        let registry = PeerRegistry::new();
        let (inbound, _c1) = make_link().await;
        let (dialed, _c2) = make_dialed_link().await;
        let prefer_inbound = |link: &PeerLink| !link.is_dialed();

        registry.add_preferring("node-b".into(), inbound.clone(), prefer_inbound);
        let outcome = registry.add_preferring("node-b".into(), dialed.clone(), prefer_inbound);

        assert!(matches!(outcome, Registration::Kept));
        assert!(Arc::ptr_eq(&registry.get("node-b").unwrap(), &inbound));
        assert_eq!(dialed.peer_id(), None);
    }

    #[tokio::test]
    async fn preferred_link_replaces_other() {
        let registry = PeerRegistry::new();
        let (dialed, _c1) = make_dialed_link().await;
        let (inbound, _c2) = make_link().await;
        let prefer_inbound = |link: &PeerLink| !link.is_dialed();

        registry.add_preferring("node-b".into(), dialed.clone(), prefer_inbound);
        let outcome = registry.add_preferring("node-b".into(), inbound.clone(), prefer_inbound);

        match outcome {
            Registration::Replaced(old) => assert!(Arc::ptr_eq(&old, &dialed)),
            _ => panic!("esperava substituição"),
        }
        assert!(Arc::ptr_eq(&registry.get("node-b").unwrap(), &inbound));
    }

    #[tokio::test]
    async fn closed_preferred_link_is_replaced() {
        let registry = PeerRegistry::new();
        let (inbound, _c1) = make_link().await;
        let (dialed, _c2) = make_dialed_link().await;
        let prefer_inbound = |link: &PeerLink| !link.is_dialed();

        registry.add_preferring("node-b".into(), inbound.clone(), prefer_inbound);
        inbound.close().await;
        let outcome = registry.add_preferring("node-b".into(), dialed.clone(), prefer_inbound);

        assert!(matches!(outcome, Registration::Replaced(_)));
        assert!(Arc::ptr_eq(&registry.get("node-b").unwrap(), &dialed));
    }

    #[tokio::test]
    async fn remove_link_ignores_newer_link() {
        let registry = PeerRegistry::new();
        let (old, _c1) = make_link().await;
        let (new, _c2) = make_link().await;

        registry.add("node-b".into(), old.clone());
        registry.add("node-b".into(), new.clone());

        assert!(!registry.remove_link("node-b", &old));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove_link("node-b", &new));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn snapshot_is_detached_from_registry() {
        let registry = PeerRegistry::new();
        let (a, _c1) = make_link().await;
        let (b, _c2) = make_link().await;
        registry.add("a".into(), a);
        registry.add("b".into(), b);

        let mut visited = Vec::new();
        registry.for_each(|id, _| {
            // mutar o registro durante a iteração não pode travar
            registry.remove(id);
            visited.push(id.to_string());
        });
        visited.sort();
        assert_eq!(visited, vec!["a", "b"]);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn ids_are_sorted() {
        let registry = PeerRegistry::new();
        let mut clients = Vec::new();
        for id in ["c", "a", "b"] {
            let (link, client) = make_link().await;
            clients.push(client);
            registry.add(id.into(), link);
        }
        assert_eq!(registry.ids(), vec!["a", "b", "c"]);
    }
}
