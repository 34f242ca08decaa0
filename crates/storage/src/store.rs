use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::entry::Entry;

/// Handle para o mapa chave → entrada. Clonar compartilha o mesmo estado.
///
/// Um único `RwLock` protege o mapa inteiro; não há lock por chave. O store não
/// conhece peers nem rede: replicação e a varredura periódica ficam com quem o
/// possui.
#[derive(Clone, Default)]
pub struct Store {
    shared: Arc<RwLock<HashMap<String, Entry>>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grava `value` com expiração em `now + ttl_secs`, sobrescrevendo qualquer
    /// entrada anterior. TTL <= 0 grava uma entrada já expirada.
    pub fn set(&self, key: String, value: Value, ttl_secs: i64) {
        let entry = Entry::with_ttl(value, ttl_secs, Instant::now());
        self.shared.write().insert(key, entry);
    }

    /// Retorna o valor se a chave existe e não expirou. Uma entrada expirada é
    /// removida na mesma transação que a encontrou (expiração preguiçosa).
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let data = self.shared.upgradable_read();
        let entry = data.get(key)?;
        if !entry.is_expired_at(now) {
            return Some(entry.value.clone());
        }

        let mut data = RwLockUpgradableReadGuard::upgrade(data);
        data.remove(key);
        debug!("key expirada removida na leitura: {key}");
        None
    }

    /// Remove a chave. Retorna se ela existia; remover chave ausente não é erro.
    pub fn delete(&self, key: &str) -> bool {
        self.shared.write().remove(key).is_some()
    }

    /// Remove toda entrada expirada em `now`. Retorna quantas foram removidas.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut data = self.shared.write();
        let before = data.len();
        data.retain(|_, entry| !entry.is_expired_at(now));
        before - data.len()
    }

    /// Número de entradas no mapa, incluindo expiradas ainda não removidas.
    pub fn len(&self) -> usize {
        self.shared.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.read().is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.shared.read().contains_key(key)
    }
}
