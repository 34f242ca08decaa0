use tokio::sync::broadcast;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tracing::debug;

use cachenode_storage::Store;

/// Tarefa de fundo que varre chaves expiradas a cada `period`, até o shutdown.
pub async fn run_sweeper(store: Store, period: Duration, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // o primeiro tick é imediato
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = store.sweep(Instant::now());
                if removed > 0 {
                    debug!("varredura removeu {removed} keys expiradas");
                }
            }
            _ = shutdown.recv() => return,
        }
    }
}
