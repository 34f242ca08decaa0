#![forbid(unsafe_code)]

mod error;

use std::time::Duration;

pub use error::*;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 7000;
pub const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024; // 4 KB
pub const MAX_LINE_SIZE: usize = 16 * 1024 * 1024; // 16 MB

/// Intervalo da varredura periódica de chaves expiradas.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Prazo para um peer confirmar (ack) uma escrita replicada.
pub const REPLICATION_TIMEOUT: Duration = Duration::from_secs(5);
/// Prazo para dial, handshake de join e escritas no socket.
pub const IO_TIMEOUT: Duration = Duration::from_secs(5);
