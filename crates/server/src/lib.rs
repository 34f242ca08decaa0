#![forbid(unsafe_code)]

pub mod config;
mod connection;
pub mod handler;
mod link;
pub mod node;
pub mod registry;
pub mod replication;
mod sweeper;

pub use config::NodeConfig;
pub use connection::{Connection, MessageReader, MessageWriter};
pub use handler::handle_connection;
pub use link::PeerLink;
pub use node::{Node, Server};
pub use registry::{PeerRegistry, Registration};
pub use replication::{FanoutPolicy, ReplicationOptions};
pub use sweeper::run_sweeper;
