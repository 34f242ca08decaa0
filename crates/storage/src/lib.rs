#![forbid(unsafe_code)]

mod entry;
mod store;

pub use entry::{Entry, expiry_from_ttl};
pub use store::Store;
