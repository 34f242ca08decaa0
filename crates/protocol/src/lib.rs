#![forbid(unsafe_code)]

mod frame;
mod message;

pub use frame::{check_line, get_line};
pub use message::Message;
pub use serde_json::Value;
