//! Data models shared by the managers and the HTTP API.

mod chat;
mod session;
mod tag;

pub use chat::*;
pub use session::*;
pub use tag::*;
