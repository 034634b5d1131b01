//! Broadcast server mode
//!
//! Every inbound peer message overwrites a single shared slot and is
//! rebroadcast to all connected peers as `{"lastMessage": <text>}`. New
//! peers are greeted with the current slot.

mod broadcast;

pub use broadcast::{BroadcastServer, DEFAULT_SERVER_PORT};
