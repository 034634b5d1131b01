//! Connection identity, options and registry

mod handle;
mod options;
mod registry;
mod target;

pub(crate) use handle::{guarded, lock, panic_message, Lineage};
pub use handle::{
    ConnectionHandle, ConnectionKey, ConnectionState, EventCallback, EventKind, EventPayload,
};
pub use options::{
    Callbacks, ConnectionOptions, ErrorCallback, MessageCallback, OpenCallback,
    DEFAULT_RECONNECT_INTERVAL,
};
pub use registry::ConnectionRegistry;
pub use target::compose_target;
