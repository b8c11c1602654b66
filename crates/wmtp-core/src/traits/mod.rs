//! Core trait definitions

mod store;
mod transport;

pub use store::KeyValueStore;
pub use transport::{Transport, TransportEvent};
