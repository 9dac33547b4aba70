//! Network messages for the consensus protocol.

mod envelope;
mod request;

pub use envelope::{DecodeError, NetworkMessage};
pub use request::{GetBlockRequest, GetBlockResponse};
