//! Line protocol between the driver and a responder
//!
//! # Example Usage
//!
//! ```ignore
//! use blocksync::protocol::{codec, memory_pair, Message};
//!
//! let (mut responder, mut driver) = memory_pair(64 * 1024);
//! codec::send_message(&mut responder, &Message::Size(8)).await?;
//! let size = codec::recv_size(&mut driver).await?;
//! ```

pub mod codec;
pub mod error;
pub mod messages;
pub mod transport;

pub use error::ProtocolError;
pub use messages::{Message, Reply, Verdict};
pub use transport::{
	memory_pair, ChildTransport, MemoryTransport, ProtocolResult, StdioTransport, StreamTransport,
	Transport,
};

// vim: ts=4
