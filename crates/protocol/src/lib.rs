//! Bulk Protocol - Shared data types
//!
//! The vocabulary of the bulk pipeline: command blocks, sink kinds with
//! their delivery masks, and the line token classifier. Everything here
//! is plain data - no I/O, no locking beyond the atomic delivery mask.

mod block;
mod sink;
mod token;

pub use block::{Block, BlockId};
pub use sink::{DeliveryMask, SinkKind, SinkSet};
pub use token::{classify, Token, CLOSE_DELIMITER, OPEN_DELIMITER};

/// Control byte a client sends to request an explicit disconnect.
///
/// Everything after this byte on the wire is discarded, including any
/// unterminated partial line before it.
pub const DISCONNECT_BYTE: u8 = 0x04;
