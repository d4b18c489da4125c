//! Bulk Server - TCP producer transport
//!
//! Accepts line-oriented producer connections and feeds each line into
//! the pipeline. The transport owns the wire concerns the pipeline does
//! not know about: framing lines out of the byte stream, the explicit
//! disconnect byte, EOF, and what to do with a connection that commits
//! a protocol violation.

mod decode;
mod tcp;

pub use decode::{DecodedItem, LineDecoder};
pub use tcp::{
    ServerMetrics, ServerMetricsSnapshot, TcpServer, TcpServerConfig, TcpServerError,
    ViolationPolicy,
};
