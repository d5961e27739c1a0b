// nexus_gateway/src/error.rs
//
// Crate-wide error taxonomy. Startup errors propagate out of `run()`;
// per-connection errors never escape `net` — they become a log line
// and/or a REJECTED response.

use crate::wire::codec::CodecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to resolve bind address {addr}: {source}")]
    AddrResolution {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind/listen on {addr}: {source}")]
    BindListen {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed message: {0}")]
    Malformed(#[from] CodecError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
