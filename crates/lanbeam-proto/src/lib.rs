//! LocalSend v2 wire protocol: announcement and transfer message types,
//! plus peer endpoint URL construction.

pub mod types;
pub mod url;

pub use types::*;
pub use url::PeerEndpoint;
