//! Transport to the remote peer.

pub mod connection;

pub use connection::{ClientOptions, Connector, Endpoint, TcpConnector};
