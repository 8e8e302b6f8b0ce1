pub mod connection;
pub mod reconnect;

pub use connection::{BridgeStatus, ConnectionPhase};
pub use reconnect::{ManualTimer, RETRY_PERIOD, Reconnector, RetryTimer};
