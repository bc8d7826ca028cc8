//! Sans-I/O state machines for the PostgreSQL protocol.
//!
//! These state machines handle the protocol logic without performing any I/O.
//! The tokio layer feeds them messages and acts on what they return.

pub mod auth;
pub mod connection;

pub use auth::{AuthResponse, Authenticator};
pub use connection::{ConnectionStateMachine, ProtocolState, Step};
