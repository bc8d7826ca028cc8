//! Asynchronous PostgreSQL client using Tokio.

mod client;
mod conn;
mod stream;
mod tls;

pub use client::{Client, MAX_RETRIES};
pub use conn::{Conn, MAX_MESSAGE_LEN};
pub use stream::{Stream, Transport};
pub use tls::negotiate;
