//! Wire types shared by the Mona server and its clients.
//!
//! With the `client` feature enabled, [`client`] also provides typed
//! clients for the informational endpoints and the subscriber channel.

pub mod objects;

#[cfg(feature = "client")]
pub mod client;
