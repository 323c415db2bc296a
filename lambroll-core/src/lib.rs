//! The pure model behind `lambroll`.
//!
//! Nothing in this crate talks to the network or the filesystem. The CLI
//! loads definitions, the remote crate produces [`remote::RemoteFunction`]
//! snapshots, and the functions here decide what differs and what to do
//! about it.

pub mod definition;
pub mod diff;
pub mod error;
pub mod normalize;
pub mod plan;
pub mod remote;
pub mod versions;

pub use error::Error;
