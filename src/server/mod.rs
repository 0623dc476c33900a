//! Server module for building the HTTP server
//!
//! [`ServerBuilder`] wires the collaborators into a [`ServerHost`] and
//! exposes it through the axum router built in [`router`].

pub mod builder;
pub mod host;
pub mod router;

pub use builder::ServerBuilder;
pub use host::ServerHost;
pub use router::build_router;
