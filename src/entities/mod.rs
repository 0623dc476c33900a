//! Entities module - contains the business entities served by the API

pub mod user;

pub use user::{UserAppState, UserRepository, Users};
