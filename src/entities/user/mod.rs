//! User entity module

pub mod descriptor;
pub mod handlers;
pub mod repository;

pub use descriptor::{USERS, Users, user_routes, users_descriptor};
pub use handlers::UserAppState;
pub use repository::UserRepository;
