pub mod auth;
pub mod authenticator;
pub mod error;
pub mod middleware;
pub mod notifier;
pub mod posts;
pub mod registration;
pub mod routes;
pub mod users;
