pub mod api;
pub mod error;
pub mod feed;
pub mod models;
pub mod roles;

pub use error::{Error, Result};
