mod auth;
mod client;
mod types;

pub use auth::Credentials;
pub use client::{SubsonicClient, SubsonicError, ERROR_NOT_FOUND};
pub use types::{ErrorBody, Song};
