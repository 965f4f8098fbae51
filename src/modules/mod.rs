//! Quill blog module layout
//!
//! Core configuration and shared plumbing
pub mod config;
pub mod cli;
pub mod error;
pub mod mail;

// Password hashing and secrets
pub mod crypto {
    pub mod password;
    pub mod secret;

    pub use password::{hash_password, needs_rehash, verify_password};
    pub use secret::random_secret;
}

// Database
pub mod database {
    pub mod storage;
    pub mod users;
    pub mod posts;
    pub mod comments;
}

// Page rendering
pub mod content {
    pub mod templates;
}

// Web
pub mod web {
    pub mod auth;
    pub mod forms;
    pub mod posts;
    pub mod routes;
    pub mod session;

    #[cfg(test)]
    pub mod test_utils;
}
