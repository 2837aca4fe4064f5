//! Database schema and queries

pub mod audio_files;
pub mod init;
pub mod models;
pub mod sessions;
pub mod users;

pub use init::*;
pub use models::*;
