pub mod config;
pub mod health;
pub mod orgs;
pub mod sessions;
pub mod users;
