pub mod auth;
pub mod connections;
pub mod domain;
pub mod identity;
pub mod process;
