pub mod auth;
pub mod config;
pub mod runner;
pub mod sync;
