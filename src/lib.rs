pub mod catalog;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod rng;
pub mod server_protocol;
pub mod server_utils;
pub mod session_store;
pub mod types;
