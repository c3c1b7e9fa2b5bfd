pub mod assistant;
pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod server;
pub mod workflow;
