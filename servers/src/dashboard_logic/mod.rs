pub mod config;
pub mod downstream;
pub mod engine;
pub mod logger;
