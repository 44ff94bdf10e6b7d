pub mod config;
pub mod errors;
pub mod logger;
pub mod models;
pub mod modules;
pub mod processor;
pub mod shared;
