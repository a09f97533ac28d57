pub mod character;
pub mod config;
pub mod core;
pub mod error;
pub mod memory;
pub mod models;
pub mod providers;
