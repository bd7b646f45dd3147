pub mod api;
pub mod config;
pub mod db;
pub mod llm;

pub use config::Config;
