pub mod cli;
pub mod config;
pub mod engine;
pub mod normalize;
pub mod parse;
pub mod search;
pub mod storage;
pub mod timeline;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use engine::Engine;
