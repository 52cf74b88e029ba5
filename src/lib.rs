pub mod config;
pub mod error;
pub mod pipeline;
pub mod sink;
pub mod source;
