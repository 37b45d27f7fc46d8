pub mod codec;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod pose;
pub mod protocol;
pub mod render;
pub mod server;
pub mod session;
pub mod tracker;
