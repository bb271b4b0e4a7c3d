pub mod checker;
mod codec;
pub mod config;
pub mod crawl;
pub mod download;
pub mod listing;
pub mod poller;
