pub mod catalog;
pub mod client;
pub mod codec;
pub mod config;
pub mod domain;
pub mod downloader;
pub mod error;
pub mod filter;
pub mod output;
pub mod parser;
pub mod sorted;
pub mod store;
pub mod units;
