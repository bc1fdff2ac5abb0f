#![forbid(unsafe_code)]

pub mod browser;
pub mod cli;
pub mod config;
pub mod detect;
pub mod discovery;
pub mod error;
pub mod fingerprint;
pub mod flatten;
pub mod formats;
pub mod logging;
pub mod parser;
pub mod pool;
pub mod retry;
pub mod scrape;
pub mod session;
pub mod store;
