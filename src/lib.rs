pub mod analyzers;
pub mod config;
pub mod error;
pub mod fetch;
pub mod ingest;
pub mod output;
pub mod parser;
pub mod services;
