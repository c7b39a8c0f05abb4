// Filings Auth - Library root

pub mod auth;
pub mod config;
pub mod error;
pub mod gate;
pub mod http_client;
pub mod models;
