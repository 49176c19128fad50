pub mod cache;
pub mod config;
pub mod listing;
pub mod search;
pub mod text;
