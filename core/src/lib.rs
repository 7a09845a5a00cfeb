pub mod auth;
pub mod db;
pub mod draft;
pub mod export;
pub mod import;
pub mod models;
pub mod stats;
pub mod store;
