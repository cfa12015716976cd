pub mod app;
pub mod auth;
pub mod backend;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod duration;
pub mod market_data;
pub mod models;
pub mod poller;
pub mod routing;
pub mod storage;
pub mod store;
pub mod tokens;
