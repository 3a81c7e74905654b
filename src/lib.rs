pub mod app_config;
pub mod create_user;
pub mod error;
pub mod ip;
pub mod middleware;
pub mod orm;
pub mod permission;
pub mod poll;
pub mod rate_limit;
pub mod response;
pub mod session;
pub mod store;
pub mod user;
pub mod web;
