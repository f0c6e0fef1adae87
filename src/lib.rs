// Library exports for the board server
// This allows integration tests to build the router and drive it directly

pub mod activity;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod mailer;
pub mod routes;
pub mod state;
pub mod uploads;
pub mod views;
