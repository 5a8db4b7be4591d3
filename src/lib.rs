pub mod adapters;
pub mod app;
pub mod auth;
pub mod cache;
pub mod cli;
pub mod clients;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod ports;
pub mod server;
pub mod startup;
pub mod use_cases;
pub mod utils;

#[cfg(test)]
mod test_support;
