// prometheus-agents-setup - Prometheus agent installer
// Library root

pub mod acquire;
pub mod agent;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod health;
pub mod orchestrator;
pub mod platform;
pub mod render;
pub mod retry;
pub mod service;
pub mod version;
