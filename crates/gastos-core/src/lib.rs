//! Core domain + application logic for the expense bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and Google Sheets
//! live behind ports (traits) implemented in adapter crates.

pub mod chart;
pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod ports;

pub use errors::{Error, Result};
