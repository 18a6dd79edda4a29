pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod market;
pub mod models;
pub mod solana;
pub mod store;
pub mod tokens;
pub mod tracker;
pub mod utils;
pub mod validation;
pub mod wallet;

pub use error::{Error, Result};
