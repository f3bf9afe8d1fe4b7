//! Core domain types and logic.

pub mod ohlcv;
pub mod error;
pub mod indicator;
pub mod indicator_helpers;
pub mod features;
pub mod market_data;
pub mod regime;
pub mod position;
pub mod portfolio;
pub mod execution;
pub mod risk_budget;
pub mod strategy;
pub mod backtest;
pub mod metrics;
pub mod param_grid;
pub mod walk_forward;
pub mod monte_carlo;
pub mod universe;
pub mod config_validation;
