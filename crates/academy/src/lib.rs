//! Academy Backend Library
//!
//! This library provides the authentication gate and the payroll ledger
//! behind the academy administration dashboard.

pub mod api;
pub mod auth;
pub mod db;
pub mod payroll;
