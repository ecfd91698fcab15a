//! Property management core: typed request dispatch over a unit of work
//! with explicit transactions, plus the persistence and storage adapters
//! the handlers run against.

pub mod application;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod metrics;
pub mod outcome;
pub mod persistence;
pub mod seed;
pub mod storage;
pub mod utils;

pub use outcome::Outcome;
