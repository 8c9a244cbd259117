//! Shared lunch expenses: groups, even splits and running balances.

pub mod accounts;
pub mod auth;
pub mod balance;
pub mod config;
pub mod error;
pub mod http;
pub mod invites;
pub mod ledger;
pub mod registry;
pub mod schemas;
pub mod split;
pub mod store;
pub mod telemetry;
