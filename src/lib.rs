pub mod catalog;
pub mod chain;
pub mod config;
pub mod deployment;
pub mod events;
pub mod ledger;
pub mod metadata;
pub mod query;
pub mod reconcile;
pub mod rpc;
pub mod watcher;
