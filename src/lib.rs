pub mod backoff;
pub mod config;
pub mod console;
pub mod demo_feed;
pub mod error;
pub mod http_client;
pub mod innings;
pub mod ledger;
pub mod match_state;
pub mod over_tracker;
pub mod persist;
pub mod processor;
pub mod reconcile;
pub mod run_rate;
pub mod snapshot_fetch;
pub mod state;
pub mod validator;
