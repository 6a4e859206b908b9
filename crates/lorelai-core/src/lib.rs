pub mod artifacts;
pub mod benchmark;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod fingerprint;
pub mod indexing;
pub mod integrations;
pub mod logging;
pub mod metrics_api;
pub mod model;
pub mod providers;
pub mod report;
pub mod storage;
