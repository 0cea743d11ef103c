pub mod aws;
pub mod citations;
pub mod config;
pub mod error;
pub mod indexing;
pub mod locator;
pub mod reconcile;
pub mod retrieval;
pub mod routes;
pub mod state;
pub mod storage;
pub mod uploads;
