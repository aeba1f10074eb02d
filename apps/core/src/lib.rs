pub mod config;
pub mod contract;
pub mod core_service;
pub mod dispatcher;
pub mod history;
pub mod logging;
pub mod matcher;
pub mod model;
pub mod pin;
pub mod ranker;
pub mod reconciler;
pub mod router;
pub mod rpc;
pub mod runtime;
pub mod source;
pub mod sources;
pub mod store;
pub mod transliteration;
