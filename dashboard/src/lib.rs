pub mod app;
pub mod config;
pub mod directory;
pub mod errors;
pub mod event;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod parse;
pub mod pending;
pub mod query;
pub mod reconciler;
pub mod registration;
pub mod registry;
pub mod rest;
pub mod sync;

#[cfg(test)]
mod testing;
