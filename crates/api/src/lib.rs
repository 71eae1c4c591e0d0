//! HTTP API: server wiring, request authorization and route handlers.

pub mod app;
pub mod authz;
pub mod config;
pub mod context;
pub mod middleware;
