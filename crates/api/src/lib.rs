//! Vivid API server library.
//!
//! Exposes the building blocks (config, state, error handling, routes,
//! the materializer and post-processing dispatcher) so integration
//! tests and the binary entrypoint can both access them.

pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod handlers;
pub mod materialize;
pub mod response;
pub mod routes;
pub mod state;
pub mod tools;
