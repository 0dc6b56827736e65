//! REST API boundary
//!
//! Thin orchestration over the settings store, record generator and
//! verification engine; the consuming UI/CRUD layer lives elsewhere.

pub mod handlers;
pub mod server;

pub use server::ApiServer;
