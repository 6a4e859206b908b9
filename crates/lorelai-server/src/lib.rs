//! HTTP surface of Lorelai: integration panels, revoke endpoints and the
//! indexing history API.

pub mod errors;
pub mod handlers;
pub mod router;
pub mod security;
pub mod state;
pub mod views;

pub use router::router;
pub use state::AppState;
