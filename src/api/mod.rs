//! HTTP surface over the engine: a thin axum layer that maps requests onto
//! registry operations and engine errors onto structured responses.

pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;

pub use handlers::ApiState;
pub use routes::create_router;
