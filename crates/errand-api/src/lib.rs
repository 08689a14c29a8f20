pub mod archive;
pub mod auth;
pub mod channels;
pub mod error;
pub mod errands;
pub mod extract;
pub mod middleware;
pub mod ratings;
pub mod remittance;
pub mod routes;
pub mod runners;
pub mod users;

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;
pub use routes::router;
