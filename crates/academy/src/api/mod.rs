//! HTTP API module.
//!
//! REST endpoints for authentication, the teacher registry and the payroll ledger.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse, InternalErrorDetail};
pub use routes::create_router;
pub use state::AppState;
