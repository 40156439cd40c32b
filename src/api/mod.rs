mod error;
mod handlers;
mod mcp;
mod router;
mod state;

pub use error::{ApiError, ErrorBody};
pub use router::build_router;
pub use state::AppState;
