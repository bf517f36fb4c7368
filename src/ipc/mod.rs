mod error;
mod handlers;
mod router;
mod types;

pub use router::{handle_request, handle_tick};
pub use types::{AppState, Request};
