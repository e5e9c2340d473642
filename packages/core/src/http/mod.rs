//! HTTP Admin Surface
//!
//! Axum server mounted under `/api/beehive`. Developers authenticate with
//! HTTP Basic for schema and user administration; end users hold session
//! cookies issued at sign-in. The [`handlers`] module maps the service error
//! taxonomy onto status codes in one place.

pub mod handlers;
mod server;
mod session;


pub use server::{router, run_http_server, AppState};
pub use session::{session_cookie, session_from_headers};
