pub mod error;
pub mod files;
pub mod middleware;
pub mod routes;

// Re-export public types and functions
pub use error::ApiError;
pub use files::{serve_frame, serve_upload};
pub use middleware::log_request_errors;
pub use routes::{create_message, extract_frames};
