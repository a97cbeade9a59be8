pub mod auth;
pub mod error;
pub mod http;
pub mod logger;
pub mod model;
pub mod runner;
pub mod script;
pub mod store;
pub mod variable;

// Re-export commonly used types
pub use error::{ResonanceError, Result};
