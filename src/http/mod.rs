pub mod client;
pub mod request;
pub mod response;
pub mod types;

// Re-export commonly used types for convenient access
pub use client::{HttpTransport, Transport};
pub use request::DispatchRequest;
pub use response::{DispatchResponse, TransportError};
pub use types::{Headers, Method, header_value, set_header};
