pub mod client;
pub mod error;
pub mod http;
pub mod in_memory;

pub use client::{JobStatusRules, PlatformClient, ProvisionRequest};
pub use error::{PlatformError, Result};
pub use http::HttpPlatformClient;
pub use in_memory::{InMemoryPlatform, PlatformJob};
