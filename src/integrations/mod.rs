//! External service integrations.

pub mod services {
    pub use crate::services::*;
}

pub mod provider_client {
    pub use crate::provider_client::*;
}
