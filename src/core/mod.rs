// Domain-layer modules and shared errors/models
pub mod waterfall {
    pub use crate::waterfall::*;
}

pub mod enrichment {
    pub use crate::enrichment::*;
}

pub mod registry {
    pub use crate::registry::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
