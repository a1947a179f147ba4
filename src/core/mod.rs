pub mod error;
pub mod types;

pub use error::{Result, RoutingError};
pub use types::{BucketType, HelloFeature, ServiceType};
