pub mod auth_extractor;
pub mod tracing_layer;

pub use auth_extractor::validate_token;
pub use tracing_layer::init_tracing;
