pub mod api;
pub mod auth;
pub mod event;
pub mod pagination;

pub use api::{ApiErrorDetail, ApiErrorResponse, ApiResponse, HealthResponse, HealthStatus};
pub use auth::{AuthUser, Claims};
pub use event::Event;
pub use pagination::{Paginated, PaginationParams};
