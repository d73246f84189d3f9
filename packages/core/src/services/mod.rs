pub mod aladhan;
pub mod error;
#[cfg(test)]
pub mod mock_aladhan;
pub mod provider;

pub use aladhan::AladhanClient;
pub use error::{ApiError, ApiResult};
pub use provider::CalendarApi;
