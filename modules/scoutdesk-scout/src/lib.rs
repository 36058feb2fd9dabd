pub mod clients;
pub mod infra;
pub mod pipeline;
pub mod scheduling;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
pub mod workflows;
