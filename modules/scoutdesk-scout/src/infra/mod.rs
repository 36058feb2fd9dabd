pub mod ids;
pub mod retry;
pub mod util;
