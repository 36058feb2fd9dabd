//! Postgres implementations of the storage seams.

pub mod journal;
pub mod postgres;
pub mod queue;

pub use journal::PgStepJournal;
pub use postgres::PgStore;
pub use queue::PgWorkQueue;
