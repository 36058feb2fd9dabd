pub mod dispatcher;
pub mod next_run;
pub mod scheduler;

pub use dispatcher::{Dispatcher, StartedRun};
pub use next_run::{compute_next_run, recompute_on_config_change};
pub use scheduler::{Scheduler, TickReport};
