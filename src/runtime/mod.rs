pub mod progress;
pub mod random;
pub mod resource;
pub mod scheduler;

pub use progress::{ConsoleProgress, ProgressSink, SilentProgress};
pub use random::ith_random_double;
pub use resource::{
    DEFAULT_BUFFER_SIZE, MAX_PREFERRED_BUFFER_SIZE, MIB, MIN_FRAGMENT_SIZE,
    MIN_PREFERRED_BUFFER_SIZE, PREFERRED_BUFFER_SIZE, parse_size,
};
pub use scheduler::{TaskRange, plan_ranges, run_ordered};
