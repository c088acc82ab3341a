pub mod timestamp;

pub use timestamp::{epoch_millis, Clock, SystemClock};
