pub mod timer;

pub use timer::{FrameClock, FrameStats, HighPrecisionTimer, Timer};
