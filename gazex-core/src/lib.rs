pub mod phase;
pub mod stimulus;
pub mod trial;

pub use phase::{GazeTarget, Phase};
pub use stimulus::{FrameInput, GazeHit, Vec3};
pub use trial::{MetaValue, Trial, TrialList};
