use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use std::time::Duration;

/// A point in scene space, in the engine's world units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

/// Formats as the three comma separated components used in data files.
impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.x, self.y, self.z)
    }
}

/// The object a gaze ray landed on this frame.
///
/// `point` is `None` when the surface reported a hit but could not resolve
/// where on the object it landed.
#[derive(Debug, Clone, PartialEq)]
pub struct GazeHit {
    pub target: String,
    pub point: Option<Vec3>,
}

impl GazeHit {
    pub fn new(target: impl Into<String>, point: Option<Vec3>) -> Self {
        Self {
            target: target.into(),
            point,
        }
    }
}

/// Everything the presentation surface reports for one rendered frame
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameInput {
    /// Time since the session started
    pub now: Duration,
    /// `None` on raycast misses
    pub gaze: Option<GazeHit>,
    /// Set once the clip started by the last `PlayMedia` has stopped playing
    pub media_finished: bool,
}

impl FrameInput {
    pub fn at(now: Duration) -> Self {
        Self {
            now,
            ..Self::default()
        }
    }

    pub fn looking_at(mut self, target: impl Into<String>, point: Option<Vec3>) -> Self {
        self.gaze = Some(GazeHit::new(target, point));
        self
    }

    pub fn with_media_finished(mut self) -> Self {
        self.media_finished = true;
        self
    }

    pub fn gaze_target(&self) -> Option<&str> {
        self.gaze.as_ref().map(|hit| hit.target.as_str())
    }

    pub fn hit_point(&self) -> Option<Vec3> {
        self.gaze.as_ref().and_then(|hit| hit.point)
    }
}
