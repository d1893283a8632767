use serde::{Deserialize, Serialize};

/// Scene objects the subject is asked to look at before the sequence moves on
#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GazeTarget {
    Fixation,
    Ready,
}

impl GazeTarget {
    /// Name of the scene object carrying this target. Gaze hits are matched
    /// by prefix, so `FixationDot (1)` still counts as the fixation dot.
    pub fn object_name(&self) -> &'static str {
        match self {
            GazeTarget::Fixation => "FixationDot",
            GazeTarget::Ready => "ReadyDot",
        }
    }

    pub fn matches(&self, hit_name: &str) -> bool {
        hit_name.starts_with(self.object_name())
    }
}

/// Experiment phases a session moves through
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Startup,
    Training,
    Calibrating(GazeTarget),
    Displaying,
    AwaitingReady,
    PlayingMedia,
    PostMediaHold,
    Advancing,
    Terminal,
}

impl Phase {
    /// The object whose dwell decides when this phase ends, if any.
    pub fn gaze_target(&self) -> Option<GazeTarget> {
        match self {
            Phase::Startup | Phase::Training => Some(GazeTarget::Fixation),
            Phase::Calibrating(target) => Some(*target),
            Phase::AwaitingReady => Some(GazeTarget::Ready),
            _ => None,
        }
    }

    pub fn shows_stimuli(&self) -> bool {
        matches!(
            self,
            Phase::Displaying
                | Phase::AwaitingReady
                | Phase::Calibrating(GazeTarget::Ready)
                | Phase::PlayingMedia
                | Phase::PostMediaHold
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Terminal)
    }
}
