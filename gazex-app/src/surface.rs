use anyhow::{Context, Result, bail};
use gazex_core::{FrameInput, GazeTarget, Vec3};
use gazex_experiment::SequencerEvent;
use log::{debug, info};
use rand::Rng;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

const BACKGROUND: &str = "backgroundPlane";
const INSTRUCTIONS: &str = "Instructions";
const END_MESSAGE: &str = "EndMessage";

/// The engine side of a session: produces one gaze sample per frame and
/// applies the sequencer's presentation effects.
pub trait PresentationSurface {
    /// `None` once the gaze stream has ended.
    fn next_frame(&mut self, now: Duration) -> Option<FrameInput>;
    fn present(&mut self, event: &SequencerEvent);
}

#[derive(Debug, Clone)]
struct Playback {
    name: String,
    started: Option<Duration>,
}

/// Objects currently in the scene plus the clip being played
#[derive(Debug, Clone)]
pub struct Scene {
    objects: BTreeSet<String>,
    stimuli: Vec<String>,
    playback: Option<Playback>,
    media_length: Duration,
}

impl Scene {
    pub fn new(media_length: Duration) -> Self {
        Self {
            objects: BTreeSet::from([BACKGROUND.to_owned()]),
            stimuli: Vec::new(),
            playback: None,
            media_length,
        }
    }

    /// Dots match by prefix, everything else by exact name.
    pub fn contains(&self, object: &str) -> bool {
        self.objects.contains(object)
            || [GazeTarget::Fixation, GazeTarget::Ready]
                .into_iter()
                .any(|target| target.matches(object) && self.shows(target))
    }

    pub fn shows(&self, target: GazeTarget) -> bool {
        self.objects.contains(target.object_name())
    }

    pub fn stimuli(&self) -> &[String] {
        &self.stimuli
    }

    pub fn apply(&mut self, event: &SequencerEvent) {
        match event {
            SequencerEvent::ShowInstructions(which) => {
                debug!("Showing {which:?} instructions");
                self.objects.insert(INSTRUCTIONS.to_owned());
            }
            SequencerEvent::ClearInstructions => {
                self.objects.remove(INSTRUCTIONS);
            }
            SequencerEvent::ShowFixationDot => {
                self.objects.insert(GazeTarget::Fixation.object_name().to_owned());
            }
            SequencerEvent::ShowReadyDot => {
                self.objects.insert(GazeTarget::Ready.object_name().to_owned());
            }
            SequencerEvent::CalibrationComplete(target) => {
                self.objects.remove(target.object_name());
            }
            SequencerEvent::DisplayStimuli(trial) => {
                self.stimuli = trial.slots.clone();
                self.objects.extend(trial.slots.iter().cloned());
            }
            SequencerEvent::PlayMedia(name) => {
                debug!("Playing {name}");
                self.playback = Some(Playback {
                    name: name.clone(),
                    started: None,
                });
            }
            SequencerEvent::ClearStimuli => {
                for name in self.stimuli.drain(..) {
                    self.objects.remove(&name);
                }
                self.objects.remove(GazeTarget::Ready.object_name());
                self.playback = None;
            }
            SequencerEvent::ShowEndMessage => {
                self.objects.insert(END_MESSAGE.to_owned());
            }
            SequencerEvent::Terminate => info!("Surface received terminate"),
        }
    }

    /// Advances playback; true on the frame the clip stops.
    fn media_finished(&mut self, now: Duration) -> bool {
        let Some(playback) = self.playback.as_mut() else {
            return false;
        };
        let started = *playback.started.get_or_insert(now);
        if now.saturating_sub(started) >= self.media_length {
            debug!("{} finished", playback.name);
            self.playback = None;
            return true;
        }
        false
    }
}

/// One line of a recorded gaze trace
#[derive(Debug, Clone, PartialEq)]
pub struct TraceSample {
    pub time: Duration,
    /// `None` for raycast misses
    pub target: Option<String>,
    pub point: Option<Vec3>,
}

/// Replays a gaze trace recorded as `time,target,x,y,z` lines.
///
/// Each frame uses the latest sample at or before the frame time. Hits on
/// objects that are not in the scene at that moment count as misses.
pub struct ReplaySurface {
    samples: Vec<TraceSample>,
    cursor: usize,
    scene: Scene,
}

impl ReplaySurface {
    pub fn new(samples: Vec<TraceSample>, media_length: Duration) -> Self {
        Self {
            samples,
            cursor: 0,
            scene: Scene::new(media_length),
        }
    }

    pub fn load(path: &Path, media_length: Duration) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading gaze trace {}", path.display()))?;
        let samples = parse_trace(&text).with_context(|| format!("parsing gaze trace {}", path.display()))?;
        info!("Loaded {} gaze samples from {}", samples.len(), path.display());
        Ok(Self::new(samples, media_length))
    }
}

impl PresentationSurface for ReplaySurface {
    fn next_frame(&mut self, now: Duration) -> Option<FrameInput> {
        let last = self.samples.last()?;
        if now > last.time {
            return None;
        }
        while self
            .samples
            .get(self.cursor + 1)
            .is_some_and(|next| next.time <= now)
        {
            self.cursor += 1;
        }

        let mut input = FrameInput::at(now);
        let sample = &self.samples[self.cursor];
        if sample.time <= now {
            if let Some(target) = &sample.target {
                if self.scene.contains(target) {
                    input = input.looking_at(target.clone(), sample.point);
                }
            }
        }
        if self.scene.media_finished(now) {
            input = input.with_media_finished();
        }
        Some(input)
    }

    fn present(&mut self, event: &SequencerEvent) {
        self.scene.apply(event);
    }
}

pub fn parse_trace(text: &str) -> Result<Vec<TraceSample>> {
    let mut samples = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || (index == 0 && line.starts_with("time")) {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 5 {
            bail!("line {}: expected 5 fields, found {}", index + 1, fields.len());
        }
        let seconds: f64 = fields[0]
            .parse()
            .with_context(|| format!("line {}: bad time {:?}", index + 1, fields[0]))?;
        let time = Duration::try_from_secs_f64(seconds)
            .with_context(|| format!("line {}: time out of range", index + 1))?;
        if samples.last().is_some_and(|prev: &TraceSample| prev.time > time) {
            bail!("line {}: samples must be in time order", index + 1);
        }

        let target = match fields[1] {
            "" | "None" => None,
            name => Some(name.to_owned()),
        };
        let coords: Option<Vec<f32>> = fields[2..].iter().map(|v| v.parse().ok()).collect();
        let point = coords.map(|c| Vec3::new(c[0], c[1], c[2]));
        samples.push(TraceSample {
            time,
            target,
            point,
        });
    }
    Ok(samples)
}

/// A simulated subject who follows instructions: looks at whichever dot is
/// up, otherwise at the first stimulus, and glances away at `lapse_rate`.
pub struct AttentiveSurface<R: Rng> {
    scene: Scene,
    rng: R,
    lapse_rate: f64,
    stimulus_points: Vec<Vec3>,
}

impl<R: Rng> AttentiveSurface<R> {
    /// `stimulus_points` are where the displayed stimuli sit, in slot order.
    pub fn new(rng: R, media_length: Duration, stimulus_points: Vec<Vec3>) -> Self {
        Self {
            scene: Scene::new(media_length),
            rng,
            lapse_rate: 0.0,
            stimulus_points,
        }
    }

    pub fn lapse_rate(mut self, rate: f64) -> Self {
        self.lapse_rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        self
    }

    fn gaze(&mut self) -> (String, Option<Vec3>) {
        if self.rng.random_bool(self.lapse_rate) {
            return (BACKGROUND.to_owned(), Some(Vec3::new(0.0, 0.0, 20.0)));
        }
        for (target, point) in [
            (GazeTarget::Fixation, Vec3::new(0.0, 0.0, 10.0)),
            (GazeTarget::Ready, Vec3::new(0.0, -3.0, 10.0)),
        ] {
            if self.scene.shows(target) {
                return (target.object_name().to_owned(), Some(point));
            }
        }
        match self.scene.stimuli().first() {
            Some(name) => (name.clone(), self.stimulus_points.first().copied()),
            None => (BACKGROUND.to_owned(), Some(Vec3::new(0.0, 0.0, 20.0))),
        }
    }
}

impl<R: Rng> PresentationSurface for AttentiveSurface<R> {
    fn next_frame(&mut self, now: Duration) -> Option<FrameInput> {
        let (target, point) = self.gaze();
        let mut input = FrameInput::at(now).looking_at(target, point);
        if self.scene.media_finished(now) {
            input = input.with_media_finished();
        }
        Some(input)
    }

    fn present(&mut self, event: &SequencerEvent) {
        self.scene.apply(event);
    }
}
