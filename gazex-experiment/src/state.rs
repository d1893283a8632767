use crate::config::ParadigmConfig;
use crate::dwell::Dwell;
use crate::error::ExperimentError;
use gazex_core::{FrameInput, GazeTarget, Phase, Trial, TrialList};
use gazex_record::SessionRecorder;
use log::{debug, info};
use std::io::Write;
use std::time::Duration;

const BEGIN_TRAINING: &str = "Beginning training";
const BEGIN_EXPERIMENT: &str = "Beginning experiment (training ended)";
const FIXATION: &str = "fixation dot-ing";
const FREE_LOOKING: &str = "free looking";
const NEXT_ROUND: &str = "Moving to next stimulus round";

#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub enum Instructions {
    /// Shown before the training trials
    Startup,
    /// Shown between the last training trial and the first main trial
    TrainingOver,
}

/// What the presentation surface should do in response to a frame
#[derive(Debug, Clone, PartialEq)]
pub enum SequencerEvent {
    ShowInstructions(Instructions),
    ClearInstructions,
    ShowFixationDot,
    ShowReadyDot,
    CalibrationComplete(GazeTarget),
    DisplayStimuli(Trial),
    PlayMedia(String),
    ClearStimuli,
    ShowEndMessage,
    Terminate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequencerState {
    pub phase: Phase,
    pub trial_index: usize,
    pub fixation: Dwell,
    pub ready: Dwell,
    /// When the current trial's stimuli went up
    pub displayed_at: Option<Duration>,
    /// Start of the post-media hold
    pub hold_since: Option<Duration>,
    pub training_over: bool,
    pub started: bool,
}

impl SequencerState {
    fn new(config: &ParadigmConfig) -> Self {
        Self {
            phase: Phase::Startup,
            trial_index: 0,
            fixation: Dwell::new(config.fixation_dwell()),
            ready: Dwell::new(config.ready_dwell()),
            displayed_at: None,
            hold_since: None,
            training_over: false,
            started: false,
        }
    }

    fn reset_trial(&mut self) {
        self.fixation.reset();
        self.ready.reset();
        self.displayed_at = None;
        self.hold_since = None;
    }
}

/// Drives one session through its trial list, one frame at a time.
///
/// Each [`update`](Self::update) consumes a [`FrameInput`], advances at most
/// one phase, appends exactly one data row to the recorder and returns the
/// presentation effects the surface must apply. Once the sequence reaches
/// [`Phase::Terminal`] further frames are ignored.
#[derive(Debug)]
pub struct Sequencer {
    config: ParadigmConfig,
    trials: TrialList,
    state: SequencerState,
}

impl Sequencer {
    pub fn new(config: ParadigmConfig, trials: TrialList) -> Result<Self, ExperimentError> {
        config.validate()?;
        if config.training_prefix_len > trials.len() {
            return Err(ExperimentError::TrainingPrefix {
                prefix: config.training_prefix_len,
                len: trials.len(),
            });
        }
        if config.has_media_phase {
            if let Some(index) = trials.iter().position(|t| t.media.is_none()) {
                return Err(ExperimentError::MissingMedia { index });
            }
        }
        let state = SequencerState::new(&config);
        Ok(Self {
            config,
            trials,
            state,
        })
    }

    /// Enters the first phase. Called implicitly by the first
    /// [`update`](Self::update); calling it again does nothing.
    pub fn start<W: Write>(
        &mut self,
        now: Duration,
        recorder: &mut SessionRecorder<W>,
    ) -> Vec<SequencerEvent> {
        let mut events = Vec::new();
        if self.state.started {
            return events;
        }
        self.state.started = true;

        if self.trials.is_empty() {
            info!("Trial list is empty, nothing to present");
            self.finish(&mut events);
            return events;
        }

        recorder.set_event(if self.config.label_fixation { FIXATION } else { BEGIN_TRAINING });
        if self.config.has_startup {
            recorder.set_trial_number(0);
            events.push(SequencerEvent::ShowInstructions(Instructions::Startup));
            self.set_phase(Phase::Startup, now);
        } else {
            recorder.set_trial_number(1);
            self.set_phase(Phase::Calibrating(GazeTarget::Fixation), now);
        }
        events.push(SequencerEvent::ShowFixationDot);
        info!(
            "Session started: {} trials ({} training)",
            self.trials.len(),
            self.config.training_prefix_len
        );
        events
    }

    pub fn update<W: Write>(
        &mut self,
        input: &FrameInput,
        recorder: &mut SessionRecorder<W>,
    ) -> Result<Vec<SequencerEvent>, ExperimentError> {
        if self.state.phase.is_terminal() {
            return Ok(Vec::new());
        }
        let mut events = self.start(input.now, recorder);
        if self.state.phase.is_terminal() {
            recorder.flush();
            return Ok(events);
        }

        let now = input.now;
        let on_target = |target: GazeTarget| input.gaze_target().is_some_and(|hit| target.matches(hit));

        match self.state.phase {
            Phase::Startup | Phase::Training => {
                if self.state.fixation.observe(on_target(GazeTarget::Fixation), now) {
                    events.push(SequencerEvent::ClearInstructions);
                    if self.state.phase == Phase::Training {
                        self.state.training_over = true;
                        recorder.set_event(BEGIN_EXPERIMENT);
                    }
                    self.state.fixation.reset();
                    recorder.set_trial_number(self.state.trial_index + 1);
                    self.set_phase(Phase::Calibrating(GazeTarget::Fixation), now);
                }
            }
            Phase::Calibrating(GazeTarget::Fixation) => {
                if self.state.fixation.observe(on_target(GazeTarget::Fixation), now) {
                    events.push(SequencerEvent::CalibrationComplete(GazeTarget::Fixation));
                    self.display_trial(now, recorder, &mut events)?;
                }
            }
            Phase::Displaying => {
                let shown = self.state.displayed_at.unwrap_or(now);
                if now.saturating_sub(shown) >= self.config.pre_ready_hold() {
                    if self.config.has_ready_phase {
                        events.push(SequencerEvent::ShowReadyDot);
                        self.set_phase(Phase::AwaitingReady, now);
                    } else {
                        self.begin_media_or_hold(now, recorder, &mut events)?;
                    }
                }
            }
            Phase::AwaitingReady | Phase::Calibrating(GazeTarget::Ready) => {
                if self.state.ready.observe(on_target(GazeTarget::Ready), now) {
                    events.push(SequencerEvent::CalibrationComplete(GazeTarget::Ready));
                    self.begin_media_or_hold(now, recorder, &mut events)?;
                } else if self.state.ready.is_running() {
                    self.set_phase(Phase::Calibrating(GazeTarget::Ready), now);
                } else {
                    self.set_phase(Phase::AwaitingReady, now);
                }
            }
            Phase::PlayingMedia => {
                if input.media_finished {
                    recorder.set_event(self.config.media_kind.ended_label());
                    self.state.hold_since = Some(now);
                    self.set_phase(Phase::PostMediaHold, now);
                }
            }
            Phase::PostMediaHold => {
                let since = self.state.hold_since.unwrap_or(now);
                if now.saturating_sub(since) >= self.config.post_media_hold() {
                    events.push(SequencerEvent::ClearStimuli);
                    recorder.set_stimuli(None);
                    if !self.config.label_fixation {
                        recorder.set_event(NEXT_ROUND);
                    }
                    self.set_phase(Phase::Advancing, now);
                }
            }
            Phase::Advancing => self.advance(now, recorder, &mut events),
            Phase::Terminal => {}
        }

        recorder.record_frame(now, input.hit_point());
        if self.state.phase.is_terminal() {
            recorder.flush();
        }
        Ok(events)
    }

    fn display_trial<W: Write>(
        &mut self,
        now: Duration,
        recorder: &mut SessionRecorder<W>,
        events: &mut Vec<SequencerEvent>,
    ) -> Result<(), ExperimentError> {
        let index = self.state.trial_index;
        let trial = self
            .trials
            .get(index)
            .ok_or(ExperimentError::OutOfRange {
                index,
                len: self.trials.len(),
            })?
            .clone();

        recorder.set_stimuli(Some(trial.stimulus_names()));
        recorder.set_trial_number(index + 1);
        recorder.set_event(FREE_LOOKING);
        recorder.mark_event(now);
        info!("Trial {}/{}: {}", index + 1, self.trials.len(), trial.stimulus_names());

        self.state.displayed_at = Some(now);
        self.set_phase(Phase::Displaying, now);
        events.push(SequencerEvent::DisplayStimuli(trial));
        Ok(())
    }

    fn begin_media_or_hold<W: Write>(
        &mut self,
        now: Duration,
        recorder: &mut SessionRecorder<W>,
        events: &mut Vec<SequencerEvent>,
    ) -> Result<(), ExperimentError> {
        if !self.config.has_media_phase {
            self.state.hold_since = Some(now);
            self.set_phase(Phase::PostMediaHold, now);
            return Ok(());
        }
        let index = self.state.trial_index;
        let media = self
            .trials
            .get(index)
            .and_then(|t| t.media.clone())
            .ok_or(ExperimentError::MissingMedia { index })?;
        recorder.set_event(self.config.media_kind.started_label());
        self.set_phase(Phase::PlayingMedia, now);
        events.push(SequencerEvent::PlayMedia(media));
        Ok(())
    }

    fn advance<W: Write>(
        &mut self,
        now: Duration,
        recorder: &mut SessionRecorder<W>,
        events: &mut Vec<SequencerEvent>,
    ) {
        self.state.trial_index += 1;
        self.state.reset_trial();
        let index = self.state.trial_index;
        recorder.set_trial_number(index + 1);

        if index >= self.trials.len() {
            self.finish(events);
        } else if index == self.config.training_prefix_len && index > 0 && !self.state.training_over {
            info!("Training complete after {index} trials");
            events.push(SequencerEvent::ShowInstructions(Instructions::TrainingOver));
            events.push(SequencerEvent::ShowFixationDot);
            self.set_phase(Phase::Training, now);
        } else {
            if self.config.label_fixation {
                recorder.set_event(FIXATION);
            }
            events.push(SequencerEvent::ShowFixationDot);
            self.set_phase(Phase::Calibrating(GazeTarget::Fixation), now);
        }
    }

    fn finish(&mut self, events: &mut Vec<SequencerEvent>) {
        events.push(SequencerEvent::ShowEndMessage);
        events.push(SequencerEvent::Terminate);
        self.state.phase = Phase::Terminal;
        info!("Session complete after {} trials", self.trials.len());
    }

    fn set_phase(&mut self, phase: Phase, now: Duration) {
        if self.state.phase != phase {
            debug!(
                "{:?} -> {:?} at {:.3}s (trial {})",
                self.state.phase,
                phase,
                now.as_secs_f64(),
                self.state.trial_index + 1
            );
            self.state.phase = phase;
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn trial_index(&self) -> usize {
        self.state.trial_index
    }

    pub fn current_trial(&self) -> Option<&Trial> {
        self.trials.get(self.state.trial_index)
    }

    /// `(trials finished, total trials)`
    pub fn progress(&self) -> (usize, usize) {
        (self.state.trial_index.min(self.trials.len()), self.trials.len())
    }

    pub fn is_finished(&self) -> bool {
        self.state.phase.is_terminal()
    }

    pub fn state(&self) -> &SequencerState {
        &self.state
    }

    pub fn config(&self) -> &ParadigmConfig {
        &self.config
    }

    pub fn trials(&self) -> &TrialList {
        &self.trials
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Paradigm;
    use gazex_core::Vec3;
    use gazex_record::RowLayout;
    use pretty_assertions::assert_eq;

    fn recorder() -> SessionRecorder<Vec<u8>> {
        SessionRecorder::with_sink(Vec::new(), RowLayout::new(&["stimuli"], ",,,", true), 1000)
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn trials(n: usize, media: bool, training: usize) -> TrialList {
        let trials = (0..n)
            .map(|i| {
                let slots = ["a", "b", "c", "d"].iter().map(|s| format!("{s}{i}")).collect();
                let trial = Trial::new(i + 1, slots);
                if media { trial.with_media(format!("clip{i}")) } else { trial }
            })
            .collect();
        TrialList::new(trials, training)
    }

    fn fixation(at: u64) -> FrameInput {
        FrameInput::at(ms(at)).looking_at("FixationDot", Some(Vec3::new(0.0, 0.0, 10.0)))
    }

    fn ready(at: u64) -> FrameInput {
        FrameInput::at(ms(at)).looking_at("ReadyDot", Some(Vec3::new(0.0, -3.0, 10.0)))
    }

    #[test]
    fn corner_trial_runs_fixation_display_hold() {
        let config = Paradigm::Corner.sequencer();
        let mut seq = Sequencer::new(config, trials(2, false, 0)).unwrap();
        let mut rec = recorder();

        let events = seq.update(&fixation(0), &mut rec).unwrap();
        assert_eq!(events, [SequencerEvent::ShowFixationDot]);
        assert_eq!(seq.phase(), Phase::Calibrating(GazeTarget::Fixation));

        assert!(seq.update(&fixation(999), &mut rec).unwrap().is_empty());
        let events = seq.update(&fixation(1000), &mut rec).unwrap();
        assert_eq!(events[0], SequencerEvent::CalibrationComplete(GazeTarget::Fixation));
        assert!(matches!(&events[1], SequencerEvent::DisplayStimuli(t) if t.source_row == 1));
        assert_eq!(seq.phase(), Phase::Displaying);
        assert_eq!(rec.context().event, "free looking");
        assert_eq!(rec.context().trial_number, 1);

        seq.update(&FrameInput::at(ms(3999)), &mut rec).unwrap();
        assert_eq!(seq.phase(), Phase::Displaying);
        seq.update(&FrameInput::at(ms(4000)), &mut rec).unwrap();
        assert_eq!(seq.phase(), Phase::PostMediaHold);

        seq.update(&FrameInput::at(ms(5999)), &mut rec).unwrap();
        let events = seq.update(&FrameInput::at(ms(6000)), &mut rec).unwrap();
        assert_eq!(events, [SequencerEvent::ClearStimuli]);
        assert_eq!(seq.phase(), Phase::Advancing);
        assert_eq!(rec.context().stimuli, None);

        let events = seq.update(&FrameInput::at(ms(6016)), &mut rec).unwrap();
        assert_eq!(events, [SequencerEvent::ShowFixationDot]);
        assert_eq!(seq.trial_index(), 1);
        assert_eq!(rec.context().trial_number, 2);
    }

    #[test]
    fn looking_away_restarts_fixation() {
        let mut seq = Sequencer::new(Paradigm::Corner.sequencer(), trials(1, false, 0)).unwrap();
        let mut rec = recorder();
        seq.update(&fixation(0), &mut rec).unwrap();
        seq.update(&fixation(900), &mut rec).unwrap();
        seq.update(&FrameInput::at(ms(950)).looking_at("backgroundPlane", None), &mut rec)
            .unwrap();
        seq.update(&fixation(1000), &mut rec).unwrap();
        seq.update(&fixation(1500), &mut rec).unwrap();
        assert_eq!(seq.phase(), Phase::Calibrating(GazeTarget::Fixation));
        seq.update(&fixation(2000), &mut rec).unwrap();
        assert_eq!(seq.phase(), Phase::Displaying);
    }

    #[test]
    fn visual_word_runs_startup_ready_and_media() {
        let mut seq = Sequencer::new(Paradigm::VisualWord.sequencer(), trials(3, true, 2)).unwrap();
        let mut rec = recorder();

        let events = seq.start(Duration::ZERO, &mut rec);
        assert_eq!(
            events,
            [
                SequencerEvent::ShowInstructions(Instructions::Startup),
                SequencerEvent::ShowFixationDot
            ]
        );
        assert_eq!(rec.context().trial_number, 0);
        assert_eq!(rec.context().event, "Beginning training");

        seq.update(&fixation(0), &mut rec).unwrap();
        let events = seq.update(&fixation(1000), &mut rec).unwrap();
        assert_eq!(events, [SequencerEvent::ClearInstructions]);
        assert_eq!(seq.phase(), Phase::Calibrating(GazeTarget::Fixation));

        seq.update(&fixation(1100), &mut rec).unwrap();
        seq.update(&fixation(2100), &mut rec).unwrap();
        assert_eq!(seq.phase(), Phase::Displaying);

        let events = seq.update(&FrameInput::at(ms(5100)), &mut rec).unwrap();
        assert_eq!(events, [SequencerEvent::ShowReadyDot]);
        assert_eq!(seq.phase(), Phase::AwaitingReady);

        seq.update(&ready(5200), &mut rec).unwrap();
        assert_eq!(seq.phase(), Phase::Calibrating(GazeTarget::Ready));
        seq.update(&FrameInput::at(ms(5300)), &mut rec).unwrap();
        assert_eq!(seq.phase(), Phase::AwaitingReady);
        seq.update(&ready(5400), &mut rec).unwrap();
        let events = seq.update(&ready(6400), &mut rec).unwrap();
        assert_eq!(
            events,
            [
                SequencerEvent::CalibrationComplete(GazeTarget::Ready),
                SequencerEvent::PlayMedia("clip0".into())
            ]
        );
        assert_eq!(rec.context().event, "audio started");

        seq.update(&FrameInput::at(ms(9000)), &mut rec).unwrap();
        assert_eq!(seq.phase(), Phase::PlayingMedia);
        seq.update(&FrameInput::at(ms(9100)).with_media_finished(), &mut rec)
            .unwrap();
        assert_eq!(seq.phase(), Phase::PostMediaHold);
        assert_eq!(rec.context().event, "audio ended");
        seq.update(&FrameInput::at(ms(11100)), &mut rec).unwrap();
        assert_eq!(seq.phase(), Phase::Advancing);
    }

    #[test]
    fn training_over_interstitial_appears_once() {
        let config = ParadigmConfig {
            fixation_dwell_s: 0.0,
            pre_ready_hold_s: 0.0,
            post_media_hold_s: 0.0,
            has_ready_phase: false,
            has_media_phase: false,
            has_startup: false,
            training_prefix_len: 1,
            ..ParadigmConfig::default()
        };
        let mut seq = Sequencer::new(config, trials(3, false, 1)).unwrap();
        let mut rec = recorder();

        let mut interstitials = 0;
        let mut t = 0;
        while !seq.is_finished() && t < 10_000 {
            let events = seq.update(&fixation(t), &mut rec).unwrap();
            interstitials += events
                .iter()
                .filter(|e| **e == SequencerEvent::ShowInstructions(Instructions::TrainingOver))
                .count();
            if seq.phase() == Phase::Training {
                assert_eq!(seq.trial_index(), 1);
            }
            t += 16;
        }
        assert!(seq.is_finished());
        assert_eq!(interstitials, 1);
        assert!(seq.state().training_over);
    }

    #[test]
    fn terminal_ignores_frames_and_flushes() {
        let config = ParadigmConfig {
            fixation_dwell_s: 0.0,
            pre_ready_hold_s: 0.0,
            post_media_hold_s: 0.0,
            ..Paradigm::Corner.sequencer()
        };
        let mut seq = Sequencer::new(config, trials(1, false, 0)).unwrap();
        let mut rec = recorder();
        let mut last = Vec::new();
        for t in 0..5 {
            last = seq.update(&fixation(t * 16), &mut rec).unwrap();
        }
        assert!(seq.is_finished());
        assert_eq!(last, [SequencerEvent::ShowEndMessage, SequencerEvent::Terminate]);
        assert_eq!(rec.pending(), 0);

        let rows = rec.stats().rows;
        assert!(seq.update(&fixation(500), &mut rec).unwrap().is_empty());
        assert_eq!(rec.stats().rows, rows);
        assert_eq!(seq.progress(), (1, 1));
    }

    #[test]
    fn every_frame_writes_one_row() {
        let mut seq = Sequencer::new(Paradigm::Corner.sequencer(), trials(1, false, 0)).unwrap();
        let mut rec = recorder();
        for t in 0..10 {
            seq.update(&FrameInput::at(ms(t * 16)), &mut rec).unwrap();
        }
        assert_eq!(rec.stats().rows, 10);
    }

    #[test]
    fn empty_list_terminates_immediately() {
        let mut seq = Sequencer::new(Paradigm::Corner.sequencer(), TrialList::default()).unwrap();
        let mut rec = recorder();
        let events = seq.update(&FrameInput::at(Duration::ZERO), &mut rec).unwrap();
        assert_eq!(events, [SequencerEvent::ShowEndMessage, SequencerEvent::Terminate]);
        assert!(seq.is_finished());
    }

    #[test]
    fn media_paradigm_requires_media_on_every_trial() {
        let err = Sequencer::new(Paradigm::VideoCorner.sequencer(), trials(2, false, 0)).unwrap_err();
        assert!(matches!(err, ExperimentError::MissingMedia { index: 0 }));

        let err = Sequencer::new(Paradigm::VisualWord.sequencer(), trials(1, true, 0)).unwrap_err();
        assert!(matches!(err, ExperimentError::TrainingPrefix { prefix: 2, len: 1 }));
    }
}
