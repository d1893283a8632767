use crate::surface::PresentationSurface;
use anyhow::{Context, Result};
use gazex_core::TrialList;
use gazex_experiment::{Sequencer, SequencerEvent, SessionConfig};
use gazex_record::{RecorderStats, SessionRecorder};
use gazex_timing::{FrameClock, FrameStats, HighPrecisionTimer, Timer};
use log::{debug, info, warn};
use serde_json::json;
use std::fs::{self, File};
use std::io::{BufWriter, Write};

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub fps: u32,
    /// Pace frames against the wall clock instead of simulated time
    pub realtime: bool,
    pub seed: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSummary {
    pub finished: bool,
    pub frames: u64,
    pub trials_completed: usize,
    pub trials_total: usize,
    pub recorder: RecorderStats,
    pub frame_stats: FrameStats,
}

/// Owns one session: the sequencer, its recorder and the surface it drives.
pub struct App<S: PresentationSurface, W: Write = BufWriter<File>> {
    config: SessionConfig,
    sequencer: Sequencer,
    recorder: SessionRecorder<W>,
    surface: S,
    options: RunOptions,
}

impl<S: PresentationSurface> App<S> {
    /// Opens the session file under the configured output directory. An
    /// unavailable output degrades the recorder; the session still runs.
    pub fn new(config: SessionConfig, trials: TrialList, surface: S, options: RunOptions) -> Result<Self> {
        let sequencer = session_sequencer(&config, trials)?;
        let recorder = SessionRecorder::create(
            &config.recorder.output_dir,
            &config.recorder.file_prefix,
            config.layout(),
            config.recorder.flush_threshold,
        );
        Ok(Self {
            config,
            sequencer,
            recorder,
            surface,
            options,
        })
    }
}

impl<S: PresentationSurface, W: Write> App<S, W> {
    pub fn with_recorder(
        config: SessionConfig,
        trials: TrialList,
        surface: S,
        recorder: SessionRecorder<W>,
        options: RunOptions,
    ) -> Result<Self> {
        let sequencer = session_sequencer(&config, trials)?;
        Ok(Self {
            config,
            sequencer,
            recorder,
            surface,
            options,
        })
    }

    /// Runs frames until the sequence terminates or the gaze stream ends.
    /// The recorder is closed on every path out of here.
    pub fn run(self) -> Result<SessionSummary> {
        if self.options.realtime {
            self.run_with(HighPrecisionTimer::new())
        } else {
            self.run_with(FrameClock::new())
        }
    }

    fn run_with<T: Timer>(mut self, mut timer: T) -> Result<SessionSummary> {
        info!(
            "=== {} session, {} trials at {} fps ({}) ===",
            self.config.paradigm,
            self.sequencer.trials().len(),
            self.options.fps,
            if self.options.realtime { "realtime" } else { "simulated" }
        );
        let result = self.drive(&mut timer);
        self.recorder.close();

        let frame_stats = timer.frame_stats();
        info!(
            "Frames: {}, {:.3} ms/frame, {:.1} Hz, jitter {:.3} ms",
            frame_stats.frames,
            frame_stats.average_frame_time_ns / 1_000_000.0,
            frame_stats.effective_fps,
            frame_stats.jitter_ns / 1_000_000.0,
        );

        let (trials_completed, trials_total) = self.sequencer.progress();
        let summary = SessionSummary {
            finished: self.sequencer.is_finished(),
            frames: timer.frame_count(),
            trials_completed,
            trials_total,
            recorder: self.recorder.stats(),
            frame_stats,
        };
        result?;
        self.write_manifest(&summary);
        Ok(summary)
    }

    fn drive<T: Timer>(&mut self, timer: &mut T) -> Result<()> {
        let period = FrameClock::period(self.options.fps);

        self.recorder.begin(&self.config.reference_points(), timer.now());
        let events = self.sequencer.start(timer.now(), &mut self.recorder);
        self.present(&events);

        while !self.sequencer.is_finished() {
            let now = timer.now();
            let Some(input) = self.surface.next_frame(now) else {
                let (done, total) = self.sequencer.progress();
                warn!("Gaze stream ended after {done}/{total} trials; stopping early");
                break;
            };
            let events = self.sequencer.update(&input, &mut self.recorder)?;
            self.present(&events);
            let spent = timer.elapsed(now);
            if spent > period {
                debug!("Frame at {:.3}s overran: {:.3} ms", now.as_secs_f64(), spent.as_secs_f64() * 1e3);
            }
            timer.wait_frame(period);
        }
        Ok(())
    }

    fn present(&mut self, events: &[SequencerEvent]) {
        for event in events {
            self.surface.present(event);
        }
    }

    /// Writes `<session>.json` beside the data file so a run can be repeated.
    fn write_manifest(&self, summary: &SessionSummary) {
        let Some(path) = self.recorder.path() else {
            return;
        };
        let manifest = json!({
            "paradigm": self.config.paradigm,
            "sequencer": self.config.sequencer,
            "recorder": self.config.recorder,
            "trials": self.config.trials,
            "seed": self.options.seed,
            "fps": self.options.fps,
            "finished": summary.finished,
            "trials_completed": summary.trials_completed,
            "frames": summary.frames,
            "rows": summary.recorder.rows,
            "lines_written": summary.recorder.lines_written,
            "lines_discarded": summary.recorder.lines_discarded,
        });
        let path = path.with_extension("json");
        let written = serde_json::to_string_pretty(&manifest)
            .map_err(anyhow::Error::from)
            .and_then(|text| fs::write(&path, text).map_err(anyhow::Error::from));
        match written {
            Ok(()) => info!("Session manifest written to {}", path.display()),
            Err(e) => warn!("Could not write session manifest {}: {e}", path.display()),
        }
    }
}

fn session_sequencer(config: &SessionConfig, trials: TrialList) -> Result<Sequencer> {
    Sequencer::new(config.sequencer.clone(), trials)
        .with_context(|| format!("setting up the {} session", config.paradigm))
}
