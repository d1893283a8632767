use crate::builder::{TrialListBuilder, TrialSchema};
use crate::error::ExperimentError;
use crate::shuffle::ShuffleMode;
use gazex_core::Vec3;
use gazex_record::RowLayout;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Copy, Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Audio,
    Video,
}

impl MediaKind {
    pub fn started_label(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio started",
            MediaKind::Video => "video started",
        }
    }

    pub fn ended_label(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio ended",
            MediaKind::Video => "video ended",
        }
    }
}

/// Timing and capabilities of one paradigm's trial sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParadigmConfig {
    pub fixation_dwell_s: f64,
    pub ready_dwell_s: f64,
    /// How long stimuli stay up before the ready dot (or media) follows
    pub pre_ready_hold_s: f64,
    /// How long stimuli stay up after media ends, or after the pre-ready
    /// hold when there is no media
    pub post_media_hold_s: f64,
    pub has_ready_phase: bool,
    pub has_media_phase: bool,
    pub training_prefix_len: usize,
    pub has_startup: bool,
    pub media_kind: MediaKind,
    /// Label every fixation phase `fixation dot-ing` instead of carrying
    /// the previous event label over
    #[serde(default)]
    pub label_fixation: bool,
}

impl ParadigmConfig {
    pub fn fixation_dwell(&self) -> Duration {
        secs(self.fixation_dwell_s)
    }

    pub fn ready_dwell(&self) -> Duration {
        secs(self.ready_dwell_s)
    }

    pub fn pre_ready_hold(&self) -> Duration {
        secs(self.pre_ready_hold_s)
    }

    pub fn post_media_hold(&self) -> Duration {
        secs(self.post_media_hold_s)
    }

    pub fn validate(&self) -> Result<(), ExperimentError> {
        for (field, value) in [
            ("fixation_dwell_s", self.fixation_dwell_s),
            ("ready_dwell_s", self.ready_dwell_s),
            ("pre_ready_hold_s", self.pre_ready_hold_s),
            ("post_media_hold_s", self.post_media_hold_s),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ExperimentError::InvalidSetting {
                    field,
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn secs(s: f64) -> Duration {
    Duration::try_from_secs_f64(s).unwrap_or(Duration::ZERO)
}

impl Default for ParadigmConfig {
    fn default() -> Self {
        Paradigm::VisualWord.sequencer()
    }
}

/// The four scenes of the eye-tracking study
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Paradigm {
    Corner,
    Theatre,
    VideoCorner,
    #[default]
    VisualWord,
}

impl Paradigm {
    pub const ALL: [Paradigm; 4] = [
        Paradigm::Corner,
        Paradigm::Theatre,
        Paradigm::VideoCorner,
        Paradigm::VisualWord,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Paradigm::Corner => "corner",
            Paradigm::Theatre => "theatre",
            Paradigm::VideoCorner => "video-corner",
            Paradigm::VisualWord => "visual-word",
        }
    }

    pub fn sequencer(&self) -> ParadigmConfig {
        let visual_word = ParadigmConfig {
            fixation_dwell_s: 1.0,
            ready_dwell_s: 1.0,
            pre_ready_hold_s: 3.0,
            post_media_hold_s: 2.0,
            has_ready_phase: true,
            has_media_phase: true,
            training_prefix_len: 2,
            has_startup: true,
            media_kind: MediaKind::Audio,
            label_fixation: false,
        };
        match self {
            Paradigm::Corner => ParadigmConfig {
                has_ready_phase: false,
                has_media_phase: false,
                training_prefix_len: 0,
                has_startup: false,
                ..visual_word
            },
            Paradigm::Theatre => ParadigmConfig {
                pre_ready_hold_s: 10.0,
                post_media_hold_s: 0.0,
                has_ready_phase: false,
                has_media_phase: false,
                training_prefix_len: 0,
                has_startup: false,
                label_fixation: true,
                ..visual_word
            },
            Paradigm::VideoCorner => ParadigmConfig {
                post_media_hold_s: 5.0,
                media_kind: MediaKind::Video,
                ..visual_word
            },
            Paradigm::VisualWord => visual_word,
        }
    }

    pub fn schema(&self) -> TrialSchema {
        match self {
            Paradigm::Corner => TrialSchema::four_images(),
            Paradigm::Theatre => TrialSchema::annotated_stimulus(),
            Paradigm::VideoCorner | Paradigm::VisualWord => TrialSchema::four_images_with_media(),
        }
    }

    pub fn layout(&self) -> RowLayout {
        let with = |media: Option<&'static str>, blank: &str| {
            let mut columns = vec!["QI image", "QII image", "QIII image", "QIV image"];
            columns.extend(media);
            columns.extend(["stimulus ID", "event", "time", "timeSinceLastEvent", "x", "y", "z"]);
            RowLayout::new(&columns[..], blank, true)
        };
        match self {
            Paradigm::Corner => with(None, ",,,"),
            Paradigm::VisualWord => with(Some("audio"), ",,,,"),
            Paradigm::VideoCorner => with(Some("video"), ",,,,"),
            Paradigm::Theatre => RowLayout::new(
                &["stimulus name", "event", "time", "time since last event", "x", "y", "z"],
                "None",
                false,
            ),
        }
    }

    /// Fixed scene locations written at the top of each session file
    pub fn reference_points(&self) -> Vec<(String, Vec3)> {
        let quadrants = |centre: Vec3, dx: f32, dy: f32| -> Vec<(String, Vec3)> {
            [
                ("QI", Vec3::new(dx, dy, 0.0)),
                ("QII", Vec3::new(-dx, dy, 0.0)),
                ("QIII", Vec3::new(-dx, -dy, 0.0)),
                ("QIV", Vec3::new(dx, -dy, 0.0)),
            ]
            .into_iter()
            .map(|(label, offset)| (label.to_owned(), centre + offset))
            .collect()
        };
        match self {
            Paradigm::Corner => quadrants(Vec3::new(0.0, 1.5, 10.0), 12.0, 7.5),
            Paradigm::VisualWord => quadrants(Vec3::new(0.0, 0.0, 10.0), 12.0, 8.0),
            Paradigm::VideoCorner => quadrants(Vec3::new(0.0, 0.0, 10.0), 9.0, 7.0),
            Paradigm::Theatre => vec![("Image location".to_owned(), Vec3::new(0.0, 0.0, 10.0))],
        }
    }

    pub fn file_prefix(&self) -> &'static str {
        match self {
            Paradigm::Corner => "ET_VR_CP",
            Paradigm::Theatre => "TP",
            Paradigm::VideoCorner => "VCP",
            Paradigm::VisualWord => "VWP",
        }
    }

    pub fn flush_threshold(&self) -> usize {
        match self {
            Paradigm::Theatre => 5,
            _ => 10,
        }
    }
}

impl fmt::Display for Paradigm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Paradigm {
    type Err = ExperimentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Paradigm::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ExperimentError::UnknownParadigm(s.to_owned()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecorderConfig {
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub flush_threshold: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrialsConfig {
    pub spec: Option<PathBuf>,
    pub shuffle: ShuffleMode,
    pub seed: Option<u64>,
}

/// Fully resolved settings for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub paradigm: Paradigm,
    pub sequencer: ParadigmConfig,
    pub recorder: RecorderConfig,
    pub trials: TrialsConfig,
}

impl SessionConfig {
    pub fn preset(paradigm: Paradigm) -> Self {
        Self {
            paradigm,
            sequencer: paradigm.sequencer(),
            recorder: RecorderConfig {
                output_dir: PathBuf::from("."),
                file_prefix: paradigm.file_prefix().to_owned(),
                flush_threshold: paradigm.flush_threshold(),
            },
            trials: TrialsConfig::default(),
        }
    }

    pub fn builder(&self) -> TrialListBuilder {
        TrialListBuilder::new(self.paradigm.schema())
            .training_prefix(self.sequencer.training_prefix_len)
            .shuffle(self.trials.shuffle)
    }

    pub fn layout(&self) -> RowLayout {
        self.paradigm.layout()
    }

    pub fn reference_points(&self) -> Vec<(String, Vec3)> {
        self.paradigm.reference_points()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::preset(Paradigm::default())
    }
}

/// A session config file. Only `paradigm` is needed; every other key
/// overrides that paradigm's preset.
///
/// ```toml
/// paradigm = "video-corner"
///
/// [sequencer]
/// post_media_hold_s = 4.0
///
/// [recorder]
/// output_dir = "data"
///
/// [trials]
/// spec = "trials/EyeTrackerVRData_0.csv"
/// shuffle = "legacy"
/// seed = 1234
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub paradigm: Option<Paradigm>,
    pub sequencer: SequencerOverrides,
    pub recorder: RecorderOverrides,
    pub trials: TrialsOverrides,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SequencerOverrides {
    pub fixation_dwell_s: Option<f64>,
    pub ready_dwell_s: Option<f64>,
    pub pre_ready_hold_s: Option<f64>,
    pub post_media_hold_s: Option<f64>,
    pub has_ready_phase: Option<bool>,
    pub has_media_phase: Option<bool>,
    pub training_prefix_len: Option<usize>,
    pub has_startup: Option<bool>,
    pub media_kind: Option<MediaKind>,
    pub label_fixation: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecorderOverrides {
    pub output_dir: Option<PathBuf>,
    pub file_prefix: Option<String>,
    pub flush_threshold: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrialsOverrides {
    pub spec: Option<PathBuf>,
    pub shuffle: Option<ShuffleMode>,
    pub seed: Option<u64>,
}

impl ConfigFile {
    pub fn parse(text: &str) -> Result<Self, ExperimentError> {
        Ok(toml::from_str(text)?)
    }

    /// Relative `spec` and `output_dir` paths are taken relative to the file.
    pub fn load(path: &Path) -> Result<Self, ExperimentError> {
        let text = fs::read_to_string(path).map_err(|source| ExperimentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut file = Self::parse(&text)?;
        if let Some(base) = path.parent() {
            file.rebase(base);
        }
        Ok(file)
    }

    fn rebase(&mut self, base: &Path) {
        for path in [&mut self.trials.spec, &mut self.recorder.output_dir]
            .into_iter()
            .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    /// Applies the overrides on top of the selected paradigm's preset;
    /// `fallback` is used when the file names no paradigm.
    pub fn resolve(self, fallback: Paradigm) -> Result<SessionConfig, ExperimentError> {
        let mut config = SessionConfig::preset(self.paradigm.unwrap_or(fallback));

        let s = self.sequencer;
        let seq = &mut config.sequencer;
        seq.fixation_dwell_s = s.fixation_dwell_s.unwrap_or(seq.fixation_dwell_s);
        seq.ready_dwell_s = s.ready_dwell_s.unwrap_or(seq.ready_dwell_s);
        seq.pre_ready_hold_s = s.pre_ready_hold_s.unwrap_or(seq.pre_ready_hold_s);
        seq.post_media_hold_s = s.post_media_hold_s.unwrap_or(seq.post_media_hold_s);
        seq.has_ready_phase = s.has_ready_phase.unwrap_or(seq.has_ready_phase);
        seq.has_media_phase = s.has_media_phase.unwrap_or(seq.has_media_phase);
        seq.training_prefix_len = s.training_prefix_len.unwrap_or(seq.training_prefix_len);
        seq.has_startup = s.has_startup.unwrap_or(seq.has_startup);
        seq.media_kind = s.media_kind.unwrap_or(seq.media_kind);
        seq.label_fixation = s.label_fixation.unwrap_or(seq.label_fixation);
        seq.validate()?;

        let r = self.recorder;
        if let Some(dir) = r.output_dir {
            config.recorder.output_dir = dir;
        }
        if let Some(prefix) = r.file_prefix {
            config.recorder.file_prefix = prefix;
        }
        if let Some(threshold) = r.flush_threshold {
            if threshold == 0 {
                return Err(ExperimentError::InvalidSetting {
                    field: "flush_threshold",
                    value: threshold.to_string(),
                });
            }
            config.recorder.flush_threshold = threshold;
        }

        let t = self.trials;
        config.trials.spec = t.spec;
        config.trials.shuffle = t.shuffle.unwrap_or(config.trials.shuffle);
        config.trials.seed = t.seed;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn presets_match_scene_timings() {
        let vwp = Paradigm::VisualWord.sequencer();
        assert_eq!(vwp.fixation_dwell(), Duration::from_secs(1));
        assert_eq!(vwp.pre_ready_hold(), Duration::from_secs(3));
        assert_eq!(vwp.post_media_hold(), Duration::from_secs(2));
        assert!(vwp.has_ready_phase && vwp.has_media_phase && vwp.has_startup);
        assert_eq!(vwp.training_prefix_len, 2);

        let vcp = Paradigm::VideoCorner.sequencer();
        assert_eq!(vcp.post_media_hold(), Duration::from_secs(5));
        assert_eq!(vcp.media_kind, MediaKind::Video);

        let tp = Paradigm::Theatre.sequencer();
        assert_eq!(tp.pre_ready_hold(), Duration::from_secs(10));
        assert!(!tp.has_ready_phase && !tp.has_media_phase);
        assert!(tp.label_fixation && !vwp.label_fixation);
        assert_eq!(Paradigm::Theatre.flush_threshold(), 5);
    }

    #[test]
    fn layouts_match_recorded_headers() {
        assert_eq!(
            Paradigm::Corner.layout().header(),
            "QI image,QII image,QIII image,QIV image,stimulus ID,event,time,timeSinceLastEvent,x,y,z"
        );
        assert_eq!(
            Paradigm::VisualWord.layout().header(),
            "QI image,QII image,QIII image,QIV image,audio,stimulus ID,event,time,timeSinceLastEvent,x,y,z"
        );
        assert_eq!(
            Paradigm::Theatre.layout().header(),
            "stimulus name,event,time,time since last event,x,y,z"
        );
    }

    #[test]
    fn corner_reference_points() {
        let points = Paradigm::Corner.reference_points();
        let rendered: Vec<String> = points.iter().map(|(l, p)| format!("{l},{p}")).collect();
        assert_eq!(rendered, ["QI,12,9,10", "QII,-12,9,10", "QIII,-12,-6,10", "QIV,12,-6,10"]);
    }

    #[test]
    fn paradigm_names_round_trip() {
        for paradigm in Paradigm::ALL {
            assert_eq!(paradigm.name().parse::<Paradigm>().unwrap(), paradigm);
        }
        assert!("Video-Corner".parse::<Paradigm>().is_ok());
        assert!(matches!(
            "stroop".parse::<Paradigm>(),
            Err(ExperimentError::UnknownParadigm(_))
        ));
    }

    #[test]
    fn file_overrides_apply_on_preset() {
        let file = ConfigFile::parse(
            r#"
            paradigm = "video-corner"

            [sequencer]
            post_media_hold_s = 4.5
            training_prefix_len = 0

            [recorder]
            flush_threshold = 3

            [trials]
            shuffle = "legacy"
            seed = 42
            "#,
        )
        .unwrap();
        let config = file.resolve(Paradigm::Corner).unwrap();
        assert_eq!(config.paradigm, Paradigm::VideoCorner);
        assert_eq!(config.sequencer.post_media_hold_s, 4.5);
        assert_eq!(config.sequencer.training_prefix_len, 0);
        assert_eq!(config.sequencer.pre_ready_hold_s, 3.0);
        assert_eq!(config.recorder.flush_threshold, 3);
        assert_eq!(config.recorder.file_prefix, "VCP");
        assert_eq!(config.trials.shuffle, ShuffleMode::Legacy);
        assert_eq!(config.trials.seed, Some(42));
    }

    #[test]
    fn empty_file_uses_fallback_preset() {
        let config = ConfigFile::parse("").unwrap().resolve(Paradigm::Theatre).unwrap();
        assert_eq!(config, SessionConfig::preset(Paradigm::Theatre));
    }

    #[test]
    fn bad_values_are_rejected() {
        let negative = ConfigFile::parse("[sequencer]\nfixation_dwell_s = -1.0\n").unwrap();
        assert!(matches!(
            negative.resolve(Paradigm::Corner),
            Err(ExperimentError::InvalidSetting { field: "fixation_dwell_s", .. })
        ));

        let zero = ConfigFile::parse("[recorder]\nflush_threshold = 0\n").unwrap();
        assert!(zero.resolve(Paradigm::Corner).is_err());

        assert!(matches!(
            ConfigFile::parse("[sequencer]\ndwell = 1\n"),
            Err(ExperimentError::Config(_))
        ));
    }

    #[test]
    fn relative_paths_follow_the_config_file() {
        let mut file = ConfigFile::parse("[trials]\nspec = \"data.csv\"\n").unwrap();
        file.rebase(Path::new("/study/config"));
        assert_eq!(file.trials.spec, Some(PathBuf::from("/study/config/data.csv")));
    }
}
