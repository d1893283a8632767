pub mod builder;
pub mod config;
pub mod dwell;
pub mod error;
pub mod shuffle;
pub mod state;

pub use builder::{ColumnKind, TrialListBuilder, TrialSchema};
pub use config::{ConfigFile, MediaKind, Paradigm, ParadigmConfig, SessionConfig};
pub use dwell::Dwell;
pub use error::{ExperimentError, ParseError, ParseErrorKind};
pub use shuffle::ShuffleMode;
pub use state::{Instructions, Sequencer, SequencerEvent, SequencerState};
