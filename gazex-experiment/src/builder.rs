//! Builds a session's trial list from a comma-delimited specification.

use crate::error::{ExperimentError, ParseError, ParseErrorKind};
use crate::shuffle::ShuffleMode;
use gazex_core::{MetaValue, Trial, TrialList};
use log::{debug, info};
use rand::Rng;
use std::fs;
use std::path::Path;

/// How one specification column is interpreted
#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub enum ColumnKind {
    /// An interchangeable display slot; slots are shuffled within a trial
    Slot,
    /// A display slot named by file; the extension is dropped
    Stimulus,
    /// Audio or video played after the display phase
    Media,
    Int,
    Float,
    Text,
}

/// Fixed per-paradigm column layout of a specification row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialSchema {
    columns: Vec<(&'static str, ColumnKind)>,
}

impl TrialSchema {
    pub fn new(columns: Vec<(&'static str, ColumnKind)>) -> Self {
        Self { columns }
    }

    /// Four images, one per quadrant
    pub fn four_images() -> Self {
        use ColumnKind::Slot;
        Self::new(vec![("QI", Slot), ("QII", Slot), ("QIII", Slot), ("QIV", Slot)])
    }

    /// Four images plus the clip played once the subject is ready
    pub fn four_images_with_media() -> Self {
        use ColumnKind::{Media, Slot};
        Self::new(vec![
            ("QI", Slot),
            ("QII", Slot),
            ("QIII", Slot),
            ("QIV", Slot),
            ("media", Media),
        ])
    }

    pub fn single_stimulus() -> Self {
        Self::new(vec![("pic", ColumnKind::Stimulus)])
    }

    /// A picture followed by its annotation columns
    pub fn annotated_stimulus() -> Self {
        use ColumnKind::{Float, Int, Stimulus, Text};
        Self::new(vec![
            ("pic", Stimulus),
            ("x", Int),
            ("y", Int),
            ("focus", Text),
            ("animacy", Text),
            ("event", Text),
            ("side", Text),
            ("an_hierarchy", Text),
            ("x_ratio", Float),
            ("y_ratio", Float),
        ])
    }

    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    pub fn has_media(&self) -> bool {
        self.columns.iter().any(|(_, kind)| *kind == ColumnKind::Media)
    }

    /// Parses one row. `row` is the 1-based line number used in errors.
    pub fn parse_row(&self, row: usize, line: &str) -> Result<Trial, ParseError> {
        let mut fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() == self.arity() + 1 && fields.last() == Some(&"") {
            fields.pop();
        }
        if fields.len() != self.arity() {
            return Err(ParseError {
                row,
                column: fields.len().min(self.arity()) + 1,
                kind: ParseErrorKind::Arity {
                    expected: self.arity(),
                    found: fields.len(),
                },
            });
        }

        let mut trial = Trial::new(row, Vec::new());
        for (index, ((_, kind), value)) in self.columns.iter().zip(fields).enumerate() {
            let column = index + 1;
            let fail = |kind| ParseError { row, column, kind };
            match kind {
                ColumnKind::Slot | ColumnKind::Stimulus | ColumnKind::Media if value.is_empty() => {
                    return Err(fail(ParseErrorKind::EmptyStimulus));
                }
                ColumnKind::Slot => trial.slots.push(value.to_owned()),
                ColumnKind::Stimulus => trial.slots.push(strip_extension(value).to_owned()),
                ColumnKind::Media => trial.media = Some(value.to_owned()),
                ColumnKind::Int => {
                    let v = value.parse::<i64>().map_err(|_| {
                        fail(ParseErrorKind::Int {
                            value: value.to_owned(),
                        })
                    })?;
                    trial.meta.push(MetaValue::Int(v));
                }
                ColumnKind::Float => {
                    let v = value.parse::<f32>().map_err(|_| {
                        fail(ParseErrorKind::Float {
                            value: value.to_owned(),
                        })
                    })?;
                    trial.meta.push(MetaValue::Float(v));
                }
                ColumnKind::Text => trial.meta.push(MetaValue::Text(value.to_owned())),
            }
        }
        Ok(trial)
    }
}

fn strip_extension(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

/// Turns a specification into a session-ordered [`TrialList`].
///
/// Comment (`#`) and blank rows are skipped. Slots within each trial are
/// shuffled, then every trial after the training prefix is shuffled as a
/// block; the prefix keeps its original order.
#[derive(Debug, Clone)]
pub struct TrialListBuilder {
    pub schema: TrialSchema,
    pub training_prefix: usize,
    pub shuffle: ShuffleMode,
}

impl TrialListBuilder {
    pub fn new(schema: TrialSchema) -> Self {
        Self {
            schema,
            training_prefix: 0,
            shuffle: ShuffleMode::default(),
        }
    }

    pub fn training_prefix(mut self, len: usize) -> Self {
        self.training_prefix = len;
        self
    }

    pub fn shuffle(mut self, mode: ShuffleMode) -> Self {
        self.shuffle = mode;
        self
    }

    /// Parses every row in `source` without randomizing anything.
    pub fn parse(&self, source: &str) -> Result<Vec<Trial>, ParseError> {
        source
            .lines()
            .enumerate()
            .filter(|(_, line)| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with('#')
            })
            .map(|(index, line)| self.schema.parse_row(index + 1, line))
            .collect()
    }

    pub fn build<R: Rng>(&self, source: &str, rng: &mut R) -> Result<TrialList, ExperimentError> {
        let mut trials = self.parse(source)?;
        if self.training_prefix > trials.len() {
            return Err(ExperimentError::TrainingPrefix {
                prefix: self.training_prefix,
                len: trials.len(),
            });
        }

        for trial in &mut trials {
            self.shuffle.shuffle(&mut trial.slots, rng);
        }
        self.shuffle.shuffle(&mut trials[self.training_prefix..], rng);

        info!(
            "Built trial list: {} training + {} main trials ({:?} shuffle)",
            self.training_prefix,
            trials.len() - self.training_prefix,
            self.shuffle
        );
        for (index, trial) in trials.iter().enumerate() {
            debug!("  #{} (row {}): {}", index + 1, trial.source_row, trial.stimulus_names());
        }
        Ok(TrialList::new(trials, self.training_prefix))
    }

    pub fn load<R: Rng>(&self, path: &Path, rng: &mut R) -> Result<TrialList, ExperimentError> {
        let source = fs::read_to_string(path).map_err(|source| ExperimentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.build(&source, rng)
    }
}
