use chrono::{DateTime, TimeZone};
use std::fmt::Display;

/// Column schema of a session file and how data rows are prefixed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowLayout {
    columns: Vec<String>,
    blank_stimuli: String,
    trial_number: bool,
}

impl RowLayout {
    /// `blank_stimuli` fills the stimulus columns while nothing is on screen.
    pub fn new<S: AsRef<str>>(
        columns: &[S],
        blank_stimuli: impl Into<String>,
        trial_number: bool,
    ) -> Self {
        Self {
            columns: columns.iter().map(|c| c.as_ref().to_owned()).collect(),
            blank_stimuli: blank_stimuli.into(),
            trial_number,
        }
    }

    pub fn header(&self) -> String {
        self.columns.join(",")
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn blank_stimuli(&self) -> &str {
        &self.blank_stimuli
    }

    /// `<stimuli>,[<trial>,]<event>,<payload>,`; the trailing comma is part
    /// of the format.
    pub fn render_row(&self, context: &RowContext, payload: &str) -> String {
        let stimuli = context.stimuli.as_deref().unwrap_or(&self.blank_stimuli);
        if self.trial_number {
            format!(
                "{stimuli},{},{},{payload},",
                context.trial_number, context.event
            )
        } else {
            format!("{stimuli},{},{payload},", context.event)
        }
    }
}

/// What the current frame row is prefixed with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowContext {
    /// `None` while no stimuli are on screen
    pub stimuli: Option<String>,
    /// 1-based; 0 before the first trial
    pub trial_number: usize,
    pub event: String,
}

/// `<PREFIX>_<MM-DD-YYYY>__<HH-MM-SS>.csv`
pub fn session_file_name<Tz>(prefix: &str, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!("{prefix}_{}.csv", at.format("%m-%d-%Y__%H-%M-%S"))
}
