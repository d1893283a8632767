use serde::{Deserialize, Serialize};
use std::fmt;

/// A typed metadata column from the trial specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Int(i64),
    Float(f32),
    Text(String),
}

impl MetaValue {
    pub fn as_float(&self) -> Option<f32> {
        match self {
            MetaValue::Int(v) => Some(*v as f32),
            MetaValue::Float(v) => Some(*v),
            MetaValue::Text(_) => None,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Int(v) => write!(f, "{v}"),
            MetaValue::Float(v) => write!(f, "{v}"),
            MetaValue::Text(v) => f.write_str(v),
        }
    }
}

/// One unit of stimulus presentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    /// 1-based line of the specification row this trial came from
    pub source_row: usize,
    /// Stimulus names in display-slot order (quadrant I..IV, or the single image)
    pub slots: Vec<String>,
    pub media: Option<String>,
    pub meta: Vec<MetaValue>,
}

impl Trial {
    pub fn new(source_row: usize, slots: Vec<String>) -> Self {
        Self {
            source_row,
            slots,
            media: None,
            meta: Vec::new(),
        }
    }

    pub fn with_media(mut self, media: impl Into<String>) -> Self {
        self.media = Some(media.into());
        self
    }

    /// Slot names followed by the media name, comma joined, as they prefix
    /// every data row while the trial is on screen.
    pub fn stimulus_names(&self) -> String {
        let mut names = self.slots.join(",");
        if let Some(media) = &self.media {
            names.push(',');
            names.push_str(media);
        }
        names
    }
}

/// Session-ordered trials: a fixed training prefix followed by the main block
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrialList {
    trials: Vec<Trial>,
    training_len: usize,
}

impl TrialList {
    /// `training_len` is clamped to the number of trials.
    pub fn new(trials: Vec<Trial>, training_len: usize) -> Self {
        let training_len = training_len.min(trials.len());
        Self {
            trials,
            training_len,
        }
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Trial> {
        self.trials.get(index)
    }

    pub fn training_len(&self) -> usize {
        self.training_len
    }

    pub fn training(&self) -> &[Trial] {
        &self.trials[..self.training_len]
    }

    pub fn main(&self) -> &[Trial] {
        &self.trials[self.training_len..]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Trial> {
        self.trials.iter()
    }
}

impl<'a> IntoIterator for &'a TrialList {
    type Item = &'a Trial;
    type IntoIter = std::slice::Iter<'a, Trial>;

    fn into_iter(self) -> Self::IntoIter {
        self.trials.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trial(row: usize) -> Trial {
        Trial::new(row, vec![format!("img{row}")])
    }

    #[test]
    fn stimulus_names_include_media() {
        let t = Trial::new(3, vec!["a".into(), "b".into(), "c".into(), "d".into()])
            .with_media("cat");
        assert_eq!(t.stimulus_names(), "a,b,c,d,cat");
        assert_eq!(trial(1).stimulus_names(), "img1");
    }

    #[test]
    fn training_prefix_partitions_list() {
        let list = TrialList::new((1..=5).map(trial).collect(), 2);
        assert_eq!(list.training().len(), 2);
        assert_eq!(list.main().len(), 3);
        assert_eq!(list.main()[0].source_row, 3);

        let clamped = TrialList::new(vec![trial(1)], 4);
        assert_eq!(clamped.training_len(), 1);
        assert!(clamped.main().is_empty());
    }

    #[test]
    fn meta_values_display_plainly() {
        assert_eq!(MetaValue::Int(-4).to_string(), "-4");
        assert_eq!(MetaValue::Float(0.25).to_string(), "0.25");
        assert_eq!(MetaValue::Text("left".into()).to_string(), "left");
        assert_eq!(MetaValue::Text("left".into()).as_float(), None);
    }
}
