use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

/// Metadata for a single LC-MS run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub name: String,
    /// Blank runs never count towards detection rates
    #[serde(default)]
    pub blank: bool,
    #[serde(default)]
    pub qc: bool,
}

impl Sample {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            blank: false,
            qc: false,
        }
    }

    pub fn blank<S: Into<String>>(name: S) -> Self {
        Self {
            blank: true,
            ..Self::new(name)
        }
    }
}

/// Ordered collection of samples. The order of samples in the set is the
/// order in which sample tables are folded into the consensus ledger, and
/// index `i` of every per-sample array refers to `samples[i]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleSet {
    samples: Vec<Sample>,
}

impl SampleSet {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.samples.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn name(&self, idx: usize) -> &str {
        &self.samples[idx].name
    }

    pub fn is_blank(&self, idx: usize) -> bool {
        self.samples[idx].blank
    }

    pub fn index_of(&self) -> FnvHashMap<&str, usize> {
        self.samples
            .iter()
            .enumerate()
            .map(|(idx, s)| (s.name.as_str(), idx))
            .collect()
    }

    pub fn non_blank_count(&self) -> usize {
        self.samples.iter().filter(|s| !s.blank).count()
    }

    /// Fraction of non-blank samples for which `detected` holds. Blank samples
    /// are excluded from both numerator and denominator; a set without any
    /// non-blank sample yields 0.
    pub fn detection_rate<F>(&self, detected: F) -> f64
    where
        F: Fn(usize) -> bool,
    {
        let denominator = self.non_blank_count();
        if denominator == 0 {
            return 0.0;
        }
        let numerator = self
            .samples
            .iter()
            .enumerate()
            .filter(|(idx, s)| !s.blank && detected(*idx))
            .count();
        numerator as f64 / denominator as f64
    }

    /// Keep only samples for which `keep` returns true, preserving order
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Sample) -> bool,
    {
        self.samples.retain(|s| keep(s))
    }
}

impl FromIterator<Sample> for SampleSet {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn detection_rate_excludes_blanks() {
        let set: SampleSet = vec![
            Sample::new("a"),
            Sample::blank("blank"),
            Sample::new("b"),
            Sample::new("c"),
        ]
        .into_iter()
        .collect();

        assert_eq!(set.non_blank_count(), 3);
        // Detected in the blank only
        assert_eq!(set.detection_rate(|i| i == 1), 0.0);
        assert_eq!(set.detection_rate(|i| i == 0 || i == 1), 1.0 / 3.0);
        assert_eq!(set.detection_rate(|_| true), 1.0);
    }

    #[test]
    fn all_blank_is_zero() {
        let set: SampleSet = vec![Sample::blank("x"), Sample::blank("y")]
            .into_iter()
            .collect();
        assert_eq!(set.detection_rate(|_| true), 0.0);
        assert_eq!(SampleSet::default().detection_rate(|_| true), 0.0);
    }
}
