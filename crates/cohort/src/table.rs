//! Per-sample feature tables, as produced by an upstream feature detector

use crate::spectrum::Ms2Spectrum;
use crate::BoxError;
use serde::{Deserialize, Serialize};

/// A chromatographic peak detected in a single sample
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleFeature {
    /// Identifier assigned by the upstream detector, unique within the sample
    pub id: i64,
    pub mz: f64,
    pub rt: f64,
    /// Scan index of the peak apex
    pub scan_idx: usize,
    pub peak_height: f64,
    pub peak_area: f64,
    /// Mean of the three most intense scans of the peak
    pub top_average: f64,
    /// Number of non-zero scans in the peak
    pub total_scans: usize,
    pub gaussian_similarity: f64,
    pub noise_score: f64,
    pub asymmetry_factor: f64,
    /// Squared error of the raw peak against its smoothed curve
    pub sse: f64,
    pub is_segmented: bool,
    pub ms2: Option<Ms2Spectrum>,
}

/// All features detected in one sample
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleTable {
    pub sample: String,
    pub features: Vec<SampleFeature>,
}

impl SampleTable {
    pub fn new<S: Into<String>>(sample: S, features: Vec<SampleFeature>) -> Self {
        Self {
            sample: sample.into(),
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Summed peak height of every feature in the table
    pub fn total_intensity(&self) -> f64 {
        self.features.iter().map(|f| f.peak_height).sum()
    }

    /// Drop features without enough evidence: a feature is kept if it carries
    /// an MS2 spectrum, or if it spans more than `scan_cutoff` scans
    pub fn retain_evidence(&mut self, scan_cutoff: usize) {
        self.features
            .retain(|f| f.ms2.is_some() || f.total_scans > scan_cutoff);
    }

    /// Stable sort by peak height, highest first
    pub fn sort_by_height(&mut self) {
        self.features
            .sort_by(|a, b| b.peak_height.total_cmp(&a.peak_height));
    }

    pub fn mzs(&self) -> Vec<f64> {
        self.features.iter().map(|f| f.mz).collect()
    }

    pub fn rts(&self) -> Vec<f64> {
        self.features.iter().map(|f| f.rt).collect()
    }
}

/// Supplies per-sample feature tables, keyed by sample name
pub trait FeatureTableSource: Sync {
    /// Returns `Ok(None)` if no table exists for `sample`
    fn load(&self, sample: &str) -> Result<Option<SampleTable>, BoxError>;
}

impl FeatureTableSource for [SampleTable] {
    fn load(&self, sample: &str) -> Result<Option<SampleTable>, BoxError> {
        Ok(self.iter().find(|t| t.sample == sample).cloned())
    }
}

impl FeatureTableSource for Vec<SampleTable> {
    fn load(&self, sample: &str) -> Result<Option<SampleTable>, BoxError> {
        self.as_slice().load(sample)
    }
}
