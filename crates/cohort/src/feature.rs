//! Consensus features: one record per analyte, carrying one slot per sample

use crate::sample::SampleSet;
use crate::spectrum::Ms2Spectrum;
use crate::table::SampleFeature;
use crate::Error;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Feature id of a slot that was never matched to a detected feature
pub const NOT_DETECTED: i64 = -1;
/// Feature id of a slot whose values were re-extracted from raw data
pub const GAP_FILLED: i64 = -2;

/// Fields populated by the isotope/adduct/in-source fragment grouping step,
/// which runs after alignment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Grouping {
    pub charge_state: u8,
    pub is_isotope: bool,
    /// Isotope signals as (m/z, intensity)
    pub isotope_signals: Option<Vec<(f64, f64)>>,
    pub is_in_source_fragment: bool,
    pub adduct_type: Option<String>,
}

impl Default for Grouping {
    fn default() -> Self {
        Self {
            charge_state: 1,
            is_isotope: false,
            isotope_signals: None,
            is_in_source_fragment: false,
            adduct_type: None,
        }
    }
}

/// Fields populated by a downstream identity annotation step
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub search_mode: Option<String>,
    pub similarity: Option<f64>,
    pub name: Option<String>,
    pub formula: Option<String>,
    pub matched_peak_number: Option<usize>,
    pub smiles: Option<String>,
    pub inchikey: Option<String>,
    pub matched_precursor_mz: Option<f64>,
    pub matched_rt: Option<f64>,
    pub matched_adduct_type: Option<String>,
    pub matched_ms2: Option<Ms2Spectrum>,
}

/// A feature aligned across samples.
///
/// Every per-sample vector has exactly one entry per sample, and index `i`
/// refers to the same sample in all of them. Summary values (`mz`, `rt`,
/// quality scores) are always copied from `reference_sample`, the sample with
/// the highest peak height - they are never averaged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignedFeature {
    /// Upstream feature id per sample; [`NOT_DETECTED`] or [`GAP_FILLED`]
    pub feature_ids: Vec<i64>,
    pub mzs: Vec<f64>,
    pub rts: Vec<f64>,
    pub scan_indices: Vec<usize>,
    pub peak_heights: Vec<f64>,
    pub peak_areas: Vec<f64>,
    pub top_averages: Vec<f64>,
    pub lengths: Vec<usize>,
    pub gaussian_similarities: Vec<f64>,
    pub noise_scores: Vec<f64>,
    pub asymmetry_factors: Vec<f64>,
    pub sses: Vec<f64>,
    pub segmented: Vec<bool>,
    /// (sample index, spectrum) for every sample that contributed an MS2
    pub ms2_seq: Vec<(usize, Ms2Spectrum)>,

    /// Dense rank by descending `highest_intensity`, assigned at finalization
    pub id: Option<usize>,
    pub group_id: Option<usize>,
    pub mz: f64,
    pub rt: f64,
    pub reference_sample: usize,
    pub reference_scan_idx: usize,
    pub highest_intensity: f64,
    pub ms2: Option<Ms2Spectrum>,
    pub ms2_reference_sample: Option<usize>,
    pub gaussian_similarity: f64,
    pub noise_score: f64,
    pub asymmetry_factor: f64,
    /// Detection rate among non-blank samples, before gap filling
    pub detection_rate: f64,
    /// Detection rate among non-blank samples, after gap filling
    pub detection_rate_gap_filled: f64,
    pub grouping: Grouping,
    pub annotation: Annotation,
}

impl AlignedFeature {
    /// Create an empty record with `n_samples` undetected slots
    pub fn empty(n_samples: usize) -> Self {
        Self {
            feature_ids: vec![NOT_DETECTED; n_samples],
            mzs: vec![0.0; n_samples],
            rts: vec![0.0; n_samples],
            scan_indices: vec![0; n_samples],
            peak_heights: vec![0.0; n_samples],
            peak_areas: vec![0.0; n_samples],
            top_averages: vec![0.0; n_samples],
            lengths: vec![0; n_samples],
            gaussian_similarities: vec![0.0; n_samples],
            noise_scores: vec![0.0; n_samples],
            asymmetry_factors: vec![0.0; n_samples],
            sses: vec![0.0; n_samples],
            segmented: vec![false; n_samples],
            ms2_seq: Vec::new(),
            id: None,
            group_id: None,
            mz: 0.0,
            rt: 0.0,
            reference_sample: 0,
            reference_scan_idx: 0,
            highest_intensity: 0.0,
            ms2: None,
            ms2_reference_sample: None,
            gaussian_similarity: 0.0,
            noise_score: 0.0,
            asymmetry_factor: 0.0,
            detection_rate: 0.0,
            detection_rate_gap_filled: 0.0,
            grouping: Grouping::default(),
            annotation: Annotation::default(),
        }
    }

    /// Seed a new record from a feature detected in `sample`
    pub fn seed(n_samples: usize, sample: usize, row: &SampleFeature) -> Self {
        let mut feature = Self::empty(n_samples);
        feature.assign(sample, row);
        feature.assign_reference(sample, row);
        feature
    }

    pub fn n_samples(&self) -> usize {
        self.feature_ids.len()
    }

    /// Copy a detected feature into slot `sample`
    pub fn assign(&mut self, sample: usize, row: &SampleFeature) {
        self.feature_ids[sample] = row.id;
        self.mzs[sample] = row.mz;
        self.rts[sample] = row.rt;
        self.scan_indices[sample] = row.scan_idx;
        self.peak_heights[sample] = row.peak_height;
        self.peak_areas[sample] = row.peak_area;
        self.top_averages[sample] = row.top_average;
        self.lengths[sample] = row.total_scans;
        self.gaussian_similarities[sample] = row.gaussian_similarity;
        self.noise_scores[sample] = row.noise_score;
        self.asymmetry_factors[sample] = row.asymmetry_factor;
        self.sses[sample] = row.sse;
        self.segmented[sample] = row.is_segmented;
        if let Some(ms2) = &row.ms2 {
            self.ms2_seq.push((sample, ms2.clone()));
        }
    }

    /// Make `sample` the reference of this record
    pub fn assign_reference(&mut self, sample: usize, row: &SampleFeature) {
        self.mz = row.mz;
        self.rt = row.rt;
        self.reference_sample = sample;
        self.reference_scan_idx = row.scan_idx;
        self.highest_intensity = row.peak_height;
        self.gaussian_similarity = row.gaussian_similarity;
        self.noise_score = row.noise_score;
        self.asymmetry_factor = row.asymmetry_factor;
    }

    pub fn is_detected(&self, sample: usize) -> bool {
        self.feature_ids[sample] >= 0
    }

    /// True if slot `sample` holds neither a detected nor a gap-filled feature
    pub fn is_gap(&self, sample: usize) -> bool {
        self.feature_ids[sample] == NOT_DETECTED
    }

    /// Select the MS2 spectrum with the greatest summed fragment intensity as
    /// the representative spectrum. Ties go to the earliest entry; spectra
    /// without peaks are never selected.
    pub fn select_representative_ms2(&mut self) {
        let mut best: Option<(usize, f64)> = None;
        for (idx, (_, spectrum)) in self.ms2_seq.iter().enumerate() {
            if spectrum.is_empty() {
                continue;
            }
            let total = spectrum.total_intensity();
            match best {
                Some((_, b)) if b >= total => {}
                _ => best = Some((idx, total)),
            }
        }

        if let Some((idx, _)) = best {
            let (sample, spectrum) = &self.ms2_seq[idx];
            self.ms2_reference_sample = Some(*sample);
            self.ms2 = Some(spectrum.clone());
        }
    }

    pub fn update_detection_rate(&mut self, samples: &SampleSet) {
        self.detection_rate = samples.detection_rate(|i| self.is_detected(i));
    }

    pub fn update_detection_rate_gap_filled(&mut self, samples: &SampleSet) {
        self.detection_rate_gap_filled = samples.detection_rate(|i| self.peak_heights[i] > 0.0);
    }

    /// Ensure that every per-sample vector has `n_samples` entries
    pub fn check_dimensions(&self, n_samples: usize) -> Result<(), Error> {
        let lengths = [
            self.feature_ids.len(),
            self.mzs.len(),
            self.rts.len(),
            self.scan_indices.len(),
            self.peak_heights.len(),
            self.peak_areas.len(),
            self.top_averages.len(),
            self.lengths.len(),
            self.gaussian_similarities.len(),
            self.noise_scores.len(),
            self.asymmetry_factors.len(),
            self.sses.len(),
            self.segmented.len(),
        ];
        match lengths.iter().find(|&&len| len != n_samples) {
            Some(&found) => Err(Error::Dimension {
                expected: n_samples,
                found,
            }),
            None => Ok(()),
        }
    }
}

/// The ordered collection of consensus features. Owned and passed from one
/// pipeline stage to the next.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    n_samples: usize,
    features: Vec<AlignedFeature>,
}

impl Ledger {
    pub fn new(n_samples: usize) -> Self {
        Self {
            n_samples,
            features: Vec::new(),
        }
    }

    /// Build a ledger from existing records, checking their dimensions
    pub fn from_features(n_samples: usize, features: Vec<AlignedFeature>) -> Result<Self, Error> {
        for feature in &features {
            feature.check_dimensions(n_samples)?;
        }
        Ok(Self {
            n_samples,
            features,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn features(&self) -> &[AlignedFeature] {
        &self.features
    }

    pub fn features_mut(&mut self) -> &mut [AlignedFeature] {
        &mut self.features
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlignedFeature> {
        self.features.iter()
    }

    pub fn into_features(self) -> Vec<AlignedFeature> {
        self.features
    }

    pub(crate) fn push(&mut self, feature: AlignedFeature) {
        debug_assert_eq!(feature.n_samples(), self.n_samples);
        self.features.push(feature);
    }

    /// Stable sort by `highest_intensity`, highest first
    pub fn sort_by_intensity(&mut self) {
        self.features
            .sort_by(|a, b| b.highest_intensity.total_cmp(&a.highest_intensity));
    }

    pub fn select_representative_ms2(&mut self) {
        self.features
            .par_iter_mut()
            .for_each(AlignedFeature::select_representative_ms2);
    }

    /// Compute detection rates and drop every record at or below `cutoff`
    pub fn filter_detection_rate(&mut self, samples: &SampleSet, cutoff: f64) {
        self.features
            .par_iter_mut()
            .for_each(|f| f.update_detection_rate(samples));
        self.features.retain(|f| f.detection_rate > cutoff);
    }

    pub fn update_detection_rate_gap_filled(&mut self, samples: &SampleSet) {
        self.features
            .par_iter_mut()
            .for_each(|f| f.update_detection_rate_gap_filled(samples));
    }

    /// Sort by descending intensity and assign dense 0-based ids
    pub fn finalize(&mut self) {
        self.sort_by_intensity();
        for (idx, feature) in self.features.iter_mut().enumerate() {
            feature.id = Some(idx);
        }
    }
}
