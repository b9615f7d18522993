//! Incremental alignment of per-sample feature tables into a [`Ledger`]
//!
//! Samples are folded one at a time, in the order given by the caller. For
//! each sample, every existing consensus feature (visited in ledger order,
//! i.e. by descending intensity) claims the most intense still-unclaimed row
//! within both tolerances. Rows that remain unclaimed seed new consensus
//! features. The ledger is then re-sorted by intensity, so that the most
//! intense features get the first pick of rows in the next sample.
//!
//! This is a greedy, order-dependent linkage: it is deterministic, but it is
//! not a globally optimal assignment.

use crate::feature::{AlignedFeature, Ledger};
use crate::ml::anchors::Anchors;
use crate::ml::retention_alignment::{RtCorrectionSettings, RtModel};
use crate::table::{SampleFeature, SampleTable};
use crate::util::binary_search_slice;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fitted RT correction model for every folded sample, keyed by sample name.
/// `None` means that correction was attempted, but no model could be fit.
pub type RtModels = BTreeMap<String, Option<RtModel>>;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignmentParameters {
    /// Rows match a consensus feature if their m/z differs by less than this
    pub mz_tol: f64,
    /// Rows match a consensus feature if their RT differs by less than this
    pub rt_tol: f64,
    /// Rows without MS2 must span more than this many scans
    pub scan_number_cutoff: usize,
    /// Absolute MS1 intensity tolerance; rows more intense than 5x this value
    /// are used to locate RT anchors
    pub ms1_abs_int_tol: f64,
    /// Consensus features detected in this fraction of non-blank samples or
    /// fewer are dropped
    pub detection_rate_cutoff: f64,
}

impl Default for AlignmentParameters {
    fn default() -> Self {
        Self {
            mz_tol: 0.01,
            rt_tol: 0.2,
            scan_number_cutoff: 5,
            ms1_abs_int_tol: 1000.0,
            detection_rate_cutoff: 0.1,
        }
    }
}

impl AlignmentParameters {
    /// Minimum peak height for a row to take part in anchor matching
    pub fn anchor_intensity_floor(&self) -> f64 {
        self.ms1_abs_int_tol * 5.0
    }
}

/// RT correction state shared across the fold: reference anchors, and the
/// models fit so far
pub struct RtCorrection<'a> {
    pub anchors: &'a Anchors,
    pub settings: RtCorrectionSettings,
    pub models: RtModels,
}

impl<'a> RtCorrection<'a> {
    pub fn new(anchors: &'a Anchors, settings: RtCorrectionSettings) -> Self {
        Self {
            anchors,
            settings,
            models: RtModels::new(),
        }
    }

    /// Fit a model for `table` from its intense rows, apply it to every row,
    /// and remember it under the table's sample name
    fn correct(&mut self, table: &mut SampleTable, intensity_floor: f64) {
        let (mz, rt): (Vec<f64>, Vec<f64>) = table
            .features
            .iter()
            .filter(|f| f.peak_height > intensity_floor)
            .map(|f| (f.mz, f.rt))
            .unzip();

        let model = RtModel::fit(self.anchors, &mz, &rt, &self.settings);
        match &model {
            Some(model) => {
                for row in table.features.iter_mut() {
                    row.rt = model.predict(row.rt);
                }
            }
            None => log::warn!(
                "{}: retention time correction abandoned, using uncorrected RT",
                table.sample
            ),
        }
        self.models.insert(table.sample.clone(), model);
    }
}

pub struct Aligner<'a> {
    pub parameters: AlignmentParameters,
    ledger: Ledger,
    rt_correction: Option<RtCorrection<'a>>,
}

impl<'a> Aligner<'a> {
    pub fn new(
        n_samples: usize,
        parameters: AlignmentParameters,
        rt_correction: Option<RtCorrection<'a>>,
    ) -> Self {
        Self {
            parameters,
            ledger: Ledger::new(n_samples),
            rt_correction,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Fold the table of the sample at position `sample` into the ledger
    pub fn fold(&mut self, sample: usize, mut table: SampleTable) {
        table.retain_evidence(self.parameters.scan_number_cutoff);
        table.sort_by_height();

        if let Some(correction) = self.rt_correction.as_mut() {
            correction.correct(&mut table, self.parameters.anchor_intensity_floor());
        }

        let matched = self.match_existing(sample, &table.features);
        let n_samples = self.ledger.n_samples();
        let mut seeded = 0;
        for (row, claimed) in table.features.iter().zip(matched) {
            if !claimed {
                self.ledger
                    .push(AlignedFeature::seed(n_samples, sample, row));
                seeded += 1;
            }
        }

        log::trace!(
            "- {}: {} rows, {} linked to existing features, {} new features",
            table.sample,
            table.len(),
            table.len() - seeded,
            seeded
        );

        self.ledger.sort_by_intensity();
    }

    /// Give every existing consensus feature, in ledger order, the chance to
    /// claim a row of `rows` (which must be sorted by descending height).
    /// Returns which rows were claimed.
    fn match_existing(&mut self, sample: usize, rows: &[SampleFeature]) -> Vec<bool> {
        let mz_tol = self.parameters.mz_tol;
        let rt_tol = self.parameters.rt_tol;

        // Row indices sorted by m/z, for fast windowed lookup. Row indices are
        // also height ranks, so the smallest candidate index is the most
        // intense candidate.
        let mut by_mz = (0..rows.len()).collect::<Vec<_>>();
        by_mz.sort_by(|&a, &b| rows[a].mz.total_cmp(&rows[b].mz));
        let mzs = by_mz.iter().map(|&idx| rows[idx].mz).collect::<Vec<_>>();

        let mut claimed = vec![false; rows.len()];
        for feature in self.ledger.features_mut() {
            let (lo, hi) = binary_search_slice(
                &mzs,
                |a: &f64, b: &f64| a.total_cmp(b),
                feature.mz - mz_tol,
                feature.mz + mz_tol,
            );

            let best = by_mz[lo..hi]
                .iter()
                .copied()
                .filter(|&idx| {
                    !claimed[idx]
                        && (rows[idx].mz - feature.mz).abs() < mz_tol
                        && (rows[idx].rt - feature.rt).abs() < rt_tol
                })
                .min();

            if let Some(idx) = best {
                claimed[idx] = true;
                let row = &rows[idx];
                feature.assign(sample, row);
                if row.peak_height > feature.highest_intensity {
                    feature.assign_reference(sample, row);
                }
            }
        }
        claimed
    }

    /// Consume the aligner, returning the ledger and any fitted RT models
    pub fn finish(self) -> (Ledger, Option<RtModels>) {
        (self.ledger, self.rt_correction.map(|c| c.models))
    }
}
