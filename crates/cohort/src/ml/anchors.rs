//! Selection of retention time landmarks from a reference sample
//!
//! An anchor is a feature whose m/z is isolated from both of its m/z
//! neighbors and whose noise score is low. The most intense anchors of a
//! single reference sample are later located in every other sample to build
//! a retention time correction model.

use crate::table::SampleTable;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnchorSettings {
    /// Maximum number of anchors to select
    pub count: usize,
    /// Anchors must have a noise score below this value
    pub noise_score_tol: f64,
    /// Both m/z neighbors of an anchor must be further away than this
    pub mz_tol: f64,
}

impl Default for AnchorSettings {
    fn default() -> Self {
        Self {
            count: 100,
            noise_score_tol: 0.1,
            mz_tol: 0.01,
        }
    }
}

/// Retention time landmarks, as parallel (m/z, RT) vectors ordered by
/// descending peak height
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Anchors {
    pub mz: Vec<f64>,
    pub rt: Vec<f64>,
}

impl Anchors {
    pub fn len(&self) -> usize {
        self.mz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz.is_empty()
    }
}

/// Select up to `settings.count` anchors from a single sample table
pub fn select_anchors(table: &SampleTable, settings: &AnchorSettings) -> Anchors {
    let mut rows = table.features.iter().collect::<Vec<_>>();
    rows.sort_by(|a, b| a.mz.total_cmp(&b.mz));

    // The first and last rows only have a single neighbor and never qualify
    let mut candidates = rows
        .windows(3)
        .filter(|w| {
            w[1].mz - w[0].mz > settings.mz_tol
                && w[2].mz - w[1].mz > settings.mz_tol
                && w[1].noise_score < settings.noise_score_tol
        })
        .map(|w| w[1])
        .collect::<Vec<_>>();

    candidates.sort_by(|a, b| b.peak_height.total_cmp(&a.peak_height));
    candidates.truncate(settings.count);

    Anchors {
        mz: candidates.iter().map(|f| f.mz).collect(),
        rt: candidates.iter().map(|f| f.rt).collect(),
    }
}

/// Index of the table whose summed peak height is the median across all
/// tables (upper median for an even number of tables)
pub fn median_intensity_table(tables: &[SampleTable]) -> Option<usize> {
    if tables.is_empty() {
        return None;
    }
    let totals = tables
        .par_iter()
        .map(SampleTable::total_intensity)
        .collect::<Vec<_>>();

    let mut order = (0..tables.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| totals[a].total_cmp(&totals[b]));
    Some(order[tables.len() / 2])
}
