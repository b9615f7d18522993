//! Collapse near-duplicate consensus features.
//!
//! Records are chained by m/z (each record within tolerance of its
//! predecessor), and every m/z chain is then split into chains by RT. Each
//! resulting cluster becomes a single record.

use crate::feature::{AlignedFeature, Ledger};
use crate::util::chained_runs;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MergeSettings {
    pub mz_tol: f64,
    pub rt_tol: f64,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            mz_tol: 0.01,
            rt_tol: 0.02,
        }
    }
}

/// Merge a cluster into its most intense member. Peak heights, areas, and
/// top-3 averages become the per-sample maximum across the cluster; every
/// other field is taken from the representative as-is.
fn collapse(mut cluster: Vec<AlignedFeature>) -> AlignedFeature {
    let mut best = 0;
    for (idx, f) in cluster.iter().enumerate() {
        if f.highest_intensity > cluster[best].highest_intensity {
            best = idx;
        }
    }
    let mut representative = cluster.swap_remove(best);

    for other in &cluster {
        let columns = [
            (&mut representative.peak_heights, &other.peak_heights),
            (&mut representative.peak_areas, &other.peak_areas),
            (&mut representative.top_averages, &other.top_averages),
        ];
        for (into, from) in columns {
            into.iter_mut()
                .zip(from.iter())
                .for_each(|(a, b)| *a = a.max(*b));
        }
    }
    representative
}

/// Merge clusters of records whose consensus m/z and RT are chained within
/// tolerance. The ledger is re-sorted by intensity afterwards.
pub fn merge_features(ledger: &mut Ledger, settings: &MergeSettings) {
    let n_samples = ledger.n_samples();
    let before = ledger.len();
    let mut features = std::mem::replace(ledger, Ledger::new(n_samples)).into_features();
    features.sort_by(|a, b| a.mz.total_cmp(&b.mz));

    for mut chain in chained_runs(features, |f| f.mz, settings.mz_tol) {
        chain.sort_by(|a, b| a.rt.total_cmp(&b.rt));
        for cluster in chained_runs(chain, |f| f.rt, settings.rt_tol) {
            ledger.push(collapse(cluster));
        }
    }
    ledger.sort_by_intensity();

    log::trace!("- merged {} records into {}", before, ledger.len());
}
