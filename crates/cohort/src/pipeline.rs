//! Staged alignment of a cohort of samples:
//!
//! 1. Load every sample's feature table; missing tables are recorded as
//!    problems and their samples dropped
//! 2. Select RT anchors from the median-intensity sample
//! 3. Fold every table into the ledger, in sample order
//! 4. Select representative MS2 spectra, filter by detection rate
//! 5. Merge near-duplicate records
//! 6. Fill gaps from raw data
//! 7. Sort by intensity and assign ids

use crate::alignment::{Aligner, AlignmentParameters, RtCorrection, RtModels};
use crate::feature::Ledger;
use crate::gap_fill::{fill_gaps, GapFillReport, GapFillSettings, RawSignalLoader};
use crate::merge::{merge_features, MergeSettings};
use crate::ml::anchors::{median_intensity_table, select_anchors, AnchorSettings, Anchors};
use crate::ml::retention_alignment::RtCorrectionSettings;
use crate::sample::SampleSet;
use crate::table::{FeatureTableSource, SampleTable};
use crate::Error;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

/// Problem recorded for a sample whose feature table could not be found
pub const MISSING_TABLE: &str = "file does not exist";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    pub alignment: AlignmentParameters,
    pub anchors: AnchorSettings,
    /// RT correction is skipped if `None`
    pub rt_correction: Option<RtCorrectionSettings>,
    /// Merging is skipped if `None`
    pub merge: Option<MergeSettings>,
    /// Gap filling is skipped if `None`
    pub gap_fill: Option<GapFillSettings>,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            alignment: AlignmentParameters::default(),
            anchors: AnchorSettings::default(),
            rt_correction: Some(RtCorrectionSettings::default()),
            merge: Some(MergeSettings::default()),
            gap_fill: Some(GapFillSettings::default()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AlignmentResult {
    /// Samples that took part in the alignment, in fold order
    pub samples: SampleSet,
    pub ledger: Ledger,
    /// Fitted RT correction models, if RT correction ran
    pub rt_models: Option<RtModels>,
    /// Sample whose anchors were used for RT correction
    pub anchor_reference: Option<String>,
    /// Sample name -> problem description
    pub problems: BTreeMap<String, String>,
    pub gap_fill: Option<GapFillReport>,
}

/// Load every sample's table, dropping samples without one
fn load_tables<S: FeatureTableSource + ?Sized>(
    samples: &mut SampleSet,
    source: &S,
    problems: &mut BTreeMap<String, String>,
) -> Result<Vec<SampleTable>, Error> {
    let loaded = samples
        .names()
        .into_par_iter()
        .map(|name| {
            source
                .load(name)
                .map_err(|e| Error::FeatureTable(name.into(), e))
        })
        .collect::<Result<Vec<_>, Error>>()?;

    let mut missing = Vec::new();
    let mut tables = Vec::with_capacity(loaded.len());
    for (name, table) in samples.names().into_iter().zip(loaded) {
        match table {
            Some(mut table) => {
                table.sample = name.into();
                tables.push(table);
            }
            None => {
                log::warn!("{}: feature table not found, sample excluded", name);
                missing.push(name.to_string());
            }
        }
    }

    for name in missing {
        samples.retain(|s| s.name != name);
        problems.insert(name, MISSING_TABLE.into());
    }
    Ok(tables)
}

/// Align the feature tables of `samples`, in the order given.
///
/// `raw` is only consulted if gap filling is enabled.
pub fn align<S, L>(
    mut samples: SampleSet,
    source: &S,
    raw: &L,
    parameters: &Parameters,
) -> Result<AlignmentResult, Error>
where
    S: FeatureTableSource + ?Sized,
    L: RawSignalLoader,
{
    let start = Instant::now();
    let mut problems = BTreeMap::new();
    let tables = load_tables(&mut samples, source, &mut problems)?;
    log::info!(
        "loaded {} feature tables in {}ms",
        tables.len(),
        start.elapsed().as_millis()
    );

    let mut anchor_reference = None;
    let anchors = match parameters.rt_correction {
        Some(_) => match median_intensity_table(&tables) {
            Some(idx) => {
                let anchors = select_anchors(&tables[idx], &parameters.anchors);
                log::info!(
                    "selected {} RT anchors from {}",
                    anchors.len(),
                    tables[idx].sample
                );
                anchor_reference = Some(tables[idx].sample.clone());
                anchors
            }
            None => Anchors::default(),
        },
        None => Anchors::default(),
    };

    let correction = parameters
        .rt_correction
        .map(|settings| RtCorrection::new(&anchors, settings));
    let mut aligner = Aligner::new(samples.len(), parameters.alignment, correction);
    for (idx, table) in tables.into_iter().enumerate() {
        aligner.fold(idx, table);
    }
    let (mut ledger, rt_models) = aligner.finish();
    log::info!(
        "aligned {} samples into {} features in {}ms",
        samples.len(),
        ledger.len(),
        start.elapsed().as_millis()
    );

    ledger.select_representative_ms2();
    ledger.filter_detection_rate(&samples, parameters.alignment.detection_rate_cutoff);
    log::info!(
        "- {} features above detection rate {}",
        ledger.len(),
        parameters.alignment.detection_rate_cutoff
    );

    if let Some(settings) = &parameters.merge {
        merge_features(&mut ledger, settings);
        log::info!("- {} features after merging", ledger.len());
    }

    let gap_fill = match &parameters.gap_fill {
        Some(settings) => {
            let report = fill_gaps(&mut ledger, &samples, raw, rt_models.as_ref(), settings)?;
            log::info!(
                "- filled {} gaps, {} samples without raw data",
                report.filled,
                report.skipped.len()
            );
            Some(report)
        }
        None => None,
    };

    ledger.finalize();
    log::info!(
        "finished alignment of {} features in {}ms",
        ledger.len(),
        start.elapsed().as_millis()
    );

    Ok(AlignmentResult {
        samples,
        ledger,
        rt_models,
        anchor_reference,
        problems,
        gap_fill,
    })
}
