//! Forced re-extraction of signal for samples where a consensus feature was
//! not detected.
//!
//! Gap filling is best-effort: a sample without raw data is skipped, and its
//! gaps remain zero-filled.

use crate::alignment::RtModels;
use crate::eic::{Eic, Ms1Run};
use crate::feature::{Ledger, GAP_FILLED};
use crate::ml::retention_alignment::RtModel;
use crate::sample::SampleSet;
use crate::{BoxError, Error};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Handle to the raw signal of a single sample
pub trait RawSignal {
    /// Extract the chromatogram at `mz` (within `mz_tol`) for every scan
    /// within `rt_window` of `rt`. An empty chromatogram means no signal.
    fn extract_eic(&self, mz: f64, rt: f64, mz_tol: f64, rt_window: f64) -> Eic;

    /// Map the handle's time axis through `model`, in place
    fn apply_rt_model(&mut self, model: &RtModel);
}

/// Opens raw signal handles, keyed by sample name
pub trait RawSignalLoader: Sync {
    type Signal: RawSignal;

    /// Returns `Ok(None)` if no raw data exists for `sample`
    fn load(&self, sample: &str) -> Result<Option<Self::Signal>, BoxError>;
}

/// A loader that never has any raw data
pub struct NoRawData;

impl RawSignalLoader for NoRawData {
    type Signal = Ms1Run;

    fn load(&self, _: &str) -> Result<Option<Ms1Run>, BoxError> {
        Ok(None)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GapFillSettings {
    pub mz_tol: f64,
    /// Half-width of the extraction window around the consensus RT
    pub rt_window: f64,
}

impl Default for GapFillSettings {
    fn default() -> Self {
        Self {
            mz_tol: 0.01,
            rt_window: 0.05,
        }
    }
}

/// Values re-extracted for a single (record, sample) slot
#[derive(Copy, Clone, Debug, PartialEq)]
struct Filled {
    record: usize,
    peak_height: f64,
    peak_area: f64,
    top_average: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GapFillReport {
    /// Number of slots that received re-extracted values
    pub filled: usize,
    /// Samples with gaps, but without raw data
    pub skipped: Vec<String>,
}

/// Re-extract signal for every gap in `ledger`, then compute
/// `detection_rate_gap_filled` for every record.
///
/// Samples are processed in parallel. Each sample's raw data is opened once,
/// and the extracted values are written into the ledger afterwards.
pub fn fill_gaps<L: RawSignalLoader>(
    ledger: &mut Ledger,
    samples: &SampleSet,
    loader: &L,
    rt_models: Option<&RtModels>,
    settings: &GapFillSettings,
) -> Result<GapFillReport, Error> {
    let features = ledger.features();
    let work = (0..samples.len())
        .map(|sample| {
            let gaps = features
                .iter()
                .enumerate()
                .filter(|(_, f)| f.is_gap(sample))
                .map(|(idx, _)| idx)
                .collect::<Vec<_>>();
            (sample, gaps)
        })
        .filter(|(_, gaps)| !gaps.is_empty())
        .collect::<Vec<_>>();

    let extracted = work
        .into_par_iter()
        .map(|(sample, gaps)| {
            let name = samples.name(sample);
            let mut signal = match loader.load(name) {
                Ok(Some(signal)) => signal,
                Ok(None) => return Ok((sample, None)),
                Err(e) => return Err(Error::RawSignal(name.into(), e)),
            };

            if let Some(Some(model)) = rt_models.and_then(|models| models.get(name)) {
                signal.apply_rt_model(model);
            }

            let filled = gaps
                .into_iter()
                .filter_map(|record| {
                    let f = &features[record];
                    let eic = signal.extract_eic(f.mz, f.rt, settings.mz_tol, settings.rt_window);
                    if eic.is_empty() {
                        return None;
                    }
                    Some(Filled {
                        record,
                        peak_height: eic.peak_height(),
                        peak_area: eic.trapezoid_area(),
                        top_average: eic.top_average(),
                    })
                })
                .collect::<Vec<_>>();
            log::trace!("- {}: filled {} gaps", name, filled.len());
            Ok((sample, Some(filled)))
        })
        .collect::<Result<Vec<_>, Error>>()?;

    let mut report = GapFillReport::default();
    let features = ledger.features_mut();
    for (sample, filled) in extracted {
        let filled = match filled {
            Some(filled) => filled,
            None => {
                log::warn!(
                    "{}: no raw data available, gaps left unfilled",
                    samples.name(sample)
                );
                report.skipped.push(samples.name(sample).into());
                continue;
            }
        };
        report.filled += filled.len();
        for slot in filled {
            let f = &mut features[slot.record];
            f.feature_ids[sample] = GAP_FILLED;
            f.peak_heights[sample] = slot.peak_height;
            f.peak_areas[sample] = slot.peak_area;
            f.top_averages[sample] = slot.top_average;
        }
    }

    ledger.update_detection_rate_gap_filled(samples);
    Ok(report)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::feature::{AlignedFeature, NOT_DETECTED};
    use crate::sample::Sample;
    use crate::table::SampleFeature;
    use std::collections::HashMap;

    /// A fixed chromatogram, returned whatever the extraction window
    impl RawSignal for Eic {
        fn extract_eic(&self, _: f64, _: f64, _: f64, _: f64) -> Eic {
            self.clone()
        }

        fn apply_rt_model(&mut self, model: &RtModel) {
            model.apply(&mut self.rt);
        }
    }

    struct Loader(HashMap<&'static str, Eic>);

    impl RawSignalLoader for Loader {
        type Signal = Eic;

        fn load(&self, sample: &str) -> Result<Option<Eic>, BoxError> {
            Ok(self.0.get(sample).cloned())
        }
    }

    struct Broken;

    impl RawSignalLoader for Broken {
        type Signal = Eic;

        fn load(&self, _: &str) -> Result<Option<Eic>, BoxError> {
            Err("truncated file".into())
        }
    }

    fn ledger() -> (SampleSet, Ledger) {
        let samples = ["a", "b", "c"].iter().map(|&s| Sample::new(s)).collect();
        let row = SampleFeature {
            id: 4,
            mz: 200.1,
            rt: 5.0,
            peak_height: 100.0,
            ..Default::default()
        };
        let mut ledger = Ledger::new(3);
        ledger.push(AlignedFeature::seed(3, 0, &row));
        (samples, ledger)
    }

    #[test]
    fn fills_and_skips() {
        let (samples, mut ledger) = ledger();
        let mut signals = HashMap::new();
        signals.insert("b", Eic::new(vec![4.98, 5.0, 5.02], vec![3.0, 9.0, 6.0]));
        let report = fill_gaps(
            &mut ledger,
            &samples,
            &Loader(signals),
            None,
            &GapFillSettings::default(),
        )
        .unwrap();

        assert_eq!(report.filled, 1);
        assert_eq!(report.skipped, vec!["c".to_string()]);
        let f = &ledger.features()[0];
        assert_eq!(f.feature_ids, vec![4, GAP_FILLED, NOT_DETECTED]);
        assert_eq!(f.peak_heights, vec![100.0, 9.0, 0.0]);
        assert!((f.top_averages[1] - 6.0).abs() < 1e-9);
        assert!((f.detection_rate_gap_filled - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_eic_is_not_a_fill() {
        let (samples, mut ledger) = ledger();
        let mut signals = HashMap::new();
        signals.insert("b", Eic::default());
        signals.insert("c", Eic::default());
        let report = fill_gaps(
            &mut ledger,
            &samples,
            &Loader(signals),
            None,
            &GapFillSettings::default(),
        )
        .unwrap();
        assert_eq!(report.filled, 0);
        assert!(report.skipped.is_empty());
        assert!(ledger.features()[0].is_gap(1));
    }

    #[test]
    fn model_applied_before_extraction() {
        let (samples, mut ledger) = ledger();
        let mut signals = HashMap::new();
        signals.insert("b", Eic::new(vec![1.0, 2.0], vec![1.0, 1.0]));
        let mut models = RtModels::new();
        models.insert(
            "b".into(),
            RtModel::from_knots(vec![0.0, 1.0], vec![0.0, 2.0]),
        );
        models.insert("c".into(), None);
        fill_gaps(
            &mut ledger,
            &samples,
            &Loader(signals),
            Some(&models),
            &GapFillSettings::default(),
        )
        .unwrap();
        // Time axis doubled before integration: (4 - 2) * 1
        assert_eq!(ledger.features()[0].peak_areas[1], 2.0);
    }

    #[test]
    fn without_raw_data_every_gap_is_skipped() {
        let (samples, mut ledger) = ledger();
        let report = fill_gaps(
            &mut ledger,
            &samples,
            &NoRawData,
            None,
            &GapFillSettings::default(),
        )
        .unwrap();
        assert_eq!(report.filled, 0);
        assert_eq!(report.skipped, vec!["b".to_string(), "c".to_string()]);
        assert!((ledger.features()[0].detection_rate_gap_filled - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn unreadable_raw_data_is_an_error() {
        let (samples, mut ledger) = ledger();
        let err = fill_gaps(
            &mut ledger,
            &samples,
            &Broken,
            None,
            &GapFillSettings::default(),
        );
        assert!(matches!(err, Err(Error::RawSignal(_, _))));
    }
}
