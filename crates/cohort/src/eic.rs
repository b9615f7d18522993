//! Extracted-ion chromatograms, and an in-memory MS1 run to extract them from

use crate::gap_fill::RawSignal;
use crate::ml::retention_alignment::RtModel;
use crate::util::binary_search_slice;
use serde::{Deserialize, Serialize};

/// Intensity over time at a fixed m/z window
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Eic {
    pub rt: Vec<f64>,
    pub intensity: Vec<f64>,
}

impl Eic {
    pub fn new(rt: Vec<f64>, intensity: Vec<f64>) -> Self {
        debug_assert_eq!(rt.len(), intensity.len());
        Self { rt, intensity }
    }

    pub fn len(&self) -> usize {
        self.intensity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intensity.is_empty()
    }

    pub fn peak_height(&self) -> f64 {
        self.intensity.iter().copied().fold(0.0, f64::max)
    }

    /// Trapezoidal integral of intensity over time, truncated towards zero
    pub fn trapezoid_area(&self) -> f64 {
        let area = self
            .rt
            .windows(2)
            .zip(self.intensity.windows(2))
            .map(|(t, y)| (t[1] - t[0]) * (y[0] + y[1]) / 2.0)
            .sum::<f64>();
        area.trunc()
    }

    /// Mean of the three most intense points (or of all points, if fewer)
    pub fn top_average(&self) -> f64 {
        if self.intensity.is_empty() {
            return 0.0;
        }
        let mut sorted = self.intensity.clone();
        sorted.sort_by(|a, b| b.total_cmp(a));
        let top = &sorted[..sorted.len().min(3)];
        top.iter().sum::<f64>() / top.len() as f64
    }
}

/// A centroided MS1 scan. `mz` is sorted in ascending order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ms1Scan {
    pub rt: f64,
    pub mz: Vec<f64>,
    pub intensity: Vec<f64>,
}

impl Ms1Scan {
    /// Build a scan, sorting the centroids by m/z
    pub fn new(rt: f64, mz: Vec<f64>, intensity: Vec<f64>) -> Self {
        let mut peaks = mz.into_iter().zip(intensity).collect::<Vec<_>>();
        peaks.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (mz, intensity) = peaks.into_iter().unzip();
        Self { rt, mz, intensity }
    }

    /// Most intense centroid strictly within `tol` of `mz`, or 0
    pub fn most_intense(&self, mz: f64, tol: f64) -> f64 {
        let (lo, hi) = binary_search_slice(
            &self.mz,
            |a: &f64, b: &f64| a.total_cmp(b),
            mz - tol,
            mz + tol,
        );
        self.mz[lo..hi]
            .iter()
            .zip(&self.intensity[lo..hi])
            .filter(|(m, _)| (*m - mz).abs() < tol)
            .map(|(_, &i)| i)
            .fold(0.0, f64::max)
    }
}

/// All MS1 scans of a single run, in acquisition order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ms1Run {
    pub scans: Vec<Ms1Scan>,
}

impl Ms1Run {
    pub fn new(scans: Vec<Ms1Scan>) -> Self {
        Self { scans }
    }

    pub fn len(&self) -> usize {
        self.scans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }
}

impl RawSignal for Ms1Run {
    fn extract_eic(&self, mz: f64, rt: f64, mz_tol: f64, rt_window: f64) -> Eic {
        let (rt, intensity) = self
            .scans
            .iter()
            .filter(|scan| (scan.rt - rt).abs() <= rt_window)
            .map(|scan| (scan.rt, scan.most_intense(mz, mz_tol)))
            .unzip();
        Eic { rt, intensity }
    }

    fn apply_rt_model(&mut self, model: &RtModel) {
        for scan in self.scans.iter_mut() {
            scan.rt = model.predict(scan.rt);
        }
    }
}
