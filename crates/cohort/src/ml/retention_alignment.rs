//! Retention time correction through piecewise-linear time warping
//!
//! * Locate every reference anchor in the target sample. Only anchors with
//!   exactly one candidate within both tolerances are used.
//! * Discard anchors whose RT residual is more than one standard deviation
//!   away from the mean residual (single pass).
//! * Interpolate linearly between the surviving (target RT, reference RT)
//!   pairs, anchored at the origin, and extrapolate beyond them.

use super::anchors::Anchors;
use serde::{Deserialize, Serialize};

/// Minimum number of anchors that must survive matching & outlier removal
pub const MIN_ANCHORS: usize = 5;
/// Minimum RT spacing between consecutive interpolation knots
pub const MIN_KNOT_SPACING: f64 = 0.1;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RtCorrectionSettings {
    /// m/z tolerance used to locate anchors in a target sample
    pub mz_tol: f64,
    /// RT tolerance used to locate anchors in a target sample
    pub rt_tol: f64,
}

impl Default for RtCorrectionSettings {
    fn default() -> Self {
        Self {
            mz_tol: 0.01,
            rt_tol: 0.5,
        }
    }
}

/// Piecewise-linear map from a sample's RT axis onto the reference RT axis.
/// Deserialized models are checked with [`RtModel::from_knots`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Knots")]
pub struct RtModel {
    /// Strictly increasing knots on the sample's RT axis
    x: Vec<f64>,
    /// Reference RT at each knot
    y: Vec<f64>,
}

#[derive(Deserialize)]
struct Knots {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl TryFrom<Knots> for RtModel {
    type Error = String;

    fn try_from(knots: Knots) -> Result<Self, Self::Error> {
        Self::from_knots(knots.x, knots.y).ok_or_else(|| {
            "RT model needs at least two finite knots with strictly increasing x".into()
        })
    }
}

impl RtModel {
    /// Build a model from knots. Returns `None` if there are fewer than two
    /// knots, the vectors differ in length, any value is non-finite, or `x`
    /// is not strictly increasing.
    pub fn from_knots(x: Vec<f64>, y: Vec<f64>) -> Option<Self> {
        if x.len() < 2 || x.len() != y.len() {
            return None;
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return None;
        }
        if x.windows(2).any(|w| w[1] <= w[0]) {
            return None;
        }
        Some(Self { x, y })
    }

    pub fn knots(&self) -> (&[f64], &[f64]) {
        (&self.x, &self.y)
    }

    /// Map a single retention time onto the reference axis
    pub fn predict(&self, rt: f64) -> f64 {
        let n = self.x.len();
        // Segment [k-1, k] containing `rt`; the outermost segments are used
        // for extrapolation
        let k = self.x.partition_point(|&x| x <= rt).clamp(1, n - 1);
        let (x0, x1) = (self.x[k - 1], self.x[k]);
        let (y0, y1) = (self.y[k - 1], self.y[k]);
        y0 + (rt - x0) * (y1 - y0) / (x1 - x0)
    }

    /// Correct retention times in place
    pub fn apply(&self, rts: &mut [f64]) {
        rts.iter_mut().for_each(|rt| *rt = self.predict(*rt));
    }

    /// Fit a correction model for a target sample, given the reference
    /// `anchors` and the target's feature coordinates.
    ///
    /// Returns `None` if fewer than [`MIN_ANCHORS`] anchors can be matched
    /// unambiguously, if fewer than [`MIN_ANCHORS`] survive outlier removal,
    /// or if the resulting knots are degenerate.
    pub fn fit(
        anchors: &Anchors,
        mz: &[f64],
        rt: &[f64],
        settings: &RtCorrectionSettings,
    ) -> Option<Self> {
        if anchors.is_empty() || mz.is_empty() {
            return None;
        }

        // (reference RT, matched target RT)
        let mut matched = Vec::with_capacity(anchors.len());
        for (&mz_ref, &rt_ref) in anchors.mz.iter().zip(anchors.rt.iter()) {
            let mut hits = mz.iter().zip(rt.iter()).filter(|&(&m, &r)| {
                (m - mz_ref).abs() < settings.mz_tol && (r - rt_ref).abs() < settings.rt_tol
            });
            if let (Some((_, &r)), None) = (hits.next(), hits.next()) {
                matched.push((rt_ref, r));
            }
        }

        if matched.len() < MIN_ANCHORS {
            log::trace!("- only {} anchors matched", matched.len());
            return None;
        }

        let residuals = matched.iter().map(|(r, m)| r - m).collect::<Vec<_>>();
        let mean = super::mean(&residuals);
        let std = super::std(&residuals);
        let mut kept = matched
            .into_iter()
            .zip(residuals)
            .filter(|(_, v)| (v - mean).abs() < std)
            .map(|(pair, _)| pair)
            .collect::<Vec<_>>();

        if kept.len() < MIN_ANCHORS {
            log::trace!("- only {} anchors survived outlier removal", kept.len());
            return None;
        }

        kept.sort_by(|a, b| a.1.total_cmp(&b.1));

        let mut x = vec![0.0];
        let mut y = vec![0.0];
        for (reference, target) in kept {
            if target - x[x.len() - 1] > MIN_KNOT_SPACING {
                x.push(target);
                y.push(reference);
            }
        }

        Self::from_knots(x, y)
    }
}

/// Fit a correction model and apply it to `rt`. If no model can be fit, the
/// retention times are returned unmodified.
pub fn retention_time_correction(
    anchors: &Anchors,
    mz: &[f64],
    rt: &[f64],
    settings: &RtCorrectionSettings,
) -> (Vec<f64>, Option<RtModel>) {
    let mut corrected = rt.to_vec();
    let model = RtModel::fit(anchors, mz, rt, settings);
    if let Some(model) = &model {
        model.apply(&mut corrected);
    }
    (corrected, model)
}

#[cfg(test)]
mod test {
    use super::super::all_close;
    use super::*;

    fn anchors(n: usize) -> Anchors {
        Anchors {
            mz: (0..n).map(|i| 100.0 + 50.0 * i as f64).collect(),
            rt: (0..n).map(|i| 1.0 + 1.5 * i as f64).collect(),
        }
    }

    #[test]
    fn interpolation() {
        let model = RtModel::from_knots(vec![0.0, 1.0, 3.0], vec![0.0, 2.0, 4.0]).unwrap();
        assert_eq!(model.predict(0.5), 1.0);
        assert_eq!(model.predict(2.0), 3.0);
        assert_eq!(model.predict(1.0), 2.0);
        // Linear extrapolation on both ends
        assert_eq!(model.predict(-1.0), -2.0);
        assert_eq!(model.predict(5.0), 6.0);

        assert!(RtModel::from_knots(vec![0.0], vec![0.0]).is_none());
        assert!(RtModel::from_knots(vec![0.0, 0.0], vec![0.0, 1.0]).is_none());
        assert!(RtModel::from_knots(vec![0.0, f64::NAN], vec![0.0, 1.0]).is_none());
    }

    #[test]
    fn too_few_anchors_passthrough() {
        let a = anchors(4);
        let rt = a.rt.iter().map(|r| r + 0.1).collect::<Vec<_>>();
        let (corrected, model) =
            retention_time_correction(&a, &a.mz, &rt, &RtCorrectionSettings::default());
        assert!(model.is_none());
        assert_eq!(corrected, rt);

        let (corrected, model) =
            retention_time_correction(&Anchors::default(), &a.mz, &rt, &Default::default());
        assert!(model.is_none());
        assert_eq!(corrected, rt);
    }

    #[test]
    fn ambiguous_anchors_dropped() {
        let a = anchors(6);
        // Duplicate every target feature with a near-identical twin - no anchor
        // can be matched unambiguously
        let mut mz = a.mz.clone();
        mz.extend(a.mz.iter().map(|m| m + 0.001));
        let mut rt = a.rt.clone();
        rt.extend(a.rt.iter().map(|r| r + 0.01));
        assert!(RtModel::fit(&a, &mz, &rt, &Default::default()).is_none());
    }

    #[test]
    fn outliers_trimmed_and_fit() {
        let a = anchors(8);
        // Residuals alternate slightly around a shift of -0.2, with one outlier
        let shifts = [0.20, 0.22, 0.18, 0.21, 0.19, 0.20, 0.45, 0.20];
        let rt = a
            .rt
            .iter()
            .zip(shifts.iter())
            .map(|(r, s)| r + s)
            .collect::<Vec<_>>();

        let model = RtModel::fit(&a, &a.mz, &rt, &Default::default()).expect("model");
        let (x, y) = model.knots();
        assert_eq!(x[0], 0.0);
        assert_eq!(y[0], 0.0);
        // The outlier (index 6) is never used as a knot
        assert!(!x.contains(&rt[6]));
        assert!(x.windows(2).all(|w| w[1] - w[0] > MIN_KNOT_SPACING));

        // Knots map exactly back onto the reference axis
        let mapped = x[1..].iter().map(|&t| model.predict(t)).collect::<Vec<_>>();
        assert!(all_close(&mapped, &y[1..], 1e-9));
    }

    #[test]
    fn constant_shift_is_degenerate() {
        // Identical residuals have zero spread, so the strict one-sigma filter
        // removes all of them
        let a = anchors(8);
        let rt = a.rt.iter().map(|r| r + 0.25).collect::<Vec<_>>();
        assert!(RtModel::fit(&a, &a.mz, &rt, &Default::default()).is_none());
    }

    #[test]
    fn knots_are_spaced() {
        // Targets within 0.1 of the origin or of the previous knot are not knots
        let target = [0.1, 1.0, 1.05, 1.2, 2.0, 3.0, 4.0];
        let reference = [0.1, 1.01, 1.04, 1.2, 2.01, 2.99, 4.3];
        let a = Anchors {
            mz: (0..7).map(|i| 100.0 + 50.0 * i as f64).collect(),
            rt: reference.to_vec(),
        };

        // The last anchor is the only residual outlier
        let model = RtModel::fit(&a, &a.mz, &target, &Default::default()).expect("model");
        let (x, y) = model.knots();
        assert_eq!(x, &[0.0, 1.0, 1.2, 2.0, 3.0]);
        assert_eq!(y, &[0.0, 1.01, 1.2, 2.01, 2.99]);
    }

    #[test]
    fn invalid_knots_rejected_on_load() {
        for json in [
            r#"{"x":[0.0],"y":[0.0]}"#,
            r#"{"x":[],"y":[]}"#,
            r#"{"x":[0.0,5.0,2.0],"y":[0.0,5.0,2.0]}"#,
            r#"{"x":[0.0,1.0],"y":[0.0]}"#,
        ] {
            assert!(serde_json::from_str::<RtModel>(json).is_err(), "{}", json);
        }
        let model: RtModel = serde_json::from_str(r#"{"x":[0.0,2.0],"y":[0.0,4.0]}"#).unwrap();
        assert_eq!(model.predict(1.0), 2.0);
    }

    #[test]
    fn model_serializes() {
        let model = RtModel::from_knots(vec![0.0, 1.2, 3.4], vec![0.0, 1.0, 3.5]).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        let back: RtModel = serde_json::from_str(&json).unwrap();
        assert_eq!(model, back);
    }
}
