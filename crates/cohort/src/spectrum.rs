use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?").expect("valid regex"));

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub mz: f64,
    pub intensity: f64,
}

/// Centroided fragmentation spectrum attached to a feature
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Ms2Spectrum {
    pub peaks: Vec<Peak>,
}

impl Ms2Spectrum {
    pub fn new(peaks: Vec<Peak>) -> Self {
        Self { peaks }
    }

    /// Parse a spectrum from text, pairing consecutive numbers as
    /// (m/z, intensity). Any delimiters are accepted, so both
    /// `100.1;2000|101.2;300` and `[[100.1, 2000.0], [101.2, 300.0]]` parse to
    /// the same spectrum. A trailing unpaired number is ignored.
    pub fn parse(s: &str) -> Self {
        let numbers = NUMBER
            .find_iter(s)
            .filter_map(|m| m.as_str().parse::<f64>().ok())
            .collect::<Vec<_>>();

        let peaks = numbers
            .chunks_exact(2)
            .map(|pair| Peak {
                mz: pair[0],
                intensity: pair[1],
            })
            .collect();
        Self { peaks }
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    /// Summed fragment intensity
    pub fn total_intensity(&self) -> f64 {
        self.peaks.iter().map(|p| p.intensity).sum()
    }
}

impl std::fmt::Display for Ms2Spectrum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (idx, peak) in self.peaks.iter().enumerate() {
            if idx > 0 {
                f.write_str("|")?;
            }
            write!(f, "{:.4};{:.0}", peak.mz, peak.intensity)?;
        }
        Ok(())
    }
}
