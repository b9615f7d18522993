//! Tab-separated per-sample feature tables

use cohort_core::spectrum::Ms2Spectrum;
use cohort_core::table::{FeatureTableSource, SampleFeature, SampleTable};
use cohort_core::BoxError;
use serde::{Deserialize, Deserializer};
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum TableError {
    IO(std::io::Error),
    Csv(csv::Error),
}

impl std::fmt::Display for TableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableError::IO(e) => write!(f, "IO error {}", e),
            TableError::Csv(e) => write!(f, "malformed row {}", e),
        }
    }
}

impl std::error::Error for TableError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TableError::IO(e) => Some(e),
            TableError::Csv(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for TableError {
    fn from(residual: std::io::Error) -> Self {
        Self::IO(residual)
    }
}

impl From<csv::Error> for TableError {
    fn from(residual: csv::Error) -> Self {
        Self::Csv(residual)
    }
}

/// Booleans are written either as `True`/`False` or `1`/`0`
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(matches!(
        value.as_deref().map(str::trim),
        Some("True" | "true" | "TRUE" | "1")
    ))
}

#[derive(Deserialize)]
struct Row {
    #[serde(rename = "feature_ID")]
    id: i64,
    #[serde(rename = "m/z")]
    mz: f64,
    #[serde(rename = "RT")]
    rt: f64,
    #[serde(default)]
    scan_idx: usize,
    peak_height: f64,
    #[serde(default)]
    peak_area: Option<f64>,
    #[serde(default)]
    top_average: Option<f64>,
    #[serde(default)]
    total_scans: usize,
    #[serde(rename = "Gaussian_similarity", default)]
    gaussian_similarity: Option<f64>,
    #[serde(default)]
    noise_score: Option<f64>,
    #[serde(default)]
    asymmetry_factor: Option<f64>,
    #[serde(rename = "MS2", default)]
    ms2: Option<String>,
    #[serde(default)]
    sse: Option<f64>,
    #[serde(default, deserialize_with = "flag")]
    is_segmented: bool,
}

impl From<Row> for SampleFeature {
    fn from(row: Row) -> Self {
        SampleFeature {
            id: row.id,
            mz: row.mz,
            rt: row.rt,
            scan_idx: row.scan_idx,
            peak_height: row.peak_height,
            peak_area: row.peak_area.unwrap_or_default(),
            top_average: row.top_average.unwrap_or_default(),
            total_scans: row.total_scans,
            gaussian_similarity: row.gaussian_similarity.unwrap_or_default(),
            noise_score: row.noise_score.unwrap_or_default(),
            asymmetry_factor: row.asymmetry_factor.unwrap_or_default(),
            sse: row.sse.unwrap_or_default(),
            is_segmented: row.is_segmented,
            ms2: row
                .ms2
                .filter(|s| !s.trim().is_empty())
                .map(|s| Ms2Spectrum::parse(&s)),
        }
    }
}

/// Parse a tab-separated feature table for `sample`
pub fn parse_feature_table<R: Read>(sample: &str, reader: R) -> Result<SampleTable, TableError> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_reader(reader);

    let features = rdr
        .deserialize::<Row>()
        .map(|row| row.map(SampleFeature::from))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SampleTable::new(sample, features))
}

pub fn read_feature_table<P: AsRef<Path>>(
    sample: &str,
    path: P,
) -> Result<SampleTable, TableError> {
    let reader = crate::open(path)?;
    parse_feature_table(sample, reader)
}

/// Feature tables stored as `<directory>/<sample>.txt`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatureDirectory {
    pub directory: PathBuf,
    pub extension: String,
}

impl FeatureDirectory {
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
            extension: "txt".into(),
        }
    }

    pub fn path(&self, sample: &str) -> PathBuf {
        self.directory
            .join(format!("{}.{}", sample, self.extension))
    }
}

impl FeatureTableSource for FeatureDirectory {
    fn load(&self, sample: &str) -> Result<Option<SampleTable>, BoxError> {
        let path = self.path(sample);
        if !path.exists() {
            return Ok(None);
        }
        let table = read_feature_table(sample, &path)?;
        log::trace!("- read {} features from {}", table.len(), path.display());
        Ok(Some(table))
    }
}
