//! Raw MS1 data stored as `<directory>/<sample>.mzML`

use crate::mzml::MzMLReader;
use cohort_core::eic::Ms1Run;
use cohort_core::gap_fill::RawSignalLoader;
use cohort_core::BoxError;
use std::path::{Path, PathBuf};

const EXTENSIONS: [&str; 4] = ["mzML", "mzml", "mzML.gz", "mzml.gz"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawDirectory {
    pub directory: PathBuf,
}

impl RawDirectory {
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Locate the raw data file of `sample`, if any
    pub fn path(&self, sample: &str) -> Option<PathBuf> {
        EXTENSIONS
            .iter()
            .map(|ext| self.directory.join(format!("{}.{}", sample, ext)))
            .find(|path| path.exists())
    }
}

pub fn read_ms1_run<P: AsRef<Path>>(path: P) -> Result<Ms1Run, crate::Error> {
    let reader = crate::open(path)?;
    Ok(MzMLReader::parse_ms1_run(reader)?)
}

impl RawSignalLoader for RawDirectory {
    type Signal = Ms1Run;

    fn load(&self, sample: &str) -> Result<Option<Ms1Run>, BoxError> {
        let path = match self.path(sample) {
            Some(path) => path,
            None => return Ok(None),
        };
        let run = read_ms1_run(&path)?;
        log::trace!("- read {} MS1 scans from {}", run.len(), path.display());
        Ok(Some(run))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn missing_raw_file() {
        let raw = RawDirectory::new(std::env::temp_dir().join("cohort-no-such-directory"));
        assert!(raw.path("s1").is_none());
        assert!(raw.load("s1").unwrap().is_none());
    }
}
