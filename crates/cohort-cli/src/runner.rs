use crate::input::Settings;
use anyhow::Context;
use cohort_core::gap_fill::NoRawData;
use cohort_core::pipeline::{align, AlignmentResult};
use cohort_io::{FeatureDirectory, RawDirectory};
use log::info;
use std::path::PathBuf;
use std::time::Instant;

pub struct Runner {
    pub settings: Settings,
    start: Instant,
}

impl Runner {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            start: Instant::now(),
        }
    }

    // Create a path for `file_name` in the output directory
    pub(crate) fn make_path<S: AsRef<str>>(&self, file_name: S) -> PathBuf {
        self.settings.output_directory.join(file_name.as_ref())
    }

    fn align(&self) -> anyhow::Result<AlignmentResult> {
        let source = FeatureDirectory::new(&self.settings.feature_directory);
        let samples = self.settings.samples.clone();
        let parameters = &self.settings.parameters;
        let result = match &self.settings.raw_directory {
            Some(raw) => align(samples, &source, &RawDirectory::new(raw), parameters),
            None => align(samples, &source, &NoRawData, parameters),
        };
        result.context("Failed to align feature tables")
    }

    /// Align every sample, write all outputs, and return the resolved
    /// settings, including output paths and problems
    pub fn run(mut self) -> anyhow::Result<Settings> {
        let result = self.align()?;

        info!(
            "aligned {} features across {} samples",
            result.ledger.len(),
            result.samples.len()
        );
        log::trace!("writing outputs");

        let path = self.write_features(&result.ledger, &result.samples)?;
        self.settings.output_paths.push(path);

        if let Some(models) = &result.rt_models {
            let path = self.write_rt_models(models)?;
            self.settings.output_paths.push(path);
        }

        if let Some(msp) = self.settings.msp.clone() {
            let path = self.write_msp(&result.ledger, &msp)?;
            self.settings.output_paths.push(path);
        }

        self.settings.samples = result.samples;
        self.settings.problems = result.problems;

        let path = self.make_path("results.json");
        self.settings.output_paths.push(path.display().to_string());
        println!("{}", serde_json::to_string_pretty(&self.settings)?);

        let bytes = serde_json::to_vec_pretty(&self.settings)?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;

        let run_time = (Instant::now() - self.start).as_secs();
        info!("finished in {}s", run_time);
        Ok(self.settings)
    }
}
