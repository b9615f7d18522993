use anyhow::{ensure, Context};
use clap::{value_parser, Arg, ArgMatches, Command, ValueHint};
use cohort_core::alignment::AlignmentParameters;
use cohort_core::gap_fill::GapFillSettings;
use cohort_core::merge::MergeSettings;
use cohort_core::ml::anchors::AnchorSettings;
use cohort_core::ml::retention_alignment::RtCorrectionSettings;
use cohort_core::pipeline::Parameters;
use cohort_core::sample::{Sample, SampleSet};
use cohort_io::FeatureDirectory;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Per-sample value reported in the aligned feature table
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantMethod {
    #[default]
    PeakHeight,
    PeakArea,
    TopAverage,
}

impl std::str::FromStr for QuantMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "peak_height" | "height" => Ok(Self::PeakHeight),
            "peak_area" | "area" => Ok(Self::PeakArea),
            "top_average" => Ok(Self::TopAverage),
            _ => anyhow::bail!(
                "unknown quantification method `{s}`, expected one of `peak_height`, `peak_area`, `top_average`"
            ),
        }
    }
}

#[derive(Serialize)]
/// Actual alignment settings - may include overrides or default values not set by user
pub struct Settings {
    pub version: String,
    pub samples: SampleSet,
    pub feature_directory: PathBuf,
    pub raw_directory: Option<PathBuf>,
    pub parameters: Parameters,
    pub quant: QuantMethod,
    pub msp: Option<String>,
    pub output_paths: Vec<String>,
    pub problems: BTreeMap<String, String>,

    #[serde(skip_serializing)]
    pub output_directory: PathBuf,
}

/// Samples are listed either by name, or with their metadata
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum SampleEntry {
    Name(String),
    Sample(Sample),
}

impl From<SampleEntry> for Sample {
    fn from(entry: SampleEntry) -> Self {
        match entry {
            SampleEntry::Name(name) => Sample::new(name),
            SampleEntry::Sample(sample) => sample,
        }
    }
}

#[derive(Deserialize, Default, Debug)]
/// Input alignment parameters deserialized from JSON file
pub struct Input {
    samples: Option<Vec<SampleEntry>>,
    feature_directory: Option<String>,
    raw_directory: Option<String>,
    output_directory: Option<String>,
    alignment: Option<AlignmentOptions>,
    rt_correction: Option<RtCorrectionOptions>,
    merge: Option<MergeOptions>,
    gap_fill: Option<GapFillOptions>,
    quant: Option<QuantMethod>,
    msp: Option<String>,
}

#[derive(Serialize, Deserialize, Default, Debug)]
pub struct AlignmentOptions {
    mz_tol: Option<f64>,
    rt_tol: Option<f64>,
    scan_number_cutoff: Option<usize>,
    ms1_abs_int_tol: Option<f64>,
    detection_rate_cutoff: Option<f64>,
}

impl From<AlignmentOptions> for AlignmentParameters {
    fn from(value: AlignmentOptions) -> Self {
        let default = AlignmentParameters::default();
        let mut parameters = AlignmentParameters {
            mz_tol: value.mz_tol.unwrap_or(default.mz_tol).abs(),
            rt_tol: value.rt_tol.unwrap_or(default.rt_tol).abs(),
            scan_number_cutoff: value
                .scan_number_cutoff
                .unwrap_or(default.scan_number_cutoff),
            ms1_abs_int_tol: value.ms1_abs_int_tol.unwrap_or(default.ms1_abs_int_tol).abs(),
            detection_rate_cutoff: value
                .detection_rate_cutoff
                .unwrap_or(default.detection_rate_cutoff),
        };
        if parameters.mz_tol > 0.05 {
            log::warn!("alignment.mz_tol is higher than expected");
        }
        if parameters.rt_tol > 1.0 {
            log::warn!("alignment.rt_tol is higher than expected");
        }
        if !(0.0..1.0).contains(&parameters.detection_rate_cutoff) {
            log::warn!(
                "alignment.detection_rate_cutoff must be in [0, 1), clamping {}",
                parameters.detection_rate_cutoff
            );
            parameters.detection_rate_cutoff = parameters.detection_rate_cutoff.clamp(0.0, 0.99);
        }
        parameters
    }
}

#[derive(Serialize, Deserialize, Default, Debug)]
pub struct RtCorrectionOptions {
    enabled: Option<bool>,
    mz_tol: Option<f64>,
    rt_tol: Option<f64>,
    anchor_count: Option<usize>,
    anchor_noise_score_tol: Option<f64>,
    anchor_mz_tol: Option<f64>,
}

impl RtCorrectionOptions {
    fn anchors(&self) -> AnchorSettings {
        let default = AnchorSettings::default();
        let anchors = AnchorSettings {
            count: self.anchor_count.unwrap_or(default.count),
            noise_score_tol: self.anchor_noise_score_tol.unwrap_or(default.noise_score_tol),
            mz_tol: self.anchor_mz_tol.unwrap_or(default.mz_tol).abs(),
        };
        if anchors.count < cohort_core::ml::retention_alignment::MIN_ANCHORS {
            log::warn!(
                "rt_correction.anchor_count is lower than the number of anchors needed to fit a model"
            );
        }
        anchors
    }

    fn settings(&self) -> Option<RtCorrectionSettings> {
        if !self.enabled.unwrap_or(true) {
            return None;
        }
        let default = RtCorrectionSettings::default();
        Some(RtCorrectionSettings {
            mz_tol: self.mz_tol.unwrap_or(default.mz_tol).abs(),
            rt_tol: self.rt_tol.unwrap_or(default.rt_tol).abs(),
        })
    }
}

#[derive(Serialize, Deserialize, Default, Debug)]
pub struct MergeOptions {
    enabled: Option<bool>,
    mz_tol: Option<f64>,
    rt_tol: Option<f64>,
}

impl MergeOptions {
    fn settings(&self) -> Option<MergeSettings> {
        if !self.enabled.unwrap_or(true) {
            return None;
        }
        let default = MergeSettings::default();
        Some(MergeSettings {
            mz_tol: self.mz_tol.unwrap_or(default.mz_tol).abs(),
            rt_tol: self.rt_tol.unwrap_or(default.rt_tol).abs(),
        })
    }
}

#[derive(Serialize, Deserialize, Default, Debug)]
pub struct GapFillOptions {
    enabled: Option<bool>,
    mz_tol: Option<f64>,
    rt_window: Option<f64>,
}

impl GapFillOptions {
    fn settings(&self) -> Option<GapFillSettings> {
        if !self.enabled.unwrap_or(true) {
            return None;
        }
        let default = GapFillSettings::default();
        let settings = GapFillSettings {
            mz_tol: self.mz_tol.unwrap_or(default.mz_tol).abs(),
            rt_window: self.rt_window.unwrap_or(default.rt_window).abs(),
        };
        if settings.rt_window > 0.5 {
            log::warn!("gap_fill.rt_window is higher than expected");
        }
        Some(settings)
    }
}

/// Command line interface of the `cohort` binary
pub fn command() -> Command {
    Command::new("cohort")
        .version(clap::crate_version!())
        .author("Cohort developers")
        .about("Align LC-MS features across a cohort of samples")
        .arg(
            Arg::new("parameters")
                .required(true)
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Path to configuration parameters (JSON file)")
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("samples")
                .num_args(1..)
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Names of the samples to align, in alignment order. Overrides samples \
                     listed in the configuration file.",
                )
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("feature_directory")
                .short('f')
                .long("feature_directory")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Directory holding one `<sample>.txt` feature table per sample. \
                     Overrides the directory specified in the configuration file.",
                )
                .value_hint(ValueHint::DirPath),
        )
        .arg(
            Arg::new("raw_directory")
                .short('r')
                .long("raw_directory")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Directory holding one `<sample>.mzML` file per sample, used for gap \
                     filling. Overrides the directory specified in the configuration file.",
                )
                .value_hint(ValueHint::DirPath),
        )
        .arg(
            Arg::new("output_directory")
                .short('o')
                .long("output_directory")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path where the aligned feature table will be written. \
                     Overrides the directory specified in the configuration file.",
                )
                .value_hint(ValueHint::DirPath),
        )
        .arg(
            Arg::new("quant")
                .long("quant")
                .value_parser(["peak_height", "peak_area", "top_average"])
                .help("Per-sample value reported in the aligned feature table"),
        )
        .arg(
            Arg::new("msp")
                .long("msp")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Also write representative MS2 spectra to this `.msp` file")
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .value_parser(value_parser!(u16).range(1..))
                .help("Number of worker threads (default = # of CPUs)")
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("no-rt-correction")
                .long("no-rt-correction")
                .action(clap::ArgAction::SetTrue)
                .help("Disable retention time correction"),
        )
        .arg(
            Arg::new("no-merge")
                .long("no-merge")
                .action(clap::ArgAction::SetTrue)
                .help("Disable merging of near-duplicate features"),
        )
        .arg(
            Arg::new("no-gap-fill")
                .long("no-gap-fill")
                .action(clap::ArgAction::SetTrue)
                .help("Disable gap filling from raw data"),
        )
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Written by {author-with-newline}Version {version}\n\n\
             {all-args}{after-help}",
        )
}

impl Input {
    pub fn from_arguments(matches: ArgMatches) -> anyhow::Result<Self> {
        let path = matches
            .get_one::<String>("parameters")
            .context("missing required `parameters` argument")?;
        let mut input = Input::load(path)
            .with_context(|| format!("Failed to read parameters from `{path}`"))?;
        input.apply_overrides(&matches)?;

        ensure!(
            input.feature_directory.is_some(),
            "`feature_directory` must be set. For more information try '--help'"
        );
        ensure!(
            input.output_directory.is_some(),
            "`output_directory` must be set. For more information try '--help'"
        );

        Ok(input)
    }

    /// Handle JSON configuration overrides
    fn apply_overrides(&mut self, matches: &ArgMatches) -> anyhow::Result<()> {
        if let Some(samples) = matches.get_many::<String>("samples") {
            log::trace!("overriding `samples` parameter.");
            self.samples = Some(samples.map(|s| SampleEntry::Name(s.into())).collect());
        }
        if let Some(feature_directory) = matches.get_one::<String>("feature_directory") {
            log::trace!("overriding `feature_directory` parameter.");
            self.feature_directory = Some(feature_directory.into());
        }
        if let Some(raw_directory) = matches.get_one::<String>("raw_directory") {
            log::trace!("overriding `raw_directory` parameter.");
            self.raw_directory = Some(raw_directory.into());
        }
        if let Some(output_directory) = matches.get_one::<String>("output_directory") {
            log::trace!("overriding `output_directory` parameter.");
            self.output_directory = Some(output_directory.into());
        }
        if let Some(quant) = matches.get_one::<String>("quant") {
            log::trace!("overriding `quant` parameter.");
            self.quant = Some(quant.parse()?);
        }
        if let Some(msp) = matches.get_one::<String>("msp") {
            log::trace!("overriding `msp` parameter.");
            self.msp = Some(msp.into());
        }
        if matches.get_flag("no-rt-correction") {
            self.rt_correction.get_or_insert_with(Default::default).enabled = Some(false);
        }
        if matches.get_flag("no-merge") {
            self.merge.get_or_insert_with(Default::default).enabled = Some(false);
        }
        if matches.get_flag("no-gap-fill") {
            self.gap_fill.get_or_insert_with(Default::default).enabled = Some(false);
        }
        Ok(())
    }

    pub fn load<S: AsRef<Path>>(path: S) -> anyhow::Result<Self> {
        cohort_io::read_json(path).map_err(anyhow::Error::from)
    }

    /// Every `<sample>.txt` table in `directory`, by name
    fn discover_samples(directory: &Path) -> anyhow::Result<Vec<Sample>> {
        let extension = FeatureDirectory::new(directory).extension;
        let mut names = std::fs::read_dir(directory)
            .with_context(|| format!("Failed to list `{}`", directory.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().map_or(false, |ext| ext == extension.as_str()))
            .filter_map(|path| path.file_stem()?.to_str().map(String::from))
            .collect::<Vec<_>>();
        names.sort();
        Ok(names.into_iter().map(Sample::new).collect())
    }

    pub fn build(self) -> anyhow::Result<Settings> {
        let feature_directory = PathBuf::from(
            self.feature_directory
                .context("`feature_directory` must be set")?,
        );
        let raw_directory = self.raw_directory.map(PathBuf::from);

        let samples = match self.samples {
            Some(samples) => samples.into_iter().map(Sample::from).collect::<Vec<_>>(),
            None => {
                log::info!(
                    "no samples listed, using every feature table in `{}`",
                    feature_directory.display()
                );
                Self::discover_samples(&feature_directory)?
            }
        };
        ensure!(!samples.is_empty(), "no samples to align");

        let mut seen = HashSet::new();
        for sample in &samples {
            ensure!(
                seen.insert(sample.name.as_str()),
                "sample `{}` is listed more than once",
                sample.name
            );
        }
        if samples.iter().all(|s| s.blank) {
            log::warn!("every sample is a blank, all detection rates will be zero");
        }

        let rt_correction = self.rt_correction.unwrap_or_default();
        let mut gap_fill = self.gap_fill.unwrap_or_default().settings();
        if gap_fill.is_some() && raw_directory.is_none() {
            log::warn!("gap filling requires `raw_directory`, skipping gap filling");
            gap_fill = None;
        }

        let parameters = Parameters {
            alignment: self.alignment.unwrap_or_default().into(),
            anchors: rt_correction.anchors(),
            rt_correction: rt_correction.settings(),
            merge: self.merge.unwrap_or_default().settings(),
            gap_fill,
        };

        if let Some(msp) = &self.msp {
            crate::output::check_msp_path(msp)?;
        }

        let output_directory = match self.output_directory {
            Some(path) => {
                let path = PathBuf::from(path);
                std::fs::create_dir_all(&path).with_context(|| {
                    format!("Failed to create output directory `{}`", path.display())
                })?;
                path
            }
            None => std::env::current_dir()?,
        };

        Ok(Settings {
            version: clap::crate_version!().into(),
            samples: samples.into_iter().collect(),
            feature_directory,
            raw_directory,
            parameters,
            quant: self.quant.unwrap_or_default(),
            msp: self.msp,
            output_paths: Vec::new(),
            problems: BTreeMap::new(),
            output_directory,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(json: &str) -> Input {
        serde_json::from_str(json).unwrap()
    }

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cohort-input-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn defaults() {
        let dir = scratch("defaults");
        let input = parse(&format!(
            r#"{{
                "samples": ["s1", {{"name": "blank", "blank": true}}],
                "feature_directory": "{0}",
                "raw_directory": "{0}",
                "output_directory": "{0}"
            }}"#,
            dir.display()
        ));
        let settings = input.build().unwrap();
        assert_eq!(settings.parameters, Parameters::default());
        assert_eq!(settings.quant, QuantMethod::PeakHeight);
        assert_eq!(settings.samples.len(), 2);
        assert!(settings.samples.is_blank(1));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn stages_and_overrides() {
        let dir = scratch("stages");
        let input = parse(&format!(
            r#"{{
                "samples": ["s1", "s2"],
                "feature_directory": "{0}",
                "output_directory": "{0}",
                "alignment": {{ "rt_tol": -0.1, "detection_rate_cutoff": 1.5 }},
                "rt_correction": {{ "enabled": false }},
                "merge": {{ "rt_tol": 0.05 }},
                "quant": "top_average"
            }}"#,
            dir.display()
        ));
        let settings = input.build().unwrap();
        let p = &settings.parameters;
        assert_eq!(p.alignment.rt_tol, 0.1);
        assert!(p.alignment.detection_rate_cutoff < 1.0);
        assert!(p.rt_correction.is_none());
        assert_eq!(p.merge.map(|m| m.rt_tol), Some(0.05));
        // No raw data to fill gaps from
        assert!(p.gap_fill.is_none());
        assert_eq!(settings.quant, QuantMethod::TopAverage);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn command_line_overrides() {
        let dir = scratch("cli");
        let mut input = parse(r#"{ "samples": ["a"], "quant": "peak_area" }"#);
        let matches = command()
            .try_get_matches_from([
                "cohort",
                "params.json",
                "s1",
                "s2",
                "-f",
                dir.to_str().unwrap(),
                "-o",
                dir.to_str().unwrap(),
                "--quant",
                "peak_height",
                "--no-merge",
            ])
            .unwrap();
        input.apply_overrides(&matches).unwrap();

        let settings = input.build().unwrap();
        assert_eq!(settings.samples.names(), vec!["s1", "s2"]);
        assert_eq!(settings.quant, QuantMethod::PeakHeight);
        assert!(settings.parameters.merge.is_none());
        assert!(settings.parameters.rt_correction.is_some());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn discover_and_validate_samples() {
        let dir = scratch("discover");
        std::fs::write(dir.join("b.txt"), "").unwrap();
        std::fs::write(dir.join("a.txt"), "").unwrap();
        std::fs::write(dir.join("notes.md"), "").unwrap();

        let input = parse(&format!(
            r#"{{ "feature_directory": "{0}", "output_directory": "{0}" }}"#,
            dir.display()
        ));
        let settings = input.build().unwrap();
        assert_eq!(settings.samples.names(), vec!["a", "b"]);

        let duplicate = parse(&format!(
            r#"{{ "samples": ["a", "a"], "feature_directory": "{0}", "output_directory": "{0}" }}"#,
            dir.display()
        ));
        assert!(duplicate.build().is_err());

        let msp = parse(&format!(
            r#"{{ "samples": ["a"], "feature_directory": "{0}", "output_directory": "{0}", "msp": "spectra.txt" }}"#,
            dir.display()
        ));
        assert!(msp.build().is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn quant_methods() {
        assert_eq!("area".parse::<QuantMethod>().unwrap(), QuantMethod::PeakArea);
        assert_eq!(
            "top_average".parse::<QuantMethod>().unwrap(),
            QuantMethod::TopAverage
        );
        assert!("median".parse::<QuantMethod>().is_err());
    }
}
