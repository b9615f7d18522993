use crate::input::QuantMethod;
use crate::runner::Runner;
use anyhow::{ensure, Context};
use cohort_core::alignment::RtModels;
use cohort_core::feature::{AlignedFeature, Ledger};
use cohort_core::sample::SampleSet;
use rayon::prelude::*;
use std::fmt::Write;

pub const FEATURE_TABLE: &str = "aligned_feature_table.tsv";
pub const RT_MODELS: &str = "rt_correction_models.json";

const HEADERS: [&str; 25] = [
    "group_ID",
    "feature_ID",
    "m/z",
    "RT",
    "adduct",
    "is_isotope",
    "is_in_source_fragment",
    "Gaussian_similarity",
    "noise_score",
    "asymmetry_factor",
    "detection_rate",
    "detection_rate_gap_filled",
    "alignment_reference_file",
    "charge",
    "isotopes",
    "MS2_reference_file",
    "MS2",
    "matched_MS2",
    "search_mode",
    "annotation",
    "formula",
    "similarity",
    "matched_peak_number",
    "SMILES",
    "InChIKey",
];

fn fixed(value: f64, decimals: usize) -> String {
    format!("{:.*}", decimals, value)
}

fn flag(value: bool) -> &'static [u8] {
    match value {
        true => &b"True"[..],
        false => &b"False"[..],
    }
}

fn text(value: &Option<String>) -> &[u8] {
    value.as_deref().unwrap_or_default().as_bytes()
}

pub fn serialize_feature(
    feature: &AlignedFeature,
    samples: &SampleSet,
    quant: QuantMethod,
) -> csv::ByteRecord {
    let grouping = &feature.grouping;
    let annotation = &feature.annotation;

    let mut record = csv::ByteRecord::new();
    match feature.group_id {
        Some(group) => record.push_field(itoa::Buffer::new().format(group).as_bytes()),
        None => record.push_field(b""),
    }
    match feature.id {
        Some(id) => record.push_field(itoa::Buffer::new().format(id).as_bytes()),
        None => record.push_field(b""),
    }
    record.push_field(fixed(feature.mz, 4).as_bytes());
    record.push_field(fixed(feature.rt, 3).as_bytes());
    record.push_field(text(&grouping.adduct_type));
    record.push_field(flag(grouping.is_isotope));
    record.push_field(flag(grouping.is_in_source_fragment));
    record.push_field(ryu::Buffer::new().format(feature.gaussian_similarity).as_bytes());
    record.push_field(ryu::Buffer::new().format(feature.noise_score).as_bytes());
    record.push_field(ryu::Buffer::new().format(feature.asymmetry_factor).as_bytes());
    record.push_field(fixed(feature.detection_rate, 2).as_bytes());
    record.push_field(fixed(feature.detection_rate_gap_filled, 2).as_bytes());
    record.push_field(samples.name(feature.reference_sample).as_bytes());
    record.push_field(itoa::Buffer::new().format(grouping.charge_state).as_bytes());

    let isotopes = grouping
        .isotope_signals
        .as_ref()
        .map(|signals| {
            signals
                .iter()
                .map(|(mz, intensity)| format!("{:.4};{:.0}", mz, intensity))
                .collect::<Vec<_>>()
                .join("|")
        })
        .unwrap_or_default();
    record.push_field(isotopes.as_bytes());

    match feature.ms2_reference_sample {
        Some(idx) => record.push_field(samples.name(idx).as_bytes()),
        None => record.push_field(b""),
    }
    let ms2 = feature.ms2.as_ref().map(ToString::to_string);
    record.push_field(text(&ms2));
    let matched_ms2 = annotation.matched_ms2.as_ref().map(ToString::to_string);
    record.push_field(text(&matched_ms2));
    record.push_field(text(&annotation.search_mode));
    record.push_field(text(&annotation.name));
    record.push_field(text(&annotation.formula));
    match annotation.similarity {
        Some(similarity) => record.push_field(fixed(similarity, 4).as_bytes()),
        None => record.push_field(b""),
    }
    match annotation.matched_peak_number {
        Some(n) => record.push_field(itoa::Buffer::new().format(n).as_bytes()),
        None => record.push_field(b""),
    }
    record.push_field(text(&annotation.smiles));
    record.push_field(text(&annotation.inchikey));

    let values = match quant {
        QuantMethod::PeakHeight => &feature.peak_heights,
        QuantMethod::PeakArea => &feature.peak_areas,
        QuantMethod::TopAverage => &feature.top_averages,
    };
    for value in values {
        // Quantities are reported as truncated integers
        record.push_field(itoa::Buffer::new().format(*value as i64).as_bytes());
    }
    record
}

/// Tab-separated aligned feature table, one column per sample after the
/// feature columns
pub fn feature_table(
    ledger: &Ledger,
    samples: &SampleSet,
    quant: QuantMethod,
) -> anyhow::Result<Vec<u8>> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(vec![]);

    let mut headers = csv::ByteRecord::from(HEADERS.to_vec());
    for name in samples.names() {
        headers.push_field(name.as_bytes());
    }
    wtr.write_byte_record(&headers)?;

    for record in ledger
        .features()
        .par_iter()
        .map(|feature| serialize_feature(feature, samples, quant))
        .collect::<Vec<_>>()
    {
        wtr.write_byte_record(&record)?;
    }

    wtr.flush()?;
    Ok(wtr.into_inner()?)
}

/// MSP files are recognized by their extension only
pub fn check_msp_path(path: &str) -> anyhow::Result<()> {
    ensure!(
        path.to_lowercase().ends_with(".msp"),
        "MSP output path must end in `.msp`: `{path}`"
    );
    Ok(())
}

/// Write one MSP block for `feature`. Features without a representative
/// MS2 spectrum are written with zero peaks.
fn msp_block<W: Write>(out: &mut W, feature: &AlignedFeature) -> std::fmt::Result {
    let annotation = &feature.annotation;
    let field = |value: &Option<String>| value.clone().unwrap_or_default();

    writeln!(out, "ID: {}", feature.id.unwrap_or_default())?;
    match &feature.ms2 {
        Some(ms2) => {
            let name = annotation.name.as_deref().unwrap_or("Unknown");
            writeln!(out, "NAME: {}", name)?;
            writeln!(out, "PRECURSORMZ: {:.4}", feature.mz)?;
            writeln!(out, "PRECURSORTYPE: {}", field(&feature.grouping.adduct_type))?;
            writeln!(out, "RETENTIONTIME: {:.3}", feature.rt)?;
            writeln!(out, "SEARCHMODE: {}", field(&annotation.search_mode))?;
            writeln!(out, "FORMULA: {}", field(&annotation.formula))?;
            writeln!(out, "INCHIKEY: {}", field(&annotation.inchikey))?;
            writeln!(out, "SMILES: {}", field(&annotation.smiles))?;
            writeln!(out, "Num Peaks: {}", ms2.len())?;
            for peak in &ms2.peaks {
                writeln!(out, "{:.4}\t{:.0}", peak.mz, peak.intensity)?;
            }
        }
        None => {
            writeln!(out, "NAME: Unknown")?;
            writeln!(out, "PRECURSORMZ: {:.4}", feature.mz)?;
            writeln!(out, "PRECURSORTYPE: {}", field(&feature.grouping.adduct_type))?;
            writeln!(out, "RETENTIONTIME: {:.3}", feature.rt)?;
            writeln!(out, "Num Peaks: 0")?;
        }
    }
    writeln!(out)
}

/// Write one MSP block per feature, separated by blank lines
pub fn msp(ledger: &Ledger) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    for feature in ledger.iter() {
        msp_block(&mut out, feature)?;
    }
    Ok(out)
}

impl Runner {
    pub fn write_features(&self, ledger: &Ledger, samples: &SampleSet) -> anyhow::Result<String> {
        let path = self.make_path(FEATURE_TABLE);
        let bytes = feature_table(ledger, samples, self.settings.quant)?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;
        Ok(path.display().to_string())
    }

    pub fn write_msp(&self, ledger: &Ledger, file_name: &str) -> anyhow::Result<String> {
        check_msp_path(file_name)?;
        let path = self.make_path(file_name);
        let contents = msp(ledger).context("Failed to format MSP spectra")?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;
        Ok(path.display().to_string())
    }

    pub fn write_rt_models(&self, models: &RtModels) -> anyhow::Result<String> {
        let path = self.make_path(RT_MODELS);
        let bytes = serde_json::to_vec_pretty(models)?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;
        Ok(path.display().to_string())
    }
}
