//! Align feature tables read from disk, gap filling from mzML files

use cohort_core::feature::GAP_FILLED;
use cohort_core::pipeline::{align, Parameters, MISSING_TABLE};
use cohort_core::sample::{Sample, SampleSet};
use cohort_io::{FeatureDirectory, RawDirectory};
use std::path::{Path, PathBuf};

const HEADER: &str = "feature_ID\tm/z\tRT\tscan_idx\tpeak_height\tpeak_area\ttop_average\ttotal_scans\tGaussian_similarity\tnoise_score\tasymmetry_factor\tMS2";

fn workspace(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("cohort-io-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_table(dir: &Path, sample: &str, rows: &[&str]) {
    let mut contents = String::from(HEADER);
    for row in rows {
        contents.push('\n');
        contents.push_str(row);
    }
    contents.push('\n');
    std::fs::write(dir.join(format!("{}.txt", sample)), contents).unwrap();
}

fn binary(values: &[f64]) -> String {
    let bytes = values
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect::<Vec<u8>>();
    base64::encode(bytes)
}

fn write_mzml(dir: &Path, sample: &str, scans: &[(f64, f64)]) {
    let spectra = scans
        .iter()
        .enumerate()
        .map(|(idx, (rt, intensity))| {
            format!(
                r#"<spectrum index="{idx}" id="scan={idx}">
<cvParam accession="MS:1000511" value="1"/>
<scanList><scan><cvParam accession="MS:1000016" value="{rt}" unitAccession="UO:0000031"/></scan></scanList>
<binaryDataArrayList>
<binaryDataArray><cvParam accession="MS:1000523"/><cvParam accession="MS:1000576"/><cvParam accession="MS:1000514"/><binary>{mz}</binary></binaryDataArray>
<binaryDataArray><cvParam accession="MS:1000523"/><cvParam accession="MS:1000576"/><cvParam accession="MS:1000515"/><binary>{int}</binary></binaryDataArray>
</binaryDataArrayList>
</spectrum>"#,
                mz = binary(&[200.1002]),
                int = binary(&[*intensity]),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let doc = format!(
        "<?xml version=\"1.0\"?>\n<mzML><run><spectrumList>{}</spectrumList></run></mzML>",
        spectra
    );
    std::fs::write(dir.join(format!("{}.mzML", sample)), doc).unwrap();
}

#[test]
fn align_from_directories() {
    let dir = workspace("align");
    write_table(&dir, "s1", &["0\t200.1000\t5.00\t10\t5000\t9000\t4800\t12\t0.9\t0.01\t1.0\t"]);
    write_table(&dir, "s2", &[]);
    write_table(&dir, "s3", &["7\t200.1003\t5.02\t11\t8000\t16000\t7000\t9\t0.95\t0.02\t1.0\t100.0;50|110.0;20"]);
    write_mzml(&dir, "s2", &[(4.9, 0.0), (4.99, 40.0), (5.01, 60.0), (5.03, 30.0), (5.2, 999.0)]);

    let samples: SampleSet = ["s1", "s2", "s3", "s4"].iter().map(|&s| Sample::new(s)).collect();
    let mut parameters = Parameters {
        rt_correction: None,
        merge: None,
        ..Default::default()
    };
    parameters.alignment.rt_tol = 0.1;

    let result = align(
        samples,
        &FeatureDirectory::new(&dir),
        &RawDirectory::new(&dir),
        &parameters,
    )
    .unwrap();

    assert_eq!(
        result.problems.get("s4").map(String::as_str),
        Some(MISSING_TABLE)
    );
    assert_eq!(result.samples.len(), 3);
    assert_eq!(result.ledger.len(), 1);

    let f = &result.ledger.features()[0];
    assert_eq!(f.feature_ids, vec![0, GAP_FILLED, 7]);
    assert_eq!(f.peak_heights[1], 60.0);
    assert!((f.top_averages[1] - 130.0 / 3.0).abs() < 1e-9);
    assert_eq!(f.ms2_reference_sample, Some(2));
    assert_eq!(f.detection_rate_gap_filled, 1.0);

    let _ = std::fs::remove_dir_all(&dir);
}
