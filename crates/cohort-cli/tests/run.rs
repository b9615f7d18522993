use cohort_cli::input::Input;
use cohort_cli::output::{FEATURE_TABLE, RT_MODELS};
use cohort_cli::runner::Runner;
use cohort_core::alignment::RtModels;
use std::path::{Path, PathBuf};

const HEADER: &str = "feature_ID\tm/z\tRT\tscan_idx\tpeak_height\tpeak_area\ttop_average\ttotal_scans\tGaussian_similarity\tnoise_score\tasymmetry_factor\tMS2";

fn workspace(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("cohort-cli-{}-{}", name, std::process::id()));
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

fn settings(dir: &Path, extra: &str) -> Input {
    let json = format!(
        r#"{{
            "samples": ["s1", "s2", "s3"],
            "feature_directory": "{0}",
            "output_directory": "{0}/out"{1}
        }}"#,
        dir.display(),
        extra
    );
    let path = dir.join("params.json");
    std::fs::write(&path, json).unwrap();
    Input::load(&path).unwrap()
}

#[test]
fn run_writes_outputs() -> anyhow::Result<()> {
    let dir = workspace("run");
    write_table(&dir, "s1", &["0\t200.1000\t5.00\t10\t5000\t9000\t4800\t12\t0.9\t0.01\t1.0\t100.0;50|110.0;20"]);
    write_table(&dir, "s2", &["3\t200.1003\t5.02\t11\t8000\t16000\t7000\t9\t0.95\t0.02\t1.0\t"]);

    let input = settings(&dir, r#", "msp": "spectra.MSP", "alignment": { "rt_tol": 0.1 }"#);
    let settings = Runner::new(input.build()?).run()?;

    let out = dir.join("out");
    assert_eq!(settings.samples.names(), vec!["s1", "s2"]);
    assert_eq!(
        settings.problems.get("s3").map(String::as_str),
        Some("file does not exist")
    );
    assert_eq!(settings.output_paths.len(), 4);
    for file in [FEATURE_TABLE, RT_MODELS, "spectra.MSP", "results.json"] {
        assert!(out.join(file).exists(), "{} missing", file);
    }

    let table = std::fs::read_to_string(out.join(FEATURE_TABLE))?;
    let lines = table.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 2);
    let header = lines[0].split('\t').collect::<Vec<_>>();
    let row = lines[1].split('\t').collect::<Vec<_>>();
    assert_eq!(header.len(), row.len());
    assert_eq!(&header[header.len() - 2..], &["s1", "s2"]);
    assert_eq!(&row[row.len() - 2..], &["5000", "8000"]);
    assert_eq!(row[1], "0");
    assert_eq!(row[10], "1.00");
    assert_eq!(row[12], "s2");
    assert_eq!(row[15], "s1");

    let models: RtModels = cohort_io::read_json(out.join(RT_MODELS))?;
    assert_eq!(models.keys().collect::<Vec<_>>(), vec!["s1", "s2"]);

    let msp = std::fs::read_to_string(out.join("spectra.MSP"))?;
    assert!(msp.starts_with("ID: 0\nNAME: Unknown\n"));
    assert!(msp.contains("Num Peaks: 2\n"));

    let results: serde_json::Value = cohort_io::read_json(out.join("results.json"))?;
    assert_eq!(results["problems"]["s3"], "file does not exist");
    assert_eq!(results["quant"], "peak_height");

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn stages_can_be_disabled() -> anyhow::Result<()> {
    let dir = workspace("disabled");
    write_table(&dir, "s1", &["0\t200.1000\t5.00\t10\t5000\t9000\t4800\t12\t0.9\t0.01\t1.0\t"]);
    write_table(&dir, "s2", &[]);
    write_table(&dir, "s3", &["1\t300.2000\t7.00\t10\t6000\t9000\t4800\t12\t0.9\t0.01\t1.0\t"]);

    let input = settings(
        &dir,
        r#", "rt_correction": { "enabled": false }, "merge": { "enabled": false }, "quant": "peak_area""#,
    );
    let settings = Runner::new(input.build()?).run()?;
    let out = dir.join("out");

    assert!(settings.problems.is_empty());
    assert!(!out.join(RT_MODELS).exists());

    let table = std::fs::read_to_string(out.join(FEATURE_TABLE))?;
    let rows = table
        .lines()
        .skip(1)
        .map(|line| line.split('\t').collect::<Vec<_>>())
        .collect::<Vec<_>>();
    assert_eq!(rows.len(), 2);
    // s3's feature is more intense and comes first
    assert_eq!(&rows[0][rows[0].len() - 3..], &["0", "0", "9000"]);
    assert_eq!(&rows[1][rows[1].len() - 3..], &["9000", "0", "0"]);
    assert_eq!(rows[0][10], "0.33");

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}

#[test]
fn invalid_msp_path_is_rejected() {
    let dir = workspace("msp");
    let input = settings(&dir, r#", "msp": "spectra.txt""#);
    assert!(input.build().is_err());
    let _ = std::fs::remove_dir_all(&dir);
}
