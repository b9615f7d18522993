pub mod mzml;
pub mod raw;
pub mod table;

use flate2::read::GzDecoder;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

pub use raw::RawDirectory;
pub use table::FeatureDirectory;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("feature table error: {0}")]
    Table(#[from] table::TableError),
    #[error("MzML error: {0}")]
    MzML(#[from] mzml::MzMLError),
}

/// Does the path end in "gz" or "gzip"?
fn gzip_heuristic(path: &Path) -> bool {
    match path.extension() {
        Some(ext) => ext.eq_ignore_ascii_case("gz") || ext.eq_ignore_ascii_case("gzip"),
        None => false,
    }
}

/// Open a buffered reader over a local file, transparently decompressing
/// gzipped files
pub fn open<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead + Send>, std::io::Error> {
    let path = path.as_ref();
    let file = File::open(path)?;
    match gzip_heuristic(path) {
        true => Ok(Box::new(BufReader::new(GzDecoder::new(file)))),
        false => Ok(Box::new(BufReader::new(file))),
    }
}

pub fn read_json<P, T>(path: P) -> Result<T, Error>
where
    P: AsRef<Path>,
    T: DeserializeOwned,
{
    let reader = open(path)?;
    Ok(serde_json::from_reader(reader)?)
}
