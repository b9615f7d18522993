pub mod alignment;
pub mod eic;
pub mod feature;
pub mod gap_fill;
pub mod merge;
pub mod ml;
pub mod pipeline;
pub mod sample;
pub mod spectrum;
pub mod table;
pub mod util;

/// Boxed error raised by an external collaborator (table provider, raw data loader)
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug)]
pub enum Error {
    /// A feature table provider failed for the named sample
    FeatureTable(String, BoxError),
    /// Raw signal data exists for the named sample, but could not be read
    RawSignal(String, BoxError),
    /// A consensus feature does not carry one slot per sample
    Dimension { expected: usize, found: usize },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FeatureTable(sample, e) => {
                write!(f, "failed to read feature table for `{}`: {}", sample, e)
            }
            Self::RawSignal(sample, e) => {
                write!(f, "failed to read raw data for `{}`: {}", sample, e)
            }
            Self::Dimension { expected, found } => write!(
                f,
                "consensus feature has {} per-sample slots, expected {}",
                found, expected
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::FeatureTable(_, e) | Self::RawSignal(_, e) => Some(e.as_ref()),
            Self::Dimension { .. } => None,
        }
    }
}
