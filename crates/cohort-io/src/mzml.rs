use cohort_core::eic::{Ms1Run, Ms1Scan};
use flate2::read::ZlibDecoder;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{BufRead, Read};

#[derive(Default, Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub ms_level: u8,
    pub id: String,
    /// Scan start time, in minutes
    pub scan_start_time: f64,
    /// M/z array
    pub mz: Vec<f64>,
    /// Intensity array
    pub intensity: Vec<f64>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
/// Which tag are we inside?
enum State {
    Spectrum,
    Scan,
    BinaryDataArray,
    Binary,
}

#[derive(Copy, Clone, Debug)]
enum BinaryKind {
    Intensity,
    Mz,
}

#[derive(Copy, Clone, Debug)]
enum Dtype {
    F32,
    F64,
}

// MUST supply only one of the following
const ZLIB_COMPRESSION: &str = "MS:1000574";
const NO_COMPRESSION: &str = "MS:1000576";

// MUST supply only one of the following
const INTENSITY_ARRAY: &str = "MS:1000515";
const MZ_ARRAY: &str = "MS:1000514";

// MUST supply only one of the following
const FLOAT_64: &str = "MS:1000523";
const FLOAT_32: &str = "MS:1000521";

const MS_LEVEL: &str = "MS:1000511";
const SCAN_START_TIME: &str = "MS:1000016";
const UNIT_SECOND: &str = "UO:0000010";

pub struct MzMLReader {
    ms_level: u8,
}

impl Default for MzMLReader {
    fn default() -> Self {
        Self { ms_level: 1 }
    }
}

impl MzMLReader {
    /// Create a new [`MzMLReader`] that only returns spectra of `ms_level`
    pub fn with_level_filter(ms_level: u8) -> Self {
        Self { ms_level }
    }

    /// Parse every spectrum of the configured MS level. Scan start times are
    /// converted to minutes.
    pub fn parse<B: BufRead>(&self, b: B) -> Result<Vec<Spectrum>, MzMLError> {
        let mut reader = Reader::from_reader(b);
        let mut buf = Vec::new();

        let mut state = None;
        let mut compression = false;
        let mut output_buffer = Vec::with_capacity(4096);
        let mut binary_dtype = Dtype::F64;
        let mut binary_array = None;

        let mut spectrum = Spectrum::default();
        let mut spectra = Vec::new();

        macro_rules! extract {
            ($ev:expr, $key:expr) => {
                $ev.try_get_attribute($key)?
                    .ok_or_else(|| MzMLError::Malformed)?
                    .value
            };
        }

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref ev)) => {
                    // State transition into child tag
                    state = match (ev.name().into_inner(), state) {
                        (b"spectrum", _) => Some(State::Spectrum),
                        (b"scan", Some(State::Spectrum)) => Some(State::Scan),
                        (b"binaryDataArray", Some(State::Spectrum)) => Some(State::BinaryDataArray),
                        (b"binary", Some(State::BinaryDataArray)) => Some(State::Binary),
                        _ => state,
                    };
                    if ev.name().into_inner() == b"spectrum" {
                        let id = extract!(ev, b"id");
                        spectrum.id = std::str::from_utf8(&id)?.to_string();
                    }
                }
                Ok(Event::Empty(ref ev)) => match (state, ev.name().into_inner()) {
                    (Some(State::BinaryDataArray), b"cvParam") => {
                        let accession = extract!(ev, b"accession");
                        let accession = std::str::from_utf8(&accession)?;
                        match accession {
                            ZLIB_COMPRESSION => compression = true,
                            NO_COMPRESSION => compression = false,
                            FLOAT_64 => binary_dtype = Dtype::F64,
                            FLOAT_32 => binary_dtype = Dtype::F32,
                            INTENSITY_ARRAY => binary_array = Some(BinaryKind::Intensity),
                            MZ_ARRAY => binary_array = Some(BinaryKind::Mz),
                            _ => {}
                        }
                    }
                    (Some(State::Spectrum), b"cvParam") => {
                        let accession = extract!(ev, b"accession");
                        if accession.as_ref() == MS_LEVEL.as_bytes() {
                            let level = extract!(ev, b"value");
                            let level = std::str::from_utf8(&level)?.parse::<u8>()?;
                            if level != self.ms_level {
                                // Skip everything up to the next spectrum
                                spectrum = Spectrum::default();
                                state = None;
                            }
                            spectrum.ms_level = level;
                        }
                    }
                    (Some(State::Scan), b"cvParam") => {
                        let accession = extract!(ev, b"accession");
                        if accession.as_ref() == SCAN_START_TIME.as_bytes() {
                            let value = extract!(ev, b"value");
                            let value = std::str::from_utf8(&value)?.parse::<f64>()?;
                            let seconds = match ev.try_get_attribute(b"unitAccession")? {
                                Some(unit) => unit.value.as_ref() == UNIT_SECOND.as_bytes(),
                                None => false,
                            };
                            spectrum.scan_start_time = match seconds {
                                true => value / 60.0,
                                false => value,
                            };
                        }
                    }
                    _ => {}
                },
                Ok(Event::Text(text)) => {
                    if let (Some(State::Binary), Some(kind)) = (state, binary_array) {
                        let raw = text.unescape()?;
                        // There are occasionally empty binary data arrays
                        if !raw.is_empty() {
                            let decoded = base64::decode(raw.trim().as_bytes())?;
                            let bytes = match compression {
                                false => decoded.as_slice(),
                                true => {
                                    let mut r = ZlibDecoder::new(decoded.as_slice());
                                    let n = r.read_to_end(&mut output_buffer)?;
                                    &output_buffer[..n]
                                }
                            };
                            let array = decode_array(bytes, binary_dtype);
                            output_buffer.clear();

                            match kind {
                                BinaryKind::Intensity => spectrum.intensity = array,
                                BinaryKind::Mz => spectrum.mz = array,
                            }
                        }
                        binary_array = None;
                    }
                }
                Ok(Event::End(ev)) => {
                    state = match (state, ev.name().into_inner()) {
                        (Some(State::Binary), b"binary") => Some(State::BinaryDataArray),
                        (Some(State::BinaryDataArray), b"binaryDataArray") => Some(State::Spectrum),
                        (Some(State::Scan), b"scan") => Some(State::Spectrum),
                        (_, b"spectrum") => {
                            if spectrum.ms_level == self.ms_level {
                                spectra.push(spectrum);
                            }
                            spectrum = Spectrum::default();
                            compression = false;
                            binary_dtype = Dtype::F64;
                            binary_array = None;
                            None
                        }
                        _ => state,
                    };
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => return Err(err.into()),
            }
            buf.clear();
        }
        Ok(spectra)
    }

    /// Parse all MS1 spectra into an [`Ms1Run`]
    pub fn parse_ms1_run<B: BufRead>(b: B) -> Result<Ms1Run, MzMLError> {
        let spectra = Self::default().parse(b)?;
        let mut scans = Vec::with_capacity(spectra.len());
        for spectrum in spectra {
            if spectrum.mz.len() != spectrum.intensity.len() {
                log::warn!(
                    "{}: m/z and intensity arrays differ in length, spectrum skipped",
                    spectrum.id
                );
                continue;
            }
            scans.push(Ms1Scan::new(
                spectrum.scan_start_time,
                spectrum.mz,
                spectrum.intensity,
            ));
        }
        Ok(Ms1Run::new(scans))
    }
}

fn decode_array(bytes: &[u8], dtype: Dtype) -> Vec<f64> {
    match dtype {
        Dtype::F32 => {
            let mut buf: [u8; 4] = [0; 4];
            bytes
                .chunks_exact(4)
                .map(|chunk| {
                    buf.copy_from_slice(chunk);
                    f32::from_le_bytes(buf) as f64
                })
                .collect()
        }
        Dtype::F64 => {
            let mut buf: [u8; 8] = [0; 8];
            bytes
                .chunks_exact(8)
                .map(|chunk| {
                    buf.copy_from_slice(chunk);
                    f64::from_le_bytes(buf)
                })
                .collect()
        }
    }
}

#[derive(Debug)]
pub enum MzMLError {
    Malformed,
    XMLError(quick_xml::Error),
    IOError(std::io::Error),
}

impl std::fmt::Display for MzMLError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MzMLError::Malformed => f.write_str("MzMLError: malformed cvParam"),
            MzMLError::IOError(s) => write!(f, "MzMLError: IO error {}", s),
            MzMLError::XMLError(s) => write!(f, "MzMLError: XML error {}", s),
        }
    }
}

impl std::error::Error for MzMLError {}

impl From<std::io::Error> for MzMLError {
    fn from(residual: std::io::Error) -> Self {
        Self::IOError(residual)
    }
}

impl From<quick_xml::Error> for MzMLError {
    fn from(residual: quick_xml::Error) -> Self {
        Self::XMLError(residual)
    }
}

impl From<quick_xml::events::attributes::AttrError> for MzMLError {
    fn from(residual: quick_xml::events::attributes::AttrError) -> Self {
        Self::XMLError(residual.into())
    }
}

impl From<std::str::Utf8Error> for MzMLError {
    fn from(_: std::str::Utf8Error) -> Self {
        Self::Malformed
    }
}

impl From<std::num::ParseFloatError> for MzMLError {
    fn from(_: std::num::ParseFloatError) -> Self {
        Self::Malformed
    }
}

impl From<std::num::ParseIntError> for MzMLError {
    fn from(_: std::num::ParseIntError) -> Self {
        Self::Malformed
    }
}

impl From<base64::DecodeError> for MzMLError {
    fn from(_: base64::DecodeError) -> Self {
        Self::Malformed
    }
}
