//! Flood-pixel counting over single-band rasters.

use crate::error::RasterReadError;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::TiffError;

/// Raw values treated as "no data" in flood extent rasters.
pub const DEFAULT_NODATA_VALUES: [i64; 2] = [0, 255];

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);

/// Counts flooded pixels in one raster.
pub trait PixelCounter: Send + Sync {
    fn count_flooded(&self, path: &Path) -> Result<u64, RasterReadError>;
}

/// Reads the first band of a TIFF with the `tiff` decoder.
#[derive(Debug, Clone)]
pub struct TiffPixelCounter {
    nodata: Vec<i64>,
    timeout: Option<Duration>,
}

impl Default for TiffPixelCounter {
    fn default() -> Self {
        Self::new(DEFAULT_NODATA_VALUES.to_vec(), Some(DEFAULT_READ_TIMEOUT))
    }
}

impl TiffPixelCounter {
    /// `timeout: None` reads on the calling thread without a bound.
    pub fn new(nodata: Vec<i64>, timeout: Option<Duration>) -> Self {
        Self { nodata, timeout }
    }

    fn read(path: &Path, nodata: &[i64]) -> Result<u64, RasterReadError> {
        let file = File::open(path).map_err(|e| RasterReadError::from_io(path, e))?;
        let mut decoder =
            Decoder::new(BufReader::new(file)).map_err(|e| decode_error(path, e))?;
        let image = decoder.read_image().map_err(|e| decode_error(path, e))?;
        sum_flooded(image, nodata).ok_or_else(|| RasterReadError::Unsupported {
            path: path.to_path_buf(),
            reason: "pixel format".to_string(),
        })
    }
}

impl PixelCounter for TiffPixelCounter {
    fn count_flooded(&self, path: &Path) -> Result<u64, RasterReadError> {
        let Some(timeout) = self.timeout else {
            return Self::read(path, &self.nodata);
        };

        // The reader thread is left to finish on its own if it overruns.
        let (tx, rx) = mpsc::channel();
        let owned: PathBuf = path.to_path_buf();
        let nodata = self.nodata.clone();
        thread::Builder::new()
            .name("floodex-raster".to_string())
            .spawn(move || {
                let _ = tx.send(Self::read(&owned, &nodata));
            })
            .map_err(|e| RasterReadError::from_io(path, e))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(RasterReadError::TimedOut {
                path: path.to_path_buf(),
                secs: timeout.as_secs(),
            }),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(RasterReadError::Corrupt {
                path: path.to_path_buf(),
                reason: "reader thread panicked".to_string(),
            }),
        }
    }
}

fn decode_error(path: &Path, err: TiffError) -> RasterReadError {
    match err {
        TiffError::IoError(e) => RasterReadError::from_io(path, e),
        TiffError::UnsupportedError(e) => RasterReadError::Unsupported {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
        TiffError::LimitsExceeded => RasterReadError::Unsupported {
            path: path.to_path_buf(),
            reason: "decoder limits exceeded".to_string(),
        },
        other => RasterReadError::Corrupt {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    }
}

/// Sum of pixel values after mapping nodata to zero. Negative values count as zero.
///
/// `None` for pixel formats the archive never uses.
pub fn sum_flooded(image: DecodingResult, nodata: &[i64]) -> Option<u64> {
    fn sum_ints<T: Copy + Into<i64>>(buf: &[T], nodata: &[i64]) -> u64 {
        buf.iter()
            .map(|&v| v.into())
            .filter(|v| *v > 0 && !nodata.contains(v))
            .map(|v| v as u64)
            .sum()
    }

    fn sum_floats(buf: impl Iterator<Item = f64>, nodata: &[i64]) -> u64 {
        buf.filter(|v| v.is_finite() && *v > 0.0)
            .filter(|v| !nodata.iter().any(|n| *n as f64 == *v))
            .sum::<f64>()
            .round() as u64
    }

    let total = match image {
        DecodingResult::U8(buf) => sum_ints(&buf, nodata),
        DecodingResult::U16(buf) => sum_ints(&buf, nodata),
        DecodingResult::U32(buf) => sum_ints(&buf, nodata),
        DecodingResult::I8(buf) => sum_ints(&buf, nodata),
        DecodingResult::I16(buf) => sum_ints(&buf, nodata),
        DecodingResult::I32(buf) => sum_ints(&buf, nodata),
        DecodingResult::F32(buf) => sum_floats(buf.into_iter().map(f64::from), nodata),
        DecodingResult::F64(buf) => sum_floats(buf.into_iter(), nodata),
        _ => return None,
    };
    Some(total)
}
