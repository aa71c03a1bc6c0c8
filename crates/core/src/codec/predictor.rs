//! PNG and TIFF predictors applied after Flate or LZW decoding.

use super::filter::FilterParams;
use crate::error::{PdfError, Result};

/// Predictor family selected by `/Predictor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Predictor {
    #[default]
    None,
    /// `/Predictor 2`: horizontal differencing.
    Tiff,
    /// `/Predictor 10..=15`: per-row PNG filter byte.
    Png,
}

impl Predictor {
    pub const fn from_value(value: i64) -> Self {
        match value {
            2 => Self::Tiff,
            v if v >= 10 => Self::Png,
            _ => Self::None,
        }
    }
}

/// Bytes in one row of samples, without the PNG filter byte.
///
/// `/Columns` and `/BitsPerComponent` come straight from the file, so the
/// product is checked and the component size must be one PDF allows.
fn row_len(params: &FilterParams) -> Result<usize> {
    let bpc = params.bits_per_component;
    if !matches!(bpc, 1 | 2 | 4 | 8 | 16) {
        return Err(PdfError::DecodeError(format!(
            "predictor does not support {bpc} bits per component"
        )));
    }
    params
        .columns
        .checked_mul(params.colors)
        .and_then(|samples| samples.checked_mul(bpc))
        .map(|bits| bits.div_ceil(8))
        .ok_or_else(|| {
            PdfError::DecodeError(format!(
                "predictor row of {} columns overflows",
                params.columns
            ))
        })
}

/// Undo the predictor named in `params`. Trailing partial rows are dropped.
pub fn apply_predictor(data: &[u8], params: &FilterParams) -> Result<Vec<u8>> {
    match params.predictor {
        Predictor::None => Ok(data.to_vec()),
        Predictor::Png => png_unpredict(data, params),
        Predictor::Tiff => tiff_unpredict(data, params),
    }
}

fn png_unpredict(data: &[u8], params: &FilterParams) -> Result<Vec<u8>> {
    let row_bytes = row_len(params)?;
    if row_bytes == 0 {
        return Err(PdfError::DecodeError("PNG predictor with empty rows".into()));
    }
    // Not even one whole row: nothing survives, and the row buffers below
    // must never be sized from an oversized /Columns.
    if row_bytes >= data.len() {
        return Ok(Vec::new());
    }
    let bpp = (params.colors * params.bits_per_component).div_ceil(8).max(1);

    let mut result = Vec::with_capacity(data.len());
    let mut prev_row = vec![0u8; row_bytes];
    let mut current_row = vec![0u8; row_bytes];

    for row in data.chunks_exact(row_bytes + 1) {
        let filter_type = row[0];
        let row_data = &row[1..];

        match filter_type {
            0 => current_row.copy_from_slice(row_data),
            // Sub
            1 => {
                for i in 0..row_bytes {
                    let left = if i >= bpp { current_row[i - bpp] } else { 0 };
                    current_row[i] = row_data[i].wrapping_add(left);
                }
            }
            // Up
            2 => {
                for i in 0..row_bytes {
                    current_row[i] = row_data[i].wrapping_add(prev_row[i]);
                }
            }
            // Average
            3 => {
                for i in 0..row_bytes {
                    let left = if i >= bpp { u16::from(current_row[i - bpp]) } else { 0 };
                    let above = u16::from(prev_row[i]);
                    current_row[i] = row_data[i].wrapping_add(((left + above) / 2) as u8);
                }
            }
            // Paeth
            4 => {
                for i in 0..row_bytes {
                    let left = if i >= bpp { current_row[i - bpp] } else { 0 };
                    let upper_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
                    let paeth = paeth_predictor(left, prev_row[i], upper_left);
                    current_row[i] = row_data[i].wrapping_add(paeth);
                }
            }
            other => {
                return Err(PdfError::DecodeError(format!(
                    "unknown PNG predictor row filter {other}"
                )));
            }
        }

        result.extend_from_slice(&current_row);
        std::mem::swap(&mut prev_row, &mut current_row);
    }

    Ok(result)
}

const fn paeth_predictor(left: u8, above: u8, upper_left: u8) -> u8 {
    let a = left as i16;
    let b = above as i16;
    let c = upper_left as i16;
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();

    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        above
    } else {
        upper_left
    }
}

fn tiff_unpredict(data: &[u8], params: &FilterParams) -> Result<Vec<u8>> {
    let row_bytes = row_len(params)?;
    if row_bytes == 0 {
        return Err(PdfError::DecodeError("TIFF predictor with empty rows".into()));
    }
    if row_bytes > data.len() {
        return Ok(Vec::new());
    }
    let colors = params.colors;
    let mut result = Vec::with_capacity(data.len());

    for row in data.chunks_exact(row_bytes) {
        let mut row = row.to_vec();
        match params.bits_per_component {
            8 => {
                for i in colors..row_bytes {
                    row[i] = row[i].wrapping_add(row[i - colors]);
                }
            }
            16 => {
                let step = colors * 2;
                let mut i = step;
                while i + 1 < row_bytes {
                    let prev = u16::from_be_bytes([row[i - step], row[i - step + 1]]);
                    let cur = u16::from_be_bytes([row[i], row[i + 1]]);
                    row[i..i + 2].copy_from_slice(&cur.wrapping_add(prev).to_be_bytes());
                    i += 2;
                }
            }
            bpc @ (1 | 2 | 4) => tiff_sub_byte_row(&mut row, params.columns, colors, bpc),
            other => {
                return Err(PdfError::DecodeError(format!(
                    "TIFF predictor does not support {other} bits per component"
                )));
            }
        }
        result.extend_from_slice(&row);
    }

    Ok(result)
}

/// Horizontal differencing for 1, 2 and 4 bit samples packed MSB-first.
fn tiff_sub_byte_row(row: &mut [u8], columns: usize, colors: usize, bpc: usize) {
    let mask = (1u16 << bpc) - 1;
    let samples = columns * colors;
    let read = |row: &[u8], idx: usize| -> u16 {
        let bit = idx * bpc;
        let shift = 8 - bpc - (bit % 8);
        (u16::from(row[bit / 8]) >> shift) & mask
    };

    for idx in colors..samples {
        let value = (read(row, idx) + read(row, idx - colors)) & mask;
        let bit = idx * bpc;
        let shift = 8 - bpc - (bit % 8);
        let byte = &mut row[bit / 8];
        *byte = (*byte & !((mask as u8) << shift)) | ((value as u8) << shift);
    }
}
