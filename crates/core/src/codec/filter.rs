//! Stream filter pipeline: `/Filter` names paired with `/DecodeParms`.

use std::collections::HashMap;

use super::ascii85::{ascii85decode, asciihexdecode};
use super::flate::flate_decode;
use super::lzw::lzw_decode;
use super::predictor::{Predictor, apply_predictor};
use super::runlength::rldecode;
use crate::error::{PdfError, Result};
use crate::model::objects::PDFObject;

/// Upper bound on `/Colors`.
const MAX_COLORS: usize = 32;

/// A single decoding stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Flate,
    Lzw,
    Ascii85,
    AsciiHex,
    RunLength,
    /// Per-stream crypt filter; decryption already happened upstream.
    Crypt,
    Dct,
    Jpx,
    CcittFax,
    Jbig2,
}

impl FilterKind {
    /// Resolve a filter name, including inline-image abbreviations.
    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "FlateDecode" | "Fl" => Self::Flate,
            "LZWDecode" | "LZW" => Self::Lzw,
            "ASCII85Decode" | "A85" => Self::Ascii85,
            "ASCIIHexDecode" | "AHx" => Self::AsciiHex,
            "RunLengthDecode" | "RL" => Self::RunLength,
            "Crypt" => Self::Crypt,
            "DCTDecode" | "DCT" => Self::Dct,
            "JPXDecode" => Self::Jpx,
            "CCITTFaxDecode" | "CCF" => Self::CcittFax,
            "JBIG2Decode" => Self::Jbig2,
            other => return Err(PdfError::UnsupportedFilter(other.to_string())),
        })
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Flate => "FlateDecode",
            Self::Lzw => "LZWDecode",
            Self::Ascii85 => "ASCII85Decode",
            Self::AsciiHex => "ASCIIHexDecode",
            Self::RunLength => "RunLengthDecode",
            Self::Crypt => "Crypt",
            Self::Dct => "DCTDecode",
            Self::Jpx => "JPXDecode",
            Self::CcittFax => "CCITTFaxDecode",
            Self::Jbig2 => "JBIG2Decode",
        }
    }

    /// Image codecs end the chain; their payload is handed on still encoded.
    pub const fn is_image(self) -> bool {
        matches!(self, Self::Dct | Self::Jpx | Self::CcittFax | Self::Jbig2)
    }
}

/// Decode parameters shared by LZW and the predictors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterParams {
    pub predictor: Predictor,
    /// Interleaved color components per sample, 1..=32.
    pub colors: usize,
    pub bits_per_component: usize,
    /// Samples per row.
    pub columns: usize,
    /// LZW: switch code width one entry early.
    pub early_change: bool,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            predictor: Predictor::None,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
            early_change: true,
        }
    }
}

impl FilterParams {
    /// Read parameters from a `/DecodeParms` dictionary.
    ///
    /// `resolve` turns indirect values into direct ones.
    pub fn from_dict<F>(dict: &HashMap<String, PDFObject>, resolve: &F) -> Self
    where
        F: Fn(&PDFObject) -> PDFObject,
    {
        let int = |key: &str| dict.get(key).and_then(|v| resolve(v).int_or_none());
        let defaults = Self::default();

        Self {
            predictor: int("Predictor").map_or(Predictor::None, Predictor::from_value),
            colors: int("Colors")
                .map_or(defaults.colors, |c| (c.max(1) as usize).min(MAX_COLORS)),
            bits_per_component: int("BitsPerComponent")
                .map_or(defaults.bits_per_component, |b| b.max(1) as usize),
            columns: int("Columns").map_or(defaults.columns, |c| c.max(1) as usize),
            early_change: int("EarlyChange").is_none_or(|e| e != 0),
        }
    }
}

/// Ordered list of filters to undo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterChain {
    stages: Vec<(FilterKind, FilterParams)>,
}

impl FilterChain {
    pub const fn new(stages: Vec<(FilterKind, FilterParams)>) -> Self {
        Self { stages }
    }

    pub fn single(kind: FilterKind) -> Self {
        Self::new(vec![(kind, FilterParams::default())])
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> &[(FilterKind, FilterParams)] {
        &self.stages
    }

    /// Build the chain from a stream dictionary.
    ///
    /// `/Filter` is a name or an array of names; `/DecodeParms` is a
    /// dictionary, or an array aligned with `/Filter` whose entries may be
    /// null.
    pub fn from_stream_attrs<F>(attrs: &HashMap<String, PDFObject>, resolve: F) -> Result<Self>
    where
        F: Fn(&PDFObject) -> PDFObject,
    {
        let Some(filter) = attrs.get("Filter") else {
            return Ok(Self::default());
        };

        let names: Vec<String> = match resolve(filter) {
            PDFObject::Name(name) => vec![name],
            PDFObject::Array(items) => items
                .iter()
                .map(|item| resolve(item).as_name().map(str::to_string))
                .collect::<Result<_>>()?,
            PDFObject::Null => Vec::new(),
            other => {
                return Err(PdfError::TypeError {
                    expected: "name or array",
                    got: other.type_name(),
                });
            }
        };

        let parms: Vec<PDFObject> = match attrs.get("DecodeParms").map(&resolve) {
            Some(PDFObject::Array(items)) => items.iter().map(&resolve).collect(),
            Some(dict @ PDFObject::Dict(_)) => vec![dict],
            _ => Vec::new(),
        };

        let stages = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let kind = FilterKind::from_name(name)?;
                let params = match parms.get(i) {
                    Some(PDFObject::Dict(dict)) => FilterParams::from_dict(dict, &resolve),
                    _ => FilterParams::default(),
                };
                Ok((kind, params))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(stages))
    }

    /// Undo every stage in order.
    pub fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut output = data.to_vec();
        for (kind, params) in &self.stages {
            output = match kind {
                FilterKind::Flate => apply_predictor(&flate_decode(&output)?, params)?,
                FilterKind::Lzw => {
                    apply_predictor(&lzw_decode(&output, params.early_change)?, params)?
                }
                FilterKind::Ascii85 => ascii85decode(&output)?,
                FilterKind::AsciiHex => asciihexdecode(&output)?,
                FilterKind::RunLength => rldecode(&output)?,
                FilterKind::Crypt => output,
                image => {
                    tracing::debug!(filter = image.name(), "leaving image payload encoded");
                    break;
                }
            };
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, PDFObject)]) -> HashMap<String, PDFObject> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn name(s: &str) -> PDFObject {
        PDFObject::Name(s.to_string())
    }

    #[test]
    fn abbreviations_resolve() {
        assert_eq!(FilterKind::from_name("AHx").unwrap(), FilterKind::AsciiHex);
        assert_eq!(FilterKind::from_name("Fl").unwrap(), FilterKind::Flate);
        assert!(matches!(
            FilterKind::from_name("Bogus"),
            Err(PdfError::UnsupportedFilter(_))
        ));
    }

    #[test]
    fn params_defaults_and_clamps() {
        let dict = attrs(&[
            ("Predictor", PDFObject::Int(12)),
            ("Colors", PDFObject::Int(99)),
            ("EarlyChange", PDFObject::Int(0)),
        ]);
        let params = FilterParams::from_dict(&dict, &|o: &PDFObject| o.clone());
        assert_eq!(params.predictor, Predictor::Png);
        assert_eq!(params.colors, MAX_COLORS);
        assert_eq!(params.bits_per_component, 8);
        assert_eq!(params.columns, 1);
        assert!(!params.early_change);
    }

    #[test]
    fn chain_applies_in_order() {
        // "Hi" run-length encoded, then hex encoded.
        let chain = FilterChain::from_stream_attrs(
            &attrs(&[(
                "Filter",
                PDFObject::Array(vec![name("ASCIIHexDecode"), name("RunLengthDecode")]),
            )]),
            |o| o.clone(),
        )
        .unwrap();
        assert_eq!(chain.stages().len(), 2);
        assert_eq!(chain.decode(b"01 48 69 80>").unwrap(), b"Hi");
    }

    #[test]
    fn decode_parms_array_aligns_with_filters() {
        let chain = FilterChain::from_stream_attrs(
            &attrs(&[
                (
                    "Filter",
                    PDFObject::Array(vec![name("A85"), name("LZW")]),
                ),
                (
                    "DecodeParms",
                    PDFObject::Array(vec![
                        PDFObject::Null,
                        PDFObject::Dict(attrs(&[("EarlyChange", PDFObject::Int(0))])),
                    ]),
                ),
            ]),
            |o| o.clone(),
        )
        .unwrap();
        assert!(chain.stages()[0].1.early_change);
        assert!(!chain.stages()[1].1.early_change);
    }

    #[test]
    fn image_filter_ends_chain() {
        let chain = FilterChain::new(vec![
            (FilterKind::AsciiHex, FilterParams::default()),
            (FilterKind::Dct, FilterParams::default()),
        ]);
        assert_eq!(chain.decode(b"FFD8>").unwrap(), vec![0xFF, 0xD8]);
    }

    #[test]
    fn no_filter_is_identity() {
        let chain = FilterChain::from_stream_attrs(&HashMap::new(), |o| o.clone()).unwrap();
        assert!(chain.is_empty());
        assert_eq!(chain.decode(b"raw").unwrap(), b"raw");
    }
}
