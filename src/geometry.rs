//! Mask and crop geometry.
//!
//! Coordinates are pixels of the *rendered* page, so they depend on the
//! configured density. Nothing here is checked against a real page: a mask
//! outside the image paints nothing, and a mask whose corners are reversed
//! (`x1 <= x0` or `y1 <= y0`) is a zero-area paint rather than an error.

use crate::error::PdfDiffError;
use image::Rgba;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Redaction rectangle given by two corners, `[x0, x1) × [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MaskRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl MaskRect {
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// True when the rectangle covers no pixel at all.
    pub fn is_degenerate(&self) -> bool {
        self.x1 <= self.x0 || self.y1 <= self.y0
    }
}

/// Extraction rectangle given by size and top-left offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CropRect {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

impl CropRect {
    pub fn new(width: u32, height: u32, x: u32, y: u32) -> Self {
        Self { width, height, x, y }
    }
}

/// Fill colour of a mask: a colour name or a hex literal.
///
/// The ImageMagick engine passes the string through untouched; the native
/// engine resolves it with [`MaskColor::to_rgba`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaskColor(String);

impl Default for MaskColor {
    fn default() -> Self {
        Self("black".to_string())
    }
}

impl fmt::Display for MaskColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MaskColor {
    fn from(s: &str) -> Self {
        Self(s.trim().to_string())
    }
}

impl From<String> for MaskColor {
    fn from(s: String) -> Self {
        Self(s.trim().to_string())
    }
}

impl MaskColor {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve to an RGBA pixel.
    pub fn to_rgba(&self) -> Result<Rgba<u8>, PdfDiffError> {
        let s = self.0.to_ascii_lowercase();
        if let Some(hex) = s.strip_prefix('#') {
            return parse_hex(hex).ok_or_else(|| PdfDiffError::InvalidColor(self.0.clone()));
        }
        let rgb = match s.as_str() {
            "black" => [0, 0, 0],
            "white" => [255, 255, 255],
            "red" => [255, 0, 0],
            "green" => [0, 128, 0],
            "lime" => [0, 255, 0],
            "blue" => [0, 0, 255],
            "yellow" => [255, 255, 0],
            "cyan" => [0, 255, 255],
            "magenta" | "fuchsia" => [255, 0, 255],
            "gray" | "grey" => [128, 128, 128],
            "orange" => [255, 165, 0],
            "transparent" => return Ok(Rgba([0, 0, 0, 0])),
            _ => return Err(PdfDiffError::InvalidColor(self.0.clone())),
        };
        Ok(Rgba([rgb[0], rgb[1], rgb[2], 255]))
    }
}

fn parse_hex(hex: &str) -> Option<Rgba<u8>> {
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let nibble = |i: usize| u8::from_str_radix(&hex[i..=i], 16).ok().map(|v| v * 17);
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        3 => Some(Rgba([nibble(0)?, nibble(1)?, nibble(2)?, 255])),
        6 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, 255])),
        8 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
        _ => None,
    }
}

/// A redaction applied to one page before comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskSpec {
    pub page_index: usize,
    #[serde(rename = "coordinates")]
    pub rect: MaskRect,
    #[serde(default)]
    pub color: MaskColor,
}

impl MaskSpec {
    pub fn new(page_index: usize, rect: MaskRect, color: impl Into<MaskColor>) -> Self {
        Self {
            page_index,
            rect,
            color: color.into(),
        }
    }
}

/// A sub-region of one page compared as its own image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropSpec {
    pub page_index: usize,
    #[serde(rename = "coordinates")]
    pub rect: CropRect,
}

impl CropSpec {
    pub fn new(page_index: usize, rect: CropRect) -> Self {
        Self { page_index, rect }
    }
}

/// Path of the `index`-th crop of `png`: `dir/page-3.png` → `dir/page-3-<index>.png`.
pub fn derived_crop_path(png: &Path, index: usize) -> PathBuf {
    let stem = png
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = png
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "png".to_string());
    png.with_file_name(format!("{stem}-{index}.{ext}"))
}

// ── CLI-friendly parsing ────────────────────────────────────────────────────

fn parse_numbers<const N: usize>(s: &str, what: &str) -> Result<[u32; N], String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != N {
        return Err(format!("{what} needs {N} comma-separated numbers, got '{s}'"));
    }
    let mut out = [0u32; N];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part
            .parse()
            .map_err(|_| format!("invalid number '{part}' in {what}"))?;
    }
    Ok(out)
}

fn split_page(s: &str, what: &str) -> Result<(usize, String), String> {
    let (page, rest) = s
        .split_once(':')
        .ok_or_else(|| format!("{what} must start with 'PAGE:', got '{s}'"))?;
    let page = page
        .trim()
        .parse()
        .map_err(|_| format!("invalid page index '{page}' in {what}"))?;
    Ok((page, rest.to_string()))
}

/// Parses `PAGE:X0,Y0,X1,Y1[:COLOR]`.
impl FromStr for MaskSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (page_index, rest) = split_page(s, "mask")?;
        let (coords, color) = match rest.split_once(':') {
            Some((c, color)) => (c.to_string(), MaskColor::from(color)),
            None => (rest, MaskColor::default()),
        };
        let [x0, y0, x1, y1] = parse_numbers::<4>(&coords, "mask")?;
        Ok(Self::new(page_index, MaskRect::new(x0, y0, x1, y1), color))
    }
}

/// Parses `PAGE:WIDTH,HEIGHT,X,Y`.
impl FromStr for CropSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (page_index, rest) = split_page(s, "crop")?;
        let [width, height, x, y] = parse_numbers::<4>(&rest, "crop")?;
        Ok(Self::new(page_index, CropRect::new(width, height, x, y)))
    }
}
