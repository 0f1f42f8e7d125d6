// Paper sizes and centimeter to pixel conversion for the print canvas

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::config::PrinterConfig;
use crate::errors::SheetFormatError;

pub const CM_PER_INCH: f64 = 2.54;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SheetFormat {
    A4,
    A5,
    A6,
}

impl SheetFormat {
    /// Portrait (width, height) in centimeters.
    pub fn size_cm(self) -> (f64, f64) {
        match self {
            SheetFormat::A4 => (21.0, 29.7),
            SheetFormat::A5 => (14.8, 21.0),
            SheetFormat::A6 => (10.5, 14.8),
        }
    }
}

impl FromStr for SheetFormat {
    type Err = SheetFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A4" => Ok(SheetFormat::A4),
            "A5" => Ok(SheetFormat::A5),
            "A6" => Ok(SheetFormat::A6),
            other => Err(SheetFormatError::Unknown(other.to_string())),
        }
    }
}

impl fmt::Display for SheetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SheetFormat::A4 => "A4",
            SheetFormat::A5 => "A5",
            SheetFormat::A6 => "A6",
        };
        f.write_str(name)
    }
}

/// Resolve a format name to its portrait size in centimeters.
pub fn sheet_size_cm(name: &str) -> Result<(f64, f64), SheetFormatError> {
    Ok(name.parse::<SheetFormat>()?.size_cm())
}

pub fn cm_to_px(cm: f64, dpi: f64) -> f64 {
    cm * dpi / CM_PER_INCH
}

/// Four-sided spacing, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Margins {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Margins {
    pub fn uniform(value: f64) -> Self {
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }

    /// From `[top, right, bottom, left]` in centimeters.
    pub fn from_cm(values: [f64; 4], dpi: f64) -> Self {
        let [top, right, bottom, left] = values.map(|v| cm_to_px(v, dpi));
        Self {
            top,
            right,
            bottom,
            left,
        }
    }
}

/// Canvas geometry for one print, already in pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetGeometry {
    pub format: SheetFormat,
    /// Landscape: the long side of the sheet is the width.
    pub canvas: (u32, u32),
    pub margins: Margins,
    pub spacing: f64,
    pub per_row: u32,
}

impl SheetGeometry {
    pub fn from_config(config: &PrinterConfig) -> Result<Self, SheetFormatError> {
        let format: SheetFormat = config.sheet_format.parse()?;
        let (short, long) = format.size_cm();
        let dpi = config.dpi;

        Ok(Self {
            format,
            canvas: (cm_to_px(long, dpi) as u32, cm_to_px(short, dpi) as u32),
            margins: Margins::from_cm(config.sheet_margins, dpi),
            spacing: cm_to_px(config.pics_spacing, dpi),
            per_row: config.pics_per_row,
        })
    }
}
