//! Stitch lists as handed over by the pattern importer, and the values derived
//! from them (bounds, color blocks, thread colors).

use crate::config::Palette;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Command flags attached to a stitch, using the pyembroidery bit values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StitchCommand(pub u16);

impl StitchCommand {
    pub const NORMAL: StitchCommand = StitchCommand(0x00);
    pub const JUMP: StitchCommand = StitchCommand(0x10);
    pub const TRIM: StitchCommand = StitchCommand(0x20);
    pub const COLOR_CHANGE: StitchCommand = StitchCommand(0x40);
    pub const STOP: StitchCommand = StitchCommand(0x80);
    pub const END: StitchCommand = StitchCommand(0x100);

    pub fn contains(self, other: StitchCommand) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn is_jump(self) -> bool {
        self.contains(Self::JUMP)
    }

    pub fn is_trim(self) -> bool {
        self.contains(Self::TRIM)
    }

    pub fn is_end(self) -> bool {
        self.contains(Self::END)
    }
}

impl std::ops::BitOr for StitchCommand {
    type Output = StitchCommand;

    fn bitor(self, rhs: StitchCommand) -> StitchCommand {
        StitchCommand(self.0 | rhs.0)
    }
}

/// One needle instruction. Coordinates are in device units (0.1 mm).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stitch {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub command: StitchCommand,
    #[serde(default)]
    pub color_index: usize,
}

impl Stitch {
    pub fn new(x: i32, y: i32, command: StitchCommand, color_index: usize) -> Self {
        Self {
            x,
            y,
            command,
            color_index,
        }
    }

    pub fn normal(x: i32, y: i32, color_index: usize) -> Self {
        Self::new(x, y, StitchCommand::NORMAL, color_index)
    }

    pub fn jump(x: i32, y: i32, color_index: usize) -> Self {
        Self::new(x, y, StitchCommand::JUMP, color_index)
    }

    pub fn is_jump(&self) -> bool {
        self.command.is_jump()
    }

    pub fn distance_to(&self, other: &Stitch) -> f64 {
        let dx = f64::from(other.x - self.x);
        let dy = f64::from(other.y - self.y);
        dx.hypot(dy)
    }
}

/// Extent of the stitched (non-jump) positions of a design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
}

impl Bounds {
    pub fn width(&self) -> i32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> i32 {
        self.max_y - self.min_y
    }

    /// Checks the design size against the hoop reported by the machine.
    pub fn fits_hoop(&self, max_width: u16, max_height: u16) -> Result<(), String> {
        let (width, height) = (self.width(), self.height());
        let too_wide = width > i32::from(max_width);
        let too_tall = height > i32::from(max_height);
        match (too_wide, too_tall) {
            (false, false) => Ok(()),
            (true, false) => Err(format!(
                "Pattern is {:.1} mm wide but the hoop allows {:.1} mm",
                f64::from(width) / 10.0,
                f64::from(max_width) / 10.0
            )),
            (false, true) => Err(format!(
                "Pattern is {:.1} mm tall but the hoop allows {:.1} mm",
                f64::from(height) / 10.0,
                f64::from(max_height) / 10.0
            )),
            (true, true) => Err(format!(
                "Pattern is {:.1} x {:.1} mm but the hoop allows {:.1} x {:.1} mm",
                f64::from(width) / 10.0,
                f64::from(height) / 10.0,
                f64::from(max_width) / 10.0,
                f64::from(max_height) / 10.0
            )),
        }
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "x: {}..{}, y: {}..{} ({} x {})",
            self.min_x,
            self.max_x,
            self.min_y,
            self.max_y,
            self.width(),
            self.height()
        )
    }
}

/// Accumulates bounds over a sequence of positions.
#[derive(Debug, Default)]
pub(crate) struct BoundsBuilder {
    bounds: Option<Bounds>,
}

impl BoundsBuilder {
    pub(crate) fn include(&mut self, x: i32, y: i32) {
        self.bounds = Some(match self.bounds {
            None => Bounds {
                min_x: x,
                max_x: x,
                min_y: y,
                max_y: y,
            },
            Some(b) => Bounds {
                min_x: b.min_x.min(x),
                max_x: b.max_x.max(x),
                min_y: b.min_y.min(y),
                max_y: b.max_y.max(y),
            },
        });
    }

    pub(crate) fn finish(self) -> Bounds {
        self.bounds.unwrap_or_default()
    }
}

/// A maximal run of stitches sharing one thread color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColorBlock {
    pub color_index: usize,
    /// Index of the first stitch of the block
    pub start: usize,
    /// Index one past the last stitch of the block
    pub end: usize,
}

impl ColorBlock {
    pub fn stitch_count(&self) -> usize {
        self.end - self.start
    }
}

pub fn color_blocks(stitches: &[Stitch]) -> Vec<ColorBlock> {
    let mut blocks: Vec<ColorBlock> = Vec::new();
    for (i, stitch) in stitches.iter().enumerate() {
        match blocks.last_mut() {
            Some(block) if block.color_index == stitch.color_index => block.end = i + 1,
            _ => blocks.push(ColorBlock {
                color_index: stitch.color_index,
                start: i,
                end: i + 1,
            }),
        }
    }
    blocks
}

/// Thread metadata carried alongside a design.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Thread {
    pub hex: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub catalog_number: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl fmt::Display for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex)?;
        if let Some(brand) = &self.brand {
            write!(f, " {brand}")?;
        }
        if let Some(number) = &self.catalog_number {
            write!(f, " #{number}")?;
        }
        if let Some(description) = &self.description {
            write!(f, " ({description})")?;
        }
        Ok(())
    }
}

/// Color for a color index: the design's own thread if it has one, the
/// palette otherwise.
pub fn thread_color(threads: &[Thread], color_index: usize, palette: &Palette) -> String {
    match threads.get(color_index) {
        Some(thread) if !thread.hex.is_empty() => thread.hex.clone(),
        _ => palette.color(color_index).to_string(),
    }
}

/// A decoded design: the importer's stitch list plus its threads.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Design {
    pub stitches: Vec<Stitch>,
    #[serde(default)]
    pub threads: Vec<Thread>,
}

impl Design {
    pub fn from_json(json: &str) -> Result<Self, crate::error::PP1Error> {
        Ok(serde_json::from_str(json)?)
    }
}
