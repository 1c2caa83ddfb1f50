//! PEN records: the machine's 4-byte stitch unit.
//!
//! Each record holds a 16-bit little-endian X followed by a 16-bit
//! little-endian Y. The coordinate occupies the upper 13 bits of each word
//! (`coordinate << 3`), the lower 3 bits carry a flag code.

use crate::constants::PEN_RECORD_SIZE;
use crate::error::PP1Error;
use modular_bitfield::prelude::*;
use num_enum::{FromPrimitive, IntoPrimitive};
use std::fmt;

#[bitfield(bytes = 4)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PenRecord {
    pub x_flags: B3,
    pub x: B13,
    pub y_flags: B3,
    pub y: B13,
}

/// Flag codes stored in the low bits of X. Mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum XFlag {
    None = 0x00,
    /// Last stitch of the outgoing color, a color change follows
    ColorEnd = 0x03,
    /// Last stitch of the design
    DataEnd = 0x05,

    #[num_enum(catch_all)]
    Unknown(u8),
}

/// Y flag bit: travel move, no needle penetration
pub const FEED: u8 = 0x01;
/// Y flag bit: trim the thread here
pub const CUT: u8 = 0x02;

const COORDINATE_MASK: u16 = 0x1FFF;

fn to_field(value: f64) -> u16 {
    // Two's complement in 13 bits, i.e. `(value << 3) & 0xFFFF` without the flag bits.
    // Halves round toward +inf, matching the machine app.
    ((value + 0.5).floor() as i64 as u16) & COORDINATE_MASK
}

fn from_field(raw: u16) -> i16 {
    ((raw << 3) as i16) >> 3
}

impl PenRecord {
    pub fn at(x: f64, y: f64) -> Self {
        PenRecord::new().with_x(to_field(x)).with_y(to_field(y))
    }

    pub fn x_flag(&self) -> XFlag {
        XFlag::from_primitive(self.x_flags())
    }

    /// Replaces the X flag code, leaving the coordinate alone.
    pub fn set_x_flag(&mut self, flag: XFlag) {
        self.set_x_flags(u8::from(flag) & 0x07);
    }

    /// Adds Y flag bits (`FEED`, `CUT`).
    pub fn add_y_flags(&mut self, flags: u8) {
        let merged = self.y_flags() | (flags & 0x07);
        self.set_y_flags(merged);
    }

    pub fn is_feed(&self) -> bool {
        self.y_flags() & FEED != 0
    }

    pub fn is_cut(&self) -> bool {
        self.y_flags() & CUT != 0
    }

    pub fn x_coordinate(&self) -> i16 {
        from_field(self.x())
    }

    pub fn y_coordinate(&self) -> i16 {
        from_field(self.y())
    }
}

impl fmt::Display for PenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:5}, {:5})", self.x_coordinate(), self.y_coordinate())?;
        match self.x_flag() {
            XFlag::None => {}
            XFlag::ColorEnd => write!(f, " COLOR_END")?,
            XFlag::DataEnd => write!(f, " DATA_END")?,
            XFlag::Unknown(code) => write!(f, " X_FLAG({code:#x})")?,
        }
        if self.is_feed() {
            write!(f, " FEED")?;
        }
        if self.is_cut() {
            write!(f, " CUT")?;
        }
        Ok(())
    }
}

/// Encodes a position as `[xLow, xHigh, yLow, yHigh]` with no flags set.
///
/// Coordinates are rounded to the nearest unit (halves up) and wrap at 16 bits after the
/// shift; range checking is the caller's job.
pub fn encode_stitch_position(x: f64, y: f64) -> [u8; 4] {
    PenRecord::at(x, y).into_bytes()
}

/// Splits a PEN byte stream back into records.
pub fn decode_pen(bytes: &[u8]) -> Result<Vec<PenRecord>, PP1Error> {
    if bytes.len() % PEN_RECORD_SIZE != 0 {
        return Err(PP1Error::InvalidPen(format!(
            "length {} is not a multiple of {}",
            bytes.len(),
            PEN_RECORD_SIZE
        )));
    }
    Ok(bytes
        .chunks_exact(PEN_RECORD_SIZE)
        .map(|chunk| PenRecord::from_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Counts of the markers found in a PEN stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PenSummary {
    pub records: usize,
    pub feeds: usize,
    pub cuts: usize,
    pub color_ends: usize,
    pub data_ends: usize,
}

impl PenSummary {
    pub fn of(records: &[PenRecord]) -> Self {
        records.iter().fold(PenSummary::default(), |mut summary, record| {
            summary.records += 1;
            summary.feeds += usize::from(record.is_feed());
            summary.cuts += usize::from(record.is_cut());
            match record.x_flag() {
                XFlag::ColorEnd => summary.color_ends += 1,
                XFlag::DataEnd => summary.data_ends += 1,
                _ => {}
            }
            summary
        })
    }
}

impl fmt::Display for PenSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records, {} feeds, {} cuts, {} color ends, {} data ends",
            self.records, self.feeds, self.cuts, self.color_ends, self.data_ends
        )
    }
}
