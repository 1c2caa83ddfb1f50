//! Compiles a stitch list into PEN data.
//!
//! Besides the one-record-per-stitch translation, the encoder secures the
//! thread wherever it gets cut: before and after every color change and around
//! every long jump it inserts a set of lock stitches, a short back-and-forth
//! tack along the direction the needle is travelling.

use crate::constants::{
    LOCK_DIRECTION_LENGTH, LOCK_OFFSET_SCALE, LOCK_STITCH_BYTES, LOCK_STITCH_COUNT, LONG_JUMP_THRESHOLD,
    MAX_COORDINATE,
};
use crate::error::PP1Error;
use crate::pen::{CUT, FEED, PenRecord, XFlag};
use crate::stitch::{Bounds, BoundsBuilder, Stitch};
use tracing::debug;

/// Output of [`encode`]: the PEN byte stream and the stitched extent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodedPattern {
    pub bytes: Vec<u8>,
    pub bounds: Bounds,
}

impl EncodedPattern {
    pub fn record_count(&self) -> usize {
        self.bytes.len() / 4
    }
}

/// A 2-D direction used to orient lock stitches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LockDirection {
    pub dir_x: f64,
    pub dir_y: f64,
}

impl LockDirection {
    pub fn fallback() -> Self {
        let component = LOCK_DIRECTION_LENGTH / std::f64::consts::SQRT_2;
        Self {
            dir_x: component,
            dir_y: component,
        }
    }

    pub fn magnitude(&self) -> f64 {
        self.dir_x.hypot(self.dir_y)
    }
}

/// Estimates the sewing direction around `index`.
///
/// Sums the deltas between consecutive non-jump stitches starting at `index`
/// and walking forward (increasing index) or backward until the sum is at
/// least [`LOCK_DIRECTION_LENGTH`] long, then rescales it to exactly that
/// length. With fewer than two usable stitches the diagonal fallback is used.
pub fn calculate_lock_direction(stitches: &[Stitch], index: usize, forward: bool) -> LockDirection {
    if index >= stitches.len() {
        return LockDirection::fallback();
    }

    let indices: Box<dyn Iterator<Item = usize>> = if forward {
        Box::new(index..stitches.len())
    } else {
        Box::new((0..=index).rev())
    };

    let (mut acc_x, mut acc_y) = (0.0_f64, 0.0_f64);
    let mut previous: Option<&Stitch> = None;
    let mut usable = 0;

    for stitch in indices.map(|i| &stitches[i]).filter(|s| !s.is_jump()) {
        usable += 1;
        if let Some(prev) = previous {
            acc_x += f64::from(stitch.x - prev.x);
            acc_y += f64::from(stitch.y - prev.y);
            if acc_x.hypot(acc_y) >= LOCK_DIRECTION_LENGTH {
                break;
            }
        }
        previous = Some(stitch);
    }

    let length = acc_x.hypot(acc_y);
    if usable < 2 || length == 0.0 {
        return LockDirection::fallback();
    }

    let scale = LOCK_DIRECTION_LENGTH / length;
    LockDirection {
        dir_x: acc_x * scale,
        dir_y: acc_y * scale,
    }
}

/// Eight records tacking back and forth around `(x, y)` along the direction.
pub fn generate_lock_stitches(x: f64, y: f64, dir_x: f64, dir_y: f64) -> Vec<u8> {
    let offset_x = dir_x * LOCK_OFFSET_SCALE;
    let offset_y = dir_y * LOCK_OFFSET_SCALE;

    let mut bytes = Vec::with_capacity(LOCK_STITCH_BYTES);
    for i in 0..LOCK_STITCH_COUNT {
        let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
        let record = PenRecord::at(x + sign * offset_x, y + sign * offset_y);
        bytes.extend_from_slice(&record.into_bytes());
    }
    bytes
}

fn check_range(stitches: &[Stitch]) -> Result<(), PP1Error> {
    let range = -MAX_COORDINATE..=MAX_COORDINATE;
    match stitches
        .iter()
        .enumerate()
        .find(|(_, s)| !range.contains(&s.x) || !range.contains(&s.y))
    {
        Some((index, s)) => Err(PP1Error::CoordinateOutOfRange {
            index,
            x: i64::from(s.x),
            y: i64::from(s.y),
            limit: MAX_COORDINATE,
        }),
        None => Ok(()),
    }
}

struct PenWriter {
    records: Vec<PenRecord>,
}

impl PenWriter {
    fn push(&mut self, record: PenRecord) {
        self.records.push(record);
    }

    fn push_lock(&mut self, x: i32, y: i32, direction: LockDirection) {
        let bytes = generate_lock_stitches(f64::from(x), f64::from(y), direction.dir_x, direction.dir_y);
        for chunk in bytes.chunks_exact(4) {
            self.records.push(PenRecord::from_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
    }

    fn last_mut(&mut self) -> Option<&mut PenRecord> {
        self.records.last_mut()
    }

    fn into_bytes(self) -> Vec<u8> {
        self.records.iter().flat_map(|r| r.into_bytes()).collect()
    }
}

/// Encodes a stitch list into PEN bytes.
///
/// Encoding stops after the first stitch flagged END; the final record always
/// carries `DATA_END`. Every stitch up to that point is range-checked before
/// anything is produced.
pub fn encode(stitches: &[Stitch]) -> Result<EncodedPattern, PP1Error> {
    let emitted = stitches
        .iter()
        .position(|s| s.command.is_end())
        .map_or(stitches.len(), |end| end + 1);
    check_range(&stitches[..emitted])?;

    let mut writer = PenWriter { records: Vec::new() };
    let mut bounds = BoundsBuilder::default();
    let mut long_jumps = 0;
    let mut color_changes = 0;

    for (i, stitch) in stitches.iter().enumerate() {
        let (x, y) = (stitch.x, stitch.y);

        if stitch.is_jump() {
            let previous = i.checked_sub(1).map(|p| &stitches[p]);
            match previous {
                Some(prev) if prev.distance_to(stitch) > LONG_JUMP_THRESHOLD => {
                    long_jumps += 1;
                    writer.push_lock(prev.x, prev.y, calculate_lock_direction(stitches, i - 1, false));
                    let mut record = PenRecord::at(f64::from(x), f64::from(y));
                    record.add_y_flags(FEED | CUT);
                    writer.push(record);
                    writer.push_lock(x, y, calculate_lock_direction(stitches, i, true));
                }
                _ => {
                    let mut record = PenRecord::at(f64::from(x), f64::from(y));
                    record.add_y_flags(FEED);
                    writer.push(record);
                }
            }
        } else {
            let mut record = PenRecord::at(f64::from(x), f64::from(y));
            if stitch.command.is_trim() {
                record.add_y_flags(CUT);
            }
            writer.push(record);
            bounds.include(x, y);
        }

        if stitch.command.is_end() {
            break;
        }

        if let Some(next) = stitches.get(i + 1) {
            if next.color_index != stitch.color_index {
                color_changes += 1;
                if let Some(last) = writer.last_mut() {
                    last.set_x_flag(XFlag::ColorEnd);
                }
                writer.push_lock(x, y, calculate_lock_direction(stitches, i, false));
                let mut cut = PenRecord::at(f64::from(x), f64::from(y));
                cut.add_y_flags(CUT);
                writer.push(cut);
                writer.push_lock(next.x, next.y, calculate_lock_direction(stitches, i + 1, true));
            }
        }
    }

    if let Some(last) = writer.last_mut() {
        last.set_x_flag(XFlag::DataEnd);
    }

    let bytes = writer.into_bytes();
    debug!(
        stitches = stitches.len(),
        bytes = bytes.len(),
        long_jumps,
        color_changes,
        "Encoded PEN data"
    );

    Ok(EncodedPattern {
        bytes,
        bounds: bounds.finish(),
    })
}
