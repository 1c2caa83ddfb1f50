//! Sewing time estimates, using the formula the machine's own app uses:
//! 150 ms per stitch plus 3 s of startup per color block, rounded up to whole
//! minutes.

use crate::stitch::ColorBlock;
use serde::Serialize;
use tracing::trace;

const MS_PER_STITCH: u64 = 150;
const STARTUP_MS: u64 = 3000;
const MS_PER_MINUTE: u64 = 60_000;

/// Minutes needed to sew `stitch_count` stitches of one color.
pub fn stitches_to_minutes(stitch_count: usize) -> u64 {
    if stitch_count <= 1 {
        return 0;
    }
    let time_ms = (stitch_count as u64 - 1) * MS_PER_STITCH + STARTUP_MS;
    time_ms.div_ceil(MS_PER_MINUTE).max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PatternTime {
    pub total_minutes: u64,
    pub elapsed_minutes: u64,
    pub remaining_minutes: u64,
}

/// Total, elapsed and remaining time for a pattern sewn up to `current_stitch`.
pub fn pattern_time(blocks: &[ColorBlock], current_stitch: usize) -> PatternTime {
    let total_minutes: u64 = blocks.iter().map(|b| stitches_to_minutes(b.stitch_count())).sum();

    let mut elapsed_minutes = 0;
    let mut cumulative = 0;
    for block in blocks {
        let count = block.stitch_count();
        let before = cumulative;
        cumulative += count;

        if cumulative < current_stitch {
            elapsed_minutes += stitches_to_minutes(count);
        } else {
            // Current block: either just finished or partway through.
            elapsed_minutes += stitches_to_minutes(current_stitch.saturating_sub(before));
            break;
        }
    }

    trace!(total_minutes, elapsed_minutes, current_stitch, "Pattern time");
    PatternTime {
        total_minutes,
        elapsed_minutes,
        remaining_minutes: total_minutes.saturating_sub(elapsed_minutes),
    }
}

/// Formats fractional minutes as `M:SS`.
pub fn format_minutes(minutes: f64) -> String {
    let mut whole = minutes.floor() as u64;
    let mut seconds = ((minutes - minutes.floor()) * 60.0).round() as u64;
    if seconds == 60 {
        whole += 1;
        seconds = 0;
    }
    format!("{whole}:{seconds:02}")
}
