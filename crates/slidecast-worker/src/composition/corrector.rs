//! Timeline correction against the authoritative duration.
//!
//! Bullet `i` of `N` is given the window `[i*D/N, (i+1)*D/N)`, with the last
//! window ending exactly at `D`. The windows depend only on `i`, `N` and `D`,
//! so correcting an already corrected timeline with the same `D` reproduces
//! it bit for bit.

use slidecast_models::{Bullet, Timeline, TimelineStage};

use crate::composition::duration::ResolvedDuration;
use crate::error::{WorkerError, WorkerResult};

/// Space `bullets` evenly over `[0, total)` in their current order.
pub fn assign_windows(bullets: &mut [Bullet], total: f64) -> WorkerResult<()> {
    if bullets.is_empty() {
        return Err(WorkerError::invalid_timeline("timeline has no bullets"));
    }
    if !(total.is_finite() && total > 0.0) {
        return Err(WorkerError::invalid_timeline(format!(
            "duration {} is not a positive finite number",
            total
        )));
    }

    let n = bullets.len();
    let count = n as f64;
    for (i, bullet) in bullets.iter_mut().enumerate() {
        let start = (i as f64 * total) / count;
        let end = if i + 1 == n {
            total
        } else {
            (((i + 1) as f64 * total) / count).min(total)
        };
        bullet.scheduled_start = start;
        bullet.scheduled_end = end;
    }

    validate_windows(bullets, total)
}

/// Every window non-negative, ordered, inside `[0, total]` and not
/// overlapping its successor.
fn validate_windows(bullets: &[Bullet], total: f64) -> WorkerResult<()> {
    let mut previous_end = 0.0;
    for bullet in bullets {
        if bullet.scheduled_start < previous_end
            || bullet.scheduled_end < bullet.scheduled_start
            || bullet.scheduled_end > total
        {
            return Err(WorkerError::invalid_timeline(format!(
                "bullet {} has window [{}, {}) outside [{}, {}]",
                bullet.ordinal, bullet.scheduled_start, bullet.scheduled_end, previous_end, total
            )));
        }
        previous_end = bullet.scheduled_end;
    }
    Ok(())
}

/// Build the corrected timeline. The provisional timeline is left untouched.
pub fn correct_timeline(provisional: &Timeline, duration: ResolvedDuration) -> WorkerResult<Timeline> {
    let mut bullets = provisional.bullets.clone();
    bullets.sort_by_key(|b| b.ordinal);
    assign_windows(&mut bullets, duration.seconds)?;

    Ok(Timeline {
        bullets,
        total_duration: duration.seconds,
        stage: TimelineStage::Corrected,
        duration_source: duration.source,
    })
}
