//! Duration reconciliation between a clip sequence and an externally timed audio track.
//!
//! Only durations are handled here. The encoder turns a [`ReconcilePlan`] or a
//! [`BedPlan`] into ffmpeg inputs later on.

use log::debug;

/// Two durations closer than this are treated as equal (one millisecond).
pub const DURATION_EPSILON: f64 = 0.001;

/// Errors raised by the reconciliation routines
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TimingError {
    #[error("Segment sequence is empty")]
    EmptySequence,

    #[error("Target duration must be positive and finite, got {0}")]
    InvalidTarget(f64),

    #[error("Segment {index} has invalid duration {duration}")]
    InvalidSegment { index: usize, duration: f64 },

    #[error("Audio bed has invalid duration {0}")]
    InvalidBed(f64),
}

/// A fixed-duration media unit in a sequence
#[derive(Debug, Clone, PartialEq)]
pub struct Segment<S> {
    /// Whatever the caller uses to find the media again (usually a path)
    pub source: S,
    /// Own duration in seconds
    pub duration: f64,
}

impl<S> Segment<S> {
    pub fn new(source: S, duration: f64) -> Self {
        Self { source, duration }
    }
}

/// One entry of the reconciled sequence: play `take` seconds from the start of
/// the segment at `index` in the original sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedClip {
    pub index: usize,
    pub take: f64,
}

/// What happened to the sequence tail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Unchanged,
    Truncated,
    /// The last segment was appended `repeats` times before the final cut
    Extended { repeats: usize },
}

/// Result of reconciling a segment sequence against a target duration
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilePlan {
    pub clips: Vec<PlannedClip>,
    pub adjustment: Adjustment,
    /// Sum of all `take` values
    pub total: f64,
}

impl ReconcilePlan {
    /// Pair each planned clip with its source
    pub fn resolve<'a, S>(&self, segments: &'a [Segment<S>]) -> Vec<(&'a S, f64)> {
        self.clips
            .iter()
            .map(|clip| (&segments[clip.index].source, clip.take))
            .collect()
    }
}

/// How to fit a continuous audio bed to a target duration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BedPlan {
    /// Total number of times the bed is played back to back (1 = no looping)
    pub plays: u32,
    /// Length the looped bed is cut to
    pub trim_to: f64,
}

impl BedPlan {
    pub fn is_looped(&self) -> bool {
        self.plays > 1
    }
}

fn check_target(target: f64) -> Result<(), TimingError> {
    if !target.is_finite() || target <= 0.0 {
        return Err(TimingError::InvalidTarget(target));
    }
    Ok(())
}

/// Trim or extend a segment sequence so it lasts exactly `target` seconds.
///
/// A longer sequence is cut at `target`, possibly in the middle of a segment.
/// A shorter one gets its last segment repeated `floor(deficit / last) + 1`
/// times and is then cut at `target`. Only the tail is ever touched.
pub fn reconcile_segments<S>(
    segments: &[Segment<S>],
    target: f64,
) -> Result<ReconcilePlan, TimingError> {
    check_target(target)?;
    if segments.is_empty() {
        return Err(TimingError::EmptySequence);
    }
    for (index, segment) in segments.iter().enumerate() {
        if !segment.duration.is_finite() || segment.duration <= 0.0 {
            return Err(TimingError::InvalidSegment {
                index,
                duration: segment.duration,
            });
        }
    }

    let sum: f64 = segments.iter().map(|s| s.duration).sum();
    let last = segments.len() - 1;

    if (sum - target).abs() <= DURATION_EPSILON {
        debug!("Sequence of {:.3}s already matches target {:.3}s", sum, target);
        let clips = (0..segments.len())
            .map(|index| PlannedClip {
                index,
                take: segments[index].duration,
            })
            .collect();
        return Ok(ReconcilePlan {
            clips,
            adjustment: Adjustment::Unchanged,
            total: sum,
        });
    }

    let (order, adjustment): (Vec<usize>, Adjustment) = if sum > target {
        ((0..segments.len()).collect(), Adjustment::Truncated)
    } else {
        let deficit = target - sum;
        let repeats = (deficit / segments[last].duration).floor() as usize + 1;
        debug!(
            "Sequence short by {:.3}s, repeating segment {} {} time(s)",
            deficit, last, repeats
        );
        let order = (0..segments.len())
            .chain(std::iter::repeat(last).take(repeats))
            .collect();
        (order, Adjustment::Extended { repeats })
    };

    let clips = cut_at(segments, &order, target);
    let total = clips.iter().map(|c| c.take).sum();

    Ok(ReconcilePlan {
        clips,
        adjustment,
        total,
    })
}

/// Walk `order` and keep whole segments until `target` is reached; the segment
/// straddling the boundary is cut, anything after it is dropped.
fn cut_at<S>(segments: &[Segment<S>], order: &[usize], target: f64) -> Vec<PlannedClip> {
    let mut clips = Vec::with_capacity(order.len());
    let mut elapsed = 0.0;

    for &index in order {
        let remaining = target - elapsed;
        if remaining <= DURATION_EPSILON {
            break;
        }
        let duration = segments[index].duration;
        if duration <= remaining + DURATION_EPSILON {
            clips.push(PlannedClip {
                index,
                take: duration.min(remaining),
            });
            elapsed += duration;
        } else {
            clips.push(PlannedClip {
                index,
                take: remaining,
            });
            elapsed = target;
        }
    }

    clips
}

/// Fit a background audio bed to `target` seconds.
///
/// A shorter bed is played `floor(target / bed) + 1` times back to back; the
/// result (or a longer bed as is) is then cut to exactly `target`.
pub fn reconcile_bed(bed_duration: f64, target: f64) -> Result<BedPlan, TimingError> {
    check_target(target)?;
    if !bed_duration.is_finite() || bed_duration <= 0.0 {
        return Err(TimingError::InvalidBed(bed_duration));
    }

    let plays = if bed_duration < target - DURATION_EPSILON {
        (target / bed_duration).floor() as u32 + 1
    } else {
        1
    };

    Ok(BedPlan {
        plays,
        trim_to: target,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments(durations: &[f64]) -> Vec<Segment<usize>> {
        durations
            .iter()
            .enumerate()
            .map(|(i, &d)| Segment::new(i, d))
            .collect()
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() <= DURATION_EPSILON, "{} != {}", a, b);
    }

    #[test]
    fn test_extend_repeats_last_segment() {
        let segs = segments(&[4.0, 4.0, 4.0]);
        let plan = reconcile_segments(&segs, 20.0).unwrap();

        assert_eq!(plan.adjustment, Adjustment::Extended { repeats: 3 });
        assert_close(plan.total, 20.0);

        let indices: Vec<usize> = plan.clips.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 2, 2]);
    }

    #[test]
    fn test_truncate_mid_segment() {
        let segs = segments(&[5.0, 5.0, 5.0, 5.0]);
        let plan = reconcile_segments(&segs, 13.0).unwrap();

        assert_eq!(plan.adjustment, Adjustment::Truncated);
        assert_eq!(plan.clips.len(), 3);
        assert_close(plan.clips[0].take, 5.0);
        assert_close(plan.clips[1].take, 5.0);
        assert_close(plan.clips[2].take, 3.0);
        assert_eq!(plan.clips[2].index, 2);
        assert_close(plan.total, 13.0);
    }

    #[test]
    fn test_matching_sequence_is_unchanged() {
        let segs = segments(&[2.5, 2.5]);
        let plan = reconcile_segments(&segs, 5.0004).unwrap();
        assert_eq!(plan.adjustment, Adjustment::Unchanged);
        assert_eq!(plan.clips.len(), 2);
    }

    #[test]
    fn test_extend_partial_repeat() {
        let segs = segments(&[3.0, 2.0]);
        let plan = reconcile_segments(&segs, 8.5).unwrap();

        // deficit 3.5 -> floor(3.5 / 2) + 1 = 2 repeats, 9s cut to 8.5s
        assert_eq!(plan.adjustment, Adjustment::Extended { repeats: 2 });
        assert_eq!(plan.clips.len(), 4);
        assert_close(plan.clips[3].take, 1.5);
        assert_close(plan.total, 8.5);
    }

    #[test]
    fn test_original_order_is_prefix() {
        let durations = [1.2, 0.7, 3.3, 2.0];
        let segs = segments(&durations);
        for target in [0.5, 2.0, 4.9, 7.2, 9.0, 15.75, 31.0] {
            let plan = reconcile_segments(&segs, target).unwrap();
            assert_close(plan.total, target);

            for (pos, clip) in plan.clips.iter().enumerate() {
                let expected = pos.min(durations.len() - 1);
                assert_eq!(clip.index, expected, "target {}", target);
                assert!(clip.take <= durations[clip.index] + DURATION_EPSILON);
            }
        }
    }

    #[test]
    fn test_resolve_maps_sources() {
        let segs = vec![Segment::new("a.mp4", 2.0), Segment::new("b.mp4", 1.0)];
        let plan = reconcile_segments(&segs, 4.5).unwrap();
        let resolved = plan.resolve(&segs);
        let names: Vec<&str> = resolved.iter().map(|(s, _)| **s).collect();
        assert_eq!(names, vec!["a.mp4", "b.mp4", "b.mp4", "b.mp4"]);
    }

    #[test]
    fn test_invalid_inputs() {
        let empty: Vec<Segment<usize>> = Vec::new();
        assert_eq!(
            reconcile_segments(&empty, 3.0),
            Err(TimingError::EmptySequence)
        );
        assert_eq!(
            reconcile_segments(&segments(&[1.0]), 0.0),
            Err(TimingError::InvalidTarget(0.0))
        );
        assert!(matches!(
            reconcile_segments(&segments(&[1.0, -2.0]), 3.0),
            Err(TimingError::InvalidSegment { index: 1, .. })
        ));
        assert!(reconcile_bed(0.0, 3.0).is_err());
        assert!(reconcile_bed(2.0, f64::NAN).is_err());
    }

    #[test]
    fn test_bed_shorter_is_looped() {
        let plan = reconcile_bed(4.0, 10.0).unwrap();
        assert_eq!(plan.plays, 3);
        assert!(plan.is_looped());
        assert_close(plan.trim_to, 10.0);
        assert!(plan.plays as f64 * 4.0 >= plan.trim_to);
    }

    #[test]
    fn test_bed_exact_multiple_still_covers_target() {
        let plan = reconcile_bed(5.0, 10.0).unwrap();
        assert_eq!(plan.plays, 3);
    }

    #[test]
    fn test_bed_longer_is_trimmed() {
        let plan = reconcile_bed(30.0, 12.5).unwrap();
        assert_eq!(plan.plays, 1);
        assert!(!plan.is_looped());
        assert_close(plan.trim_to, 12.5);
    }
}
