use crate::error::PipelineError;

/// One planned cut of the source media.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedSegment {
    pub index: usize,
    /// Start offset in seconds
    pub start: f64,
    /// Length in seconds, shorter than the segment length only for the tail
    pub length: f64,
}

/// Ordered, gapless list of cuts covering a whole media file.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentPlan {
    segments: Vec<PlannedSegment>,
}

impl SegmentPlan {
    pub fn segments(&self) -> &[PlannedSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlannedSegment> {
        self.segments.iter()
    }
}

impl<'a> IntoIterator for &'a SegmentPlan {
    type Item = &'a PlannedSegment;
    type IntoIter = std::slice::Iter<'a, PlannedSegment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

/// Most cuts a single plan may hold.
pub const MAX_SEGMENTS: usize = 10_000;

/// Splits `duration` seconds into `ceil(duration / segment_length)` cuts.
///
/// Offsets are always computed as `index * segment_length` rather than by
/// accumulation, so the same inputs give the same plan on every retry.
pub fn plan(duration: f64, segment_length: f64) -> Result<SegmentPlan, PipelineError> {
    if !(duration > 0.0 && duration.is_finite())
        || !(segment_length > 0.0 && segment_length.is_finite())
    {
        return Err(PipelineError::InvalidDuration {
            duration,
            segment_length,
        });
    }

    let count = (duration / segment_length).ceil();
    if count > MAX_SEGMENTS as f64 {
        return Err(PipelineError::InvalidDuration {
            duration,
            segment_length,
        });
    }
    let count = count as usize;
    let segments = (0..count)
        .map(|index| {
            let start = index as f64 * segment_length;
            let end = ((index + 1) as f64 * segment_length).min(duration);
            PlannedSegment {
                index,
                start,
                length: end - start,
            }
        })
        .collect();

    Ok(SegmentPlan { segments })
}
