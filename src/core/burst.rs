//! Azimuth time <-> image line mapping, with optional burst (TOPS) bookkeeping

use crate::types::{
    microseconds_between, offset_by_microseconds, BurstRecord, GeometryContext,
    GroundControlPoint, SarError, SarResult,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Anchor used when a time (or line) falls outside every burst's valid window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BurstAnchor {
    /// Anchor on the first valid time/line of the latest preceding burst
    #[default]
    FirstValid,
    /// Anchor past-the-end values on the last valid time/line of the latest preceding burst
    LastValid,
}

/// Per-burst timing as annotated in the swath timing list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurstTiming {
    pub azimuth_time: DateTime<Utc>,
    /// One entry per line of the burst, -1 for invalid lines
    pub first_valid_sample: Vec<i64>,
}

/// Maps zero-Doppler azimuth times to fractional image lines and back
#[derive(Debug, Clone, Copy)]
pub struct BurstLineMapper<'a> {
    acquisition_start_time: DateTime<Utc>,
    azimuth_time_interval_us: f64,
    bursts: &'a [BurstRecord],
    anchor: BurstAnchor,
}

impl<'a> BurstLineMapper<'a> {
    /// Create a mapper; an empty burst table maps lines linearly from the acquisition start
    pub fn new(
        acquisition_start_time: DateTime<Utc>,
        azimuth_time_interval_us: f64,
        bursts: &'a [BurstRecord],
        anchor: BurstAnchor,
    ) -> Self {
        Self {
            acquisition_start_time,
            azimuth_time_interval_us,
            bursts,
            anchor,
        }
    }

    /// Mapper over the timing and burst table of a product geometry
    pub fn from_context(context: &'a GeometryContext, anchor: BurstAnchor) -> Self {
        Self::new(
            context.acquisition_start_time,
            context.azimuth_time_interval_us,
            &context.bursts,
            anchor,
        )
    }

    /// Fractional image line of an azimuth time
    pub fn time_to_line(&self, time: DateTime<Utc>) -> SarResult<f64> {
        self.check()?;

        if self.bursts.is_empty() {
            return Ok(microseconds_between(time, self.acquisition_start_time)
                / self.azimuth_time_interval_us);
        }

        let (anchor_time, anchor_line) = self.anchor_for_time(time);
        Ok(microseconds_between(time, anchor_time) / self.azimuth_time_interval_us + anchor_line)
    }

    /// Azimuth time of a fractional image line, rounded to the microsecond
    pub fn line_to_time(&self, line: f64) -> SarResult<DateTime<Utc>> {
        self.check()?;

        if self.bursts.is_empty() {
            return offset_by_microseconds(
                self.acquisition_start_time,
                line * self.azimuth_time_interval_us,
            );
        }

        let (anchor_time, anchor_line) = self.anchor_for_line(line);
        offset_by_microseconds(
            anchor_time,
            (line - anchor_line) * self.azimuth_time_interval_us,
        )
    }

    fn check(&self) -> SarResult<()> {
        if !(self.azimuth_time_interval_us > 0.0) {
            return Err(SarError::InvalidInput(format!(
                "Azimuth time interval must be positive, got {} us",
                self.azimuth_time_interval_us
            )));
        }
        validate_burst_table(self.bursts)
    }

    fn anchor_for_time(&self, time: DateTime<Utc>) -> (DateTime<Utc>, f64) {
        if let Some(burst) = self
            .bursts
            .iter()
            .rev()
            .find(|b| b.first_valid_time <= time && time < b.last_valid_time)
        {
            return (burst.first_valid_time, burst.first_valid_line as f64);
        }

        let first = &self.bursts[0];
        let preceding = self
            .bursts
            .iter()
            .rev()
            .find(|b| b.first_valid_time <= time)
            .unwrap_or(first);

        if time < first.first_valid_time {
            log::trace!("Time {} before first burst", time);
            return (first.first_valid_time, first.first_valid_line as f64);
        }

        match self.anchor {
            BurstAnchor::FirstValid => (preceding.first_valid_time, preceding.first_valid_line as f64),
            BurstAnchor::LastValid => (preceding.last_valid_time, preceding.last_valid_line as f64),
        }
    }

    fn anchor_for_line(&self, line: f64) -> (DateTime<Utc>, f64) {
        if let Some(burst) = self
            .bursts
            .iter()
            .rev()
            .find(|b| b.first_valid_line as f64 <= line && line < b.last_valid_line as f64)
        {
            return (burst.first_valid_time, burst.first_valid_line as f64);
        }

        let first = &self.bursts[0];
        if line < first.first_valid_line as f64 {
            return (first.first_valid_time, first.first_valid_line as f64);
        }

        let preceding = self
            .bursts
            .iter()
            .rev()
            .find(|b| b.first_valid_line as f64 <= line)
            .unwrap_or(first);

        match self.anchor {
            BurstAnchor::FirstValid => (preceding.first_valid_time, preceding.first_valid_line as f64),
            BurstAnchor::LastValid => (preceding.last_valid_time, preceding.last_valid_line as f64),
        }
    }
}

/// Build burst records from swath timing annotations.
///
/// Leading `-1` entries of `first_valid_sample` are invalid lines; the valid run
/// ends (exclusive) at the next `-1`. Lines are absolute
/// (`burst_index * lines_per_burst + offset`), times are the burst azimuth time
/// plus the offset in whole microseconds. Bursts without any valid line are skipped.
pub fn build_burst_records(
    timings: &[BurstTiming],
    lines_per_burst: u64,
    azimuth_time_interval_us: f64,
) -> SarResult<Vec<BurstRecord>> {
    let mut records = Vec::with_capacity(timings.len());

    for (burst_id, timing) in timings.iter().enumerate() {
        let mask = &timing.first_valid_sample;
        let first_valid = mask.iter().take_while(|&&v| v == -1).count();
        let last_valid = mask[first_valid..]
            .iter()
            .position(|&v| v == -1)
            .map_or(mask.len(), |n| first_valid + n);

        if last_valid <= first_valid {
            log::warn!("Burst {} has no valid lines, skipping", burst_id);
            continue;
        }

        let base_line = burst_id as u64 * lines_per_burst;
        let line_time = |n: usize| {
            offset_by_microseconds(timing.azimuth_time, (n as f64 * azimuth_time_interval_us).trunc())
        };

        let record = BurstRecord {
            first_valid_time: line_time(first_valid)?,
            first_valid_line: base_line + first_valid as u64,
            last_valid_time: line_time(last_valid)?,
            last_valid_line: base_line + last_valid as u64,
        };

        log::debug!(
            "Burst {}: lines {}..{} ({} .. {})",
            burst_id,
            record.first_valid_line,
            record.last_valid_line,
            record.first_valid_time.format("%H:%M:%S%.6f"),
            record.last_valid_time.format("%H:%M:%S%.6f")
        );
        records.push(record);
    }

    if !timings.is_empty() && records.is_empty() {
        return Err(SarError::DegenerateBurstTable(format!(
            "none of the {} bursts has a valid line",
            timings.len()
        )));
    }

    Ok(records)
}

/// Validate burst consistency
pub fn validate_burst_table(bursts: &[BurstRecord]) -> SarResult<()> {
    for (i, burst) in bursts.iter().enumerate() {
        if burst.first_valid_line > burst.last_valid_line {
            return Err(SarError::DegenerateBurstTable(format!(
                "burst {} has invalid line range: {}-{}",
                i, burst.first_valid_line, burst.last_valid_line
            )));
        }
        if burst.first_valid_time > burst.last_valid_time {
            return Err(SarError::DegenerateBurstTable(format!(
                "burst {} ends before it starts",
                i
            )));
        }
    }

    for (i, pair) in bursts.windows(2).enumerate() {
        if pair[1].first_valid_line < pair[0].first_valid_line
            || pair[1].last_valid_line < pair[0].last_valid_line
        {
            return Err(SarError::DegenerateBurstTable(format!(
                "line ranges decrease between bursts {} and {}",
                i,
                i + 1
            )));
        }
        if pair[1].first_valid_time <= pair[0].first_valid_time {
            return Err(SarError::DegenerateBurstTable(format!(
                "bursts {} and {} are not in chronological order",
                i,
                i + 1
            )));
        }
    }

    Ok(())
}

/// Merge a burst table into the single record of the debursted product.
///
/// Bursts overlapping in time are split at the middle of the overlap: the
/// earlier burst keeps its lines before the split, the later one resumes at its
/// line closest to the split time. Returns the debursted record (lines counted
/// from 0) and the kept image line ranges, half-open, one per burst.
pub fn deburst_records(
    bursts: &[BurstRecord],
    azimuth_time_interval_us: f64,
) -> SarResult<(BurstRecord, Vec<(u64, u64)>)> {
    if bursts.is_empty() {
        return Err(SarError::DegenerateBurstTable(
            "no burst to deburst".to_string(),
        ));
    }
    if !(azimuth_time_interval_us > 0.0) {
        return Err(SarError::InvalidInput(format!(
            "Azimuth time interval must be positive, got {} us",
            azimuth_time_interval_us
        )));
    }
    validate_burst_table(bursts)?;

    let mut lines = Vec::with_capacity(bursts.len());
    let mut current_start = bursts[0].first_valid_line;

    for (i, pair) in bursts.windows(2).enumerate() {
        let (current, next) = (&pair[0], &pair[1]);

        let overlap_us = microseconds_between(current.last_valid_time, next.first_valid_time);
        let overlap_lines = if overlap_us > 0.0 {
            (overlap_us / azimuth_time_interval_us).floor() as u64
        } else {
            0
        };
        let half_overlap = overlap_lines / 2;

        // Time of the first dropped line of `current`, relative to the start of `next`
        let split_us = overlap_us - half_overlap as f64 * azimuth_time_interval_us;
        let next_skip = (split_us / azimuth_time_interval_us + 0.5).floor().max(0.0) as u64;

        let current_stop = current.last_valid_line.saturating_sub(half_overlap);
        let next_start = next.first_valid_line + next_skip;

        if current_stop <= current_start || next_start >= next.last_valid_line {
            return Err(SarError::DegenerateBurstTable(format!(
                "overlap between bursts {} and {} covers a whole burst",
                i,
                i + 1
            )));
        }
        if next_start < current_stop {
            return Err(SarError::DegenerateBurstTable(format!(
                "line ranges of bursts {} and {} overlap",
                i,
                i + 1
            )));
        }

        log::trace!(
            "Burst {} keeps lines {}..{}, {} overlapping lines",
            i,
            current_start,
            current_stop,
            overlap_lines
        );
        lines.push((current_start, current_stop));
        current_start = next_start;
    }

    let last = &bursts[bursts.len() - 1];
    if current_start >= last.last_valid_line {
        return Err(SarError::DegenerateBurstTable(format!(
            "last burst has no line left ({}..{})",
            current_start, last.last_valid_line
        )));
    }
    lines.push((current_start, last.last_valid_line));

    let total_lines: u64 = lines.iter().map(|(start, stop)| stop - start).sum();
    let record = BurstRecord {
        first_valid_time: bursts[0].first_valid_time,
        first_valid_line: 0,
        last_valid_time: last.last_valid_time,
        last_valid_line: total_lines,
    };

    log::debug!(
        "Debursted {} bursts into {} lines ({} .. {})",
        bursts.len(),
        total_lines,
        record.first_valid_time.format("%H:%M:%S%.6f"),
        record.last_valid_time.format("%H:%M:%S%.6f")
    );
    Ok((record, lines))
}

/// Debursted line of an image line, `None` when the line was dropped.
///
/// The kept range is looked up with the line rounded to the nearest integer;
/// the fractional part carries over.
pub fn image_line_to_deburst_line(lines: &[(u64, u64)], image_line: f64) -> Option<f64> {
    let rounded = (image_line + 0.5).floor();
    let mut dropped = lines.first()?.0 as f64;
    let mut previous_stop = None;

    for &(start, stop) in lines {
        if let Some(previous_stop) = previous_stop {
            dropped += start.saturating_sub(previous_stop) as f64;
        }
        if rounded >= start as f64 && rounded < stop as f64 {
            return Some(image_line - dropped);
        }
        previous_stop = Some(stop);
    }

    None
}

/// Image line of a debursted line; lines past the end extend the last kept range.
///
/// `None` only for an empty range list.
pub fn deburst_line_to_image_line(lines: &[(u64, u64)], deburst_line: f64) -> Option<f64> {
    let (first, rest) = lines.split_first()?;
    let rounded = (deburst_line + 0.5).floor();
    let mut dropped = first.0 as f64;
    let mut stop = first.1;

    for &(start, next_stop) in rest {
        if rounded + dropped < stop as f64 {
            break;
        }
        dropped += start.saturating_sub(stop) as f64;
        stop = next_stop;
    }

    Some(deburst_line + dropped)
}

/// GCPs moved to debursted lines; GCPs on dropped lines are left out
pub fn deburst_gcps(gcps: &[GroundControlPoint], lines: &[(u64, u64)]) -> Vec<GroundControlPoint> {
    gcps.iter()
        .filter_map(|gcp| {
            let line = image_line_to_deburst_line(lines, gcp.image_point.line)?;
            let mut moved = gcp.clone();
            moved.image_point.line = line;
            Some(moved)
        })
        .collect()
}

/// Product geometry after deburst
#[derive(Debug, Clone)]
pub struct DeburstedGeometry {
    pub context: GeometryContext,
    pub ground_control_points: Vec<GroundControlPoint>,
    /// Kept image line ranges, half-open, one per original burst
    pub lines: Vec<(u64, u64)>,
}

/// Deburst a product: single burst record, timing starting at the first valid
/// line, GCPs moved to debursted lines
pub fn deburst_geometry(
    context: &GeometryContext,
    gcps: &[GroundControlPoint],
) -> SarResult<DeburstedGeometry> {
    let (record, lines) = deburst_records(&context.bursts, context.azimuth_time_interval_us)?;
    let ground_control_points = deburst_gcps(gcps, &lines);

    if ground_control_points.len() < gcps.len() {
        log::info!(
            "Deburst dropped {} of {} GCPs on overlapping lines",
            gcps.len() - ground_control_points.len(),
            gcps.len()
        );
    }

    let mut debursted = context.clone();
    debursted.acquisition_start_time = record.first_valid_time;
    debursted.acquisition_stop_time = Some(record.last_valid_time);
    debursted.number_of_lines = Some(record.last_valid_line as usize);
    debursted.bursts = vec![record];

    Ok(DeburstedGeometry {
        context: debursted,
        ground_control_points,
        lines,
    })
}
