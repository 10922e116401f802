//! Velocity-threshold fixation detection
//!
//! Gaze points arrive as left/right display-area coordinates (0..1 per axis)
//! and are fused into one screen position in pixels. A point moving slower
//! than the velocity threshold extends the current fixation; a faster point
//! (a saccade) closes it when at least three slow points were collected.
//! Closed fixations are published on the `fixation` stream.

use crate::preprocess::fuse_mean;
use crate::types::{channels, Sample};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Screen size (px) gaze coordinates are scaled to
pub const DEFAULT_SCREEN_SIZE: (f64, f64) = (1920.0, 1080.0);

/// Pixels per microsecond above which a gaze movement is a saccade
pub const DEFAULT_VELOCITY_THRESHOLD: f64 = 0.05;

/// Slow points a fixation needs before a saccade can close it
const MIN_FIXATION_POINTS: usize = 3;

/// A completed fixation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fixation {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Milliseconds from the first gaze point of the session
    pub start_offset_ms: f64,
    pub end_offset_ms: f64,
    /// Mean screen position (px)
    pub x: f64,
    pub y: f64,
    /// Gaze points averaged
    pub points: usize,
}

impl Fixation {
    pub fn duration_ms(&self) -> f64 {
        self.end_offset_ms - self.start_offset_ms
    }

    /// Sample for the `fixation` stream, stamped with the fixation end
    pub fn to_sample(&self) -> Sample {
        Sample::new(self.end)
            .with(channels::FIXATION_X, self.x)
            .with(channels::FIXATION_Y, self.y)
            .with(channels::FIXATION_DURATION, self.duration_ms())
    }
}

#[derive(Debug, Clone, Copy)]
struct GazePoint {
    x: f64,
    y: f64,
    timestamp: DateTime<Utc>,
}

/// Turns a gaze stream into fixations
#[derive(Debug, Clone)]
pub struct FixationDetector {
    screen: (f64, f64),
    velocity_threshold: f64,
    first_timestamp: Option<DateTime<Utc>>,
    last_point: Option<GazePoint>,
    last_was_slow: bool,
    points: Vec<GazePoint>,
    detected: u64,
}

impl Default for FixationDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SCREEN_SIZE, DEFAULT_VELOCITY_THRESHOLD)
    }
}

impl FixationDetector {
    pub fn new(screen: (f64, f64), velocity_threshold: f64) -> Self {
        Self {
            screen,
            velocity_threshold,
            first_timestamp: None,
            last_point: None,
            last_was_slow: false,
            points: Vec::new(),
            detected: 0,
        }
    }

    /// Feed one gaze point; NaN coordinates mark a dropped eye.
    ///
    /// Returns the fixation this point closed, if any.
    pub fn insert(
        &mut self,
        left: (f64, f64),
        right: (f64, f64),
        timestamp: DateTime<Utc>,
    ) -> Option<Fixation> {
        let (width, height) = self.screen;
        let point = GazePoint {
            x: fuse_mean(left.0 * width, right.0 * width, self.last_point.map(|p| p.x)),
            y: fuse_mean(left.1 * height, right.1 * height, self.last_point.map(|p| p.y)),
            timestamp,
        };

        let mut closed = None;
        if let Some(previous) = self.last_point {
            if velocity(&previous, &point) > self.velocity_threshold {
                if self.last_was_slow && self.points.len() >= MIN_FIXATION_POINTS {
                    closed = self.close();
                }
                self.last_was_slow = false;
            } else {
                self.last_was_slow = true;
                self.points.push(point);
            }
        }

        self.last_point = Some(point);
        self.first_timestamp.get_or_insert(timestamp);
        closed
    }

    fn close(&mut self) -> Option<Fixation> {
        let first_timestamp = self.first_timestamp?;
        let points = std::mem::take(&mut self.points);
        let first = points.first()?;
        let last = points.last()?;
        let count = points.len() as f64;

        let fixation = Fixation {
            start: first.timestamp,
            end: last.timestamp,
            start_offset_ms: micros_between(first_timestamp, first.timestamp) / 1000.0,
            end_offset_ms: micros_between(first_timestamp, last.timestamp) / 1000.0,
            x: points.iter().map(|p| p.x).sum::<f64>() / count,
            y: points.iter().map(|p| p.y).sum::<f64>() / count,
            points: points.len(),
        };
        self.detected += 1;
        debug!(
            x = fixation.x,
            y = fixation.y,
            duration_ms = fixation.duration_ms(),
            detected = self.detected,
            "fixation closed"
        );
        Some(fixation)
    }

    /// Fixations closed so far
    pub fn detected(&self) -> u64 {
        self.detected
    }
}

fn micros_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let elapsed = to - from;
    match elapsed.num_microseconds() {
        Some(micros) => micros as f64,
        None => elapsed.num_milliseconds() as f64 * 1000.0,
    }
}

/// Pixels per microsecond between two points. Coincident timestamps move
/// infinitely fast unless the position is unchanged.
fn velocity(from: &GazePoint, to: &GazePoint) -> f64 {
    let distance = (to.x - from.x).hypot(to.y - from.y);
    let elapsed = micros_between(from.timestamp, to.timestamp).abs();
    if elapsed == 0.0 {
        return if distance == 0.0 { 0.0 } else { f64::INFINITY };
    }
    distance / elapsed
}
