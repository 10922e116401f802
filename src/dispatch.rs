//! Subscriber dispatch
//!
//! An acquisition layer owns a `SubscriberRegistry` listing, per named data
//! stream, the handlers interested in it, and pushes every sample through
//! [`SubscriberRegistry::dispatch`].

use crate::error::ComputeError;
use crate::handler::WindowedHandler;
use crate::types::{MeasurementRow, Sample};
use std::collections::BTreeMap;
use tracing::warn;

/// Fused pupil samples from the eye tracker
pub const GAZE_STREAM: &str = "gaze";

/// Completed fixations from the eye tracker
pub const FIXATION_STREAM: &str = "fixation";

/// Stream names used by the eye-tracker acquisition layer
pub const EYETRACKER_STREAMS: &[&str] = &[GAZE_STREAM, FIXATION_STREAM];

/// Stream names used by the wristband acquisition layer
pub const WRISTBAND_STREAMS: &[&str] = &["EDA", "HR", "TEMP", "IBI"];

/// Anything that accepts samples pushed by an acquisition layer
pub trait Subscriber {
    fn name(&self) -> &str;

    fn add_data_point(&mut self, sample: &Sample) -> Result<Option<MeasurementRow>, ComputeError>;
}

impl Subscriber for WindowedHandler {
    fn name(&self) -> &str {
        WindowedHandler::name(self)
    }

    fn add_data_point(&mut self, sample: &Sample) -> Result<Option<MeasurementRow>, ComputeError> {
        WindowedHandler::add_data_point(self, sample)
    }
}

/// Result of pushing one sample to every subscriber of a stream
#[derive(Debug, Default)]
pub struct Dispatched {
    /// Rows emitted by subscribers, in subscription order
    pub rows: Vec<(String, MeasurementRow)>,
    /// Subscribers that failed on this sample
    pub errors: Vec<(String, ComputeError)>,
}

/// Per-stream subscriber lists owned by one acquisition layer
#[derive(Default)]
pub struct SubscriberRegistry {
    streams: BTreeMap<String, Vec<Box<dyn Subscriber + Send>>>,
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: BTreeMap<&str, usize> = self
            .streams
            .iter()
            .map(|(stream, subscribers)| (stream.as_str(), subscribers.len()))
            .collect();
        f.debug_struct("SubscriberRegistry")
            .field("streams", &counts)
            .finish()
    }
}

impl SubscriberRegistry {
    /// Registry accepting subscriptions to the given streams
    pub fn new<I, S>(streams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            streams: streams
                .into_iter()
                .map(|stream| (stream.into(), Vec::new()))
                .collect(),
        }
    }

    pub fn subscribe(
        &mut self,
        stream: &str,
        subscriber: impl Subscriber + Send + 'static,
    ) -> Result<(), ComputeError> {
        let subscribers = self.streams.get_mut(stream).ok_or_else(|| {
            ComputeError::ConfigurationError(format!("no data stream named '{}'", stream))
        })?;
        subscribers.push(Box::new(subscriber));
        Ok(())
    }

    /// Push a sample to every subscriber of `stream`.
    ///
    /// A failing subscriber does not stop delivery to the others. Unknown
    /// streams have no subscribers.
    pub fn dispatch(&mut self, stream: &str, sample: &Sample) -> Dispatched {
        let mut dispatched = Dispatched::default();
        let Some(subscribers) = self.streams.get_mut(stream) else {
            return dispatched;
        };

        for subscriber in subscribers.iter_mut() {
            match subscriber.add_data_point(sample) {
                Ok(Some(row)) => dispatched.rows.push((subscriber.name().to_string(), row)),
                Ok(None) => {}
                Err(err) => {
                    warn!(stream, subscriber = subscriber.name(), error = %err, "subscriber rejected sample");
                    dispatched.errors.push((subscriber.name().to_string(), err));
                }
            }
        }
        dispatched
    }

    pub fn streams(&self) -> impl Iterator<Item = &str> {
        self.streams.keys().map(String::as_str)
    }

    pub fn subscriber_count(&self, stream: &str) -> usize {
        self.streams.get(stream).map_or(0, Vec::len)
    }
}
