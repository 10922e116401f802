//! Lockstep sample windows
//!
//! One fixed-capacity ring buffer per subscribed channel. The oldest sample is
//! evicted when a buffer is full, and the set is only ready for measurement
//! when every channel holds a full window.

use crate::error::ComputeError;
use crate::types::Sample;
use std::collections::VecDeque;

/// Ring buffers for a set of named channels
#[derive(Debug, Clone)]
pub struct ChannelWindows {
    capacity: usize,
    /// Buffers in subscription order
    buffers: Vec<(String, VecDeque<f64>)>,
}

impl ChannelWindows {
    /// Create windows of `capacity` samples for each channel
    pub fn new<I, S>(channels: I, capacity: usize) -> Result<Self, ComputeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if capacity == 0 {
            return Err(ComputeError::ConfigurationError(
                "window capacity must be positive".to_string(),
            ));
        }

        let mut buffers: Vec<(String, VecDeque<f64>)> = Vec::new();
        for channel in channels {
            let channel = channel.into();
            if buffers.iter().any(|(name, _)| *name == channel) {
                return Err(ComputeError::ConfigurationError(format!(
                    "channel '{}' subscribed twice",
                    channel
                )));
            }
            buffers.push((channel, VecDeque::with_capacity(capacity)));
        }

        if buffers.is_empty() {
            return Err(ComputeError::ConfigurationError(
                "at least one channel is required".to_string(),
            ));
        }

        Ok(Self { capacity, buffers })
    }

    /// Append every reading of the sample to its channel's window.
    ///
    /// Fails without touching any window if the sample names a channel that is
    /// not subscribed.
    pub fn push(&mut self, sample: &Sample) -> Result<(), ComputeError> {
        if let Some(unknown) = sample
            .readings
            .keys()
            .find(|key| self.position(key).is_none())
        {
            return Err(ComputeError::UnknownChannel(unknown.clone()));
        }

        for (channel, value) in &sample.readings {
            if let Some(index) = self.position(channel) {
                let buffer = &mut self.buffers[index].1;
                if buffer.len() == self.capacity {
                    buffer.pop_front();
                }
                buffer.push_back(*value);
            }
        }
        Ok(())
    }

    /// True when every channel holds a full window
    pub fn is_ready(&self) -> bool {
        self.buffers
            .iter()
            .all(|(_, buffer)| buffer.len() == self.capacity)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.buffers.iter().map(|(name, _)| name.as_str())
    }

    pub fn channel_count(&self) -> usize {
        self.buffers.len()
    }

    /// Number of samples currently held for a channel
    pub fn len(&self, channel: &str) -> Option<usize> {
        self.position(channel).map(|index| self.buffers[index].1.len())
    }

    /// Oldest-first copy of a channel's window
    pub fn values(&self, channel: &str) -> Option<Vec<f64>> {
        self.position(channel)
            .map(|index| self.buffers[index].1.iter().copied().collect())
    }

    /// Oldest-first copy of a channel's window, or `UnknownChannel`
    pub fn require(&self, channel: &str) -> Result<Vec<f64>, ComputeError> {
        self.values(channel)
            .ok_or_else(|| ComputeError::UnknownChannel(channel.to_string()))
    }

    /// Window of the first subscribed channel (single-channel handlers)
    pub fn primary(&self) -> Vec<f64> {
        self.buffers[0].1.iter().copied().collect()
    }

    fn position(&self, channel: &str) -> Option<usize> {
        self.buffers.iter().position(|(name, _)| name == channel)
    }
}
