use std::collections::VecDeque;
use std::time::SystemTime;

use crate::inference::{BASELINE_AIRFLOW_MEAN, BASELINE_HEART_RATE_MEAN};

/**
 * Number of samples kept per channel.
 */
pub const MAX_DATA_POINTS: usize = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorChannel {
    HeartRate,
    Airflow,
}

impl std::fmt::Display for SensorChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            SensorChannel::HeartRate => "heart rate",
            SensorChannel::Airflow => "airflow",
        };

        write!(f, "{}", result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    timestamp: SystemTime,
    channel: SensorChannel,
    value: f64,
}

impl Sample {
    pub fn new(timestamp: SystemTime, channel: SensorChannel, value: f64) -> Self {
        Sample { timestamp, channel, value }
    }

    pub fn now(channel: SensorChannel, value: f64) -> Self {
        Sample::new(SystemTime::now(), channel, value)
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn channel(&self) -> SensorChannel {
        self.channel
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Rolling window of the most recent samples of one channel, oldest first.
#[derive(Debug, Clone)]
pub struct TelemetryWindow {
    channel: SensorChannel,
    capacity: usize,
    samples: VecDeque<Sample>,
}

impl TelemetryWindow {
    pub fn new(channel: SensorChannel) -> Self {
        TelemetryWindow::with_capacity(channel, MAX_DATA_POINTS)
    }

    pub fn with_capacity(channel: SensorChannel, capacity: usize) -> Self {
        TelemetryWindow {
            channel,
            capacity,
            samples: VecDeque::with_capacity(capacity + 1),
        }
    }

    pub fn channel(&self) -> SensorChannel {
        self.channel
    }

    /// Ingestion order is trusted; timestamps are not checked for monotonicity.
    pub fn append(&mut self, sample: Sample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// `None` when no sample has been received yet.
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// A heart rate / airflow pair as seen by the inference function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub heart_rate: f64,
    pub airflow: f64,
}

impl Default for Reading {
    fn default() -> Self {
        Reading {
            heart_rate: BASELINE_HEART_RATE_MEAN,
            airflow: BASELINE_AIRFLOW_MEAN,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryBuffers {
    pub heart_rate: TelemetryWindow,
    pub airflow: TelemetryWindow,
}

impl Default for TelemetryBuffers {
    fn default() -> Self {
        TelemetryBuffers {
            heart_rate: TelemetryWindow::new(SensorChannel::HeartRate),
            airflow: TelemetryWindow::new(SensorChannel::Airflow),
        }
    }
}

impl TelemetryBuffers {
    pub fn append(&mut self, sample: Sample) {
        self.window_mut(sample.channel()).append(sample);
    }

    pub fn window(&self, channel: SensorChannel) -> &TelemetryWindow {
        match channel {
            SensorChannel::HeartRate => &self.heart_rate,
            SensorChannel::Airflow => &self.airflow,
        }
    }

    fn window_mut(&mut self, channel: SensorChannel) -> &mut TelemetryWindow {
        match channel {
            SensorChannel::HeartRate => &mut self.heart_rate,
            SensorChannel::Airflow => &mut self.airflow,
        }
    }

    /// Merges the channels by most recent value. A channel without data reads as its baseline mean.
    pub fn latest_reading(&self) -> Reading {
        let baseline = Reading::default();

        Reading {
            heart_rate: self.heart_rate.latest().map_or(baseline.heart_rate, Sample::value),
            airflow: self.airflow.latest().map_or(baseline.airflow, Sample::value),
        }
    }

    pub fn clear(&mut self) {
        self.heart_rate.clear();
        self.airflow.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use super::*;

    fn sample_at(secs: u64, value: f64) -> Sample {
        Sample::new(SystemTime::UNIX_EPOCH + Duration::from_secs(secs), SensorChannel::HeartRate, value)
    }

    #[test]
    fn test_window_keeps_last_n_in_order() {
        for extra in [0_usize, 1, 7, MAX_DATA_POINTS, 3 * MAX_DATA_POINTS + 11] {
            let mut window = TelemetryWindow::new(SensorChannel::HeartRate);
            let total = MAX_DATA_POINTS + extra;

            for i in 0..total {
                window.append(sample_at(i as u64, i as f64));
            }

            assert_eq!(window.len(), MAX_DATA_POINTS);
            let values: Vec<f64> = window.iter().map(Sample::value).collect();
            let expected: Vec<f64> = (extra..total).map(|i| i as f64).collect();
            assert_eq!(values, expected);
        }
    }

    #[test]
    fn test_window_below_capacity() {
        let mut window = TelemetryWindow::with_capacity(SensorChannel::Airflow, 3);
        assert!(window.latest().is_none());

        window.append(sample_at(1, 10.0));
        window.append(sample_at(2, 11.0));

        assert_eq!(window.len(), 2);
        assert_eq!(window.latest().map(Sample::value), Some(11.0));
    }

    #[test]
    fn test_window_accepts_out_of_order_timestamps() {
        let mut window = TelemetryWindow::with_capacity(SensorChannel::HeartRate, 3);
        window.append(sample_at(10, 1.0));
        window.append(sample_at(5, 2.0));

        assert_eq!(window.latest().map(Sample::value), Some(2.0));
    }

    #[test]
    fn test_latest_reading_merges_channels() {
        let mut buffers = TelemetryBuffers::default();
        assert_eq!(buffers.latest_reading(), Reading { heart_rate: 75.0, airflow: 20.0 });

        buffers.append(Sample::now(SensorChannel::HeartRate, 90.0));
        assert_eq!(buffers.latest_reading(), Reading { heart_rate: 90.0, airflow: 20.0 });

        buffers.append(Sample::now(SensorChannel::Airflow, 8.0));
        buffers.append(Sample::now(SensorChannel::HeartRate, 95.0));
        assert_eq!(buffers.latest_reading(), Reading { heart_rate: 95.0, airflow: 8.0 });
        assert_eq!(buffers.window(SensorChannel::HeartRate).len(), 2);
    }
}
