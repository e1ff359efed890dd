//! Measurement-interval reports
//!
//! A report puts the true global aggregates, computed from every peer's
//! selected value, next to the spread of the peers' local estimates.

use chrono::{DateTime, Utc};
use murmur_core::{AggregateFunction, AggregateState, Payload};
use murmur_network::{MeasurementSnapshot, MessageCounts, OutcomeCounts};
use serde::Serialize;
use std::time::Duration;

/// What one peer looked like at the end of an interval
pub struct PeerSample {
    pub snapshot: MeasurementSnapshot,
    /// `None` while the peer is inactive
    pub estimates: Option<Vec<(AggregateFunction, Payload)>>,
}

/// Component-wise comparison of one function
#[derive(Debug, Clone, Serialize)]
pub struct Estimate {
    pub function: AggregateFunction,
    pub truth: Vec<f64>,
    pub mean: Vec<f64>,
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

impl Estimate {
    fn compute(function: AggregateFunction, truth: &Payload, estimates: &[&Payload]) -> Self {
        let truth = truth.as_slice().to_vec();
        let len = truth.len();
        let mut sum = vec![0.0; len];
        let mut min = vec![f64::INFINITY; len];
        let mut max = vec![f64::NEG_INFINITY; len];
        let mut counted = 0usize;

        for payload in estimates.iter().map(|p| p.as_slice()) {
            if payload.len() != len {
                continue;
            }
            counted += 1;
            for (i, v) in payload.iter().enumerate() {
                sum[i] += v;
                min[i] = min[i].min(*v);
                max[i] = max[i].max(*v);
            }
        }

        let mean = if counted == 0 {
            vec![f64::NAN; len]
        } else {
            sum.iter().map(|s| s / counted as f64).collect()
        };
        Self {
            function,
            truth,
            mean,
            min,
            max,
        }
    }

    /// Largest relative distance between the mean estimate and the truth
    pub fn relative_error(&self) -> f64 {
        self.truth
            .iter()
            .zip(&self.mean)
            .map(|(t, m)| {
                if *t == 0.0 {
                    m.abs()
                } else {
                    ((m - t) / t).abs()
                }
            })
            .fold(0.0, f64::max)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub timestamp: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub peers: usize,
    pub active: usize,
    pub min_epoch: u64,
    pub max_epoch: u64,
    pub outcomes: OutcomeCounts,
    pub sent: MessageCounts,
    pub estimates: Vec<Estimate>,
}

impl SimulationReport {
    pub fn build(elapsed: Duration, truth: &AggregateState, samples: &[PeerSample]) -> Self {
        let mut outcomes = OutcomeCounts::default();
        let mut sent = MessageCounts::default();
        for sample in samples {
            outcomes.merge(&sample.snapshot.outcomes);
            sent.merge(&sample.snapshot.sent);
        }

        let active: Vec<&PeerSample> = samples.iter().filter(|s| s.snapshot.active).collect();
        let min_epoch = active.iter().map(|s| s.snapshot.epoch).min().unwrap_or(0);
        let max_epoch = active.iter().map(|s| s.snapshot.epoch).max().unwrap_or(0);

        let estimates = AggregateFunction::ALL
            .iter()
            .map(|function| {
                let reported: Vec<&Payload> = samples
                    .iter()
                    .filter_map(|s| s.estimates.as_ref())
                    .filter_map(|e| e.iter().find(|(f, _)| f == function).map(|(_, p)| p))
                    .collect();
                Estimate::compute(*function, &truth.get(*function), &reported)
            })
            .collect();

        Self {
            timestamp: Utc::now(),
            elapsed_ms: elapsed.as_millis() as u64,
            peers: samples.len(),
            active: active.len(),
            min_epoch,
            max_epoch,
            outcomes,
            sent,
            estimates,
        }
    }

    pub fn estimate(&self, function: AggregateFunction) -> Option<&Estimate> {
        self.estimates.iter().find(|e| e.function == function)
    }

    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_core::{AggregationKind, PeerHandle};
    use murmur_network::QueueSizes;

    fn snapshot(peer: &str, active: bool, epoch: u64) -> MeasurementSnapshot {
        MeasurementSnapshot {
            timestamp: Utc::now(),
            peer: PeerHandle::from(peer),
            active,
            epoch,
            outcomes: OutcomeCounts {
                first: 2,
                double: 1,
                replace: 0,
                unsuccessful: 1,
            },
            sent: MessageCounts {
                push: 3,
                pull_push: 2,
                pull: 1,
            },
            queues: QueueSizes::default(),
            filters: None,
        }
    }

    fn sample(peer: &str, epoch: u64, sum: f64, count: f64) -> PeerSample {
        PeerSample {
            snapshot: snapshot(peer, true, epoch),
            estimates: Some(vec![
                (AggregateFunction::Sum, Payload::Scalar(sum)),
                (AggregateFunction::Count, Payload::Scalar(count)),
            ]),
        }
    }

    fn truth(values: &[f64]) -> AggregateState {
        let mut state = AggregateState::new(AggregationKind::Scalar);
        for v in values {
            state.add(&Payload::Scalar(*v)).unwrap();
        }
        state
    }

    #[test]
    fn test_report_compares_estimates_with_truth() {
        let samples = vec![
            sample("a", 1, 6.0, 3.0),
            sample("b", 1, 4.0, 2.0),
            sample("c", 2, 5.0, 3.0),
            PeerSample {
                snapshot: snapshot("d", false, 0),
                estimates: None,
            },
        ];
        let report =
            SimulationReport::build(Duration::from_secs(2), &truth(&[1.0, 2.0, 3.0]), &samples);

        assert_eq!(report.peers, 4);
        assert_eq!(report.active, 3);
        assert_eq!((report.min_epoch, report.max_epoch), (1, 2));
        assert_eq!(report.outcomes.first, 8);
        assert_eq!(report.sent.total(), 24);
        assert_eq!(report.elapsed_ms, 2000);

        let sum = report.estimate(AggregateFunction::Sum).unwrap();
        assert_eq!(sum.truth, vec![6.0]);
        assert_eq!(sum.mean, vec![5.0]);
        assert_eq!(sum.min, vec![4.0]);
        assert_eq!(sum.max, vec![6.0]);
        assert!((sum.relative_error() - 1.0 / 6.0).abs() < 1e-12);

        // Nobody reported AVG
        let avg = report.estimate(AggregateFunction::Avg).unwrap();
        assert_eq!(avg.truth, vec![2.0]);
        assert!(avg.mean[0].is_nan());
    }

    #[test]
    fn test_report_serializes_as_one_line() {
        let samples = vec![sample("a", 0, 1.0, 1.0)];
        let report = SimulationReport::build(Duration::ZERO, &truth(&[1.0]), &samples);
        let line = report.to_json_line().unwrap();
        assert!(!line.contains('\n'));
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["estimates"][0]["function"], "SUM");
        assert_eq!(parsed["active"], 1);
    }
}
