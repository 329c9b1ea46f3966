//! Prometheus request metrics

use std::time::Duration;

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    /// Stopped by the keyword denylist
    Rejected,
    Failed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Rejected => "rejected",
            Outcome::Failed => "failed",
        }
    }
}

pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("staffql_requests_total", "Query requests by endpoint and outcome"),
            &["endpoint", "outcome"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "staffql_query_duration_seconds",
                "Time from request to response for query endpoints",
            ),
            &["endpoint"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            registry,
            requests,
            duration,
        })
    }

    pub fn observe(&self, endpoint: &str, outcome: Outcome, elapsed: Duration) {
        self.requests
            .with_label_values(&[endpoint, outcome.as_str()])
            .inc();
        self.duration
            .with_label_values(&[endpoint])
            .observe(elapsed.as_secs_f64());
    }

    pub fn request_count(&self, endpoint: &str, outcome: Outcome) -> u64 {
        self.requests
            .with_label_values(&[endpoint, outcome.as_str()])
            .get()
    }

    /// Text exposition format
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
