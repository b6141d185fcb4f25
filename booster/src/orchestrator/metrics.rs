use prometheus_client::{
    encoding::{EncodeLabelSet, EncodeLabelValue, LabelValueEncoder},
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

/// Outcome of a tick.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Status {
    /// Every validator was processed.
    Success,
    /// The tick was aborted by an error.
    Failure,
    /// Another tick was already running.
    Skipped,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Skipped => "skipped",
        }
    }
}

impl EncodeLabelValue for Status {
    fn encode(&self, encoder: &mut LabelValueEncoder) -> Result<(), std::fmt::Error> {
        use std::fmt::Write;
        encoder.write_str(self.as_str())
    }
}

/// Label for tick metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TickLabel {
    pub status: Status,
}

/// Metrics for the [Orchestrator](super::Orchestrator)
#[derive(Default)]
pub struct Metrics {
    /// Number of ticks by status
    pub ticks: Family<TickLabel, Counter>,
    /// Number of confirmed queueBoost transactions
    pub queued: Counter,
    /// Number of confirmed activateBoost transactions
    pub activated: Counter,
    /// Number of confirmed transactions that could not be recorded
    pub persistence_gaps: Counter,
    /// Number of pending queue boost records retired because the contract no longer held them
    pub stale_records: Counter,
    /// Number of validators seen by the last tick
    pub validators: Gauge,
}

impl Metrics {
    /// Create and return a new set of metrics, registered with the given registry.
    pub fn init(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register("ticks", "Number of ticks by status", metrics.ticks.clone());
        registry.register(
            "queued",
            "Number of confirmed queueBoost transactions",
            metrics.queued.clone(),
        );
        registry.register(
            "activated",
            "Number of confirmed activateBoost transactions",
            metrics.activated.clone(),
        );
        registry.register(
            "persistence_gaps",
            "Number of confirmed transactions that could not be recorded",
            metrics.persistence_gaps.clone(),
        );
        registry.register(
            "stale_records",
            "Number of pending queue boost records retired because the contract no longer held them",
            metrics.stale_records.clone(),
        );
        registry.register(
            "validators",
            "Number of validators seen by the last tick",
            metrics.validators.clone(),
        );
        metrics
    }

    pub(super) fn tick(&self, status: Status) {
        self.ticks.get_or_create(&TickLabel { status }).inc();
    }
}
