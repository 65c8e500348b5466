//! Network monitoring pipeline: sampling, capture, aggregation, alerting.

pub mod aggregator;
pub mod alerts;
pub mod capture;
pub mod controller;
pub mod history;
pub mod model;
pub mod rate;
pub mod runtime;
pub mod sampler;
pub mod snapshot;

pub use aggregator::{FlowAggregator, HostnameLookup};
pub use alerts::{AlertMetric, AlertRule, AlertTrigger, Operator, RuleState};
pub use capture::{
    event_channel, CaptureBackend, CaptureCapability, CaptureProvider, Drained, EventReceiver,
    EventSender,
};
pub use controller::{select_mode, ModeDecision, MonitorController};
pub use history::{HistoryPoint, RateHistory};
pub use model::*;
pub use rate::{compute_rate, Rate};
pub use runtime::MonitorRuntime;
pub use sampler::{CounterSampler, CounterSource, SysinfoCounterSource};
pub use snapshot::{PersistStatus, TickSnapshot};
