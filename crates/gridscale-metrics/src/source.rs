//! Metric sources, one per scaling dimension.

use async_trait::async_trait;
use http::Method;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use gridscale_client::{AppSnapshot, ClientResult, RemoteClient};

/// Sentinel for "no metric available this cycle".
///
/// The control loop must skip the decision and sleep rather than feed this
/// value into the engine.
pub const METRIC_UNAVAILABLE: f64 = -1.0;

/// The trigger selector named a dimension nobody implements.
#[derive(Debug, Error)]
#[error("unknown scaling trigger: {0}")]
pub struct UnknownTrigger(pub String);

/// One scaling dimension: its healthy band and its current reading.
#[async_trait]
pub trait MetricSource: Send + Sync + std::fmt::Debug {
    /// Lower bound of the healthy region.
    fn min(&self) -> f64;
    /// Upper bound of the healthy region.
    fn max(&self) -> f64;
    /// Name used by the trigger selector and in logs.
    fn name(&self) -> &'static str;
    /// Current reading, or [`METRIC_UNAVAILABLE`] when the backend has
    /// nothing this cycle. Client errors keep their usual fatal semantics.
    async fn value(&self, client: &mut RemoteClient, app: &AppSnapshot) -> ClientResult<f64>;
}

/// Resolve a trigger selector into its metric source.
pub fn source_for(
    trigger: &str,
    min: f64,
    max: f64,
) -> Result<Box<dyn MetricSource>, UnknownTrigger> {
    match trigger {
        "cpu" => Ok(Box::new(CpuSource { min, max })),
        "memory" => Ok(Box::new(MemorySource { min, max })),
        "queue" => Ok(Box::new(QueueSource { min, max })),
        other => Err(UnknownTrigger(other.to_string())),
    }
}

/// Mean per-task CPU utilisation, in percent.
#[derive(Debug)]
pub struct CpuSource {
    pub min: f64,
    pub max: f64,
}

#[async_trait]
impl MetricSource for CpuSource {
    fn min(&self) -> f64 {
        self.min
    }

    fn max(&self) -> f64 {
        self.max
    }

    fn name(&self) -> &'static str {
        "cpu"
    }

    async fn value(&self, client: &mut RemoteClient, app: &AppSnapshot) -> ClientResult<f64> {
        task_stat_average(client, app, "cpu_percent").await
    }
}

/// Mean per-task memory utilisation, in percent.
#[derive(Debug)]
pub struct MemorySource {
    pub min: f64,
    pub max: f64,
}

#[async_trait]
impl MetricSource for MemorySource {
    fn min(&self) -> f64 {
        self.min
    }

    fn max(&self) -> f64 {
        self.max
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    async fn value(&self, client: &mut RemoteClient, app: &AppSnapshot) -> ClientResult<f64> {
        task_stat_average(client, app, "memory_percent").await
    }
}

/// Depth of the app's work queue.
#[derive(Debug)]
pub struct QueueSource {
    pub min: f64,
    pub max: f64,
}

#[async_trait]
impl MetricSource for QueueSource {
    fn min(&self) -> f64 {
        self.min
    }

    fn max(&self) -> f64 {
        self.max
    }

    fn name(&self) -> &'static str {
        "queue"
    }

    async fn value(&self, client: &mut RemoteClient, app: &AppSnapshot) -> ClientResult<f64> {
        let path = format!("/v2/queues/{}", app.id.trim_start_matches('/'));
        let payload = client.request(Method::GET, &path, None).await?;
        match stat_field(&payload, "count") {
            Some(depth) => Ok(depth),
            None => {
                warn!(app = %app.id, "queue reported no depth");
                Ok(METRIC_UNAVAILABLE)
            }
        }
    }
}

/// Average a per-task statistic over every task that reports it.
///
/// No samples at all means the metric is unavailable this cycle.
async fn task_stat_average(
    client: &mut RemoteClient,
    app: &AppSnapshot,
    field: &str,
) -> ClientResult<f64> {
    let mut samples = Vec::with_capacity(app.tasks.len());
    for task in &app.tasks {
        let path = format!("/v2/tasks/{}/stats", task.id);
        let stats = client.request(Method::GET, &path, None).await?;
        match stat_field(&stats, field) {
            Some(value) => {
                debug!(task = %task.id, field, value, "task statistic");
                samples.push(value);
            }
            None => warn!(task = %task.id, field, "task reported no statistic"),
        }
    }
    Ok(average(&samples))
}

fn stat_field(payload: &Value, field: &str) -> Option<f64> {
    payload.get(field).and_then(Value::as_f64)
}

fn average(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return METRIC_UNAVAILABLE;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}
