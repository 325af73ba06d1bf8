//! Metrics collection and export for work pools

use serde::Serialize;
use std::collections::HashMap;

/// Point-in-time metrics of one pool
///
/// # Examples
///
/// ```
/// use esox_workbroker::Instance;
///
/// let instance = Instance::new();
/// let pool = instance.ref_pool("jobs");
/// pool.lock().queue("a", "g1");
///
/// let metrics = pool.metrics();
/// assert_eq!(metrics.size, 1);
/// assert_eq!(metrics.queued_objects, 1);
/// assert_eq!(metrics.total_queued, 1);
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct PoolMetrics {
    /// Live objects, queued or claimed
    pub size: usize,

    /// Objects waiting in the global queue
    pub queued_objects: usize,

    /// Objects claimed by sessions and not yet resolved
    pub claimed_objects: usize,

    /// Groups with at least one queued object
    pub groups: usize,

    /// Current watermark
    pub mark: usize,

    /// Whether a session currently holds the marker role
    pub marker_held: bool,

    /// Sessions bound to the pool
    pub references: usize,

    /// Objects newly queued
    pub total_queued: usize,

    /// Queue requests skipped because the id was already live
    pub total_duplicates: usize,

    /// Objects handed out by dequeue
    pub total_claimed: usize,

    /// Objects returned to the queue
    pub total_requeued: usize,

    /// Objects retired
    pub total_released: usize,

    /// Dequeue calls that found the queue empty
    pub empty_dequeues: usize,

    /// Times a session was elected marker
    pub marker_elections: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("size".to_string(), self.size.to_string());
        metrics.insert("queued_objects".to_string(), self.queued_objects.to_string());
        metrics.insert("claimed_objects".to_string(), self.claimed_objects.to_string());
        metrics.insert("groups".to_string(), self.groups.to_string());
        metrics.insert("mark".to_string(), self.mark.to_string());
        metrics.insert("marker_held".to_string(), self.marker_held.to_string());
        metrics.insert("references".to_string(), self.references.to_string());
        metrics.insert("total_queued".to_string(), self.total_queued.to_string());
        metrics.insert("total_duplicates".to_string(), self.total_duplicates.to_string());
        metrics.insert("total_claimed".to_string(), self.total_claimed.to_string());
        metrics.insert("total_requeued".to_string(), self.total_requeued.to_string());
        metrics.insert("total_released".to_string(), self.total_released.to_string());
        metrics.insert("empty_dequeues".to_string(), self.empty_dequeues.to_string());
        metrics.insert("marker_elections".to_string(), self.marker_elections.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_workbroker::{Instance, MetricsExporter};
    /// use std::collections::HashMap;
    ///
    /// let instance = Instance::new();
    /// let pool = instance.ref_pool("jobs");
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = MetricsExporter::export_prometheus(&pool.metrics(), "jobs", Some(&tags)).unwrap();
    /// assert!(output.contains("workbroker_pool_size"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> crate::BrokerResult<String> {
        use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};

        let encode_error = |e: prometheus::Error| crate::BrokerError::Encode(e.to_string());
        let labels = Self::format_labels(pool_name, tags);
        let registry = Registry::new();

        // Gauge metrics
        let gauges = [
            ("workbroker_pool_size", "Live objects in the pool", metrics.size),
            ("workbroker_objects_queued", "Objects waiting in the queue", metrics.queued_objects),
            ("workbroker_objects_claimed", "Objects claimed by sessions", metrics.claimed_objects),
            ("workbroker_groups", "Groups with queued objects", metrics.groups),
            ("workbroker_mark", "Current watermark", metrics.mark),
            ("workbroker_marker_held", "Whether a marker session is elected", metrics.marker_held as usize),
            ("workbroker_sessions", "Sessions bound to the pool", metrics.references),
        ];
        for (name, help, value) in gauges {
            let gauge = IntGauge::with_opts(Opts::new(name, help).const_labels(labels.clone()))
                .map_err(encode_error)?;
            gauge.set(value as i64);
            registry.register(Box::new(gauge)).map_err(encode_error)?;
        }

        // Counter metrics
        let counters = [
            ("workbroker_objects_queued_total", "Objects newly queued", metrics.total_queued),
            ("workbroker_duplicates_total", "Duplicate queue requests skipped", metrics.total_duplicates),
            ("workbroker_objects_claimed_total", "Objects handed out to sessions", metrics.total_claimed),
            ("workbroker_objects_requeued_total", "Objects returned to the queue", metrics.total_requeued),
            ("workbroker_objects_released_total", "Objects retired", metrics.total_released),
            ("workbroker_empty_dequeues_total", "Dequeues on an empty queue", metrics.empty_dequeues),
            ("workbroker_marker_elections_total", "Marker elections", metrics.marker_elections),
        ];
        for (name, help, value) in counters {
            let counter = IntCounter::with_opts(Opts::new(name, help).const_labels(labels.clone()))
                .map_err(encode_error)?;
            counter.inc_by(value as u64);
            registry.register(Box::new(counter)).map_err(encode_error)?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .map_err(encode_error)?;
        String::from_utf8(buffer).map_err(|e| crate::BrokerError::Encode(e.to_string()))
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> HashMap<String, String> {
        let mut labels = HashMap::new();
        labels.insert("pool".to_string(), pool_name.to_string());

        if let Some(tags) = tags {
            for (key, value) in tags {
                labels.insert(key.clone(), value.clone());
            }
        }

        labels
    }
}

/// Running counters kept inside the pool's locked state
#[derive(Debug, Default, Clone)]
pub(crate) struct MetricsTracker {
    pub total_queued: usize,
    pub total_duplicates: usize,
    pub total_claimed: usize,
    pub total_requeued: usize,
    pub total_released: usize,
    pub empty_dequeues: usize,
    pub marker_elections: usize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PoolMetrics {
        PoolMetrics {
            size: 3,
            queued_objects: 1,
            claimed_objects: 2,
            groups: 1,
            mark: 0,
            marker_held: true,
            references: 2,
            total_queued: 3,
            total_duplicates: 1,
            total_claimed: 2,
            total_requeued: 0,
            total_released: 0,
            empty_dequeues: 4,
            marker_elections: 1,
        }
    }

    #[test]
    fn test_export_map() {
        let exported = sample().export();
        assert_eq!(exported.get("size").map(String::as_str), Some("3"));
        assert_eq!(exported.get("marker_held").map(String::as_str), Some("true"));
        assert_eq!(exported.len(), 14);
    }

    #[test]
    fn test_serialize_json() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["claimed_objects"], 2);
        assert_eq!(json["marker_held"], true);
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_export_prometheus() {
        let output = MetricsExporter::export_prometheus(&sample(), "jobs", None).unwrap();
        assert!(output.contains("# TYPE workbroker_pool_size gauge"));
        assert!(output.contains("workbroker_pool_size{pool=\"jobs\"} 3"));
        assert!(output.contains("# TYPE workbroker_duplicates_total counter"));
        assert!(output.contains("workbroker_empty_dequeues_total{pool=\"jobs\"} 4"));
    }
}
