//! Metrics collection and export for connection pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::health::Status;

/// Metrics data for a pool
///
/// Counters are totals since the pool was created; the rest mirror
/// [`Status`] at the time of the snapshot.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PoolMetrics {
    /// Successful acquire calls
    pub total_acquired: usize,

    /// Connections returned to the pool
    pub total_released: usize,

    /// Acquire calls that had to queue
    pub total_waits: usize,

    /// Connections created by the factory
    pub connections_created: usize,

    /// Factory failures
    pub creation_failures: usize,

    /// Idle connections found closed and rebuilt
    pub dead_connections_replaced: usize,

    /// Connections released to a pool that did not issue them
    pub misuse_events: usize,

    /// Connections out with callers
    pub checked_out_connections: usize,

    /// Idle connections
    pub available_connections: usize,

    /// Queued acquire calls
    pub waiting_requests: usize,

    /// Pool utilization ratio (0.0 to 1.0)
    pub utilization: f64,

    /// Maximum pool capacity
    pub max_capacity: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_acquired".to_string(), self.total_acquired.to_string());
        metrics.insert("total_released".to_string(), self.total_released.to_string());
        metrics.insert("total_waits".to_string(), self.total_waits.to_string());
        metrics.insert("connections_created".to_string(), self.connections_created.to_string());
        metrics.insert("creation_failures".to_string(), self.creation_failures.to_string());
        metrics.insert(
            "dead_connections_replaced".to_string(),
            self.dead_connections_replaced.to_string(),
        );
        metrics.insert("misuse_events".to_string(), self.misuse_events.to_string());
        metrics.insert(
            "checked_out_connections".to_string(),
            self.checked_out_connections.to_string(),
        );
        metrics.insert(
            "available_connections".to_string(),
            self.available_connections.to_string(),
        );
        metrics.insert("waiting_requests".to_string(), self.waiting_requests.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("max_capacity".to_string(), self.max_capacity.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
pub struct MetricsExporter;

impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let mut output = String::new();
        let labels = Self::format_labels(pool_name, tags);

        let gauges = [
            (
                "connections_checked_out",
                "Connections out with callers",
                metrics.checked_out_connections,
            ),
            ("connections_available", "Idle connections", metrics.available_connections),
            (
                "requests_waiting",
                "Acquire calls waiting for a connection",
                metrics.waiting_requests,
            ),
        ];
        for (name, help, value) in gauges {
            Self::write(&mut output, "gauge", name, help, &labels, value);
        }

        output.push_str("# HELP slotpool_utilization Pool utilization ratio\n");
        output.push_str("# TYPE slotpool_utilization gauge\n");
        output.push_str(&format!(
            "slotpool_utilization{{{}}} {:.2}\n",
            labels, metrics.utilization
        ));

        for (name, help, value) in counters(metrics) {
            Self::write(&mut output, "counter", name, help, &labels, value);
        }

        output
    }

    fn write(output: &mut String, kind: &str, name: &str, help: &str, labels: &str, value: usize) {
        output.push_str(&format!("# HELP slotpool_{} {}\n", name, help));
        output.push_str(&format!("# TYPE slotpool_{} {}\n", name, kind));
        output.push_str(&format!("slotpool_{}{{{}}} {}\n", name, labels, value));
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            let mut tags: Vec<_> = tags.iter().collect();
            tags.sort();
            for (key, value) in tags {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

/// Name, help text and value of every counter, shared by both exporters.
fn counters(metrics: &PoolMetrics) -> [(&'static str, &'static str, usize); 7] {
    [
        ("acquired_total", "Successful acquire calls", metrics.total_acquired),
        ("released_total", "Connections returned to the pool", metrics.total_released),
        ("waits_total", "Acquire calls that had to wait", metrics.total_waits),
        ("connections_created_total", "Connections created", metrics.connections_created),
        ("creation_failures_total", "Connection creation failures", metrics.creation_failures),
        (
            "dead_connections_replaced_total",
            "Closed connections replaced",
            metrics.dead_connections_replaced,
        ),
        (
            "misuse_events_total",
            "Connections released to a pool that did not issue them",
            metrics.misuse_events,
        ),
    ]
}

/// Internal metrics tracker
#[derive(Debug, Default)]
pub(crate) struct MetricsTracker {
    total_acquired: AtomicUsize,
    total_released: AtomicUsize,
    total_waits: AtomicUsize,
    connections_created: AtomicUsize,
    creation_failures: AtomicUsize,
    dead_connections_replaced: AtomicUsize,
    misuse_events: AtomicUsize,
}

impl MetricsTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_acquired(&self) {
        self.total_acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_released(&self) {
        self.total_released.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_wait(&self) {
        self.total_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_created(&self) {
        self.connections_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_creation_failure(&self) {
        self.creation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_replaced(&self) {
        self.dead_connections_replaced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_misuse(&self) {
        self.misuse_events.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn get_metrics(&self, status: &Status) -> PoolMetrics {
        PoolMetrics {
            total_acquired: self.total_acquired.load(Ordering::Relaxed),
            total_released: self.total_released.load(Ordering::Relaxed),
            total_waits: self.total_waits.load(Ordering::Relaxed),
            connections_created: self.connections_created.load(Ordering::Relaxed),
            creation_failures: self.creation_failures.load(Ordering::Relaxed),
            dead_connections_replaced: self.dead_connections_replaced.load(Ordering::Relaxed),
            misuse_events: self.misuse_events.load(Ordering::Relaxed),
            checked_out_connections: status.checked_out,
            available_connections: status.available,
            waiting_requests: status.waiting,
            utilization: status.utilization(),
            max_capacity: status.max_connections,
        }
    }
}

#[cfg(feature = "prometheus")]
pub use self::collector::PoolCollector;

#[cfg(feature = "prometheus")]
mod collector {
    use parking_lot::Mutex;
    use prometheus::core::{Collector, Desc};
    use prometheus::proto::MetricFamily;
    use prometheus::{IntCounter, IntGauge, Opts};

    use super::counters;
    use crate::factory::ConnectionFactory;
    use crate::pool::Pool;

    /// Registers a pool with a [`prometheus::Registry`].
    ///
    /// Values are read from the pool on every scrape.
    pub struct PoolCollector<M: ConnectionFactory> {
        pool: Pool<M>,
        checked_out: IntGauge,
        available: IntGauge,
        waiting: IntGauge,
        /// Same order as the counter table.
        counters: Vec<IntCounter>,
        /// Held for a whole scrape so concurrent gathers advance each counter once.
        scrape: Mutex<()>,
    }

    impl<M: ConnectionFactory> PoolCollector<M> {
        /// Build a collector for `pool`. Every metric carries a constant
        /// `pool` label set to `pool_name`.
        ///
        /// # Errors
        ///
        /// Fails if `pool_name` is not a valid label value.
        pub fn new(pool: Pool<M>, pool_name: &str) -> prometheus::Result<Self> {
            let opts = |name: &str, help: &str| {
                Opts::new(format!("slotpool_{}", name), help).const_label("pool", pool_name)
            };
            let gauge = |name: &str, help: &str| IntGauge::with_opts(opts(name, help));

            let counters = counters(&pool.metrics())
                .into_iter()
                .map(|(name, help, _)| IntCounter::with_opts(opts(name, help)))
                .collect::<prometheus::Result<Vec<_>>>()?;

            Ok(Self {
                checked_out: gauge("connections_checked_out", "Connections out with callers")?,
                available: gauge("connections_available", "Idle connections")?,
                waiting: gauge("requests_waiting", "Acquire calls waiting for a connection")?,
                counters,
                scrape: Mutex::new(()),
                pool,
            })
        }

        fn collectors(&self) -> impl Iterator<Item = &dyn Collector> {
            let gauges: [&dyn Collector; 3] = [&self.checked_out, &self.available, &self.waiting];
            gauges
                .into_iter()
                .chain(self.counters.iter().map(|c| c as &dyn Collector))
        }
    }

    impl<M: ConnectionFactory> Collector for PoolCollector<M> {
        fn desc(&self) -> Vec<&Desc> {
            self.collectors().flat_map(|c| c.desc()).collect()
        }

        fn collect(&self) -> Vec<MetricFamily> {
            let _scrape = self.scrape.lock();
            let metrics = self.pool.metrics();
            self.checked_out.set(metrics.checked_out_connections as i64);
            self.available.set(metrics.available_connections as i64);
            self.waiting.set(metrics.waiting_requests as i64);

            for (counter, (_, _, total)) in self.counters.iter().zip(counters(&metrics)) {
                let seen = counter.get();
                if total as u64 > seen {
                    counter.inc_by(total as u64 - seen);
                }
            }

            self.collectors().flat_map(|c| c.collect()).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestFactory;
    use crate::{Pool, PoolConfiguration};

    fn pool() -> Pool<TestFactory> {
        Pool::new(TestFactory::new(), PoolConfiguration::new().with_max_connections(4)).unwrap()
    }

    #[tokio::test]
    async fn test_counters_follow_pool_activity() {
        let pool = pool();
        {
            let _a = pool.acquire().await.unwrap();
            let _b = pool.acquire().await.unwrap();
            let metrics = pool.metrics();
            assert_eq!(metrics.total_acquired, 2);
            assert_eq!(metrics.checked_out_connections, 2);
            assert_eq!(metrics.utilization, 0.5);
        }

        let metrics = pool.metrics();
        assert_eq!(metrics.total_released, 2);
        assert_eq!(metrics.connections_created, 2);
        assert_eq!(metrics.available_connections, 2);
        assert_eq!(pool.export_metrics()["total_acquired"], "2");
    }

    #[tokio::test]
    async fn test_prometheus_text_export() {
        let pool = pool();
        let _conn = pool.acquire().await.unwrap();

        let mut tags = HashMap::new();
        tags.insert("service".to_string(), "api".to_string());
        let output = pool.export_metrics_prometheus("primary", Some(&tags));

        assert!(output.contains("# TYPE slotpool_connections_checked_out gauge"));
        let labels = "{pool=\"primary\",service=\"api\"}";
        assert!(output.contains(&format!("slotpool_connections_checked_out{} 1", labels)));
        assert!(output.contains(&format!("slotpool_acquired_total{} 1", labels)));
        assert!(output.contains(&format!("slotpool_released_total{} 0", labels)));
        assert!(output.contains(&format!("slotpool_waits_total{} 0", labels)));
        assert!(output.contains("# TYPE slotpool_misuse_events_total counter"));
    }

    #[cfg(feature = "prometheus")]
    fn counter_value(registry: &prometheus::Registry, name: &str) -> f64 {
        registry
            .gather()
            .iter()
            .find(|family| family.get_name() == name)
            .map(|family| family.get_metric()[0].get_counter().get_value())
            .unwrap()
    }

    #[cfg(feature = "prometheus")]
    #[tokio::test]
    async fn test_concurrent_scrapes_do_not_overcount() {
        let pool = pool();
        for _ in 0..50 {
            drop(pool.acquire().await.unwrap());
        }

        for _ in 0..20 {
            let registry = prometheus::Registry::new();
            registry
                .register(Box::new(PoolCollector::new(pool.clone(), "primary").unwrap()))
                .unwrap();

            std::thread::scope(|scope| {
                for _ in 0..4 {
                    scope.spawn(|| registry.gather());
                }
            });

            assert_eq!(counter_value(&registry, "slotpool_acquired_total"), 50.0);
            assert_eq!(counter_value(&registry, "slotpool_released_total"), 50.0);
        }
    }

    #[cfg(feature = "prometheus")]
    #[tokio::test]
    async fn test_collector_reports_on_scrape() {
        let pool = pool();
        let registry = prometheus::Registry::new();
        registry
            .register(Box::new(PoolCollector::new(pool.clone(), "primary").unwrap()))
            .unwrap();

        let conn = pool.acquire().await.unwrap();
        let families = registry.gather();
        let created = families
            .iter()
            .find(|family| family.get_name() == "slotpool_connections_created_total")
            .unwrap();
        assert_eq!(created.get_metric()[0].get_counter().get_value(), 1.0);

        drop(conn);
        let families = registry.gather();
        let available = families
            .iter()
            .find(|family| family.get_name() == "slotpool_connections_available")
            .unwrap();
        assert_eq!(available.get_metric()[0].get_gauge().get_value(), 1.0);
    }
}
