//! Prometheus-backed metrics sink

use super::sink::{Labels, MetricsSink};
use crate::error::{SinkError, SinkResult};
use crate::fault::{Metric, MetricKind};
use prometheus::{GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};
use std::collections::HashMap;

/// Buckets for simulated response times (in seconds)
const RESPONSE_TIME_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0, 30.0];

/// Metrics sink exposing every simulated metric family in an injected registry
#[derive(Clone)]
pub struct PrometheusMetricsSink {
    gauges: HashMap<&'static str, GaugeVec>,
    histograms: HashMap<&'static str, HistogramVec>,
}

impl PrometheusMetricsSink {
    pub fn new(registry: &Registry) -> SinkResult<Self> {
        let mut gauges = HashMap::new();
        let mut histograms = HashMap::new();

        for metric in Metric::ALL {
            let label_names = ["service", metric.label_key()];
            match metric.kind() {
                MetricKind::Gauge => {
                    let gauge = GaugeVec::new(Opts::new(metric.name(), metric.help()), &label_names)?;
                    registry.register(Box::new(gauge.clone()))?;
                    gauges.insert(metric.name(), gauge);
                }
                MetricKind::Histogram => {
                    let histogram = HistogramVec::new(
                        HistogramOpts::new(metric.name(), metric.help())
                            .buckets(RESPONSE_TIME_BUCKETS.to_vec()),
                        &label_names,
                    )?;
                    registry.register(Box::new(histogram.clone()))?;
                    histograms.insert(metric.name(), histogram);
                }
            }
        }

        Ok(Self { gauges, histograms })
    }
}

/// Label values in the order the family was registered with
fn label_values<'a>(name: &str, labels: &'a Labels) -> SinkResult<[&'a str; 2]> {
    let metric = Metric::from_name(name).ok_or_else(|| SinkError::UnknownMetric(name.to_string()))?;
    let lookup = |key: &str| {
        labels
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| SinkError::UnknownMetric(format!("{name} is missing label {key}")))
    };
    Ok([lookup("service")?, lookup(metric.label_key())?])
}

impl MetricsSink for PrometheusMetricsSink {
    fn record_gauge(&self, name: &str, labels: &Labels, value: f64) -> SinkResult<()> {
        let gauge = self
            .gauges
            .get(name)
            .ok_or_else(|| SinkError::UnknownMetric(name.to_string()))?;
        let values = label_values(name, labels)?;
        gauge.with_label_values(&values).set(value);
        Ok(())
    }

    fn record_histogram(&self, name: &str, labels: &Labels, value: f64) -> SinkResult<()> {
        let histogram = self
            .histograms
            .get(name)
            .ok_or_else(|| SinkError::UnknownMetric(name.to_string()))?;
        let values = label_values(name, labels)?;
        histogram.with_label_values(&values).observe(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_registers_every_family() {
        let registry = Registry::new();
        let sink = PrometheusMetricsSink::new(&registry).unwrap();
        assert_eq!(sink.gauges.len() + sink.histograms.len(), Metric::ALL.len());

        // Families appear in gather() once they have a child
        sink.record_gauge(
            "service_cpu_usage",
            &labels(&[("service", "user-api"), ("pod", "user-api-1")]),
            42.0,
        )
        .unwrap();
        let families = registry.gather();
        let cpu = families
            .iter()
            .find(|f| f.get_name() == "service_cpu_usage")
            .unwrap();
        assert_eq!(cpu.get_metric()[0].get_gauge().get_value(), 42.0);
    }

    #[test]
    fn test_records_histogram() {
        let registry = Registry::new();
        let sink = PrometheusMetricsSink::new(&registry).unwrap();
        sink.record_histogram(
            "service_response_time_seconds",
            &labels(&[("service", "user-api"), ("endpoint", "/api/users")]),
            3.5,
        )
        .unwrap();

        let families = registry.gather();
        let family = families
            .iter()
            .find(|f| f.get_name() == "service_response_time_seconds")
            .unwrap();
        assert_eq!(family.get_metric()[0].get_histogram().get_sample_count(), 1);
    }

    #[test]
    fn test_rejects_unknown_metric_and_wrong_kind() {
        let sink = PrometheusMetricsSink::new(&Registry::new()).unwrap();
        let l = labels(&[("service", "user-api"), ("pod", "p")]);

        assert!(matches!(
            sink.record_gauge("service_request_rate", &l, 1.0),
            Err(SinkError::UnknownMetric(_))
        ));
        assert!(sink.record_histogram("service_cpu_usage", &l, 1.0).is_err());
    }

    #[test]
    fn test_rejects_missing_label() {
        let sink = PrometheusMetricsSink::new(&Registry::new()).unwrap();
        let result = sink.record_gauge(
            "service_queue_depth",
            &labels(&[("service", "message-queue")]),
            10.0,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_two_sinks_on_one_registry_conflict() {
        let registry = Registry::new();
        PrometheusMetricsSink::new(&registry).unwrap();
        assert!(matches!(
            PrometheusMetricsSink::new(&registry),
            Err(SinkError::Registration(_))
        ));
    }
}
