// Performance metrics for the pricing engine
//
// Tracks execution times, cache hit rates, and slow operations across the
// pipeline phases (discounts, shipping, tax, whole calculation).

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use utoipa::ToSchema;

/// Threshold above which an operation is counted as slow (100ms)
const SLOW_OPERATION_THRESHOLD_MS: u64 = 100;

/// Pipeline phase being timed
#[derive(Debug, Clone, Copy)]
pub enum OperationType {
    Calculation,
    Discounts,
    Shipping,
    Tax,
}

/// Performance metrics for the pricing engine
#[derive(Debug, Clone)]
pub struct PerformanceMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,

    calculations: AtomicU64,
    discount_evaluations: AtomicU64,
    shipping_resolutions: AtomicU64,
    tax_resolutions: AtomicU64,

    total_calculation_time_us: AtomicU64,
    total_discount_time_us: AtomicU64,
    total_shipping_time_us: AtomicU64,
    total_tax_time_us: AtomicU64,

    slow_calculations: AtomicU64,
}

/// Point-in-time view of the counters, serialized for the metrics endpoint
#[derive(Debug, Serialize, ToSchema)]
pub struct MetricsSnapshot {
    pub cache_hit_rate: f64,
    pub calculations: u64,
    pub discount_evaluations: u64,
    pub shipping_resolutions: u64,
    pub tax_resolutions: u64,
    pub avg_calculation_us: u64,
    pub slow_calculations: u64,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                cache_hits: AtomicU64::new(0),
                cache_misses: AtomicU64::new(0),
                calculations: AtomicU64::new(0),
                discount_evaluations: AtomicU64::new(0),
                shipping_resolutions: AtomicU64::new(0),
                tax_resolutions: AtomicU64::new(0),
                total_calculation_time_us: AtomicU64::new(0),
                total_discount_time_us: AtomicU64::new(0),
                total_shipping_time_us: AtomicU64::new(0),
                total_tax_time_us: AtomicU64::new(0),
                slow_calculations: AtomicU64::new(0),
            }),
        }
    }

    pub fn record_cache_hit(&self) {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Cache hit rate between 0.0 and 1.0
    pub fn cache_hit_rate(&self) -> f64 {
        let hits = self.inner.cache_hits.load(Ordering::Relaxed);
        let misses = self.inner.cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;

        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Start timing a full cart calculation
    pub fn start_calculation(&self) -> OperationTimer {
        OperationTimer::new(OperationType::Calculation, self.clone())
    }

    /// Start timing a discount evaluation
    pub fn start_discount_evaluation(&self) -> OperationTimer {
        OperationTimer::new(OperationType::Discounts, self.clone())
    }

    /// Start timing a shipping resolution
    pub fn start_shipping_resolution(&self) -> OperationTimer {
        OperationTimer::new(OperationType::Shipping, self.clone())
    }

    /// Start timing a tax resolution
    pub fn start_tax_resolution(&self) -> OperationTimer {
        OperationTimer::new(OperationType::Tax, self.clone())
    }

    fn record(&self, operation: OperationType, duration: Duration) {
        let micros = duration.as_micros() as u64;
        match operation {
            OperationType::Calculation => {
                self.inner.calculations.fetch_add(1, Ordering::Relaxed);
                self.inner
                    .total_calculation_time_us
                    .fetch_add(micros, Ordering::Relaxed);
                if duration.as_millis() as u64 > SLOW_OPERATION_THRESHOLD_MS {
                    self.inner.slow_calculations.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("Slow cart calculation: {}ms", duration.as_millis());
                }
            }
            OperationType::Discounts => {
                self.inner.discount_evaluations.fetch_add(1, Ordering::Relaxed);
                self.inner
                    .total_discount_time_us
                    .fetch_add(micros, Ordering::Relaxed);
            }
            OperationType::Shipping => {
                self.inner.shipping_resolutions.fetch_add(1, Ordering::Relaxed);
                self.inner
                    .total_shipping_time_us
                    .fetch_add(micros, Ordering::Relaxed);
            }
            OperationType::Tax => {
                self.inner.tax_resolutions.fetch_add(1, Ordering::Relaxed);
                self.inner
                    .total_tax_time_us
                    .fetch_add(micros, Ordering::Relaxed);
            }
        }
    }

    /// Snapshot the counters for reporting
    pub fn snapshot(&self) -> MetricsSnapshot {
        let calculations = self.inner.calculations.load(Ordering::Relaxed);
        let total_us = self.inner.total_calculation_time_us.load(Ordering::Relaxed);

        MetricsSnapshot {
            cache_hit_rate: self.cache_hit_rate(),
            calculations,
            discount_evaluations: self.inner.discount_evaluations.load(Ordering::Relaxed),
            shipping_resolutions: self.inner.shipping_resolutions.load(Ordering::Relaxed),
            tax_resolutions: self.inner.tax_resolutions.load(Ordering::Relaxed),
            avg_calculation_us: if calculations == 0 {
                0
            } else {
                total_us / calculations
            },
            slow_calculations: self.inner.slow_calculations.load(Ordering::Relaxed),
        }
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Times one operation; records on drop
pub struct OperationTimer {
    operation: OperationType,
    metrics: PerformanceMetrics,
    start: Instant,
}

impl OperationTimer {
    fn new(operation: OperationType, metrics: PerformanceMetrics) -> Self {
        Self {
            operation,
            metrics,
            start: Instant::now(),
        }
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        self.metrics.record(self.operation, self.start.elapsed());
    }
}
