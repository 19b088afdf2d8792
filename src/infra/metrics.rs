// ============================================================
// Layer 6 — Smoothed Metrics
// ============================================================
// Running statistics for the training loop.
//
//   SmoothedValue — one metric: a sliding window (for median /
//                   recent average) plus an all-time total and
//                   count (for the epoch-global average)
//   MetricLogger  — a named set of SmoothedValues with periodic
//                   progress lines and cross-process sync
//
// Only total and count are reduced across workers, so after
// synchronize_between_processes the global average is exact
// while the window statistics stay local to each worker.

use std::{
    collections::{BTreeMap, VecDeque},
    fmt,
    time::Instant,
};

use crate::domain::traits::ProcessGroup;

// ─── SmoothedValue ────────────────────────────────────────────────────────────

/// How a meter renders itself in progress lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterFormat {
    /// "median (global_avg)"
    MedianAndGlobal { precision: usize },
    /// latest value only
    Value { precision: usize },
}

#[derive(Debug, Clone)]
pub struct SmoothedValue {
    window:      VecDeque<f64>,
    window_size: usize,
    total:       f64,
    count:       f64,
    format:      MeterFormat,
}

impl Default for SmoothedValue {
    fn default() -> Self {
        Self::new(20)
    }
}

impl SmoothedValue {
    pub fn new(window_size: usize) -> Self {
        Self {
            window:      VecDeque::with_capacity(window_size.max(1)),
            window_size: window_size.max(1),
            total:       0.0,
            count:       0.0,
            format:      MeterFormat::MedianAndGlobal { precision: 4 },
        }
    }

    pub fn with_format(mut self, format: MeterFormat) -> Self {
        self.format = format;
        self
    }

    /// Record `value` observed `n` times (e.g. n = batch size)
    pub fn update(&mut self, value: f64, n: usize) {
        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(value);
        self.count += n as f64;
        self.total += value * n as f64;
    }

    /// Sum count and total across workers. Window stays local.
    pub fn synchronize(&mut self, group: &dyn ProcessGroup) {
        let mut buf = [self.count, self.total];
        group.all_reduce_sum(&mut buf);
        self.count = buf[0];
        self.total = buf[1];
    }

    pub fn median(&self) -> f64 {
        if self.window.is_empty() {
            return f64::NAN;
        }
        let mut sorted: Vec<f64> = self.window.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        // lower median, matching torch.median on even lengths
        sorted[(sorted.len() - 1) / 2]
    }

    pub fn avg(&self) -> f64 {
        if self.window.is_empty() {
            return f64::NAN;
        }
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }

    pub fn global_avg(&self) -> f64 {
        if self.count == 0.0 {
            return f64::NAN;
        }
        self.total / self.count
    }

    pub fn max(&self) -> f64 {
        self.window.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn value(&self) -> f64 {
        self.window.back().copied().unwrap_or(f64::NAN)
    }

    pub fn count(&self) -> f64 {
        self.count
    }
}

impl fmt::Display for SmoothedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.format {
            MeterFormat::MedianAndGlobal { precision } => write!(
                f, "{:.p$} ({:.p$})", self.median(), self.global_avg(), p = precision
            ),
            MeterFormat::Value { precision } => write!(f, "{:.p$}", self.value(), p = precision),
        }
    }
}

// ─── MetricLogger ─────────────────────────────────────────────────────────────

pub struct MetricLogger {
    meters:     BTreeMap<String, SmoothedValue>,
    delimiter:  String,
    print_freq: usize,
    iter_time:  SmoothedValue,
    started:    Instant,
    last_tick:  Instant,
}

impl MetricLogger {
    pub fn new(delimiter: impl Into<String>, print_freq: usize) -> Self {
        let now = Instant::now();
        Self {
            meters:     BTreeMap::new(),
            delimiter:  delimiter.into(),
            print_freq: print_freq.max(1),
            iter_time:  SmoothedValue::new(20),
            started:    now,
            last_tick:  now,
        }
    }

    /// Register a meter with a non-default window or format
    pub fn add_meter(&mut self, name: impl Into<String>, meter: SmoothedValue) {
        self.meters.insert(name.into(), meter);
    }

    /// Record one observation; unknown names get a default meter
    pub fn update(&mut self, name: &str, value: f64) {
        self.meters
            .entry(name.to_string())
            .or_default()
            .update(value, 1);
    }

    pub fn meters(&self) -> &BTreeMap<String, SmoothedValue> {
        &self.meters
    }

    /// Call once at the end of every step. Logs a progress line
    /// every `print_freq` steps and on the last step.
    pub fn log_every(&mut self, step: usize, total: usize, header: &str) {
        let now = Instant::now();
        self.iter_time.update(now.duration_since(self.last_tick).as_secs_f64(), 1);
        self.last_tick = now;

        let last = total > 0 && step + 1 == total;
        if step % self.print_freq != 0 && !last {
            return;
        }

        let remaining = total.saturating_sub(step + 1) as f64;
        let eta = format_duration(self.iter_time.global_avg() * remaining);
        let width = total.to_string().len();
        tracing::info!(
            "{} [{:>w$}/{}]{d}eta: {}{d}{}{d}time: {:.4}",
            header,
            step,
            total,
            eta,
            self,
            self.iter_time.avg(),
            w = width,
            d = self.delimiter,
        );

        if last {
            let elapsed = now.duration_since(self.started).as_secs_f64();
            tracing::info!(
                "{header} Total time: {} ({:.4} s / it)",
                format_duration(elapsed),
                elapsed / total as f64
            );
        }
    }

    pub fn synchronize_between_processes(&mut self, group: &dyn ProcessGroup) {
        for meter in self.meters.values_mut() {
            meter.synchronize(group);
        }
    }

    /// Epoch-global average of every meter, keyed by name
    pub fn global_averages(&self) -> BTreeMap<String, f64> {
        self.meters
            .iter()
            .map(|(name, meter)| (name.clone(), meter.global_avg()))
            .collect()
    }
}

impl fmt::Display for MetricLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.meters
            .iter()
            .map(|(name, meter)| format!("{name}: {meter}"))
            .collect();
        write!(f, "{}", parts.join(&self.delimiter))
    }
}

/// Seconds → "H:MM:SS"
pub fn format_duration(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "--:--:--".to_string();
    }
    let total = seconds.round() as u64;
    format!("{}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}
