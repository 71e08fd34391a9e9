//! Running means of named metrics between two log points.

use std::collections::BTreeMap;

/// Accumulates values per metric name and reports their means.
#[derive(Debug, Clone, Default)]
pub struct MetricAggregator {
    sums: BTreeMap<String, (f64, usize)>,
}

impl MetricAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one observation. Non-finite values are dropped.
    pub fn update(&mut self, name: &str, value: f32) {
        if !value.is_finite() {
            return;
        }
        let entry = self.sums.entry(name.to_string()).or_insert((0.0, 0));
        entry.0 += f64::from(value);
        entry.1 += 1;
    }

    pub fn extend(&mut self, metrics: &BTreeMap<String, f32>) {
        for (name, &value) in metrics {
            self.update(name, value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sums.is_empty()
    }

    /// Mean of every metric seen since the last reset.
    pub fn compute(&self) -> BTreeMap<String, f32> {
        self.sums
            .iter()
            .map(|(name, &(sum, count))| (name.clone(), (sum / count as f64) as f32))
            .collect()
    }

    pub fn reset(&mut self) {
        self.sums.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_means_per_name() {
        let mut agg = MetricAggregator::new();
        agg.update("Loss/policy_loss", 1.0);
        agg.update("Loss/policy_loss", 3.0);
        agg.update("Loss/value_loss", 0.5);
        agg.update("Loss/value_loss", f32::NAN);

        let means = agg.compute();
        assert_eq!(means["Loss/policy_loss"], 2.0);
        assert_eq!(means["Loss/value_loss"], 0.5);

        agg.reset();
        assert!(agg.is_empty());
    }
}
