use common::config::SizingConfig;
use common::models::VolumeConstraints;
use tracing::{debug, warn};

/// Converts an account balance into a lot size the broker will accept.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    config: SizingConfig,
}

impl PositionSizer {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    /// Volume before any broker constraints are applied.
    pub fn raw_volume(&self, symbol: &str, balance: f64) -> f64 {
        if let Some(formula) = self.config.formulas.get(symbol) {
            return formula.apply(balance);
        }

        match &self.config.default_formula {
            Some(formula) => formula.apply(balance),
            None => {
                warn!(
                    "No volume formula for {}. Using the default lot size of {}",
                    symbol, self.config.default_volume
                );
                self.config.default_volume
            }
        }
    }

    /// Snaps to the volume step, clamps into the broker limits and rounds to two decimals.
    ///
    /// Without constraints the raw volume is returned untouched.
    pub fn size(
        &self,
        symbol: &str,
        balance: f64,
        constraints: Option<&VolumeConstraints>,
    ) -> f64 {
        let raw = self.raw_volume(symbol, balance);

        let Some(constraints) = constraints else {
            warn!("No volume limits for {}, using raw volume {}", symbol, raw);
            return raw;
        };

        let volume = round_lots(snap_to_grid(raw, constraints));
        debug!(
            "Sized {}: raw={:.6} step={} min={} max={} -> {}",
            symbol,
            raw,
            constraints.volume_step,
            constraints.volume_min,
            constraints.volume_max,
            volume
        );
        volume
    }
}

/// `round(raw / step) * step`, then clamped into `[min, max]`.
pub fn snap_to_grid(raw: f64, constraints: &VolumeConstraints) -> f64 {
    let step = constraints.volume_step;
    let snapped = if step > 0.0 {
        (raw / step).round() * step
    } else {
        raw
    };
    constraints
        .volume_min
        .max(snapped.min(constraints.volume_max))
}

pub fn round_lots(volume: f64) -> f64 {
    (volume * 100.0).round() / 100.0
}
