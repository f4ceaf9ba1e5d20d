use super::moving_average::sma_series;

/// Rolling average volume for every index
pub fn average_volume_series(volumes: &[f64], period: usize) -> Vec<Option<f64>> {
    sma_series(volumes, period)
}

/// Check if volume is spiking (current volume significantly above average)
pub fn is_volume_spike(current_volume: f64, average_volume: f64, multiplier: f64) -> bool {
    average_volume > 0.0 && current_volume > average_volume * multiplier
}
