/// Rolling mean ± k·stddev envelope
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Bands for the most recent `period` prices
pub fn calculate_bollinger(prices: &[f64], period: usize, k: f64) -> Option<BollingerBands> {
    if period == 0 || prices.len() < period {
        return None;
    }
    Some(bands_for_window(&prices[prices.len() - period..], k))
}

/// Bands for every index, `None` until `period` prices are available
///
/// Uses population standard deviation.
pub fn bollinger_series(prices: &[f64], period: usize, k: f64) -> Vec<Option<BollingerBands>> {
    let mut out = vec![None; prices.len()];
    if period == 0 || prices.len() < period {
        return out;
    }

    for end in period..=prices.len() {
        out[end - 1] = Some(bands_for_window(&prices[end - period..end], k));
    }

    out
}

fn bands_for_window(window: &[f64], k: f64) -> BollingerBands {
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let variance = window.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    BollingerBands {
        upper: mean + k * std_dev,
        middle: mean,
        lower: mean - k * std_dev,
    }
}
