//! Performance metrics — pure functions over NAV, performance and profit series.
//!
//! Every metric is a pure function: series in, scalar out. Annualization uses
//! 365 days since crypto markets never close. Each function returns 0.0 when
//! its input is too short or degenerate, with the exceptions noted per function.

use serde::{Deserialize, Serialize};

/// Days per year used for annualization.
pub const DAYS_PER_YEAR: f64 = 365.0;

/// Default Expected Shortfall confidence level.
pub const DEFAULT_CONFIDENCE: f64 = 0.95;

/// Aggregate metrics recomputed on every day boundary and at run end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub cagr: f64,
    pub calmar_ratio: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub ulcer_index: f64,
    pub expected_shortfall: f64,
    pub profit_factor: f64,
    pub recovery_factor: f64,
    pub r2: f64,
}

impl PerformanceMetrics {
    #[allow(clippy::too_many_arguments)]
    pub fn compute(
        nav_history: &[f64],
        performance_history: &[f64],
        profit_history: &[f64],
        initial_nav: f64,
        final_nav: f64,
        elapsed_days: i64,
        max_drawdown: f64,
        allocation: f64,
    ) -> Self {
        let cagr_value = cagr(initial_nav, final_nav, elapsed_days);
        let net_profit_pct = if allocation > 0.0 {
            (final_nav - allocation) / allocation
        } else {
            0.0
        };
        Self {
            cagr: cagr_value,
            calmar_ratio: calmar_ratio(cagr_value, max_drawdown),
            sharpe_ratio: sharpe_ratio(nav_history, 0.0),
            sortino_ratio: sortino_ratio(nav_history, 0.0),
            ulcer_index: ulcer_index(nav_history),
            expected_shortfall: expected_shortfall(nav_history, DEFAULT_CONFIDENCE),
            profit_factor: profit_factor(profit_history),
            recovery_factor: recovery_factor(net_profit_pct, max_drawdown),
            r2: r2(performance_history),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Compound Annual Growth Rate.
///
/// 0.0 if `elapsed_days < 1` or `initial_nav <= 0`; -1.0 if `final_nav <= 0`
/// (total loss).
pub fn cagr(initial_nav: f64, final_nav: f64, elapsed_days: i64) -> f64 {
    if elapsed_days < 1 || initial_nav <= 0.0 {
        return 0.0;
    }
    if final_nav <= 0.0 {
        return -1.0;
    }
    (final_nav / initial_nav).powf(DAYS_PER_YEAR / elapsed_days as f64) - 1.0
}

/// CAGR per unit of max drawdown. `max_drawdown` is a non-positive fraction.
pub fn calmar_ratio(cagr: f64, max_drawdown: f64) -> f64 {
    if max_drawdown >= 0.0 {
        return 0.0;
    }
    cagr / max_drawdown.abs()
}

/// Annualized Sharpe ratio over period returns of `nav_history`.
///
/// Sample standard deviation (n - 1). Needs at least 3 returns.
pub fn sharpe_ratio(nav_history: &[f64], risk_free_rate: f64) -> f64 {
    let returns = period_returns(nav_history);
    if returns.len() < 3 {
        return 0.0;
    }
    let std = sample_std_dev(&returns);
    if std == 0.0 {
        return 0.0;
    }
    (mean_f64(&returns) - risk_free_rate) / std * DAYS_PER_YEAR.sqrt()
}

/// Annualized Sortino ratio over period returns of `nav_history`.
///
/// Downside deviation is the root mean square of the negative returns only.
/// Needs at least 3 returns and one negative return.
pub fn sortino_ratio(nav_history: &[f64], risk_free_rate: f64) -> f64 {
    let returns = period_returns(nav_history);
    if returns.len() < 3 {
        return 0.0;
    }
    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if downside.is_empty() {
        return 0.0;
    }
    let downside_dev = (downside.iter().map(|r| r * r).sum::<f64>() / downside.len() as f64).sqrt();
    if downside_dev == 0.0 {
        return 0.0;
    }
    (mean_f64(&returns) - risk_free_rate) / downside_dev * DAYS_PER_YEAR.sqrt()
}

/// Ulcer Index: RMS of percentage drawdowns from the running peak.
pub fn ulcer_index(nav_history: &[f64]) -> f64 {
    if nav_history.len() < 2 {
        return 0.0;
    }
    let mut peak = nav_history[0];
    let mut squared = Vec::with_capacity(nav_history.len());
    for &nav in nav_history {
        peak = peak.max(nav);
        if peak == 0.0 {
            continue;
        }
        let dd_pct = (nav - peak) / peak * 100.0;
        squared.push(dd_pct * dd_pct);
    }
    if squared.is_empty() {
        return 0.0;
    }
    mean_f64(&squared).sqrt()
}

/// Expected Shortfall: mean of the worst `(1 - confidence)` tail of returns.
///
/// The tail holds at least one return.
pub fn expected_shortfall(nav_history: &[f64], confidence: f64) -> f64 {
    if nav_history.len() < 2 {
        return 0.0;
    }
    let mut returns = period_returns(nav_history);
    if returns.is_empty() {
        return 0.0;
    }
    returns.sort_by(|a, b| a.total_cmp(b));
    let tail = ((returns.len() as f64 * (1.0 - confidence)) as usize).max(1);
    mean_f64(&returns[..tail])
}

/// Gross wins over gross losses. 0.0 with no trades or no losing trade.
pub fn profit_factor(profits: &[f64]) -> f64 {
    if profits.is_empty() {
        return 0.0;
    }
    let wins: f64 = profits.iter().filter(|p| **p > 0.0).sum();
    let losses: f64 = profits.iter().filter(|p| **p < 0.0).sum::<f64>().abs();
    if losses == 0.0 {
        return 0.0;
    }
    wins / losses
}

/// Net profit fraction per unit of max drawdown.
pub fn recovery_factor(net_profit_pct: f64, max_drawdown: f64) -> f64 {
    if max_drawdown >= 0.0 {
        return 0.0;
    }
    net_profit_pct / max_drawdown.abs()
}

/// Coefficient of determination of a least-squares line through `values`
/// against their index.
pub fn r2(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean_x = (n - 1) as f64 / 2.0;
    let mean_y = mean_f64(values);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        sxy += dx * (y - mean_y);
        sxx += dx * dx;
    }
    if sxx == 0.0 {
        return 0.0;
    }
    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let fit = slope * i as f64 + intercept;
        ss_res += (y - fit).powi(2);
        ss_tot += (y - mean_y).powi(2);
    }
    if ss_tot == 0.0 {
        return 0.0;
    }
    1.0 - ss_res / ss_tot
}

/// Running-peak drawdown of `nav` as a non-positive fraction.
pub fn drawdown(nav: f64, nav_peak: f64) -> f64 {
    if nav_peak == 0.0 {
        return 0.0;
    }
    (nav - nav_peak) / nav_peak
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Consecutive returns, skipping steps whose previous value is 0.
pub fn period_returns(nav_history: &[f64]) -> Vec<f64> {
    nav_history
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

pub fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}
