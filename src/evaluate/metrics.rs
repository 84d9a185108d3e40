//! Cross-sectional factor quality metrics.
//!
//! Every function returns neutral values (0.0) on empty or degenerate input
//! instead of failing: data gaps upstream are expected and a job must still
//! resolve with a usable result.

use crate::evaluate::model::EvaluationMetrics;
use crate::evaluate::panel::{MergedPanel, MergedRow};

/// Annualization factor; assumes one observation per trading day.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IcStats {
    pub mean: f64,
    pub std: f64,
}

impl IcStats {
    /// mean / std, or 0 when std is zero or not finite.
    pub fn ir(&self) -> f64 {
        if self.std != 0.0 && self.std.is_finite() {
            let ir = self.mean / self.std;
            if ir.is_finite() {
                return ir;
            }
        }
        0.0
    }
}

pub fn evaluate(panel: &MergedPanel) -> EvaluationMetrics {
    let ic = ic_stats(&daily_ic(panel));
    let rank_ic = ic_stats(&daily_rank_ic(panel));
    let returns = daily_returns(panel);

    EvaluationMetrics {
        ic: ic.mean,
        ic_std: ic.std,
        icir: ic.ir(),
        rank_ic: rank_ic.mean,
        rank_icir: rank_ic.ir(),
        annual_return: annual_return(&returns),
        sharpe_ratio: sharpe_ratio(&returns),
        max_drawdown: max_drawdown(&returns),
    }
    .sanitized()
}

/// Per-date Pearson correlation between factor and label. Dates where the
/// correlation is undefined (fewer than two instruments, constant column)
/// are skipped.
pub fn daily_ic(panel: &MergedPanel) -> Vec<f64> {
    panel
        .by_date()
        .values()
        .filter_map(|rows| {
            let (xs, ys) = split(rows);
            pearson(&xs, &ys)
        })
        .collect()
}

/// Same as [`daily_ic`] on values ranked within each date.
pub fn daily_rank_ic(panel: &MergedPanel) -> Vec<f64> {
    panel
        .by_date()
        .values()
        .filter_map(|rows| {
            let (xs, ys) = split(rows);
            pearson(&rank(&xs), &rank(&ys))
        })
        .collect()
}

pub fn ic_stats(daily: &[f64]) -> IcStats {
    IcStats {
        mean: mean(daily).unwrap_or(0.0),
        std: sample_std(daily).unwrap_or(0.0),
    }
}

/// Equal-weighted mean label per date, in date order.
pub fn daily_returns(panel: &MergedPanel) -> Vec<f64> {
    panel
        .by_date()
        .values()
        .filter_map(|rows| {
            let labels: Vec<f64> = rows.iter().map(|r| r.label).collect();
            mean(&labels)
        })
        .collect()
}

pub fn annual_return(daily: &[f64]) -> f64 {
    mean(daily).map_or(0.0, |m| m * TRADING_DAYS_PER_YEAR)
}

pub fn sharpe_ratio(daily: &[f64]) -> f64 {
    let (Some(m), Some(s)) = (mean(daily), sample_std(daily)) else {
        return 0.0;
    };
    if s == 0.0 || !s.is_finite() {
        return 0.0;
    }
    let sharpe = TRADING_DAYS_PER_YEAR.sqrt() * m / s;
    if sharpe.is_finite() {
        sharpe
    } else {
        0.0
    }
}

/// Largest peak-to-trough decline of the compounded wealth curve, as a
/// positive fraction. Missing returns count as flat for the curve.
pub fn max_drawdown(daily: &[f64]) -> f64 {
    let mut wealth = 1.0_f64;
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;

    for r in daily {
        let r = if r.is_finite() { *r } else { 0.0 };
        wealth *= 1.0 + r;
        if wealth > peak {
            peak = wealth;
        }
        if peak > 0.0 {
            let dd = (wealth - peak) / peak;
            if dd < worst {
                worst = dd;
            }
        }
    }
    worst.abs()
}

fn split(rows: &[&MergedRow]) -> (Vec<f64>, Vec<f64>) {
    rows.iter().map(|r| (r.factor, r.label)).unzip()
}

fn finite(values: &[f64]) -> impl Iterator<Item = f64> + '_ {
    values.iter().copied().filter(|v| v.is_finite())
}

pub fn mean(values: &[f64]) -> Option<f64> {
    let (sum, n) = finite(values).fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

/// Sample standard deviation (n - 1); `None` below two observations.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let (ss, n) = finite(values).fold((0.0, 0usize), |(s, n), v| (s + (v - m).powi(2), n + 1));
    if n < 2 {
        return None;
    }
    Some((ss / (n - 1) as f64).sqrt())
}

/// Pearson correlation of paired finite observations.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = xs
        .iter()
        .zip(ys)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| (*x, *y))
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (x, y) in &pairs {
        let dx = x - mx;
        let dy = y - my;
        cov += dx * dy;
        vx += dx * dx;
        vy += dy * dy;
    }
    if vx == 0.0 || vy == 0.0 {
        return None;
    }
    let r = cov / (vx.sqrt() * vy.sqrt());
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

/// 1-based ranks, ties get the average of the ranks they span.
pub fn rank(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }
    ranks
}
