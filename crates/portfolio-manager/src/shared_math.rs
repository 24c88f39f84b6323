//! Pure mathematical utilities for portfolio returns.
//! Stateless functions: no I/O, no shared state.

use tracing::debug;

use crate::cash_flows::CashFlow;

/// Newton-Raphson starting rate (10%).
pub const XIRR_INITIAL_GUESS: f64 = 0.10;
/// Iteration cap; the solver always terminates after this many steps.
pub const XIRR_MAX_ITERATIONS: usize = 100;
const XIRR_TOLERANCE: f64 = 1e-7;
const XIRR_MIN_DERIVATIVE: f64 = 1e-12;
const XIRR_MAX_RESIDUAL: f64 = 1e-3;
const DAYS_PER_YEAR: f64 = 365.0;

/// (years since the earliest flow, amount) pairs.
fn year_fractions(flows: &[CashFlow]) -> Option<Vec<(f64, f64)>> {
    let first = flows.iter().map(|f| f.date).min()?;
    Some(
        flows
            .iter()
            .map(|f| ((f.date - first).num_days() as f64 / DAYS_PER_YEAR, f.amount))
            .collect(),
    )
}

/// NPV(r) = Σ amount / (1 + r)^t
pub fn npv(series: &[(f64, f64)], rate: f64) -> f64 {
    series
        .iter()
        .map(|&(t, amount)| amount / (1.0 + rate).powf(t))
        .sum()
}

/// NPV'(r) = Σ -t * amount / (1 + r)^(t + 1)
pub fn npv_derivative(series: &[(f64, f64)], rate: f64) -> f64 {
    series
        .iter()
        .map(|&(t, amount)| -t * amount / (1.0 + rate).powf(t + 1.0))
        .sum()
}

/// Annualized internal rate of return of dated cash flows, as a percentage.
///
/// Returns `None` when no rate can be determined: empty input, a flat or
/// non-finite derivative, or a final rate whose NPV is not within 1e-3 of
/// zero (e.g. every flow has the same sign).
pub fn xirr(flows: &[CashFlow]) -> Option<f64> {
    let series = year_fractions(flows)?;
    let mut rate = XIRR_INITIAL_GUESS;

    for iteration in 0..XIRR_MAX_ITERATIONS {
        let value = npv(&series, rate);
        let slope = npv_derivative(&series, rate);

        if !value.is_finite() || !slope.is_finite() || slope.abs() < XIRR_MIN_DERIVATIVE {
            debug!(iteration, rate, value, slope, "xirr aborted on degenerate step");
            return None;
        }

        let next = rate - value / slope;
        if !next.is_finite() {
            debug!(iteration, rate, "xirr step diverged");
            return None;
        }

        if (next - rate).abs() < XIRR_TOLERANCE {
            rate = next;
            break;
        }
        rate = next;
    }

    let residual = npv(&series, rate);
    if rate.is_finite() && residual.abs() <= XIRR_MAX_RESIDUAL {
        Some(rate * 100.0)
    } else {
        debug!(rate, residual, "xirr did not converge");
        None
    }
}

/// Compound annual growth from `cost` to `value` over `days`, as a percentage.
/// Holding periods shorter than a day count as one day.
pub fn annualized_return(cost: f64, value: f64, days: i64) -> Option<f64> {
    if cost <= 0.0 || value < 0.0 {
        return None;
    }
    let years = (days as f64 / DAYS_PER_YEAR).max(1.0 / DAYS_PER_YEAR);
    let annualized = (value / cost).powf(1.0 / years) - 1.0;
    annualized.is_finite().then_some(annualized * 100.0)
}

/// Weighted mean of (value, weight) pairs. `None` when total weight is not positive.
pub fn weighted_average(pairs: impl IntoIterator<Item = (f64, f64)>) -> Option<f64> {
    let (sum, total_weight) = pairs
        .into_iter()
        .fold((0.0, 0.0), |(sum, total), (value, weight)| {
            (sum + value * weight, total + weight)
        });
    if total_weight > 0.0 {
        Some(sum / total_weight)
    } else {
        None
    }
}
