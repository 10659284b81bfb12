use serde::Serialize;
use tracing::debug;

use super::error::{CalcError, CalcResult, ensure_non_negative, ensure_positive};

/// Relative slack on the net proceeds when checking the lower search bound.
const BRACKET_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
pub struct AprSolveConfig {
    pub search_min_percent: f64,
    pub search_max_percent: f64,
    pub tolerance_percent: f64,
    pub max_iterations: u32,
}

impl Default for AprSolveConfig {
    fn default() -> Self {
        Self {
            search_min_percent: 0.0,
            search_max_percent: 200.0,
            tolerance_percent: 1e-7,
            max_iterations: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AprSolveIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_percent: f64,
    pub present_value: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AprSolveResult {
    pub apr_percent: f64,
    pub converged: bool,
    #[serde(skip_serializing)]
    pub iterations: Vec<AprSolveIteration>,
    pub iteration_count: u32,
    pub message: String,
}

/// Present value of a payment stream; the first payment is discounted one period.
pub fn present_value(payments: &[f64], rate_per_period: f64) -> f64 {
    let discount = 1.0 / (1.0 + rate_per_period);
    let mut factor = 1.0;
    let mut total = 0.0;
    for payment in payments {
        factor *= discount;
        total += payment * factor;
    }
    total
}

/// Annual percentage rate that equates the payment stream with the cash actually
/// received, found by bisection on the nominal annual rate.
pub fn solve_effective_apr(
    payments: &[f64],
    net_proceeds: f64,
    periods_per_year: u32,
    config: AprSolveConfig,
) -> CalcResult<AprSolveResult> {
    validate_config(config)?;
    let net_proceeds = ensure_positive("netProceeds", net_proceeds)?;
    if payments.is_empty() {
        return Err(CalcError::invalid("payments", "must not be empty"));
    }
    let ppy = periods_per_year.max(1) as f64;
    let pv_at = |annual_percent: f64| present_value(payments, annual_percent / 100.0 / ppy);

    let mut lo = config.search_min_percent;
    let mut hi = config.search_max_percent;
    // Float summation can leave the payments a hair below the proceeds at the lower bound.
    let pv_lo = pv_at(lo);
    if (pv_lo - net_proceeds).abs() <= net_proceeds * BRACKET_TOLERANCE {
        return Ok(AprSolveResult {
            apr_percent: lo,
            converged: true,
            iterations: Vec::new(),
            iteration_count: 0,
            message: "Effective APR equals the lower search bound.".to_string(),
        });
    }
    if pv_lo < net_proceeds || pv_at(hi) > net_proceeds {
        debug!(net_proceeds, lo, hi, "APR not bracketed by search bounds");
        return Err(CalcError::non_convergent(
            format!("no APR between {lo}% and {hi}% matches net proceeds {net_proceeds:.2}"),
            config.max_iterations,
        ));
    }

    let mut iterations = Vec::with_capacity(config.max_iterations as usize);
    let mut converged = false;
    let mut it = 0;
    while it < config.max_iterations {
        it += 1;
        let mid = (lo + hi) * 0.5;
        let pv = pv_at(mid);
        iterations.push(AprSolveIteration {
            iteration: it,
            lower_bound: lo,
            upper_bound: hi,
            candidate_percent: mid,
            present_value: pv,
        });

        if pv > net_proceeds {
            lo = mid;
        } else {
            hi = mid;
        }

        if (hi - lo).abs() <= config.tolerance_percent {
            converged = true;
            break;
        }
    }

    let message = if converged {
        "Solved effective APR.".to_string()
    } else {
        "Reached max iterations before tolerance was met; returning best estimate.".to_string()
    };
    Ok(AprSolveResult {
        apr_percent: (lo + hi) * 0.5,
        converged,
        iteration_count: it,
        iterations,
        message,
    })
}

/// Average-balance shortcut for an all-in annual rate: interest plus fees over
/// the mean outstanding balance, per year. Exact only when there are no fees;
/// `solve_effective_apr` gives the true figure.
pub fn approximate_real_apr(
    total_interest: f64,
    fees: f64,
    average_balance: f64,
    years: f64,
) -> f64 {
    if average_balance <= 0.0 || years <= 0.0 {
        return 0.0;
    }
    (total_interest + fees) / average_balance / years * 100.0
}

fn validate_config(config: AprSolveConfig) -> CalcResult<()> {
    ensure_non_negative("searchMinPercent", config.search_min_percent)?;
    ensure_positive("tolerancePercent", config.tolerance_percent)?;
    if !config.search_max_percent.is_finite()
        || config.search_max_percent <= config.search_min_percent
    {
        return Err(CalcError::invalid(
            "searchMaxPercent",
            "must be greater than searchMinPercent",
        ));
    }
    if config.max_iterations == 0 {
        return Err(CalcError::invalid("maxIterations", "must be > 0"));
    }
    Ok(())
}
