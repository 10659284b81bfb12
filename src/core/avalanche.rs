use tracing::debug;

use super::amortization::BALANCE_EPSILON;
use super::error::{CalcError, CalcResult, ensure_non_negative};
use super::types::{
    BaselineOutcome, Debt, DebtPayoffInput, DebtPayoffResult, ExtraBudget, PayoffEvent,
    PayoffMonthRow, PayoffSummary, ScheduledExtra,
};

pub const MAX_PAYOFF_MONTHS: u32 = 1_200;

#[derive(Debug, Clone)]
struct WorkingDebt {
    name: String,
    balance: f64,
    min_payment: f64,
    monthly_rate: f64,
    interest_paid: f64,
    paid_off: bool,
}

#[derive(Debug)]
struct SimulationRun {
    converged: bool,
    events: Vec<PayoffEvent>,
    rows: Vec<PayoffMonthRow>,
    remaining_balance: f64,
}

impl SimulationRun {
    fn summary(&self) -> PayoffSummary {
        PayoffSummary {
            months: self.rows.len() as u32,
            total_interest: self.rows.iter().map(|r| r.interest_accrued).sum(),
            total_paid: self
                .rows
                .iter()
                .map(|r| r.minimum_paid + r.extra_paid)
                .sum(),
        }
    }
}

/// Avalanche payoff: every month all debts accrue interest and receive their
/// minimum, then the month's extra budget goes to the highest-rate open debt,
/// rolling down the rate order as debts close.
pub fn simulate_avalanche(input: &DebtPayoffInput) -> CalcResult<DebtPayoffResult> {
    validate(input)?;
    let ordered = avalanche_order(&input.debts);

    let strategy = run_simulation(
        ordered.clone(),
        Some(&input.extra),
        input.rollover_freed_minimums,
    );
    if !strategy.converged {
        debug!(
            remaining = strategy.remaining_balance,
            "avalanche payoff hit the month cap"
        );
        return Err(CalcError::non_convergent(
            format!(
                "payoff not achievable in reasonable time, {:.2} still owed",
                strategy.remaining_balance
            ),
            MAX_PAYOFF_MONTHS,
        ));
    }
    let strategy_summary = strategy.summary();

    let baseline_run = run_simulation(ordered, None, false);
    let baseline = if baseline_run.converged {
        BaselineOutcome::Converged(baseline_run.summary())
    } else {
        debug!(
            remaining = baseline_run.remaining_balance,
            "minimum-only payoff hit the month cap"
        );
        let summary = baseline_run.summary();
        BaselineOutcome::NotConverged {
            months_simulated: summary.months,
            interest_accrued: summary.total_interest,
            remaining_balance: baseline_run.remaining_balance,
        }
    };

    let (months_saved, interest_saved) = match baseline {
        BaselineOutcome::Converged(base) => (
            Some(base.months.saturating_sub(strategy_summary.months)),
            Some(base.total_interest - strategy_summary.total_interest),
        ),
        BaselineOutcome::NotConverged { .. } => (None, None),
    };

    Ok(DebtPayoffResult {
        strategy: strategy_summary,
        baseline,
        months_saved,
        interest_saved,
        payoff_events: strategy.events,
        rows: strategy.rows,
    })
}

/// Highest rate first; equal rates keep their input order.
fn avalanche_order(debts: &[Debt]) -> Vec<WorkingDebt> {
    let mut ordered = debts
        .iter()
        .map(|debt| WorkingDebt {
            name: debt.name.clone(),
            balance: debt.balance,
            min_payment: debt.min_payment,
            monthly_rate: debt.annual_rate_percent / 100.0 / 12.0,
            interest_paid: 0.0,
            paid_off: debt.balance <= BALANCE_EPSILON,
        })
        .collect::<Vec<_>>();
    ordered.sort_by(|a, b| b.monthly_rate.total_cmp(&a.monthly_rate));
    ordered
}

fn run_simulation(
    mut debts: Vec<WorkingDebt>,
    extra: Option<&ExtraBudget>,
    rollover_freed_minimums: bool,
) -> SimulationRun {
    let mut events = Vec::new();
    let mut rows = Vec::new();

    for month in 1..=MAX_PAYOFF_MONTHS {
        if debts.iter().all(|d| d.paid_off) {
            break;
        }

        let mut interest_accrued = 0.0;
        let mut minimum_paid = 0.0;
        for debt in debts.iter_mut().filter(|d| !d.paid_off) {
            let interest = debt.balance * debt.monthly_rate;
            debt.balance += interest;
            debt.interest_paid += interest;
            interest_accrued += interest;

            let payment = debt.min_payment.min(debt.balance);
            debt.balance -= payment;
            minimum_paid += payment;
        }

        let mut budget = extra.map_or(0.0, |extra| extra_for_month(extra, month));
        if rollover_freed_minimums {
            budget += debts
                .iter()
                .filter(|d| d.paid_off)
                .map(|d| d.min_payment)
                .sum::<f64>();
        }

        let mut extra_paid = 0.0;
        for debt in debts.iter_mut().filter(|d| !d.paid_off) {
            if budget <= 0.0 {
                break;
            }
            let payment = budget.min(debt.balance);
            debt.balance -= payment;
            budget -= payment;
            extra_paid += payment;
        }

        for debt in debts.iter_mut().filter(|d| !d.paid_off) {
            if debt.balance <= BALANCE_EPSILON {
                // The residual settles with this month's minimum.
                minimum_paid += debt.balance;
                debt.balance = 0.0;
                debt.paid_off = true;
                events.push(PayoffEvent {
                    debt_name: debt.name.clone(),
                    payoff_month: month,
                    total_interest_paid: debt.interest_paid,
                });
            }
        }

        rows.push(PayoffMonthRow {
            month,
            interest_accrued,
            minimum_paid,
            extra_paid,
            remaining_balance: debts.iter().map(|d| d.balance).sum(),
        });
    }

    let remaining_balance = debts.iter().map(|d| d.balance).sum();
    SimulationRun {
        converged: debts.iter().all(|d| d.paid_off),
        events,
        rows,
        remaining_balance,
    }
}

/// Extra budget available in a 1-based simulation month.
///
/// The annual extra is paid in its start month and every twelfth month after.
fn extra_for_month(extra: &ExtraBudget, month: u32) -> f64 {
    let mut amount = extra.monthly.max(0.0);
    if let Some(ScheduledExtra { amount: annual, month: start }) = extra.annual {
        if month >= start && (month - start) % 12 == 0 {
            amount += annual.max(0.0);
        }
    }
    if let Some(one_time) = extra.one_time {
        if one_time.month == month {
            amount += one_time.amount.max(0.0);
        }
    }
    amount
}

fn validate(input: &DebtPayoffInput) -> CalcResult<()> {
    for debt in &input.debts {
        ensure_non_negative("balance", debt.balance)?;
        ensure_non_negative("minPayment", debt.min_payment)?;
        ensure_non_negative("annualRatePercent", debt.annual_rate_percent)?;
    }
    ensure_non_negative("extraMonthly", input.extra.monthly)?;
    for (field, scheduled) in [
        ("extraAnnual", input.extra.annual),
        ("extraOneTime", input.extra.one_time),
    ] {
        if let Some(scheduled) = scheduled {
            ensure_non_negative(field, scheduled.amount)?;
            if scheduled.month == 0 {
                return Err(CalcError::invalid(field, "month must be >= 1"));
            }
        }
    }
    Ok(())
}
