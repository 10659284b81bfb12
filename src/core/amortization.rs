use std::ops::Range;

use tracing::debug;

use super::error::{CalcError, CalcResult, ensure_non_negative, ensure_positive};
use super::types::{
    AmortizationRow, AmortizationSchedule, AmortizationSummary, ExtraPayments, LoanInput,
};

/// Balances at or below this are treated as paid off.
pub const BALANCE_EPSILON: f64 = 0.01;
pub const MAX_SCHEDULE_PERIODS: u32 = 1_200;

pub fn periodic_rate(annual_rate_percent: f64, periods_per_year: u32) -> f64 {
    annual_rate_percent / 100.0 / periods_per_year.max(1) as f64
}

/// Level payment that fully amortizes `principal` over `periods` at `rate` per period.
pub fn level_payment(principal: f64, rate: f64, periods: u32) -> f64 {
    let n = periods.max(1) as f64;
    if rate == 0.0 {
        return principal / n;
    }
    let growth = (1.0 + rate).powf(n);
    principal * rate * growth / (growth - 1.0)
}

/// Number of periods needed to repay `principal` with a fixed `payment`.
///
/// The result is fractional; the last scheduled payment covers the remainder.
/// A payment that does not exceed the first period's interest never amortizes.
pub fn solve_term(principal: f64, rate: f64, payment: f64) -> CalcResult<f64> {
    ensure_non_negative("principal", principal)?;
    ensure_non_negative("rate", rate)?;
    ensure_positive("payment", payment)?;
    if principal == 0.0 {
        return Ok(0.0);
    }

    let periods = if rate == 0.0 {
        principal / payment
    } else {
        let interest = principal * rate;
        if payment <= interest {
            return Err(CalcError::non_convergent(
                format!("payment {payment:.2} does not exceed per-period interest {interest:.2}"),
                MAX_SCHEDULE_PERIODS,
            ));
        }
        -(1.0 - interest / payment).ln() / (1.0 + rate).ln()
    };

    if !periods.is_finite() || periods > MAX_SCHEDULE_PERIODS as f64 {
        return Err(CalcError::non_convergent(
            format!("payment {payment:.2} needs {periods:.0} periods"),
            MAX_SCHEDULE_PERIODS,
        ));
    }
    Ok(periods)
}

pub fn amortize(input: &LoanInput) -> CalcResult<AmortizationSchedule> {
    validate_loan(input)?;
    let rate = periodic_rate(input.annual_rate_percent, input.periods_per_year);
    let payment = level_payment(input.principal, rate, input.term_periods);
    build_schedule(
        input.principal,
        rate,
        payment,
        input.periods_per_year,
        &input.extra,
    )
}

/// Schedule for a loan repaid with a fixed payment instead of a fixed term.
pub fn amortize_with_payment(
    principal: f64,
    annual_rate_percent: f64,
    periods_per_year: u32,
    payment: f64,
    extra: &ExtraPayments,
) -> CalcResult<AmortizationSchedule> {
    ensure_non_negative("annualRatePercent", annual_rate_percent)?;
    validate_periods_per_year(periods_per_year)?;
    validate_extras(extra)?;
    let rate = periodic_rate(annual_rate_percent, periods_per_year);
    solve_term(principal, rate, payment)?;
    build_schedule(principal, rate, payment, periods_per_year, extra)
}

fn build_schedule(
    principal: f64,
    rate: f64,
    payment: f64,
    periods_per_year: u32,
    extra: &ExtraPayments,
) -> CalcResult<AmortizationSchedule> {
    let rows = build_rows(principal, rate, payment, periods_per_year, extra)?;
    let baseline = if extra.is_empty() {
        None
    } else {
        Some(build_rows(
            principal,
            rate,
            payment,
            periods_per_year,
            &extra.without_payments(),
        )?)
    };

    Ok(AmortizationSchedule {
        summary: summarize(payment, periods_per_year, &rows, baseline.as_deref()),
        rows,
    })
}

fn build_rows(
    principal: f64,
    rate: f64,
    payment: f64,
    periods_per_year: u32,
    extra: &ExtraPayments,
) -> CalcResult<Vec<AmortizationRow>> {
    let mut rows = Vec::new();
    let mut balance = principal;
    if balance <= BALANCE_EPSILON {
        return Ok(rows);
    }

    if extra.is_empty() && payment <= balance * rate {
        debug!(payment, balance, rate, "payment never covers interest");
        return Err(CalcError::non_convergent(
            format!(
                "payment {payment:.2} does not exceed first-period interest {:.2}",
                balance * rate
            ),
            MAX_SCHEDULE_PERIODS,
        ));
    }

    for period_index in 1..=MAX_SCHEDULE_PERIODS {
        let interest = balance * rate;
        let scheduled_principal = (payment - interest).min(balance);
        let extra_due = extra_for_period(extra, period_index, periods_per_year);
        let extra_principal = extra_due.min(balance - scheduled_principal).max(0.0);

        let mut principal_portion = scheduled_principal + extra_principal;
        let mut ending_balance = balance - principal_portion;
        if ending_balance <= BALANCE_EPSILON {
            principal_portion += ending_balance;
            ending_balance = 0.0;
        }

        let offset = period_start_offset(period_index, periods_per_year);
        rows.push(AmortizationRow {
            period_index,
            calendar_month: calendar_month(extra.start_month, offset),
            starting_balance: balance,
            payment: principal_portion + interest,
            principal_portion,
            interest_portion: interest,
            extra_principal,
            ending_balance,
        });

        balance = ending_balance;
        if balance == 0.0 {
            return Ok(rows);
        }
    }

    debug!(payment, balance, "schedule hit the period cap");
    Err(CalcError::non_convergent(
        format!("balance {balance:.2} remains after the period cap"),
        MAX_SCHEDULE_PERIODS,
    ))
}

fn extra_for_period(extra: &ExtraPayments, period_index: u32, periods_per_year: u32) -> f64 {
    let mut amount = extra.per_period.max(0.0);

    if let Some(one_time) = extra.one_time {
        if one_time.period_index == period_index {
            amount += one_time.amount.max(0.0);
        }
    }

    if let Some(lump) = extra.annual {
        let hits = months_started(period_index, periods_per_year)
            .filter(|offset| calendar_month(extra.start_month, *offset) == lump.month)
            .count();
        amount += lump.amount.max(0.0) * hits as f64;
    }

    amount
}

/// Month offsets (from the first period's month) whose first day falls inside this period.
fn months_started(period_index: u32, periods_per_year: u32) -> Range<u64> {
    let ppy = periods_per_year.max(1) as u64;
    let index = period_index as u64;
    ((index - 1) * 12).div_ceil(ppy)..(index * 12).div_ceil(ppy)
}

fn period_start_offset(period_index: u32, periods_per_year: u32) -> u64 {
    (period_index as u64 - 1) * 12 / periods_per_year.max(1) as u64
}

fn calendar_month(start_month: u32, offset: u64) -> u32 {
    ((start_month.saturating_sub(1) as u64 + offset) % 12) as u32 + 1
}

fn summarize(
    scheduled_payment: f64,
    periods_per_year: u32,
    rows: &[AmortizationRow],
    baseline: Option<&[AmortizationRow]>,
) -> AmortizationSummary {
    let interest = total_interest(rows);
    let periods = rows.len() as u32;
    let (interest_saved, periods_saved) = match baseline {
        Some(base) => (
            (total_interest(base) - interest).max(0.0),
            (base.len() as u32).saturating_sub(periods),
        ),
        None => (0.0, 0),
    };

    AmortizationSummary {
        scheduled_payment,
        total_payment: rows.iter().map(|r| r.payment).sum(),
        total_interest: interest,
        total_principal: rows.iter().map(|r| r.principal_portion).sum(),
        periods,
        payoff_years: periods as f64 / periods_per_year.max(1) as f64,
        interest_saved,
        periods_saved,
    }
}

fn total_interest(rows: &[AmortizationRow]) -> f64 {
    rows.iter().map(|r| r.interest_portion).sum()
}

fn validate_loan(input: &LoanInput) -> CalcResult<()> {
    ensure_non_negative("principal", input.principal)?;
    ensure_non_negative("annualRatePercent", input.annual_rate_percent)?;
    if input.term_periods == 0 {
        return Err(CalcError::invalid("termPeriods", "must be > 0"));
    }
    if input.term_periods > MAX_SCHEDULE_PERIODS {
        return Err(CalcError::invalid(
            "termPeriods",
            format!("must be <= {MAX_SCHEDULE_PERIODS}"),
        ));
    }
    validate_periods_per_year(input.periods_per_year)?;
    validate_extras(&input.extra)
}

fn validate_periods_per_year(periods_per_year: u32) -> CalcResult<()> {
    if periods_per_year == 0 || periods_per_year > 365 {
        return Err(CalcError::invalid(
            "periodsPerYear",
            "must be between 1 and 365",
        ));
    }
    Ok(())
}

fn validate_extras(extra: &ExtraPayments) -> CalcResult<()> {
    ensure_non_negative("extraPerPeriod", extra.per_period)?;
    if !(1..=12).contains(&extra.start_month) {
        return Err(CalcError::invalid("startMonth", "must be between 1 and 12"));
    }
    if let Some(one_time) = extra.one_time {
        ensure_non_negative("oneTimeAmount", one_time.amount)?;
        if one_time.period_index == 0 {
            return Err(CalcError::invalid("oneTimePeriod", "must be >= 1"));
        }
    }
    if let Some(lump) = extra.annual {
        ensure_non_negative("annualLumpAmount", lump.amount)?;
        if !(1..=12).contains(&lump.month) {
            return Err(CalcError::invalid(
                "annualLumpMonth",
                "must be between 1 and 12",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AnnualLumpSum, OneTimePayment};
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn assert_approx_tol(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn mortgage() -> LoanInput {
        LoanInput {
            principal: 250_000.0,
            annual_rate_percent: 6.5,
            term_periods: 360,
            periods_per_year: 12,
            extra: ExtraPayments::default(),
        }
    }

    #[test]
    fn thirty_year_mortgage_matches_published_figures() {
        let schedule = amortize(&mortgage()).expect("valid loan");
        assert_approx_tol(schedule.summary.scheduled_payment, 1_580.17, 0.01);
        assert_approx_tol(schedule.summary.total_interest, 318_861.0, 1.0);
        assert_eq!(schedule.rows.len(), 360);
        assert_eq!(schedule.summary.periods, 360);
        assert_approx(schedule.summary.payoff_years, 30.0);

        let last = schedule.rows.last().expect("rows");
        assert_eq!(last.ending_balance, 0.0);
        assert_approx_tol(last.payment, 1_580.17, 0.02);
    }

    #[test]
    fn zero_rate_divides_linearly() {
        let mut input = mortgage();
        input.principal = 12_000.0;
        input.annual_rate_percent = 0.0;
        input.term_periods = 48;

        let schedule = amortize(&input).expect("valid loan");
        assert_eq!(schedule.summary.scheduled_payment, 12_000.0 / 48.0);
        assert_eq!(schedule.rows.len(), 48);
        assert!(schedule.rows.iter().all(|r| r.interest_portion == 0.0));
        assert_eq!(schedule.summary.total_interest, 0.0);
        assert_eq!(schedule.rows[47].ending_balance, 0.0);
    }

    #[test]
    fn level_payment_round_trips_through_solve_term() {
        let rate = periodic_rate(6.5, 12);
        let payment = level_payment(250_000.0, rate, 360);
        let term = solve_term(250_000.0, rate, payment).expect("payment covers interest");
        assert_approx(term, 360.0);

        let zero_term = solve_term(9_000.0, 0.0, level_payment(9_000.0, 0.0, 36))
            .expect("zero rate always amortizes");
        assert_approx(zero_term, 36.0);
    }

    #[test]
    fn payment_at_or_below_interest_is_non_convergent() {
        let rate = periodic_rate(12.0, 12);
        let err = solve_term(100_000.0, rate, 1_000.0).expect_err("interest-only payment");
        assert!(matches!(err, CalcError::NonConvergent { .. }));

        let err = amortize_with_payment(100_000.0, 12.0, 12, 900.0, &ExtraPayments::default())
            .expect_err("payment below interest");
        assert!(matches!(err, CalcError::NonConvergent { limit, .. } if limit == MAX_SCHEDULE_PERIODS));
    }

    #[test]
    fn payment_needing_more_than_cap_periods_is_non_convergent() {
        let rate = periodic_rate(12.0, 12);
        let err = solve_term(100_000.0, rate, 1_000.001).expect_err("barely above interest");
        assert!(matches!(err, CalcError::NonConvergent { .. }));
    }

    #[test]
    fn fixed_payment_schedule_ends_with_partial_payment() {
        let schedule = amortize_with_payment(10_000.0, 6.0, 12, 500.0, &ExtraPayments::default())
            .expect("payment covers interest");
        let term = solve_term(10_000.0, periodic_rate(6.0, 12), 500.0).expect("term");
        assert_eq!(schedule.rows.len() as u32, term.ceil() as u32);

        let last = schedule.rows.last().expect("rows");
        assert_eq!(last.ending_balance, 0.0);
        assert!(last.payment < 500.0);
        assert_approx(schedule.summary.total_principal, 10_000.0);
    }

    #[test]
    fn recurring_extra_shortens_loan_and_reports_savings() {
        let mut input = mortgage();
        input.extra.per_period = 200.0;

        let schedule = amortize(&input).expect("valid loan");
        let plain = amortize(&mortgage()).expect("valid loan");

        assert!(schedule.summary.periods < 360);
        assert_eq!(schedule.summary.periods_saved, 360 - schedule.summary.periods);
        assert_approx_tol(
            schedule.summary.interest_saved,
            plain.summary.total_interest - schedule.summary.total_interest,
            1e-3,
        );
        assert_approx_tol(schedule.rows[0].extra_principal, 200.0, EPS);
        assert_approx_tol(schedule.summary.total_principal, 250_000.0, 1e-6);
    }

    #[test]
    fn one_time_payment_lands_in_its_period() {
        let mut input = mortgage();
        input.extra.one_time = Some(OneTimePayment {
            period_index: 12,
            amount: 10_000.0,
        });

        let schedule = amortize(&input).expect("valid loan");
        assert_approx(schedule.rows[11].extra_principal, 10_000.0);
        assert!(schedule
            .rows
            .iter()
            .filter(|r| r.period_index != 12)
            .all(|r| r.extra_principal == 0.0));
        assert!(schedule.summary.periods < 360);
    }

    #[test]
    fn annual_lump_sum_matches_calendar_month() {
        let mut input = mortgage();
        input.extra.start_month = 11;
        input.extra.annual = Some(AnnualLumpSum {
            month: 3,
            amount: 1_000.0,
        });

        let schedule = amortize(&input).expect("valid loan");
        let hits = schedule
            .rows
            .iter()
            .filter(|r| r.extra_principal > 0.0)
            .take(3)
            .map(|r| (r.period_index, r.calendar_month))
            .collect::<Vec<_>>();
        assert_eq!(hits, vec![(5, 3), (17, 3), (29, 3)]);
    }

    #[test]
    fn annual_lump_sum_applies_once_per_year_for_yearly_periods() {
        let input = LoanInput {
            principal: 50_000.0,
            annual_rate_percent: 5.0,
            term_periods: 10,
            periods_per_year: 1,
            extra: ExtraPayments {
                annual: Some(AnnualLumpSum {
                    month: 6,
                    amount: 500.0,
                }),
                ..ExtraPayments::default()
            },
        };

        let schedule = amortize(&input).expect("valid loan");
        assert_approx(schedule.rows[0].extra_principal, 500.0);
        assert_approx(schedule.rows[1].extra_principal, 500.0);
    }

    #[test]
    fn rejects_zero_term_and_negative_rate() {
        let mut input = mortgage();
        input.term_periods = 0;
        let err = amortize(&input).expect_err("zero term");
        assert!(matches!(err, CalcError::InvalidInput { field: "termPeriods", .. }));

        let mut input = mortgage();
        input.annual_rate_percent = -1.0;
        let err = amortize(&input).expect_err("negative rate");
        assert!(matches!(err, CalcError::InvalidInput { field: "annualRatePercent", .. }));
    }

    #[test]
    fn zero_principal_yields_empty_schedule() {
        let mut input = mortgage();
        input.principal = 0.0;
        let schedule = amortize(&input).expect("valid loan");
        assert!(schedule.rows.is_empty());
        assert_eq!(schedule.summary.total_payment, 0.0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_level_payment_repays_principal_exactly(
            principal in 1_000u32..2_000_000,
            rate_bp in 1u32..2_500,
            term in 1u32..=480,
        ) {
            let input = LoanInput {
                principal: principal as f64,
                annual_rate_percent: rate_bp as f64 / 100.0,
                term_periods: term,
                periods_per_year: 12,
                extra: ExtraPayments::default(),
            };
            let schedule = amortize(&input).expect("valid loan");

            prop_assert_eq!(schedule.rows.len() as u32, term);
            let repaid: f64 = schedule.rows.iter().map(|r| r.principal_portion).sum();
            prop_assert!((repaid - input.principal).abs() <= 1e-6 * input.principal.max(1.0));
            prop_assert_eq!(schedule.rows.last().map(|r| r.ending_balance), Some(0.0));

            let mut previous = input.principal;
            for row in &schedule.rows {
                prop_assert!(row.ending_balance <= previous);
                prop_assert!((row.principal_portion + row.interest_portion - row.payment).abs() <= 1e-9 * row.payment.max(1.0));
                previous = row.ending_balance;
            }
        }
    }
}
