use std::ops::Add;

use super::amortization::periodic_rate;
use super::error::{CalcError, CalcResult, ensure_finite, ensure_non_negative};
use super::types::{
    AccumulationInput, AccumulationRow, AccumulationSchedule, AccumulationSummary, TaxTrackInput,
    TaxTrackRow, TaxTrackSchedule, TaxTrackSummary, TrackBalances, YearSummary,
};

pub const MAX_ACCUMULATION_YEARS: u32 = 100;

/// Contribution lands first, then the whole balance earns one period of interest.
pub(crate) fn compound_period(balance: f64, contribution: f64, rate: f64) -> (f64, f64) {
    let interest = (balance + contribution) * rate;
    (interest, balance + contribution + interest)
}

pub(crate) fn grown_contribution(base: f64, growth_percent: f64, years_elapsed: u32) -> f64 {
    base * (1.0 + growth_percent / 100.0).powi(years_elapsed as i32)
}

pub fn accumulate(input: &AccumulationInput) -> CalcResult<AccumulationSchedule> {
    validate_accumulation(input)?;
    let rate = periodic_rate(input.annual_rate_percent, input.periods_per_year);

    let mut rows = Vec::with_capacity(input.periods as usize);
    let mut balance = input.initial_balance;
    for period_index in 1..=input.periods {
        let year = (period_index - 1) / input.periods_per_year + 1;
        let contribution = grown_contribution(
            input.periodic_contribution,
            input.contribution_growth_percent,
            year - 1,
        );
        let (interest_earned, ending_balance) = compound_period(balance, contribution, rate);
        rows.push(AccumulationRow {
            period_index,
            year,
            starting_balance: balance,
            contribution,
            interest_earned,
            ending_balance,
        });
        balance = ending_balance;
    }

    Ok(AccumulationSchedule {
        summary: summarize(input.initial_balance, &rows),
        rows,
    })
}

fn summarize(initial_balance: f64, rows: &[AccumulationRow]) -> AccumulationSummary {
    AccumulationSummary {
        initial_balance,
        total_contributions: rows.iter().map(|r| r.contribution).sum(),
        total_interest: rows.iter().map(|r| r.interest_earned).sum(),
        final_balance: rows.last().map_or(initial_balance, |r| r.ending_balance),
    }
}

pub fn year_summaries(rows: &[AccumulationRow]) -> Vec<YearSummary> {
    let mut years: Vec<YearSummary> = Vec::new();
    for row in rows {
        match years.last_mut() {
            Some(summary) if summary.year == row.year => {
                summary.contributions += row.contribution;
                summary.interest_earned += row.interest_earned;
                summary.ending_balance = row.ending_balance;
            }
            _ => years.push(YearSummary {
                year: row.year,
                contributions: row.contribution,
                interest_earned: row.interest_earned,
                ending_balance: row.ending_balance,
            }),
        }
    }
    years
}

fn validate_accumulation(input: &AccumulationInput) -> CalcResult<()> {
    ensure_non_negative("initialBalance", input.initial_balance)?;
    ensure_non_negative("periodicContribution", input.periodic_contribution)?;
    ensure_non_negative("annualRatePercent", input.annual_rate_percent)?;
    validate_growth(input.contribution_growth_percent)?;
    validate_periods_per_year(input.periods_per_year)?;
    if input.periods == 0 {
        return Err(CalcError::invalid("periods", "must be > 0"));
    }
    if input.periods > MAX_ACCUMULATION_YEARS * input.periods_per_year {
        return Err(CalcError::invalid(
            "periods",
            format!("must cover at most {MAX_ACCUMULATION_YEARS} years"),
        ));
    }
    Ok(())
}

pub(crate) fn validate_growth(growth_percent: f64) -> CalcResult<()> {
    let growth_percent = ensure_finite("contributionGrowthPercent", growth_percent)?;
    if growth_percent <= -100.0 {
        return Err(CalcError::invalid(
            "contributionGrowthPercent",
            "must be > -100",
        ));
    }
    Ok(())
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

pub(crate) fn validate_tax_rate(field: &'static str, percent: f64) -> CalcResult<f64> {
    let percent = ensure_finite(field, percent)?;
    if !(0.0..=100.0).contains(&percent) {
        return Err(CalcError::invalid(field, "must be between 0 and 100"));
    }
    Ok(percent / 100.0)
}

impl Add for TrackBalances {
    type Output = TrackBalances;

    fn add(self, rhs: TrackBalances) -> TrackBalances {
        TrackBalances {
            tax_deferred: self.tax_deferred + rhs.tax_deferred,
            tax_free: self.tax_free + rhs.tax_free,
            taxable: self.taxable + rhs.taxable,
        }
    }
}

impl TrackBalances {
    fn uniform(value: f64) -> Self {
        Self {
            tax_deferred: value,
            tax_free: value,
            taxable: value,
        }
    }

    fn scaled(self, factor: f64) -> Self {
        Self {
            tax_deferred: self.tax_deferred * factor,
            tax_free: self.tax_free * factor,
            taxable: self.taxable * factor,
        }
    }
}

/// Grows the same contributions under three tax treatments in one loop so the
/// tracks always share periods, contribution amounts and rate assumptions.
///
/// The tax-free and taxable tracks deposit contributions net of the current tax
/// rate. The taxable track pays tax on each year's gains at year end. The
/// deferred track is taxed once, at the retirement rate, in `after_tax_balance`.
pub fn run_tax_tracks(input: &TaxTrackInput) -> CalcResult<TaxTrackSchedule> {
    ensure_non_negative("initialBalance", input.initial_balance)?;
    ensure_non_negative("annualContribution", input.annual_contribution)?;
    ensure_non_negative("annualRatePercent", input.annual_rate_percent)?;
    validate_growth(input.contribution_growth_percent)?;
    validate_periods_per_year(input.periods_per_year)?;
    let current_tax = validate_tax_rate("currentTaxRatePercent", input.current_tax_rate_percent)?;
    let retirement_tax =
        validate_tax_rate("retirementTaxRatePercent", input.retirement_tax_rate_percent)?;
    if input.years == 0 || input.years > MAX_ACCUMULATION_YEARS {
        return Err(CalcError::invalid(
            "years",
            format!("must be between 1 and {MAX_ACCUMULATION_YEARS}"),
        ));
    }

    let rate = periodic_rate(input.annual_rate_percent, input.periods_per_year);
    let mut balances = TrackBalances::uniform(input.initial_balance);
    let mut rows = Vec::with_capacity(input.years as usize);

    for year in 1..=input.years {
        let gross_contribution = grown_contribution(
            input.annual_contribution,
            input.contribution_growth_percent,
            year - 1,
        );
        let per_period = gross_contribution / input.periods_per_year as f64;
        let deposit = TrackBalances {
            tax_deferred: per_period,
            tax_free: per_period * (1.0 - current_tax),
            taxable: per_period * (1.0 - current_tax),
        };

        let mut deposits = TrackBalances::default();
        let mut interest_earned = TrackBalances::default();
        for _ in 0..input.periods_per_year {
            let earned = (balances + deposit).scaled(rate);
            balances = balances + deposit + earned;
            deposits = deposits + deposit;
            interest_earned = interest_earned + earned;
        }

        let taxable_tax_paid = interest_earned.taxable.max(0.0) * current_tax;
        balances.taxable -= taxable_tax_paid;

        rows.push(TaxTrackRow {
            year,
            gross_contribution,
            deposits,
            interest_earned,
            taxable_tax_paid,
            ending_balance: balances,
        });
    }

    let summary = TaxTrackSummary {
        total_gross_contributions: rows.iter().map(|r| r.gross_contribution).sum(),
        total_taxable_tax_paid: rows.iter().map(|r| r.taxable_tax_paid).sum(),
        final_balance: balances,
        after_tax_balance: TrackBalances {
            tax_deferred: balances.tax_deferred * (1.0 - retirement_tax),
            ..balances
        },
    };
    Ok(TaxTrackSchedule { summary, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

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

    fn monthly_savings() -> AccumulationInput {
        AccumulationInput {
            initial_balance: 5_000.0,
            periodic_contribution: 200.0,
            annual_rate_percent: 6.0,
            periods: 120,
            periods_per_year: 12,
            contribution_growth_percent: 0.0,
        }
    }

    fn ira_tracks() -> TaxTrackInput {
        TaxTrackInput {
            initial_balance: 0.0,
            annual_contribution: 6_000.0,
            annual_rate_percent: 7.0,
            years: 30,
            periods_per_year: 1,
            contribution_growth_percent: 0.0,
            current_tax_rate_percent: 24.0,
            retirement_tax_rate_percent: 24.0,
        }
    }

    #[test]
    fn contribution_is_added_before_interest_accrues() {
        let input = AccumulationInput {
            initial_balance: 0.0,
            periodic_contribution: 100.0,
            annual_rate_percent: 12.0,
            periods: 1,
            periods_per_year: 12,
            contribution_growth_percent: 0.0,
        };
        let schedule = accumulate(&input).expect("valid input");
        assert_approx(schedule.rows[0].interest_earned, 1.0);
        assert_approx(schedule.summary.final_balance, 101.0);
    }

    #[test]
    fn matches_closed_form_annuity_due() {
        let input = monthly_savings();
        let schedule = accumulate(&input).expect("valid input");

        let r = 0.06 / 12.0;
        let growth = (1.0_f64 + r).powi(120);
        let expected = 5_000.0 * growth + 200.0 * (growth - 1.0) / r * (1.0 + r);
        assert_approx_tol(schedule.summary.final_balance, expected, 1e-6);
        assert_approx(schedule.summary.total_contributions, 24_000.0);
        assert_approx_tol(
            schedule.summary.total_interest,
            expected - 5_000.0 - 24_000.0,
            1e-6,
        );
    }

    #[test]
    fn rows_satisfy_balance_identity() {
        let schedule = accumulate(&monthly_savings()).expect("valid input");
        for row in &schedule.rows {
            assert_approx(
                row.ending_balance,
                row.starting_balance + row.contribution + row.interest_earned,
            );
        }
    }

    #[test]
    fn contribution_growth_compounds_yearly() {
        let input = AccumulationInput {
            initial_balance: 0.0,
            periodic_contribution: 1_000.0,
            annual_rate_percent: 0.0,
            periods: 3,
            periods_per_year: 1,
            contribution_growth_percent: 10.0,
        };
        let schedule = accumulate(&input).expect("valid input");
        let contributions = schedule
            .rows
            .iter()
            .map(|r| r.contribution)
            .collect::<Vec<_>>();
        assert_approx(contributions[0], 1_000.0);
        assert_approx(contributions[1], 1_100.0);
        assert_approx(contributions[2], 1_210.0);
        assert_approx(schedule.summary.final_balance, 3_310.0);
    }

    #[test]
    fn growth_steps_only_at_year_boundaries_for_monthly_periods() {
        let mut input = monthly_savings();
        input.periods = 24;
        input.contribution_growth_percent = 5.0;
        let schedule = accumulate(&input).expect("valid input");
        assert_approx(schedule.rows[11].contribution, 200.0);
        assert_approx(schedule.rows[12].contribution, 210.0);
        assert_eq!(schedule.rows[12].year, 2);
    }

    #[test]
    fn year_summaries_roll_up_periods() {
        let schedule = accumulate(&monthly_savings()).expect("valid input");
        let years = year_summaries(&schedule.rows);
        assert_eq!(years.len(), 10);
        assert_approx(years[0].contributions, 2_400.0);
        assert_approx(years[9].ending_balance, schedule.summary.final_balance);
        let interest: f64 = years.iter().map(|y| y.interest_earned).sum();
        assert_approx_tol(interest, schedule.summary.total_interest, 1e-6);
    }

    #[test]
    fn daily_compounding_exceeds_annual() {
        let mut daily = monthly_savings();
        daily.periodic_contribution = 0.0;
        daily.periods_per_year = 365;
        daily.periods = 365 * 10;
        let mut annual = daily.clone();
        annual.periods_per_year = 1;
        annual.periods = 10;

        let daily = accumulate(&daily).expect("valid input");
        let annual = accumulate(&annual).expect("valid input");
        assert!(daily.summary.final_balance > annual.summary.final_balance);
    }

    #[test]
    fn rejects_negative_rate_and_empty_horizon() {
        let mut input = monthly_savings();
        input.annual_rate_percent = -2.0;
        assert!(matches!(
            accumulate(&input),
            Err(CalcError::InvalidInput { field: "annualRatePercent", .. })
        ));

        let mut input = monthly_savings();
        input.periods = 0;
        assert!(matches!(
            accumulate(&input),
            Err(CalcError::InvalidInput { field: "periods", .. })
        ));
    }

    #[test]
    fn tax_tracks_advance_in_lockstep() {
        let schedule = run_tax_tracks(&ira_tracks()).expect("valid input");
        assert_eq!(schedule.rows.len(), 30);
        for (idx, row) in schedule.rows.iter().enumerate() {
            assert_eq!(row.year, idx as u32 + 1);
            assert_approx(row.deposits.tax_deferred, 6_000.0);
            assert_approx(row.deposits.tax_free, 6_000.0 * 0.76);
            assert_approx(row.deposits.taxable, 6_000.0 * 0.76);
        }
    }

    #[test]
    fn deferred_and_tax_free_match_at_equal_tax_rates() {
        let schedule = run_tax_tracks(&ira_tracks()).expect("valid input");
        let after_tax = schedule.summary.after_tax_balance;
        assert_approx_tol(after_tax.tax_deferred, after_tax.tax_free, 1e-6);
        assert!(after_tax.taxable < after_tax.tax_free);
        assert!(schedule.summary.total_taxable_tax_paid > 0.0);
    }

    #[test]
    fn lower_retirement_rate_favours_deferred_track() {
        let mut input = ira_tracks();
        input.retirement_tax_rate_percent = 12.0;
        let schedule = run_tax_tracks(&input).expect("valid input");
        let after_tax = schedule.summary.after_tax_balance;
        assert!(after_tax.tax_deferred > after_tax.tax_free);
    }

    #[test]
    fn zero_tax_makes_all_tracks_equal() {
        let mut input = ira_tracks();
        input.initial_balance = 10_000.0;
        input.current_tax_rate_percent = 0.0;
        input.retirement_tax_rate_percent = 0.0;
        input.periods_per_year = 12;
        let schedule = run_tax_tracks(&input).expect("valid input");
        let balances = schedule.summary.after_tax_balance;
        assert_approx_tol(balances.tax_deferred, balances.tax_free, 1e-6);
        assert_approx_tol(balances.tax_free, balances.taxable, 1e-6);
    }

    #[test]
    fn tax_tracks_reject_out_of_range_tax_rate() {
        let mut input = ira_tracks();
        input.current_tax_rate_percent = 120.0;
        assert!(matches!(
            run_tax_tracks(&input),
            Err(CalcError::InvalidInput { field: "currentTaxRatePercent", .. })
        ));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(48))]

        #[test]
        fn prop_balance_never_decreases_with_non_negative_inputs(
            initial in 0u32..500_000,
            contribution in 0u32..5_000,
            rate_bp in 0u32..2_000,
            growth_bp in 0u32..1_000,
            years in 1u32..40,
            frequency in 0usize..4,
        ) {
            let periods_per_year = [1u32, 4, 12, 52][frequency];
            let input = AccumulationInput {
                initial_balance: initial as f64,
                periodic_contribution: contribution as f64,
                annual_rate_percent: rate_bp as f64 / 100.0,
                periods: years * periods_per_year,
                periods_per_year,
                contribution_growth_percent: growth_bp as f64 / 100.0,
            };
            let schedule = accumulate(&input).expect("valid input");
            let mut previous = input.initial_balance;
            for row in &schedule.rows {
                prop_assert!(row.ending_balance >= previous);
                previous = row.ending_balance;
            }
            prop_assert!(schedule.summary.final_balance.is_finite());
        }
    }
}
