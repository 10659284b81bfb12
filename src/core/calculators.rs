use serde::Serialize;
use tracing::debug;

use super::accumulation::{
    MAX_ACCUMULATION_YEARS, accumulate, compound_period, grown_contribution, run_tax_tracks,
    validate_growth, year_summaries,
};
use super::amortization::{amortize, amortize_with_payment, periodic_rate, solve_term};
use super::error::{CalcError, CalcResult, ensure_non_negative, ensure_positive};
use super::solver::{AprSolveConfig, AprSolveResult, approximate_real_apr, solve_effective_apr};
use super::types::{
    AccumulationInput, AccumulationRow, AccumulationSummary, AmortizationSchedule,
    AnnualLumpSum, CompoundingFrequency, ExtraPayments, LoanInput, OneTimePayment,
    TaxTrackInput, TaxTrackSchedule, YearSummary,
};

const MONTHS_PER_YEAR: u32 = 12;

fn monthly_loan(principal: f64, annual_rate_percent: f64, term_months: u32) -> LoanInput {
    LoanInput {
        principal,
        annual_rate_percent,
        term_periods: term_months,
        periods_per_year: MONTHS_PER_YEAR,
        extra: ExtraPayments::default(),
    }
}

fn years_between(field: &'static str, from_age: u32, to_age: u32) -> CalcResult<u32> {
    if to_age <= from_age {
        return Err(CalcError::invalid(field, "must be greater than the current age"));
    }
    let years = to_age - from_age;
    if years > MAX_ACCUMULATION_YEARS {
        return Err(CalcError::invalid(
            field,
            format!("must be within {MAX_ACCUMULATION_YEARS} years of the current age"),
        ));
    }
    Ok(years)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AmortizationCalcInput {
    pub loan_amount: f64,
    pub annual_rate_percent: f64,
    pub term_years: u32,
    pub extra_monthly: f64,
    pub one_time_extra: f64,
    /// 1-based payment number receiving the one-time extra.
    pub one_time_extra_month: u32,
    pub annual_extra: f64,
    pub annual_extra_month: u32,
    pub start_month: u32,
}

impl Default for AmortizationCalcInput {
    fn default() -> Self {
        Self {
            loan_amount: 250_000.0,
            annual_rate_percent: 6.5,
            term_years: 30,
            extra_monthly: 0.0,
            one_time_extra: 0.0,
            one_time_extra_month: 1,
            annual_extra: 0.0,
            annual_extra_month: 1,
            start_month: 1,
        }
    }
}

pub fn run_amortization(input: &AmortizationCalcInput) -> CalcResult<AmortizationSchedule> {
    if input.term_years == 0 {
        return Err(CalcError::invalid("termYears", "must be > 0"));
    }
    let mut loan = monthly_loan(
        input.loan_amount,
        input.annual_rate_percent,
        input.term_years.saturating_mul(MONTHS_PER_YEAR),
    );
    loan.extra = ExtraPayments {
        per_period: input.extra_monthly,
        one_time: (input.one_time_extra > 0.0).then_some(OneTimePayment {
            period_index: input.one_time_extra_month,
            amount: input.one_time_extra,
        }),
        annual: (input.annual_extra > 0.0).then_some(AnnualLumpSum {
            month: input.annual_extra_month,
            amount: input.annual_extra,
        }),
        start_month: input.start_month,
    };
    amortize(&loan)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutoLoanInput {
    pub vehicle_price: f64,
    pub down_payment: f64,
    pub trade_in_value: f64,
    pub trade_in_owed: f64,
    pub sales_tax_percent: f64,
    pub fees: f64,
    pub annual_rate_percent: f64,
    pub term_months: u32,
}

impl Default for AutoLoanInput {
    fn default() -> Self {
        Self {
            vehicle_price: 35_000.0,
            down_payment: 5_000.0,
            trade_in_value: 0.0,
            trade_in_owed: 0.0,
            sales_tax_percent: 7.0,
            fees: 500.0,
            annual_rate_percent: 7.0,
            term_months: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoLoanResult {
    pub sales_tax: f64,
    pub amount_financed: f64,
    pub monthly_payment: f64,
    pub total_interest: f64,
    pub total_loan_payments: f64,
    /// Down payment, net trade-in equity and every loan payment.
    pub total_cost: f64,
    pub schedule: AmortizationSchedule,
}

pub fn run_auto_loan(input: &AutoLoanInput) -> CalcResult<AutoLoanResult> {
    let price = ensure_non_negative("vehiclePrice", input.vehicle_price)?;
    let down = ensure_non_negative("downPayment", input.down_payment)?;
    let trade_in = ensure_non_negative("tradeInValue", input.trade_in_value)?;
    let trade_in_owed = ensure_non_negative("tradeInOwed", input.trade_in_owed)?;
    let fees = ensure_non_negative("fees", input.fees)?;
    let tax_percent = ensure_non_negative("salesTaxPercent", input.sales_tax_percent)?;

    // Sales tax is charged on the price after the trade-in credit.
    let sales_tax = (price - trade_in).max(0.0) * tax_percent / 100.0;
    let trade_in_equity = trade_in - trade_in_owed;
    let amount_financed = (price + sales_tax + fees - down - trade_in_equity).max(0.0);
    debug!(amount_financed, sales_tax, "auto loan principal");

    let schedule = amortize(&monthly_loan(
        amount_financed,
        input.annual_rate_percent,
        input.term_months,
    ))?;
    let total_loan_payments = schedule.summary.total_payment;

    Ok(AutoLoanResult {
        sales_tax,
        amount_financed,
        monthly_payment: schedule.summary.scheduled_payment,
        total_interest: schedule.summary.total_interest,
        total_loan_payments,
        total_cost: down + trade_in_equity + total_loan_payments,
        schedule,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersonalLoanInput {
    pub loan_amount: f64,
    pub annual_rate_percent: f64,
    pub term_months: u32,
    pub origination_fee_percent: f64,
}

impl Default for PersonalLoanInput {
    fn default() -> Self {
        Self {
            loan_amount: 15_000.0,
            annual_rate_percent: 11.0,
            term_months: 36,
            origination_fee_percent: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalLoanResult {
    pub monthly_payment: f64,
    pub origination_fee: f64,
    pub net_proceeds: f64,
    pub total_interest: f64,
    pub total_cost: f64,
    /// Average-balance shortcut; see `effective_apr` for the solved rate.
    pub approximate_real_apr_percent: f64,
    /// `None` when the fee-adjusted rate lies outside the solver's search range.
    pub effective_apr: Option<AprSolveResult>,
    pub schedule: AmortizationSchedule,
}

pub fn run_personal_loan(input: &PersonalLoanInput) -> CalcResult<PersonalLoanResult> {
    let principal = ensure_positive("loanAmount", input.loan_amount)?;
    let fee_percent = ensure_non_negative("originationFeePercent", input.origination_fee_percent)?;
    if fee_percent >= 100.0 {
        return Err(CalcError::invalid("originationFeePercent", "must be < 100"));
    }

    let schedule = amortize(&monthly_loan(
        principal,
        input.annual_rate_percent,
        input.term_months,
    ))?;
    let origination_fee = principal * fee_percent / 100.0;
    let net_proceeds = principal - origination_fee;

    let average_balance = schedule
        .rows
        .iter()
        .map(|r| r.starting_balance)
        .sum::<f64>()
        / schedule.rows.len().max(1) as f64;
    let years = schedule.summary.payoff_years;
    let approximate_real_apr_percent = approximate_real_apr(
        schedule.summary.total_interest,
        origination_fee,
        average_balance,
        years,
    );

    let payments = schedule.rows.iter().map(|r| r.payment).collect::<Vec<_>>();
    let effective_apr = match solve_effective_apr(
        &payments,
        net_proceeds,
        MONTHS_PER_YEAR,
        AprSolveConfig::default(),
    ) {
        Ok(solved) => Some(solved),
        Err(err @ CalcError::NonConvergent { .. }) => {
            debug!(error = %err, "effective APR not solvable");
            None
        }
        Err(err) => return Err(err),
    };

    Ok(PersonalLoanResult {
        monthly_payment: schedule.summary.scheduled_payment,
        origination_fee,
        net_proceeds,
        total_interest: schedule.summary.total_interest,
        total_cost: schedule.summary.total_interest + origination_fee,
        approximate_real_apr_percent,
        effective_apr,
        schedule,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PaymentMode {
    #[serde(rename_all = "camelCase")]
    FixedTerm { term_months: u32 },
    #[serde(rename_all = "camelCase")]
    FixedPayment { monthly_payment: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentInput {
    pub loan_amount: f64,
    pub annual_rate_percent: f64,
    pub mode: PaymentMode,
}

impl Default for PaymentInput {
    fn default() -> Self {
        Self {
            loan_amount: 25_000.0,
            annual_rate_percent: 6.0,
            mode: PaymentMode::FixedTerm { term_months: 60 },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResult {
    pub mode: PaymentMode,
    pub monthly_payment: f64,
    /// Fractional when solved from a fixed payment.
    pub term_months: f64,
    pub schedule: AmortizationSchedule,
}

pub fn run_payment(input: &PaymentInput) -> CalcResult<PaymentResult> {
    match input.mode {
        PaymentMode::FixedTerm { term_months } => {
            let schedule = amortize(&monthly_loan(
                input.loan_amount,
                input.annual_rate_percent,
                term_months,
            ))?;
            Ok(PaymentResult {
                mode: input.mode,
                monthly_payment: schedule.summary.scheduled_payment,
                term_months: term_months as f64,
                schedule,
            })
        }
        PaymentMode::FixedPayment { monthly_payment } => {
            ensure_non_negative("annualRatePercent", input.annual_rate_percent)?;
            let rate = periodic_rate(input.annual_rate_percent, MONTHS_PER_YEAR);
            let term_months = solve_term(input.loan_amount, rate, monthly_payment)?;
            let schedule = amortize_with_payment(
                input.loan_amount,
                input.annual_rate_percent,
                MONTHS_PER_YEAR,
                monthly_payment,
                &ExtraPayments::default(),
            )?;
            Ok(PaymentResult {
                mode: input.mode,
                monthly_payment,
                term_months,
                schedule,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavingsInput {
    pub initial_deposit: f64,
    pub monthly_contribution: f64,
    pub annual_rate_percent: f64,
    pub years: u32,
    pub compounding: CompoundingFrequency,
    pub annual_contribution_growth_percent: f64,
}

impl Default for SavingsInput {
    fn default() -> Self {
        Self {
            initial_deposit: 5_000.0,
            monthly_contribution: 200.0,
            annual_rate_percent: 4.5,
            years: 10,
            compounding: CompoundingFrequency::Monthly,
            annual_contribution_growth_percent: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsResult {
    pub compounding: CompoundingFrequency,
    pub contribution_per_period: f64,
    pub summary: AccumulationSummary,
    pub yearly: Vec<YearSummary>,
    pub rows: Vec<AccumulationRow>,
}

pub fn run_savings(input: &SavingsInput) -> CalcResult<SavingsResult> {
    if input.years == 0 {
        return Err(CalcError::invalid("years", "must be > 0"));
    }
    let periods_per_year = input.compounding.periods_per_year();
    // Monthly saving is spread evenly over the compounding periods of the year.
    let contribution_per_period =
        input.monthly_contribution * MONTHS_PER_YEAR as f64 / periods_per_year as f64;

    let schedule = accumulate(&AccumulationInput {
        initial_balance: input.initial_deposit,
        periodic_contribution: contribution_per_period,
        annual_rate_percent: input.annual_rate_percent,
        periods: input.years.saturating_mul(periods_per_year),
        periods_per_year,
        contribution_growth_percent: input.annual_contribution_growth_percent,
    })?;

    Ok(SavingsResult {
        compounding: input.compounding,
        contribution_per_period,
        summary: schedule.summary,
        yearly: year_summaries(&schedule.rows),
        rows: schedule.rows,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Retirement401kInput {
    pub current_age: u32,
    pub retirement_age: u32,
    pub annual_salary: f64,
    pub contribution_percent: f64,
    /// Employer pays this share of the employee's matched contribution.
    pub employer_match_percent: f64,
    /// Salary share the employer match applies to.
    pub employer_match_limit_percent: f64,
    pub salary_growth_percent: f64,
    pub current_balance: f64,
    pub annual_return_percent: f64,
    pub contribution_limit: f64,
    pub catch_up_contribution: f64,
    pub catch_up_age: u32,
}

impl Default for Retirement401kInput {
    fn default() -> Self {
        Self {
            current_age: 30,
            retirement_age: 65,
            annual_salary: 75_000.0,
            contribution_percent: 6.0,
            employer_match_percent: 50.0,
            employer_match_limit_percent: 6.0,
            salary_growth_percent: 2.0,
            current_balance: 10_000.0,
            annual_return_percent: 7.0,
            contribution_limit: 23_000.0,
            catch_up_contribution: 7_500.0,
            catch_up_age: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Retirement401kRow {
    pub year: u32,
    pub age: u32,
    pub salary: f64,
    pub employee_contribution: f64,
    pub employer_contribution: f64,
    pub interest_earned: f64,
    pub ending_balance: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Retirement401kResult {
    pub years_to_retirement: u32,
    pub final_balance: f64,
    pub total_employee_contributions: f64,
    pub total_employer_contributions: f64,
    pub total_interest: f64,
    pub rows: Vec<Retirement401kRow>,
}

pub fn run_401k(input: &Retirement401kInput) -> CalcResult<Retirement401kResult> {
    let years = years_between("retirementAge", input.current_age, input.retirement_age)?;
    let salary = ensure_non_negative("annualSalary", input.annual_salary)?;
    let balance_start = ensure_non_negative("currentBalance", input.current_balance)?;
    ensure_non_negative("annualReturnPercent", input.annual_return_percent)?;
    ensure_non_negative("contributionLimit", input.contribution_limit)?;
    ensure_non_negative("catchUpContribution", input.catch_up_contribution)?;
    ensure_non_negative("employerMatchPercent", input.employer_match_percent)?;
    validate_growth(input.salary_growth_percent)?;
    for (field, percent) in [
        ("contributionPercent", input.contribution_percent),
        ("employerMatchLimitPercent", input.employer_match_limit_percent),
    ] {
        let percent = ensure_non_negative(field, percent)?;
        if percent > 100.0 {
            return Err(CalcError::invalid(field, "must be <= 100"));
        }
    }

    let rate = periodic_rate(input.annual_return_percent, MONTHS_PER_YEAR);
    let mut balance = balance_start;
    let mut rows = Vec::with_capacity(years as usize);

    for year in 1..=years {
        let age = input.current_age + year - 1;
        let salary = grown_contribution(salary, input.salary_growth_percent, year - 1);
        let limit = if age >= input.catch_up_age {
            input.contribution_limit + input.catch_up_contribution
        } else {
            input.contribution_limit
        };
        let employee_contribution = (salary * input.contribution_percent / 100.0).min(limit);
        // The match follows what was actually deferred after the limit.
        let deferred_percent = if salary > 0.0 {
            employee_contribution / salary * 100.0
        } else {
            0.0
        };
        let matched_share = deferred_percent.min(input.employer_match_limit_percent);
        let employer_contribution =
            salary * matched_share / 100.0 * input.employer_match_percent / 100.0;

        let monthly = (employee_contribution + employer_contribution) / MONTHS_PER_YEAR as f64;
        let mut interest_earned = 0.0;
        for _ in 0..MONTHS_PER_YEAR {
            let (interest, ending) = compound_period(balance, monthly, rate);
            interest_earned += interest;
            balance = ending;
        }

        rows.push(Retirement401kRow {
            year,
            age,
            salary,
            employee_contribution,
            employer_contribution,
            interest_earned,
            ending_balance: balance,
        });
    }

    Ok(Retirement401kResult {
        years_to_retirement: years,
        final_balance: balance,
        total_employee_contributions: rows.iter().map(|r| r.employee_contribution).sum(),
        total_employer_contributions: rows.iter().map(|r| r.employer_contribution).sum(),
        total_interest: rows.iter().map(|r| r.interest_earned).sum(),
        rows,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct IraInput {
    pub current_age: u32,
    pub retirement_age: u32,
    pub current_balance: f64,
    pub annual_contribution: f64,
    pub annual_return_percent: f64,
    pub contribution_growth_percent: f64,
    pub current_tax_rate_percent: f64,
    pub retirement_tax_rate_percent: f64,
}

impl Default for IraInput {
    fn default() -> Self {
        Self {
            current_age: 30,
            retirement_age: 65,
            current_balance: 5_000.0,
            annual_contribution: 7_000.0,
            annual_return_percent: 7.0,
            contribution_growth_percent: 0.0,
            current_tax_rate_percent: 22.0,
            retirement_tax_rate_percent: 15.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IraResult {
    pub years_to_retirement: u32,
    pub schedule: TaxTrackSchedule,
}

pub fn run_ira(input: &IraInput) -> CalcResult<IraResult> {
    let years = years_between("retirementAge", input.current_age, input.retirement_age)?;
    let schedule = run_tax_tracks(&TaxTrackInput {
        initial_balance: input.current_balance,
        annual_contribution: input.annual_contribution,
        annual_rate_percent: input.annual_return_percent,
        years,
        periods_per_year: 1,
        contribution_growth_percent: input.contribution_growth_percent,
        current_tax_rate_percent: input.current_tax_rate_percent,
        retirement_tax_rate_percent: input.retirement_tax_rate_percent,
    })?;
    Ok(IraResult {
        years_to_retirement: years,
        schedule,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollegeInput {
    pub current_annual_cost: f64,
    pub cost_inflation_percent: f64,
    pub child_age: u32,
    pub college_start_age: u32,
    pub years_in_college: u32,
    pub current_savings: f64,
    pub monthly_contribution: f64,
    pub annual_return_percent: f64,
}

impl Default for CollegeInput {
    fn default() -> Self {
        Self {
            current_annual_cost: 28_000.0,
            cost_inflation_percent: 5.0,
            child_age: 5,
            college_start_age: 18,
            years_in_college: 4,
            current_savings: 10_000.0,
            monthly_contribution: 300.0,
            annual_return_percent: 6.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollegeCostRow {
    pub college_year: u32,
    pub age: u32,
    pub projected_cost: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollegeResult {
    pub years_until_college: u32,
    pub total_projected_cost: f64,
    pub savings_at_start: f64,
    pub shortfall: f64,
    pub percent_covered: f64,
    /// Extra monthly saving, on top of the current plan, that closes the shortfall.
    pub additional_monthly_needed: f64,
    pub cost_rows: Vec<CollegeCostRow>,
    pub savings: AccumulationSummary,
    pub savings_by_year: Vec<YearSummary>,
}

/// Costs are compared with savings at college start; savings are not modelled
/// as earning while tuition is drawn down.
pub fn run_college(input: &CollegeInput) -> CalcResult<CollegeResult> {
    let years_until = years_between("collegeStartAge", input.child_age, input.college_start_age)?;
    let annual_cost = ensure_non_negative("currentAnnualCost", input.current_annual_cost)?;
    let inflation = ensure_non_negative("costInflationPercent", input.cost_inflation_percent)?;
    if input.years_in_college == 0 || input.years_in_college > MAX_ACCUMULATION_YEARS {
        return Err(CalcError::invalid(
            "yearsInCollege",
            format!("must be between 1 and {MAX_ACCUMULATION_YEARS}"),
        ));
    }

    let cost_rows = (0..input.years_in_college)
        .map(|k| CollegeCostRow {
            college_year: k + 1,
            age: input.college_start_age.saturating_add(k),
            projected_cost: grown_contribution(annual_cost, inflation, years_until + k),
        })
        .collect::<Vec<_>>();
    let total_projected_cost = cost_rows.iter().map(|r| r.projected_cost).sum::<f64>();

    let months = years_until * MONTHS_PER_YEAR;
    let schedule = accumulate(&AccumulationInput {
        initial_balance: input.current_savings,
        periodic_contribution: input.monthly_contribution,
        annual_rate_percent: input.annual_return_percent,
        periods: months,
        periods_per_year: MONTHS_PER_YEAR,
        contribution_growth_percent: 0.0,
    })?;
    let savings_at_start = schedule.summary.final_balance;
    let shortfall = (total_projected_cost - savings_at_start).max(0.0);

    let rate = periodic_rate(input.annual_return_percent, MONTHS_PER_YEAR);
    let annuity_due_factor = if rate == 0.0 {
        months as f64
    } else {
        ((1.0 + rate).powi(months as i32) - 1.0) / rate * (1.0 + rate)
    };
    let additional_monthly_needed = shortfall / annuity_due_factor;
    let percent_covered = if total_projected_cost > 0.0 {
        (savings_at_start / total_projected_cost * 100.0).min(100.0)
    } else {
        100.0
    };

    Ok(CollegeResult {
        years_until_college: years_until,
        total_projected_cost,
        savings_at_start,
        shortfall,
        percent_covered,
        additional_monthly_needed,
        cost_rows,
        savings: schedule.summary,
        savings_by_year: year_summaries(&schedule.rows),
    })
}
