use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{MethodRouter, get},
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::core::{
    AmortizationCalcInput, AmortizationSchedule, AutoLoanInput, AutoLoanResult, CalcError,
    CalcResult, CollegeInput, CollegeResult, CompoundingFrequency, Debt, DebtPayoffInput,
    DebtPayoffResult, ExtraBudget, IncomePeriod, IraInput, IraResult, PaymentInput, PaymentMode,
    PaymentResult, PersonalLoanInput, PersonalLoanResult, RentInput, RentResult,
    Retirement401kInput, Retirement401kResult, SavingsInput, SavingsResult, ScheduledExtra,
    rent_affordability, run_401k, run_amortization, run_auto_loan, run_college, run_ira,
    run_payment, run_personal_loan, run_savings, simulate_avalanche,
};

const DEFAULT_PORT: u16 = 8080;

#[derive(Parser, Debug)]
#[command(
    name = "calcs",
    about = "Loan, savings, retirement and debt payoff calculators"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the calculators as a JSON HTTP API.
    Serve {
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    Amortization(AmortizationPayload),
    AutoLoan(AutoLoanPayload),
    PersonalLoan(PersonalLoanPayload),
    Payment(PaymentPayload),
    Savings(SavingsPayload),
    #[command(name = "401k")]
    Retirement401k(Retirement401kPayload),
    Ira(IraPayload),
    College(CollegePayload),
    DebtPayoff(DebtPayoffPayload),
    Rent(RentPayload),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CompoundingChoice {
    #[serde(alias = "annual", alias = "yearly")]
    Annually,
    #[serde(alias = "semiannual", alias = "semi-annually")]
    Semiannually,
    #[serde(alias = "quarter")]
    Quarterly,
    #[serde(alias = "month")]
    Monthly,
    #[serde(alias = "bi-weekly")]
    Biweekly,
    #[serde(alias = "week")]
    Weekly,
    #[serde(alias = "day")]
    Daily,
}

impl From<CompoundingChoice> for CompoundingFrequency {
    fn from(value: CompoundingChoice) -> Self {
        match value {
            CompoundingChoice::Annually => CompoundingFrequency::Annually,
            CompoundingChoice::Semiannually => CompoundingFrequency::Semiannually,
            CompoundingChoice::Quarterly => CompoundingFrequency::Quarterly,
            CompoundingChoice::Monthly => CompoundingFrequency::Monthly,
            CompoundingChoice::Biweekly => CompoundingFrequency::Biweekly,
            CompoundingChoice::Weekly => CompoundingFrequency::Weekly,
            CompoundingChoice::Daily => CompoundingFrequency::Daily,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentModeChoice {
    #[serde(alias = "fixedTerm", alias = "fixed_term", alias = "term")]
    FixedTerm,
    #[serde(alias = "fixedPayment", alias = "fixed_payment", alias = "payment")]
    FixedPayment,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum IncomePeriodChoice {
    #[serde(alias = "annually", alias = "yearly")]
    Annual,
    #[serde(alias = "month")]
    Monthly,
}

impl From<IncomePeriodChoice> for IncomePeriod {
    fn from(value: IncomePeriodChoice) -> Self {
        match value {
            IncomePeriodChoice::Annual => IncomePeriod::Annual,
            IncomePeriodChoice::Monthly => IncomePeriod::Monthly,
        }
    }
}

#[derive(Args, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AmortizationPayload {
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    loan_amount: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    annual_rate_percent: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    term_years: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    extra_monthly: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    one_time_extra: Option<f64>,
    /// Payment number that receives the one-time extra.
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    one_time_extra_month: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    annual_extra: Option<f64>,
    /// Calendar month (1-12) of the yearly lump sum.
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    annual_extra_month: Option<f64>,
    /// Calendar month (1-12) of the first payment.
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    start_month: Option<f64>,
}

#[derive(Args, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AutoLoanPayload {
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    vehicle_price: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    down_payment: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    trade_in_value: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    trade_in_owed: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    sales_tax_percent: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    fees: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    annual_rate_percent: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    term_months: Option<f64>,
}

#[derive(Args, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersonalLoanPayload {
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    loan_amount: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    annual_rate_percent: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    term_months: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    origination_fee_percent: Option<f64>,
}

#[derive(Args, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PaymentPayload {
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    loan_amount: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    annual_rate_percent: Option<f64>,
    /// Defaults to fixed-payment when only a monthly payment is given.
    #[arg(long, value_enum)]
    #[serde(deserialize_with = "lenient_choice")]
    mode: Option<PaymentModeChoice>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    term_months: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    monthly_payment: Option<f64>,
}

#[derive(Args, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SavingsPayload {
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    initial_deposit: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    monthly_contribution: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    annual_rate_percent: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    years: Option<f64>,
    #[arg(long, value_enum)]
    #[serde(deserialize_with = "lenient_choice")]
    compounding: Option<CompoundingChoice>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    annual_contribution_growth_percent: Option<f64>,
}

#[derive(Args, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Retirement401kPayload {
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    current_age: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    retirement_age: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    annual_salary: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    contribution_percent: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    employer_match_percent: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    employer_match_limit_percent: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    salary_growth_percent: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    current_balance: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    annual_return_percent: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    contribution_limit: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    catch_up_contribution: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    catch_up_age: Option<f64>,
}

#[derive(Args, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IraPayload {
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    current_age: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    retirement_age: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    current_balance: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    annual_contribution: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    annual_return_percent: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    contribution_growth_percent: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    current_tax_rate_percent: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    retirement_tax_rate_percent: Option<f64>,
}

#[derive(Args, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CollegePayload {
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    current_annual_cost: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    cost_inflation_percent: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    child_age: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    college_start_age: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    years_in_college: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    current_savings: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    monthly_contribution: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    annual_return_percent: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DebtPayload {
    name: Option<String>,
    #[serde(deserialize_with = "lenient_number")]
    balance: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    min_payment: Option<f64>,
    #[serde(alias = "rate", alias = "apr", deserialize_with = "lenient_number")]
    annual_rate_percent: Option<f64>,
}

#[derive(Args, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DebtPayoffPayload {
    /// NAME:BALANCE:MIN_PAYMENT:RATE, repeatable.
    #[arg(long = "debt", value_parser = parse_debt_arg)]
    #[serde(deserialize_with = "lenient_debts")]
    debts: Vec<DebtPayload>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    extra_monthly: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    extra_annual: Option<f64>,
    /// First month of the yearly extra; repeats every 12 months.
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    extra_annual_month: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    extra_one_time: Option<f64>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    extra_one_time_month: Option<f64>,
    /// Add each paid-off debt's minimum to the extra budget.
    #[arg(long)]
    #[serde(deserialize_with = "lenient_flag")]
    rollover_freed_minimums: bool,
}

#[derive(Args, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RentPayload {
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    income: Option<f64>,
    #[arg(long, value_enum)]
    #[serde(deserialize_with = "lenient_choice")]
    income_period: Option<IncomePeriodChoice>,
    #[arg(long)]
    #[serde(deserialize_with = "lenient_number")]
    monthly_debts: Option<f64>,
}

/// One calculator page: a lenient payload that resolves onto documented
/// defaults and runs its engine.
trait Calculator: DeserializeOwned + Default + Send + 'static {
    type Output: Serialize;
    const NAME: &'static str;

    fn run(self) -> CalcResult<Self::Output>;
}

impl AmortizationPayload {
    fn into_input(self) -> AmortizationCalcInput {
        let d = AmortizationCalcInput::default();
        AmortizationCalcInput {
            loan_amount: positive_or(self.loan_amount, d.loan_amount),
            annual_rate_percent: non_negative_or(self.annual_rate_percent, d.annual_rate_percent),
            term_years: positive_count_or(self.term_years, d.term_years),
            extra_monthly: non_negative_or(self.extra_monthly, d.extra_monthly),
            one_time_extra: non_negative_or(self.one_time_extra, d.one_time_extra),
            one_time_extra_month: positive_count_or(
                self.one_time_extra_month,
                d.one_time_extra_month,
            ),
            annual_extra: non_negative_or(self.annual_extra, d.annual_extra),
            annual_extra_month: month_or(self.annual_extra_month, d.annual_extra_month),
            start_month: month_or(self.start_month, d.start_month),
        }
    }
}

impl Calculator for AmortizationPayload {
    type Output = AmortizationSchedule;
    const NAME: &'static str = "amortization";

    fn run(self) -> CalcResult<Self::Output> {
        run_amortization(&self.into_input())
    }
}

impl AutoLoanPayload {
    fn into_input(self) -> AutoLoanInput {
        let d = AutoLoanInput::default();
        AutoLoanInput {
            vehicle_price: positive_or(self.vehicle_price, d.vehicle_price),
            down_payment: non_negative_or(self.down_payment, d.down_payment),
            trade_in_value: non_negative_or(self.trade_in_value, d.trade_in_value),
            trade_in_owed: non_negative_or(self.trade_in_owed, d.trade_in_owed),
            sales_tax_percent: non_negative_or(self.sales_tax_percent, d.sales_tax_percent),
            fees: non_negative_or(self.fees, d.fees),
            annual_rate_percent: non_negative_or(self.annual_rate_percent, d.annual_rate_percent),
            term_months: positive_count_or(self.term_months, d.term_months),
        }
    }
}

impl Calculator for AutoLoanPayload {
    type Output = AutoLoanResult;
    const NAME: &'static str = "auto-loan";

    fn run(self) -> CalcResult<Self::Output> {
        run_auto_loan(&self.into_input())
    }
}

impl PersonalLoanPayload {
    fn into_input(self) -> PersonalLoanInput {
        let d = PersonalLoanInput::default();
        PersonalLoanInput {
            loan_amount: positive_or(self.loan_amount, d.loan_amount),
            annual_rate_percent: non_negative_or(self.annual_rate_percent, d.annual_rate_percent),
            term_months: positive_count_or(self.term_months, d.term_months),
            origination_fee_percent: non_negative_or(
                self.origination_fee_percent,
                d.origination_fee_percent,
            ),
        }
    }
}

impl Calculator for PersonalLoanPayload {
    type Output = PersonalLoanResult;
    const NAME: &'static str = "personal-loan";

    fn run(self) -> CalcResult<Self::Output> {
        run_personal_loan(&self.into_input())
    }
}

const DEFAULT_FIXED_PAYMENT: f64 = 500.0;
const DEFAULT_TERM_MONTHS: u32 = 60;

impl PaymentPayload {
    fn into_input(self) -> PaymentInput {
        let d = PaymentInput::default();
        let mode = match self.mode {
            Some(mode) => mode,
            None if self.monthly_payment.is_some() && self.term_months.is_none() => {
                PaymentModeChoice::FixedPayment
            }
            None => PaymentModeChoice::FixedTerm,
        };
        let mode = match mode {
            PaymentModeChoice::FixedTerm => PaymentMode::FixedTerm {
                term_months: positive_count_or(self.term_months, DEFAULT_TERM_MONTHS),
            },
            PaymentModeChoice::FixedPayment => PaymentMode::FixedPayment {
                monthly_payment: positive_or(self.monthly_payment, DEFAULT_FIXED_PAYMENT),
            },
        };
        PaymentInput {
            loan_amount: positive_or(self.loan_amount, d.loan_amount),
            annual_rate_percent: non_negative_or(self.annual_rate_percent, d.annual_rate_percent),
            mode,
        }
    }
}

impl Calculator for PaymentPayload {
    type Output = PaymentResult;
    const NAME: &'static str = "payment";

    fn run(self) -> CalcResult<Self::Output> {
        run_payment(&self.into_input())
    }
}

impl SavingsPayload {
    fn into_input(self) -> SavingsInput {
        let d = SavingsInput::default();
        SavingsInput {
            initial_deposit: non_negative_or(self.initial_deposit, d.initial_deposit),
            monthly_contribution: non_negative_or(
                self.monthly_contribution,
                d.monthly_contribution,
            ),
            annual_rate_percent: non_negative_or(self.annual_rate_percent, d.annual_rate_percent),
            years: positive_count_or(self.years, d.years),
            compounding: self.compounding.map_or(d.compounding, Into::into),
            annual_contribution_growth_percent: non_negative_or(
                self.annual_contribution_growth_percent,
                d.annual_contribution_growth_percent,
            ),
        }
    }
}

impl Calculator for SavingsPayload {
    type Output = SavingsResult;
    const NAME: &'static str = "savings";

    fn run(self) -> CalcResult<Self::Output> {
        run_savings(&self.into_input())
    }
}

impl Retirement401kPayload {
    fn into_input(self) -> Retirement401kInput {
        let d = Retirement401kInput::default();
        Retirement401kInput {
            current_age: positive_count_or(self.current_age, d.current_age),
            retirement_age: positive_count_or(self.retirement_age, d.retirement_age),
            annual_salary: positive_or(self.annual_salary, d.annual_salary),
            contribution_percent: non_negative_or(
                self.contribution_percent,
                d.contribution_percent,
            ),
            employer_match_percent: non_negative_or(
                self.employer_match_percent,
                d.employer_match_percent,
            ),
            employer_match_limit_percent: non_negative_or(
                self.employer_match_limit_percent,
                d.employer_match_limit_percent,
            ),
            salary_growth_percent: non_negative_or(
                self.salary_growth_percent,
                d.salary_growth_percent,
            ),
            current_balance: non_negative_or(self.current_balance, d.current_balance),
            annual_return_percent: non_negative_or(
                self.annual_return_percent,
                d.annual_return_percent,
            ),
            contribution_limit: positive_or(self.contribution_limit, d.contribution_limit),
            catch_up_contribution: non_negative_or(
                self.catch_up_contribution,
                d.catch_up_contribution,
            ),
            catch_up_age: positive_count_or(self.catch_up_age, d.catch_up_age),
        }
    }
}

impl Calculator for Retirement401kPayload {
    type Output = Retirement401kResult;
    const NAME: &'static str = "401k";

    fn run(self) -> CalcResult<Self::Output> {
        run_401k(&self.into_input())
    }
}

impl IraPayload {
    fn into_input(self) -> IraInput {
        let d = IraInput::default();
        IraInput {
            current_age: positive_count_or(self.current_age, d.current_age),
            retirement_age: positive_count_or(self.retirement_age, d.retirement_age),
            current_balance: non_negative_or(self.current_balance, d.current_balance),
            annual_contribution: non_negative_or(self.annual_contribution, d.annual_contribution),
            annual_return_percent: non_negative_or(
                self.annual_return_percent,
                d.annual_return_percent,
            ),
            contribution_growth_percent: non_negative_or(
                self.contribution_growth_percent,
                d.contribution_growth_percent,
            ),
            current_tax_rate_percent: non_negative_or(
                self.current_tax_rate_percent,
                d.current_tax_rate_percent,
            ),
            retirement_tax_rate_percent: non_negative_or(
                self.retirement_tax_rate_percent,
                d.retirement_tax_rate_percent,
            ),
        }
    }
}

impl Calculator for IraPayload {
    type Output = IraResult;
    const NAME: &'static str = "ira";

    fn run(self) -> CalcResult<Self::Output> {
        run_ira(&self.into_input())
    }
}

impl CollegePayload {
    fn into_input(self) -> CollegeInput {
        let d = CollegeInput::default();
        CollegeInput {
            current_annual_cost: positive_or(self.current_annual_cost, d.current_annual_cost),
            cost_inflation_percent: non_negative_or(
                self.cost_inflation_percent,
                d.cost_inflation_percent,
            ),
            child_age: count_or(self.child_age, d.child_age),
            college_start_age: positive_count_or(self.college_start_age, d.college_start_age),
            years_in_college: positive_count_or(self.years_in_college, d.years_in_college),
            current_savings: non_negative_or(self.current_savings, d.current_savings),
            monthly_contribution: non_negative_or(
                self.monthly_contribution,
                d.monthly_contribution,
            ),
            annual_return_percent: non_negative_or(
                self.annual_return_percent,
                d.annual_return_percent,
            ),
        }
    }
}

impl Calculator for CollegePayload {
    type Output = CollegeResult;
    const NAME: &'static str = "college";

    fn run(self) -> CalcResult<Self::Output> {
        run_college(&self.into_input())
    }
}

const DEFAULT_ANNUAL_EXTRA_MONTH: u32 = 12;
const DEFAULT_ONE_TIME_EXTRA_MONTH: u32 = 1;

impl DebtPayoffPayload {
    fn into_input(self) -> DebtPayoffInput {
        // Rows without a positive balance are blank form lines.
        let debts = self
            .debts
            .into_iter()
            .filter(|debt| debt.balance.is_some_and(|b| b > 0.0))
            .enumerate()
            .map(|(idx, debt)| Debt {
                name: debt
                    .name
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| format!("Debt {}", idx + 1)),
                balance: positive_or(debt.balance, 0.0),
                min_payment: non_negative_or(debt.min_payment, 0.0),
                annual_rate_percent: non_negative_or(debt.annual_rate_percent, 0.0),
            })
            .collect();

        let scheduled = |amount: Option<f64>, month: Option<f64>, default_month: u32| {
            amount.filter(|v| *v > 0.0).map(|amount| ScheduledExtra {
                amount,
                month: positive_count_or(month, default_month),
            })
        };
        DebtPayoffInput {
            debts,
            extra: ExtraBudget {
                monthly: non_negative_or(self.extra_monthly, 0.0),
                annual: scheduled(
                    self.extra_annual,
                    self.extra_annual_month,
                    DEFAULT_ANNUAL_EXTRA_MONTH,
                ),
                one_time: scheduled(
                    self.extra_one_time,
                    self.extra_one_time_month,
                    DEFAULT_ONE_TIME_EXTRA_MONTH,
                ),
            },
            rollover_freed_minimums: self.rollover_freed_minimums,
        }
    }
}

impl Calculator for DebtPayoffPayload {
    type Output = DebtPayoffResult;
    const NAME: &'static str = "debt-payoff";

    fn run(self) -> CalcResult<Self::Output> {
        simulate_avalanche(&self.into_input())
    }
}

const DEFAULT_RENT_INCOME: f64 = 75_000.0;
const DEFAULT_RENT_MONTHLY_DEBTS: f64 = 500.0;

impl RentPayload {
    fn into_input(self) -> RentInput {
        RentInput {
            income: positive_or(self.income, DEFAULT_RENT_INCOME),
            income_period: self.income_period.map_or(IncomePeriod::Annual, Into::into),
            monthly_debts: non_negative_or(self.monthly_debts, DEFAULT_RENT_MONTHLY_DEBTS),
        }
    }
}

impl Calculator for RentPayload {
    type Output = RentResult;
    const NAME: &'static str = "rent";

    fn run(self) -> CalcResult<Self::Output> {
        rent_affordability(&self.into_input())
    }
}

fn positive_or(value: Option<f64>, default: f64) -> f64 {
    value.filter(|v| *v > 0.0).unwrap_or(default)
}

fn non_negative_or(value: Option<f64>, default: f64) -> f64 {
    value.filter(|v| *v >= 0.0).unwrap_or(default)
}

fn count_or(value: Option<f64>, default: u32) -> u32 {
    value
        .filter(|v| *v >= 0.0 && *v <= u32::MAX as f64)
        .map_or(default, |v| v.trunc() as u32)
}

fn positive_count_or(value: Option<f64>, default: u32) -> u32 {
    match count_or(value, default) {
        0 => default,
        n => n,
    }
}

fn month_or(value: Option<f64>, default: u32) -> u32 {
    match count_or(value, default) {
        m @ 1..=12 => m,
        _ => default,
    }
}

/// Parses form text such as `"250,000"`, `"$1,500.50"` or `"6.5%"`.
fn parse_number(text: &str) -> Option<f64> {
    let cleaned = text
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '%' | '_') && !c.is_whitespace())
        .collect::<String>();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_number(&s),
        _ => None,
    })
}

fn lenient_choice<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        ),
        _ => false,
    })
}

/// Debts arrive as a JSON array, or as a JSON-encoded string from a query.
fn lenient_debts<'de, D>(deserializer: D) -> Result<Vec<DebtPayload>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Value::deserialize(deserializer)? {
        Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::Null),
        other => other,
    };
    let Value::Array(items) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

fn parse_debt_arg(raw: &str) -> Result<DebtPayload, String> {
    let parts = raw.split(':').collect::<Vec<_>>();
    let [name, balance, min_payment, rate] = parts.as_slice() else {
        return Err(format!("expected NAME:BALANCE:MIN_PAYMENT:RATE, got `{raw}`"));
    };
    let number = |field: &str, text: &str| {
        parse_number(text).ok_or_else(|| format!("invalid {field} `{text}` in `{raw}`"))
    };
    Ok(DebtPayload {
        name: Some(name.to_string()),
        balance: Some(number("balance", *balance)?),
        min_payment: Some(number("minimum payment", *min_payment)?),
        annual_rate_percent: Some(number("rate", *rate)?),
    })
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(flatten)]
    detail: Option<CalcError>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub fn router() -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/amortization", calculator_route::<AmortizationPayload>())
        .route("/api/auto-loan", calculator_route::<AutoLoanPayload>())
        .route("/api/personal-loan", calculator_route::<PersonalLoanPayload>())
        .route("/api/payment", calculator_route::<PaymentPayload>())
        .route("/api/savings", calculator_route::<SavingsPayload>())
        .route("/api/401k", calculator_route::<Retirement401kPayload>())
        .route("/api/ira", calculator_route::<IraPayload>())
        .route("/api/college", calculator_route::<CollegePayload>())
        .route("/api/debt-payoff", calculator_route::<DebtPayoffPayload>())
        .route("/api/rent", calculator_route::<RentPayload>())
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "calculator HTTP API listening");
    info!("local access: http://127.0.0.1:{port}/api/health");

    axum::serve(listener, router()).await
}

/// Runs a parsed command line: serves HTTP or prints one calculator's result.
pub async fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Serve { port } => run_http_server(port)
            .await
            .map_err(|e| format!("server error: {e}")),
        command => {
            let json = render_command(command)?;
            println!("{json}");
            Ok(())
        }
    }
}

fn render_command(command: Command) -> Result<String, String> {
    match command {
        Command::Serve { .. } => Err("serve does not produce a report".to_string()),
        Command::Amortization(payload) => render(payload),
        Command::AutoLoan(payload) => render(payload),
        Command::PersonalLoan(payload) => render(payload),
        Command::Payment(payload) => render(payload),
        Command::Savings(payload) => render(payload),
        Command::Retirement401k(payload) => render(payload),
        Command::Ira(payload) => render(payload),
        Command::College(payload) => render(payload),
        Command::DebtPayoff(payload) => render(payload),
        Command::Rent(payload) => render(payload),
    }
}

fn render<P: Calculator>(payload: P) -> Result<String, String> {
    let output = payload.run().map_err(|e| e.to_string())?;
    serde_json::to_string_pretty(&output).map_err(|e| format!("failed to encode result: {e}"))
}

fn calculator_route<P: Calculator>() -> MethodRouter {
    get(calculator_get_handler::<P>).post(calculator_post_handler::<P>)
}

async fn health_handler() -> Response {
    json_response(
        StatusCode::OK,
        HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        },
    )
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found", None)
}

async fn calculator_get_handler<P: Calculator>(Query(payload): Query<P>) -> Response {
    calculator_response(payload)
}

async fn calculator_post_handler<P: Calculator>(Json(payload): Json<P>) -> Response {
    calculator_response(payload)
}

fn calculator_response<P: Calculator>(payload: P) -> Response {
    debug!(calculator = P::NAME, "running calculator");
    match payload.run() {
        Ok(output) => json_response(StatusCode::OK, output),
        Err(err) => {
            debug!(calculator = P::NAME, error = %err, "calculator rejected input");
            let status = match err {
                CalcError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
                CalcError::NonConvergent { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            };
            error_response(status, &err.to_string(), Some(err))
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str, detail: Option<CalcError>) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
            detail,
        },
    )
}

#[cfg(test)]
fn payload_from_json<P: Calculator>(json: &str) -> Result<P, String> {
    serde_json::from_str::<P>(json).map_err(|e| format!("Invalid API JSON payload: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("readable body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[test]
    fn payload_from_json_parses_numbers_and_strings() {
        let payload = payload_from_json::<AmortizationPayload>(
            r#"{"loanAmount":"$300,000","annualRatePercent":7,"termYears":"15","startMonth":"4"}"#,
        )
        .expect("valid json");
        let input = payload.into_input();
        assert_approx(input.loan_amount, 300_000.0);
        assert_approx(input.annual_rate_percent, 7.0);
        assert_eq!(input.term_years, 15);
        assert_eq!(input.start_month, 4);
    }

    #[test]
    fn missing_or_unparseable_fields_fall_back_to_defaults() {
        let payload = payload_from_json::<AmortizationPayload>(
            r#"{"loanAmount":"lots","termYears":0,"annualRatePercent":-2,"startMonth":13,"extraMonthly":null}"#,
        )
        .expect("valid json");
        assert_eq!(payload.into_input(), AmortizationCalcInput::default());

        let empty = payload_from_json::<AutoLoanPayload>("{}").expect("empty object");
        assert_eq!(empty.into_input(), AutoLoanInput::default());
    }

    #[test]
    fn zero_rate_and_zero_down_payment_are_kept() {
        let payload = payload_from_json::<AutoLoanPayload>(
            r#"{"annualRatePercent":0,"downPayment":"0","vehiclePrice":0}"#,
        )
        .expect("valid json");
        let input = payload.into_input();
        assert_eq!(input.annual_rate_percent, 0.0);
        assert_eq!(input.down_payment, 0.0);
        assert_approx(input.vehicle_price, AutoLoanInput::default().vehicle_price);
    }

    #[test]
    fn payment_mode_is_inferred_from_monthly_payment() {
        let payload = payload_from_json::<PaymentPayload>(r#"{"monthlyPayment":"750"}"#)
            .expect("valid json");
        assert_eq!(
            payload.into_input().mode,
            PaymentMode::FixedPayment {
                monthly_payment: 750.0
            }
        );

        let payload = payload_from_json::<PaymentPayload>(r#"{"mode":"fixedPayment"}"#)
            .expect("valid json");
        assert_eq!(
            payload.into_input().mode,
            PaymentMode::FixedPayment {
                monthly_payment: DEFAULT_FIXED_PAYMENT
            }
        );

        let payload = payload_from_json::<PaymentPayload>("{}").expect("valid json");
        assert_eq!(payload.into_input(), PaymentInput::default());
    }

    #[test]
    fn choices_accept_aliases_and_ignore_unknown_values() {
        let payload = payload_from_json::<SavingsPayload>(r#"{"compounding":"quarter"}"#)
            .expect("valid json");
        assert_eq!(
            payload.into_input().compounding,
            CompoundingFrequency::Quarterly
        );

        let payload = payload_from_json::<SavingsPayload>(r#"{"compounding":"hourly"}"#)
            .expect("valid json");
        assert_eq!(payload.into_input().compounding, CompoundingFrequency::Monthly);

        let payload = payload_from_json::<RentPayload>(r#"{"incomePeriod":"monthly","income":"4000"}"#)
            .expect("valid json");
        let input = payload.into_input();
        assert_eq!(input.income_period, IncomePeriod::Monthly);
        assert_approx(input.monthly_debts, DEFAULT_RENT_MONTHLY_DEBTS);
    }

    #[test]
    fn debts_parse_from_array_and_encoded_string() {
        let payload = payload_from_json::<DebtPayoffPayload>(
            r#"{
                "debts": [
                    {"name":"Card","balance":"5,000","minPayment":150,"rate":"22.9"},
                    {"name":"","balance":2000,"minPayment":50,"annualRatePercent":6},
                    {"name":"Blank","balance":0}
                ],
                "extraMonthly":"200",
                "extraAnnual":1000,
                "rolloverFreedMinimums":"yes"
            }"#,
        )
        .expect("valid json");
        let input = payload.into_input();
        assert_eq!(input.debts.len(), 2);
        assert_eq!(input.debts[0].name, "Card");
        assert_approx(input.debts[0].annual_rate_percent, 22.9);
        assert_eq!(input.debts[1].name, "Debt 2");
        assert_approx(input.extra.monthly, 200.0);
        assert_eq!(
            input.extra.annual,
            Some(ScheduledExtra {
                amount: 1_000.0,
                month: DEFAULT_ANNUAL_EXTRA_MONTH
            })
        );
        assert!(input.extra.one_time.is_none());
        assert!(input.rollover_freed_minimums);

        let encoded = payload_from_json::<DebtPayoffPayload>(
            r#"{"debts":"[{\"name\":\"Car\",\"balance\":9000,\"minPayment\":250,\"rate\":5}]"}"#,
        )
        .expect("valid json");
        assert_eq!(encoded.into_input().debts.len(), 1);
    }

    #[test]
    fn parse_debt_arg_reads_colon_separated_fields() {
        let debt = parse_debt_arg("Visa:5,000:150:22.9").expect("valid debt");
        assert_eq!(debt.name.as_deref(), Some("Visa"));
        assert_eq!(debt.balance, Some(5_000.0));
        assert_eq!(debt.annual_rate_percent, Some(22.9));

        let err = parse_debt_arg("Visa:5000").expect_err("missing fields");
        assert!(err.contains("NAME:BALANCE:MIN_PAYMENT:RATE"));
        assert!(parse_debt_arg("Visa:abc:150:22.9").is_err());
    }

    #[test]
    fn cli_parses_subcommands_and_serve_port() {
        let cli = Cli::try_parse_from(["calcs", "serve"]).expect("serve parses");
        assert!(matches!(cli.command, Command::Serve { port: DEFAULT_PORT }));

        let cli = Cli::try_parse_from(["calcs", "auto-loan", "--vehicle-price", "20000"])
            .expect("auto-loan parses");
        let Command::AutoLoan(payload) = cli.command else {
            panic!("expected auto-loan subcommand");
        };
        assert_approx(payload.into_input().vehicle_price, 20_000.0);

        let cli = Cli::try_parse_from([
            "calcs",
            "debt-payoff",
            "--debt",
            "Card:3000:90:19.9",
            "--debt",
            "Loan:8000:200:7",
            "--extra-monthly",
            "150",
        ])
        .expect("debt-payoff parses");
        let Command::DebtPayoff(payload) = cli.command else {
            panic!("expected debt-payoff subcommand");
        };
        assert_eq!(payload.into_input().debts.len(), 2);

        assert!(Cli::try_parse_from(["calcs", "401k", "--current-age", "40"]).is_ok());
    }

    #[test]
    fn render_command_prints_camel_case_json() {
        let json = render_command(Command::Rent(RentPayload::default())).expect("defaults");
        assert!(json.contains("\"maxRentAt30Percent\": 1875.0"));
        assert!(json.contains("\"debtBand\": \"healthy\""));

        let err = render_command(Command::Ira(IraPayload {
            current_age: Some(70.0),
            retirement_age: Some(60.0),
            ..IraPayload::default()
        }))
        .expect_err("retirement before current age");
        assert!(err.contains("retirementAge"));
    }

    #[tokio::test]
    async fn successful_response_is_json_without_caching() {
        let response = calculator_response(AmortizationPayload::default());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).map(|v| v.as_bytes()),
            Some("no-store".as_bytes())
        );
        let body = body_json(response).await;
        assert_eq!(body["rows"].as_array().map(Vec::len), Some(360));
        let payment = body["summary"]["scheduledPayment"].as_f64().expect("payment");
        assert!((payment - 1_580.17).abs() < 0.01);
    }

    #[tokio::test]
    async fn invalid_input_maps_to_bad_request() {
        let response = calculator_response(Retirement401kPayload {
            current_age: Some(65.0),
            retirement_age: Some(60.0),
            ..Retirement401kPayload::default()
        });
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["kind"], "invalidInput");
        assert_eq!(body["field"], "retirementAge");
        assert!(body["error"].as_str().is_some_and(|e| e.contains("retirementAge")));
    }

    #[tokio::test]
    async fn non_convergent_payoff_maps_to_unprocessable() {
        let response = calculator_response(PaymentPayload {
            loan_amount: Some(100_000.0),
            annual_rate_percent: Some(12.0),
            monthly_payment: Some(900.0),
            ..PaymentPayload::default()
        });
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["kind"], "nonConvergent");
    }

    #[tokio::test]
    async fn unknown_paths_return_json_not_found() {
        let response = not_found_handler().await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Not found");
        assert!(body.get("kind").is_none());
    }

    async fn send(request: axum::http::Request<axum::body::Body>) -> Response {
        use tower::ServiceExt;
        router().oneshot(request).await.expect("infallible router")
    }

    fn get_request(uri: &str) -> axum::http::Request<axum::body::Body> {
        axum::http::Request::builder()
            .uri(uri)
            .body(axum::body::Body::empty())
            .expect("valid request")
    }

    #[tokio::test]
    async fn rent_query_accepts_grouped_income() {
        let response = send(get_request("/api/rent?income=75%2C000")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["monthlyIncome"].as_f64(), Some(6_250.0));
    }

    #[tokio::test]
    async fn debt_query_accepts_encoded_json_list() {
        let uri = concat!(
            "/api/debt-payoff?extraMonthly=100&debts=",
            "%5B%7B%22name%22%3A%22card%22%2C%22balance%22%3A1000%2C",
            "%22minPayment%22%3A50%2C%22rate%22%3A20%7D%5D",
        );
        let response = send(get_request(uri)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["payoffEvents"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["payoffEvents"][0]["debtName"], "card");
    }

    #[tokio::test]
    async fn rent_post_reads_json_body() {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/api/rent")
            .header(header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(r#"{"income":"6000","incomePeriod":"monthly"}"#))
            .expect("valid request");
        let response = send(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["monthlyIncome"].as_f64(), Some(6_000.0));
    }

    #[tokio::test]
    async fn router_falls_back_to_json_not_found() {
        let response = send(get_request("/api/unknown")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "Not found");
    }

    #[tokio::test]
    async fn health_reports_version() {
        let body = body_json(health_handler().await).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }
}
