use serde::Serialize;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompoundingFrequency {
    Annually,
    Semiannually,
    Quarterly,
    #[default]
    Monthly,
    Biweekly,
    Weekly,
    Daily,
}

impl CompoundingFrequency {
    pub fn periods_per_year(self) -> u32 {
        match self {
            CompoundingFrequency::Annually => 1,
            CompoundingFrequency::Semiannually => 2,
            CompoundingFrequency::Quarterly => 4,
            CompoundingFrequency::Monthly => 12,
            CompoundingFrequency::Biweekly => 26,
            CompoundingFrequency::Weekly => 52,
            CompoundingFrequency::Daily => 365,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct OneTimePayment {
    /// 1-based period the payment lands in.
    pub period_index: u32,
    pub amount: f64,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AnnualLumpSum {
    /// Calendar month, 1 = January.
    pub month: u32,
    pub amount: f64,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ExtraPayments {
    pub per_period: f64,
    pub one_time: Option<OneTimePayment>,
    pub annual: Option<AnnualLumpSum>,
    /// Calendar month of the first period, 1 = January.
    pub start_month: u32,
}

impl Default for ExtraPayments {
    fn default() -> Self {
        Self {
            per_period: 0.0,
            one_time: None,
            annual: None,
            start_month: 1,
        }
    }
}

impl ExtraPayments {
    pub fn is_empty(&self) -> bool {
        self.per_period <= 0.0
            && self.one_time.is_none_or(|p| p.amount <= 0.0)
            && self.annual.is_none_or(|p| p.amount <= 0.0)
    }

    pub(crate) fn without_payments(&self) -> Self {
        Self {
            start_month: self.start_month,
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoanInput {
    pub principal: f64,
    pub annual_rate_percent: f64,
    pub term_periods: u32,
    pub periods_per_year: u32,
    pub extra: ExtraPayments,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AmortizationRow {
    pub period_index: u32,
    pub calendar_month: u32,
    pub starting_balance: f64,
    pub payment: f64,
    /// Includes `extra_principal`.
    pub principal_portion: f64,
    pub interest_portion: f64,
    pub extra_principal: f64,
    pub ending_balance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AmortizationSummary {
    pub scheduled_payment: f64,
    pub total_payment: f64,
    pub total_interest: f64,
    pub total_principal: f64,
    pub periods: u32,
    pub payoff_years: f64,
    /// Interest avoided versus the same loan without extra payments.
    pub interest_saved: f64,
    pub periods_saved: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AmortizationSchedule {
    pub summary: AmortizationSummary,
    pub rows: Vec<AmortizationRow>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AccumulationInput {
    pub initial_balance: f64,
    pub periodic_contribution: f64,
    pub annual_rate_percent: f64,
    pub periods: u32,
    pub periods_per_year: u32,
    /// Yearly raise applied to the contribution, compounded.
    pub contribution_growth_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccumulationRow {
    pub period_index: u32,
    pub year: u32,
    pub starting_balance: f64,
    pub contribution: f64,
    pub interest_earned: f64,
    pub ending_balance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccumulationSummary {
    pub initial_balance: f64,
    pub total_contributions: f64,
    pub total_interest: f64,
    pub final_balance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearSummary {
    pub year: u32,
    pub contributions: f64,
    pub interest_earned: f64,
    pub ending_balance: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccumulationSchedule {
    pub summary: AccumulationSummary,
    pub rows: Vec<AccumulationRow>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TaxTrackInput {
    pub initial_balance: f64,
    pub annual_contribution: f64,
    pub annual_rate_percent: f64,
    pub years: u32,
    pub periods_per_year: u32,
    pub contribution_growth_percent: f64,
    pub current_tax_rate_percent: f64,
    pub retirement_tax_rate_percent: f64,
}

/// One value per tax treatment, always advanced together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackBalances {
    /// Pre-tax contributions, taxed on withdrawal.
    pub tax_deferred: f64,
    /// After-tax contributions, gains never taxed.
    pub tax_free: f64,
    /// After-tax contributions, gains taxed every year.
    pub taxable: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxTrackRow {
    pub year: u32,
    pub gross_contribution: f64,
    pub deposits: TrackBalances,
    pub interest_earned: TrackBalances,
    pub taxable_tax_paid: f64,
    pub ending_balance: TrackBalances,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxTrackSummary {
    pub total_gross_contributions: f64,
    pub total_taxable_tax_paid: f64,
    pub final_balance: TrackBalances,
    pub after_tax_balance: TrackBalances,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxTrackSchedule {
    pub summary: TaxTrackSummary,
    pub rows: Vec<TaxTrackRow>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Debt {
    pub name: String,
    pub balance: f64,
    pub min_payment: f64,
    pub annual_rate_percent: f64,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScheduledExtra {
    pub amount: f64,
    /// 1-based simulation month of the first (or only) payment.
    pub month: u32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ExtraBudget {
    pub monthly: f64,
    pub annual: Option<ScheduledExtra>,
    pub one_time: Option<ScheduledExtra>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DebtPayoffInput {
    pub debts: Vec<Debt>,
    pub extra: ExtraBudget,
    /// Add the minimum of each paid-off debt to the extra budget.
    pub rollover_freed_minimums: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoffEvent {
    pub debt_name: String,
    pub payoff_month: u32,
    pub total_interest_paid: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoffMonthRow {
    pub month: u32,
    pub interest_accrued: f64,
    pub minimum_paid: f64,
    pub extra_paid: f64,
    pub remaining_balance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoffSummary {
    pub months: u32,
    pub total_interest: f64,
    pub total_paid: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum BaselineOutcome {
    Converged(PayoffSummary),
    #[serde(rename_all = "camelCase")]
    NotConverged {
        months_simulated: u32,
        interest_accrued: f64,
        remaining_balance: f64,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtPayoffResult {
    pub strategy: PayoffSummary,
    pub baseline: BaselineOutcome,
    pub months_saved: Option<u32>,
    pub interest_saved: Option<f64>,
    pub payoff_events: Vec<PayoffEvent>,
    pub rows: Vec<PayoffMonthRow>,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IncomePeriod {
    #[default]
    Annual,
    Monthly,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RentInput {
    pub income: f64,
    pub income_period: IncomePeriod,
    pub monthly_debts: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DtiBand {
    Healthy,
    Manageable,
    Stretched,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RentTier {
    pub percent_of_income: f64,
    pub max_rent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RentResult {
    pub monthly_income: f64,
    pub monthly_debts: f64,
    pub tiers: Vec<RentTier>,
    pub max_rent_at_30_percent: f64,
    pub debt_to_income_percent: f64,
    pub debt_band: DtiBand,
    pub total_obligation_percent: f64,
    pub total_obligation_band: DtiBand,
    pub residual_income: f64,
}
