use super::error::{CalcResult, ensure_non_negative};
use super::types::{DtiBand, IncomePeriod, RentInput, RentResult, RentTier};

pub const RENT_SHARES_PERCENT: [f64; 3] = [25.0, 30.0, 33.0];
const GUIDELINE_SHARE_PERCENT: f64 = 30.0;

impl DtiBand {
    pub fn classify(ratio_percent: f64) -> Self {
        if ratio_percent < 20.0 {
            DtiBand::Healthy
        } else if ratio_percent < 36.0 {
            DtiBand::Manageable
        } else if ratio_percent <= 43.0 {
            DtiBand::Stretched
        } else {
            DtiBand::Critical
        }
    }
}

pub fn monthly_income(income: f64, period: IncomePeriod) -> f64 {
    match period {
        IncomePeriod::Annual => income / 12.0,
        IncomePeriod::Monthly => income,
    }
}

fn ratio_percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 { part / whole * 100.0 } else { 0.0 }
}

pub fn rent_affordability(input: &RentInput) -> CalcResult<RentResult> {
    let income = ensure_non_negative("income", input.income)?;
    let monthly_debts = ensure_non_negative("monthlyDebts", input.monthly_debts)?;
    let monthly_income = monthly_income(income, input.income_period);

    let tiers = RENT_SHARES_PERCENT
        .iter()
        .map(|share| RentTier {
            percent_of_income: *share,
            max_rent: monthly_income * share / 100.0,
        })
        .collect::<Vec<_>>();
    let max_rent_at_30_percent = monthly_income * GUIDELINE_SHARE_PERCENT / 100.0;

    let debt_to_income_percent = ratio_percent(monthly_debts, monthly_income);
    // Without income every obligation is unaffordable.
    let debt_band = if monthly_income > 0.0 || monthly_debts == 0.0 {
        DtiBand::classify(debt_to_income_percent)
    } else {
        DtiBand::Critical
    };
    let total_obligation_percent =
        ratio_percent(monthly_debts + max_rent_at_30_percent, monthly_income);
    let total_obligation_band = if monthly_income > 0.0 {
        DtiBand::classify(total_obligation_percent)
    } else {
        debt_band
    };

    Ok(RentResult {
        monthly_income,
        monthly_debts,
        tiers,
        max_rent_at_30_percent,
        debt_to_income_percent,
        debt_band,
        total_obligation_percent,
        total_obligation_band,
        residual_income: monthly_income - monthly_debts - max_rent_at_30_percent,
    })
}
