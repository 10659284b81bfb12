mod accumulation;
mod affordability;
mod amortization;
mod avalanche;
mod calculators;
mod error;
mod solver;
mod types;

pub use accumulation::{MAX_ACCUMULATION_YEARS, accumulate, run_tax_tracks, year_summaries};
pub use affordability::{RENT_SHARES_PERCENT, monthly_income, rent_affordability};
pub use amortization::{
    BALANCE_EPSILON, MAX_SCHEDULE_PERIODS, amortize, amortize_with_payment, level_payment,
    periodic_rate, solve_term,
};
pub use avalanche::{MAX_PAYOFF_MONTHS, simulate_avalanche};
pub use calculators::{
    AmortizationCalcInput, AutoLoanInput, AutoLoanResult, CollegeCostRow, CollegeInput,
    CollegeResult, IraInput, IraResult, PaymentInput, PaymentMode, PaymentResult,
    PersonalLoanInput, PersonalLoanResult, Retirement401kInput, Retirement401kResult,
    Retirement401kRow, SavingsInput, SavingsResult, run_401k, run_amortization,
    run_auto_loan, run_college, run_ira, run_payment, run_personal_loan, run_savings,
};
pub use error::{CalcError, CalcResult};
pub use solver::{
    AprSolveConfig, AprSolveIteration, AprSolveResult, approximate_real_apr, present_value,
    solve_effective_apr,
};
pub use types::{
    AccumulationInput, AccumulationRow, AccumulationSchedule, AccumulationSummary,
    AmortizationRow, AmortizationSchedule, AmortizationSummary, AnnualLumpSum, BaselineOutcome,
    CompoundingFrequency, Debt, DebtPayoffInput, DebtPayoffResult, DtiBand, ExtraBudget,
    ExtraPayments, IncomePeriod, LoanInput, OneTimePayment, PayoffEvent, PayoffMonthRow,
    PayoffSummary, RentInput, RentResult, RentTier, ScheduledExtra, TaxTrackInput, TaxTrackRow,
    TaxTrackSchedule, TaxTrackSummary, TrackBalances, YearSummary,
};
