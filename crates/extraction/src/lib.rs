pub mod ade;
pub mod pattern;

pub use ade::AdeClient;
pub use pattern::PatternExtractor;

use analysis_core::{ExtractedFields, FieldValue};

/// Extraction target fields, addressable by name so the service client and
/// the pattern extractor share one assignment path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Field {
    RevenueCurrent,
    RevenuePrior,
    OperatingIncome,
    NetIncome,
    TotalAssets,
    TotalLiabilities,
    ShareholdersEquity,
    CashEquivalents,
    TotalDebt,
    SharesOutstanding,
    CeoTotalComp,
    CeoBaseSalary,
    SayOnPayApprovalPct,
    BoardSize,
    IndependentDirectors,
    AverageDirectorTenure,
}

impl Field {
    pub(crate) const ALL: [Field; 16] = [
        Field::RevenueCurrent,
        Field::RevenuePrior,
        Field::OperatingIncome,
        Field::NetIncome,
        Field::TotalAssets,
        Field::TotalLiabilities,
        Field::ShareholdersEquity,
        Field::CashEquivalents,
        Field::TotalDebt,
        Field::SharesOutstanding,
        Field::CeoTotalComp,
        Field::CeoBaseSalary,
        Field::SayOnPayApprovalPct,
        Field::BoardSize,
        Field::IndependentDirectors,
        Field::AverageDirectorTenure,
    ];

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Field::RevenueCurrent => "revenue_current",
            Field::RevenuePrior => "revenue_prior",
            Field::OperatingIncome => "operating_income",
            Field::NetIncome => "net_income",
            Field::TotalAssets => "total_assets",
            Field::TotalLiabilities => "total_liabilities",
            Field::ShareholdersEquity => "shareholders_equity",
            Field::CashEquivalents => "cash_equivalents",
            Field::TotalDebt => "total_debt",
            Field::SharesOutstanding => "shares_outstanding",
            Field::CeoTotalComp => "ceo_total_comp",
            Field::CeoBaseSalary => "ceo_base_salary",
            Field::SayOnPayApprovalPct => "say_on_pay_approval_pct",
            Field::BoardSize => "board_size",
            Field::IndependentDirectors => "independent_directors",
            Field::AverageDirectorTenure => "average_director_tenure",
        }
    }

    pub(crate) fn from_name(name: &str) -> Option<Field> {
        Field::ALL.iter().copied().find(|f| f.name() == name)
    }

    pub(crate) fn slot<'a>(&self, fields: &'a mut ExtractedFields) -> &'a mut FieldValue {
        match self {
            Field::RevenueCurrent => &mut fields.revenue_current,
            Field::RevenuePrior => &mut fields.revenue_prior,
            Field::OperatingIncome => &mut fields.operating_income,
            Field::NetIncome => &mut fields.net_income,
            Field::TotalAssets => &mut fields.total_assets,
            Field::TotalLiabilities => &mut fields.total_liabilities,
            Field::ShareholdersEquity => &mut fields.shareholders_equity,
            Field::CashEquivalents => &mut fields.cash_equivalents,
            Field::TotalDebt => &mut fields.total_debt,
            Field::SharesOutstanding => &mut fields.shares_outstanding,
            Field::CeoTotalComp => &mut fields.ceo_total_comp,
            Field::CeoBaseSalary => &mut fields.ceo_base_salary,
            Field::SayOnPayApprovalPct => &mut fields.say_on_pay_approval_pct,
            Field::BoardSize => &mut fields.board_size,
            Field::IndependentDirectors => &mut fields.independent_directors,
            Field::AverageDirectorTenure => &mut fields.average_director_tenure,
        }
    }
}
