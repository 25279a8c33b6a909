//! Declarative fact-matching rules and their compiled lookup form.
//!
//! Each output column owns a priority-ordered list of rules; a rule's
//! position in the list is its priority (0 is best). The same financial
//! concept surfaces under different element names across taxonomy
//! generations, so earlier rules carry the canonical names and later rules
//! the fallbacks.
//!
//! At extraction time the tables are compiled into two hash indexes (by tag
//! local name and by `name`-attribute suffix) plus a short list of custom
//! predicates scanned per element. That turns per-document work into a
//! single traversal with O(1) rule lookup per element instead of one tree
//! query per column.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::value::ParserKind;

/// How a rule decides whether an element carries its fact.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Head {
    /// Element's namespace-stripped tag name equals the literal.
    Tag(&'static str),
    /// Element has a `name` attribute whose part after the last `:` equals
    /// the literal.
    NameAttr(&'static str),
    /// Caller-supplied predicate over the element's shape.
    Custom(CustomPredicate),
}

/// Predicate over `(local_name, name_suffix, context_ref)`.
pub(crate) type CustomPredicate =
    fn(local_name: &str, name_suffix: Option<&str>, context_ref: Option<&str>) -> bool;

/// Which element(s) of a match supply the text to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Expand {
    /// The matched element itself.
    Matched,
    /// The matched element, then its first descendant `<span>`. Inline XBRL
    /// wraps some facts in presentational spans nested below the tagged
    /// element.
    MatchedThenFirstSpan,
}

/// One candidate rule of a column.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RuleDef {
    pub(crate) head: Head,
    pub(crate) parser: ParserKind,
    pub(crate) expand: Expand,
}

/// A named output column and its ordered candidate rules.
#[derive(Debug)]
pub(crate) struct ColumnDef {
    pub(crate) name: &'static str,
    pub(crate) rules: &'static [RuleDef],
}

const fn tag(name: &'static str, parser: ParserKind) -> RuleDef {
    RuleDef {
        head: Head::Tag(name),
        parser,
        expand: Expand::Matched,
    }
}

const fn name_attr(name: &'static str, parser: ParserKind) -> RuleDef {
    RuleDef {
        head: Head::NameAttr(name),
        parser,
        expand: Expand::Matched,
    }
}

const fn custom(predicate: CustomPredicate, parser: ParserKind) -> RuleDef {
    RuleDef {
        head: Head::Custom(predicate),
        parser,
        expand: Expand::Matched,
    }
}

fn creditors_within_one_year(
    _local_name: &str,
    name_suffix: Option<&str>,
    context_ref: Option<&str>,
) -> bool {
    name_suffix == Some("Creditors") && context_ref.is_some_and(|c| c.contains("WithinOneYear"))
}

fn creditors_after_one_year(
    _local_name: &str,
    name_suffix: Option<&str>,
    context_ref: Option<&str>,
) -> bool {
    name_suffix == Some("Creditors") && context_ref.is_some_and(|c| c.contains("AfterOneYear"))
}

fn equity_share_capital(
    _local_name: &str,
    name_suffix: Option<&str>,
    context_ref: Option<&str>,
) -> bool {
    name_suffix == Some("Equity") && context_ref.is_some_and(|c| c.contains("ShareCapital"))
}

fn equity_retained_earnings(
    _local_name: &str,
    name_suffix: Option<&str>,
    context_ref: Option<&str>,
) -> bool {
    name_suffix == Some("Equity")
        && context_ref.is_some_and(|c| c.contains("RetainedEarningsAccumulatedLosses"))
}

fn equity_unsegmented(
    _local_name: &str,
    name_suffix: Option<&str>,
    context_ref: Option<&str>,
) -> bool {
    name_suffix == Some("Equity") && context_ref.is_none_or(|c| !c.contains("segment"))
}

/// Per-document general attributes, in output-schema order.
pub(crate) static GENERAL_COLUMNS: &[ColumnDef] = &[
    ColumnDef {
        name: "balance_sheet_date",
        rules: &[
            name_attr("BalanceSheetDate", ParserKind::Date),
            tag("BalanceSheetDate", ParserKind::Date),
        ],
    },
    ColumnDef {
        name: "companies_house_registered_number",
        rules: &[
            name_attr("UKCompaniesHouseRegisteredNumber", ParserKind::Text),
            tag("CompaniesHouseRegisteredNumber", ParserKind::Text),
        ],
    },
    ColumnDef {
        name: "entity_current_legal_name",
        rules: &[
            RuleDef {
                head: Head::NameAttr("EntityCurrentLegalOrRegisteredName"),
                parser: ParserKind::Text,
                expand: Expand::MatchedThenFirstSpan,
            },
            tag("EntityCurrentLegalName", ParserKind::Text),
        ],
    },
    ColumnDef {
        name: "company_dormant",
        rules: &[
            name_attr("EntityDormantTruefalse", ParserKind::Flag),
            name_attr("EntityDormant", ParserKind::Flag),
            tag("CompanyDormant", ParserKind::Flag),
            tag("CompanyNotDormant", ParserKind::ReversedFlag),
        ],
    },
    ColumnDef {
        name: "average_number_employees_during_period",
        rules: &[
            name_attr("AverageNumberEmployeesDuringPeriod", ParserKind::EmployeeCount),
            name_attr("EmployeesTotal", ParserKind::EmployeeCount),
            tag("AverageNumberEmployeesDuringPeriod", ParserKind::EmployeeCount),
            tag("EmployeesTotal", ParserKind::EmployeeCount),
        ],
    },
];

/// Per-period balance-sheet and income-statement attributes, in
/// output-schema order.
pub(crate) static PERIODIC_COLUMNS: &[ColumnDef] = &[
    ColumnDef {
        name: "tangible_fixed_assets",
        rules: &[
            tag("FixedAssets", ParserKind::Number),
            name_attr("FixedAssets", ParserKind::Number),
            tag("TangibleFixedAssets", ParserKind::Number),
            name_attr("TangibleFixedAssets", ParserKind::Number),
            name_attr("PropertyPlantEquipment", ParserKind::Number),
        ],
    },
    ColumnDef {
        name: "debtors",
        rules: &[
            tag("Debtors", ParserKind::Number),
            name_attr("Debtors", ParserKind::Number),
        ],
    },
    ColumnDef {
        name: "cash_bank_in_hand",
        rules: &[
            tag("CashBankInHand", ParserKind::Number),
            name_attr("CashBankInHand", ParserKind::Number),
            name_attr("CashBankOnHand", ParserKind::Number),
        ],
    },
    ColumnDef {
        name: "current_assets",
        rules: &[
            tag("CurrentAssets", ParserKind::Number),
            name_attr("CurrentAssets", ParserKind::Number),
        ],
    },
    ColumnDef {
        name: "creditors_due_within_one_year",
        rules: &[
            name_attr("CreditorsDueWithinOneYear", ParserKind::Number),
            custom(creditors_within_one_year, ParserKind::Number),
        ],
    },
    ColumnDef {
        name: "creditors_due_after_one_year",
        rules: &[
            name_attr("CreditorsDueAfterOneYear", ParserKind::Number),
            custom(creditors_after_one_year, ParserKind::Number),
        ],
    },
    ColumnDef {
        name: "net_current_assets_liabilities",
        rules: &[
            tag("NetCurrentAssetsLiabilities", ParserKind::Number),
            name_attr("NetCurrentAssetsLiabilities", ParserKind::Number),
        ],
    },
    ColumnDef {
        name: "total_assets_less_current_liabilities",
        rules: &[
            tag("TotalAssetsLessCurrentLiabilities", ParserKind::Number),
            name_attr("TotalAssetsLessCurrentLiabilities", ParserKind::Number),
        ],
    },
    ColumnDef {
        name: "net_assets_liabilities_including_pension_asset_liability",
        rules: &[
            tag("NetAssetsLiabilitiesIncludingPensionAssetLiability", ParserKind::Number),
            name_attr("NetAssetsLiabilitiesIncludingPensionAssetLiability", ParserKind::Number),
            tag("NetAssetsLiabilities", ParserKind::Number),
            name_attr("NetAssetsLiabilities", ParserKind::Number),
        ],
    },
    ColumnDef {
        name: "called_up_share_capital",
        rules: &[
            tag("CalledUpShareCapital", ParserKind::Number),
            name_attr("CalledUpShareCapital", ParserKind::Number),
            custom(equity_share_capital, ParserKind::Number),
        ],
    },
    ColumnDef {
        name: "profit_loss_account_reserve",
        rules: &[
            tag("ProfitLossAccountReserve", ParserKind::Number),
            name_attr("ProfitLossAccountReserve", ParserKind::Number),
            custom(equity_retained_earnings, ParserKind::Number),
        ],
    },
    ColumnDef {
        name: "shareholder_funds",
        rules: &[
            tag("ShareholderFunds", ParserKind::Number),
            name_attr("ShareholderFunds", ParserKind::Number),
            custom(equity_unsegmented, ParserKind::Number),
        ],
    },
    ColumnDef {
        name: "turnover_gross_operating_revenue",
        rules: &[
            tag("TurnoverGrossOperatingRevenue", ParserKind::Number),
            name_attr("TurnoverGrossOperatingRevenue", ParserKind::Number),
            tag("TurnoverRevenue", ParserKind::Number),
            name_attr("TurnoverRevenue", ParserKind::Number),
        ],
    },
    ColumnDef {
        name: "other_operating_income",
        rules: &[
            tag("OtherOperatingIncome", ParserKind::Number),
            name_attr("OtherOperatingIncome", ParserKind::Number),
            tag("OtherOperatingIncomeFormat2", ParserKind::Number),
            name_attr("OtherOperatingIncomeFormat2", ParserKind::Number),
        ],
    },
    ColumnDef {
        name: "cost_sales",
        rules: &[
            tag("CostSales", ParserKind::Number),
            name_attr("CostSales", ParserKind::Number),
        ],
    },
    ColumnDef {
        name: "gross_profit_loss",
        rules: &[
            tag("GrossProfitLoss", ParserKind::Number),
            name_attr("GrossProfitLoss", ParserKind::Number),
        ],
    },
    ColumnDef {
        name: "administrative_expenses",
        rules: &[
            tag("AdministrativeExpenses", ParserKind::Number),
            name_attr("AdministrativeExpenses", ParserKind::Number),
        ],
    },
    ColumnDef {
        name: "raw_materials_consumables",
        rules: &[
            tag("RawMaterialsConsumables", ParserKind::Number),
            name_attr("RawMaterialsConsumables", ParserKind::Number),
            tag("RawMaterialsConsumablesUsed", ParserKind::Number),
            name_attr("RawMaterialsConsumablesUsed", ParserKind::Number),
        ],
    },
    ColumnDef {
        name: "staff_costs",
        rules: &[
            tag("StaffCosts", ParserKind::Number),
            name_attr("StaffCosts", ParserKind::Number),
            tag("StaffCostsEmployeeBenefitsExpense", ParserKind::Number),
            name_attr("StaffCostsEmployeeBenefitsExpense", ParserKind::Number),
        ],
    },
    ColumnDef {
        name: "depreciation_other_amounts_written_off_tangible_intangible_fixed_assets",
        rules: &[
            tag(
                "DepreciationOtherAmountsWrittenOffTangibleIntangibleFixedAssets",
                ParserKind::Number,
            ),
            name_attr(
                "DepreciationOtherAmountsWrittenOffTangibleIntangibleFixedAssets",
                ParserKind::Number,
            ),
            tag("DepreciationAmortisationImpairmentExpense", ParserKind::Number),
            name_attr("DepreciationAmortisationImpairmentExpense", ParserKind::Number),
        ],
    },
    ColumnDef {
        name: "other_operating_charges_format2",
        rules: &[
            tag("OtherOperatingChargesFormat2", ParserKind::Number),
            name_attr("OtherOperatingChargesFormat2", ParserKind::Number),
            tag("OtherOperatingExpensesFormat2", ParserKind::Number),
            name_attr("OtherOperatingExpensesFormat2", ParserKind::Number),
        ],
    },
    ColumnDef {
        name: "operating_profit_loss",
        rules: &[
            tag("OperatingProfitLoss", ParserKind::Number),
            name_attr("OperatingProfitLoss", ParserKind::Number),
        ],
    },
    ColumnDef {
        name: "profit_loss_on_ordinary_activities_before_tax",
        rules: &[
            tag("ProfitLossOnOrdinaryActivitiesBeforeTax", ParserKind::Number),
            name_attr("ProfitLossOnOrdinaryActivitiesBeforeTax", ParserKind::Number),
        ],
    },
    ColumnDef {
        name: "tax_on_profit_or_loss_on_ordinary_activities",
        rules: &[
            tag("TaxOnProfitOrLossOnOrdinaryActivities", ParserKind::Number),
            name_attr("TaxOnProfitOrLossOnOrdinaryActivities", ParserKind::Number),
            tag("TaxTaxCreditOnProfitOrLossOnOrdinaryActivities", ParserKind::Number),
            name_attr("TaxTaxCreditOnProfitOrLossOnOrdinaryActivities", ParserKind::Number),
        ],
    },
    ColumnDef {
        name: "profit_loss_for_period",
        rules: &[
            tag("ProfitLoss", ParserKind::Number),
            name_attr("ProfitLoss", ParserKind::Number),
            tag("ProfitLossForPeriod", ParserKind::Number),
            name_attr("ProfitLossForPeriod", ParserKind::Number),
        ],
    },
];

/// Which accumulator a compiled rule feeds, and the column index within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    /// Per-document store, index into [`GENERAL_COLUMNS`].
    General(usize),
    /// Per-period store, index into [`PERIODIC_COLUMNS`].
    Periodic(usize),
}

/// A rule resolved to its accumulator target and priority.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CompiledRule {
    pub(crate) target: Target,
    pub(crate) priority: usize,
    pub(crate) parser: ParserKind,
    pub(crate) expand: Expand,
}

/// The rule tables compiled into the per-element lookup structures.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    by_tag: HashMap<&'static str, Vec<CompiledRule>>,
    by_name_suffix: HashMap<&'static str, Vec<CompiledRule>>,
    custom: Vec<(CustomPredicate, CompiledRule)>,
}

static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::compile);

impl Registry {
    /// The registry compiled from the fixed rule tables.
    pub(crate) fn global() -> &'static Self {
        &REGISTRY
    }

    fn compile() -> Self {
        let mut registry = Self::default();
        for (index, column) in GENERAL_COLUMNS.iter().enumerate() {
            registry.add_column(Target::General(index), column);
        }
        for (index, column) in PERIODIC_COLUMNS.iter().enumerate() {
            registry.add_column(Target::Periodic(index), column);
        }
        registry
    }

    fn add_column(&mut self, target: Target, column: &'static ColumnDef) {
        for (priority, rule) in column.rules.iter().enumerate() {
            let compiled = CompiledRule {
                target,
                priority,
                parser: rule.parser,
                expand: rule.expand,
            };
            match rule.head {
                Head::Tag(name) => self.by_tag.entry(name).or_default().push(compiled),
                Head::NameAttr(name) => {
                    self.by_name_suffix.entry(name).or_default().push(compiled);
                }
                Head::Custom(predicate) => self.custom.push((predicate, compiled)),
            }
        }
    }

    /// Rules keyed on the element's tag local name.
    pub(crate) fn tag_rules(&self, local_name: &str) -> &[CompiledRule] {
        self.by_tag.get(local_name).map_or(&[], Vec::as_slice)
    }

    /// Rules keyed on the element's `name`-attribute suffix.
    pub(crate) fn name_suffix_rules(&self, suffix: &str) -> &[CompiledRule] {
        self.by_name_suffix.get(suffix).map_or(&[], Vec::as_slice)
    }

    /// Custom rules, evaluated for every element.
    pub(crate) fn custom_rules(&self) -> &[(CustomPredicate, CompiledRule)] {
        &self.custom
    }
}
