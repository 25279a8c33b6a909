//! Single-pass extraction of rows from one accounts document.
//!
//! The walker visits every element of the document exactly once, looks up
//! candidate rules through the compiled registry and feeds two keyed
//! accumulators: one for general (per-document) attributes and one for
//! periodic (per-context-period) attributes. Both keep the best-priority
//! value seen so far, with deliberately different tie handling: a general
//! fact at equal priority overwrites (the last occurrence in document order
//! wins, which tends to be the most recent period's presentation), while a
//! periodic fact requires a strictly better priority (the first occurrence
//! wins). Fixture reproducibility depends on this asymmetry.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::context::{ContextTable, PeriodSpan};
use crate::dom::Document;
use crate::error::{ExtractError, Result};
use crate::row::{DocumentName, Row};
use crate::rules::{CompiledRule, Expand, GENERAL_COLUMNS, PERIODIC_COLUMNS, Registry, Target};
use crate::value::{FactAttrs, Value, parse_fact};

/// Taxonomy namespaces recognised in the `taxonomy` output column.
const ALLOWED_TAXONOMIES: &[&str] = &[
    "http://www.xbrl.org/uk/fr/gaap/pt/2004-12-01",
    "http://www.xbrl.org/uk/gaap/core/2009-09-01",
    "http://xbrl.frc.org.uk/fr/2014-09-01/core",
];

/// Worse than any real rule priority.
const SENTINEL_PRIORITY: usize = usize::MAX;

/// Accumulator slot: best priority seen and the value stored at it.
type Slot = (usize, Option<Value>);

/// Extract all rows from one accounts document.
///
/// Produces one row per reported period, newest first, or a single row when
/// the document has no resolvable periods. Malformed XML and uncoercible
/// values degrade to a sentinel row rather than an error: the only failure
/// surfaced to the caller is a filename that does not match the bulk-data
/// naming convention.
pub fn document_to_rows(filename: &str, content: &[u8]) -> Result<Vec<Row>> {
    let name = DocumentName::parse(filename)?;

    let doc = match Document::parse(content) {
        Ok(doc) => doc,
        Err(err) => {
            log::warn!("{filename}: {err}; extracting nothing");
            Document::default()
        }
    };
    let taxonomy = declared_taxonomies(&doc);

    match extract(&doc, &name, &taxonomy) {
        Ok(rows) => Ok(rows),
        Err(err) => {
            let mut row = Row::new(&name, taxonomy);
            row.error = Some(err.to_string());
            Ok(vec![row])
        }
    }
}

/// `;`-joined intersection of root namespaces with the allow-list.
fn declared_taxonomies(doc: &Document) -> String {
    let declared = doc.root_namespaces();
    ALLOWED_TAXONOMIES
        .iter()
        .filter(|uri| declared.contains(uri))
        .copied()
        .collect::<Vec<_>>()
        .join(";")
}

fn extract(doc: &Document, name: &DocumentName, taxonomy: &str) -> Result<Vec<Row>> {
    let registry = Registry::global();
    let contexts = ContextTable::build(doc);

    let mut general: Vec<Slot> = vec![(SENTINEL_PRIORITY, None); GENERAL_COLUMNS.len()];
    let mut periodic: BTreeMap<PeriodSpan, Vec<Slot>> = BTreeMap::new();

    for id in doc.element_ids() {
        let local_name = doc.local_name(id);
        let name_suffix = doc
            .attr(id, "name")
            .and_then(|value| value.rsplit_once(':'))
            .map(|(_, suffix)| suffix);
        let context_ref = doc.attr(id, "contextRef");

        for rule in registry.tag_rules(local_name) {
            dispatch(doc, id, rule, context_ref, &contexts, &mut general, &mut periodic)?;
        }
        if let Some(suffix) = name_suffix {
            for rule in registry.name_suffix_rules(suffix) {
                dispatch(doc, id, rule, context_ref, &contexts, &mut general, &mut periodic)?;
            }
        }
        for (predicate, rule) in registry.custom_rules() {
            if predicate(local_name, name_suffix, context_ref) {
                dispatch(doc, id, rule, context_ref, &contexts, &mut general, &mut periodic)?;
            }
        }
    }

    assemble(name, taxonomy, general, periodic)
}

fn dispatch(
    doc: &Document,
    id: usize,
    rule: &CompiledRule,
    context_ref: Option<&str>,
    contexts: &ContextTable,
    general: &mut [Slot],
    periodic: &mut BTreeMap<PeriodSpan, Vec<Slot>>,
) -> Result<()> {
    match rule.target {
        Target::General(column) => {
            if general[column].0 < rule.priority {
                return Ok(());
            }
            if let Some(value) = parse_expanded(doc, id, rule)? {
                general[column] = (rule.priority, Some(value));
            }
        }
        Target::Periodic(column) => {
            let Some(context_ref) = context_ref else {
                return Ok(());
            };
            let Some(span) = contexts.get(context_ref) else {
                // Unknown or undated context: the fact is dropped.
                return Ok(());
            };
            let slots = periodic
                .entry(span.clone())
                .or_insert_with(|| vec![(SENTINEL_PRIORITY, None); PERIODIC_COLUMNS.len()]);
            if slots[column].0 <= rule.priority {
                return Ok(());
            }
            if let Some(value) = parse_expanded(doc, id, rule)? {
                slots[column] = (rule.priority, Some(value));
            }
        }
    }
    Ok(())
}

/// Parse the text of the matched element, or of its expansion elements in
/// turn, returning the first non-absent value.
fn parse_expanded(doc: &Document, id: usize, rule: &CompiledRule) -> Result<Option<Value>> {
    let mut targets = vec![id];
    if rule.expand == Expand::MatchedThenFirstSpan {
        targets.extend(doc.first_span(id));
    }

    for target in targets {
        let attrs = FactAttrs {
            sign: doc.attr(target, "sign"),
            scale: doc.attr(target, "scale"),
            format: doc.attr(target, "format"),
        };
        let text = doc.text(target);
        if let Some(value) = parse_fact(rule.parser, attrs, &text)? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

fn assemble(
    name: &DocumentName,
    taxonomy: &str,
    general: Vec<Slot>,
    periodic: BTreeMap<PeriodSpan, Vec<Slot>>,
) -> Result<Vec<Row>> {
    let general_values: Vec<Option<Value>> =
        general.into_iter().map(|(_, value)| value).collect();

    if periodic.is_empty() {
        let mut row = Row::new(name, taxonomy.to_string());
        row.general = general_values;
        return Ok(vec![row]);
    }

    // ISO date strings order lexicographically as dates, so reverse map
    // order is newest first.
    let mut rows = Vec::with_capacity(periodic.len());
    for (span, slots) in periodic.iter().rev() {
        let mut row = Row::new(name, taxonomy.to_string());
        row.general = general_values.clone();
        row.period_start = Some(parse_iso_date(&span.0)?);
        row.period_end = Some(parse_iso_date(&span.1)?);
        row.periodic = slots.iter().map(|(_, value)| value.clone()).collect();
        rows.push(row);
    }
    Ok(rows)
}

fn parse_iso_date(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| ExtractError::BadDate(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    const NAME: &str = "Prod223_2542_09355500_20230302.html";

    fn number(row: &Row, column: &str) -> Option<Decimal> {
        match row.value(column) {
            Some(Value::Number(number)) => Some(*number),
            _ => None,
        }
    }

    #[test]
    fn test_bad_filename_is_the_only_error() {
        let result = document_to_rows("not-an-accounts-file.html", b"<xbrl/>");
        assert!(matches!(result, Err(ExtractError::BadFilename(_))));
    }

    #[test]
    fn test_unparseable_document_still_yields_a_row() {
        let rows = document_to_rows(NAME, b"complete garbage, no markup").unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.company_id, "09355500");
        assert!(row.error.is_none());
        assert!(row.period_start.is_none());
        assert!(row.general.iter().all(Option::is_none));
    }

    #[test]
    fn test_instant_fact_lands_on_its_period() {
        let xml = "<xbrl>\
            <context id=\"now\"><period><instant>2022-12-31</instant></period></context>\
            <uk:CurrentAssets contextRef=\"now\">259,832</uk:CurrentAssets>\
            </xbrl>";
        let rows = document_to_rows(NAME, xml.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.period_start, NaiveDate::from_ymd_opt(2022, 12, 31));
        assert_eq!(row.period_end, NaiveDate::from_ymd_opt(2022, 12, 31));
        assert_eq!(number(row, "current_assets"), Some(Decimal::from(259_832)));
    }

    #[test]
    fn test_periods_sorted_newest_first() {
        let xml = "<xbrl>\
            <context id=\"prior\"><period><instant>2021-12-31</instant></period></context>\
            <context id=\"current\"><period><instant>2022-12-31</instant></period></context>\
            <uk:Debtors contextRef=\"prior\">10</uk:Debtors>\
            <uk:Debtors contextRef=\"current\">20</uk:Debtors>\
            </xbrl>";
        let rows = document_to_rows(NAME, xml.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].period_end, NaiveDate::from_ymd_opt(2022, 12, 31));
        assert_eq!(number(&rows[0], "debtors"), Some(Decimal::from(20)));
        assert_eq!(rows[1].period_end, NaiveDate::from_ymd_opt(2021, 12, 31));
        assert_eq!(number(&rows[1], "debtors"), Some(Decimal::from(10)));
    }

    #[test]
    fn test_general_attributes_duplicated_across_period_rows() {
        let xml = "<xbrl>\
            <context id=\"c1\"><period><instant>2022-09-30</instant></period></context>\
            <context id=\"c2\"><period><instant>2021-09-01</instant></period></context>\
            <CompaniesHouseRegisteredNumber>NI682066</CompaniesHouseRegisteredNumber>\
            <uk:Debtors contextRef=\"c1\">19633</uk:Debtors>\
            <uk:CalledUpShareCapital contextRef=\"c1\">2</uk:CalledUpShareCapital>\
            <uk:TangibleFixedAssets contextRef=\"c2\">1750</uk:TangibleFixedAssets>\
            </xbrl>";
        let rows = document_to_rows(NAME, xml.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(
                row.value("companies_house_registered_number"),
                Some(&Value::Text("NI682066".to_string()))
            );
        }
        assert_eq!(number(&rows[0], "called_up_share_capital"), Some(Decimal::from(2)));
        assert_eq!(number(&rows[0], "debtors"), Some(Decimal::from(19_633)));
        assert!(number(&rows[0], "tangible_fixed_assets").is_none());
        assert_eq!(number(&rows[1], "tangible_fixed_assets"), Some(Decimal::from(1750)));
        assert!(number(&rows[1], "debtors").is_none());
    }

    #[test]
    fn test_fact_with_unknown_context_dropped() {
        let xml = "<xbrl>\
            <uk:CurrentAssets contextRef=\"ghost\">100</uk:CurrentAssets>\
            </xbrl>";
        let rows = document_to_rows(NAME, xml.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].period_start.is_none());
        assert!(number(&rows[0], "current_assets").is_none());
    }

    #[test]
    fn test_fact_without_context_ref_skipped() {
        let xml = "<xbrl><uk:CurrentAssets>100</uk:CurrentAssets></xbrl>";
        let rows = document_to_rows(NAME, xml.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(number(&rows[0], "current_assets").is_none());
    }

    #[test]
    fn test_general_tie_keeps_last_occurrence() {
        let xml = "<xbrl>\
            <EntityCurrentLegalName>OLD NAME LIMITED</EntityCurrentLegalName>\
            <EntityCurrentLegalName>NEW NAME LIMITED</EntityCurrentLegalName>\
            </xbrl>";
        let rows = document_to_rows(NAME, xml.as_bytes()).unwrap();
        assert_eq!(
            rows[0].value("entity_current_legal_name"),
            Some(&Value::Text("NEW NAME LIMITED".to_string()))
        );
    }

    #[test]
    fn test_general_better_priority_displaces_fallback() {
        let xml = "<xbrl>\
            <CompanyNotDormant>true</CompanyNotDormant>\
            <span name=\"x:EntityDormantTruefalse\">true</span>\
            </xbrl>";
        let rows = document_to_rows(NAME, xml.as_bytes()).unwrap();
        // The reversed fallback said false; the canonical tagging wins.
        assert_eq!(rows[0].value("company_dormant"), Some(&Value::Flag(true)));
    }

    #[test]
    fn test_general_worse_priority_cannot_displace() {
        let xml = "<xbrl>\
            <span name=\"x:EntityDormantTruefalse\">false</span>\
            <CompanyNotDormant>false</CompanyNotDormant>\
            </xbrl>";
        let rows = document_to_rows(NAME, xml.as_bytes()).unwrap();
        assert_eq!(rows[0].value("company_dormant"), Some(&Value::Flag(false)));
    }

    #[test]
    fn test_periodic_tie_keeps_first_occurrence() {
        let xml = "<xbrl>\
            <context id=\"c1\"><period><instant>2022-12-31</instant></period></context>\
            <uk:Debtors contextRef=\"c1\">111</uk:Debtors>\
            <uk:Debtors contextRef=\"c1\">222</uk:Debtors>\
            </xbrl>";
        let rows = document_to_rows(NAME, xml.as_bytes()).unwrap();
        assert_eq!(number(&rows[0], "debtors"), Some(Decimal::from(111)));
    }

    #[test]
    fn test_periodic_better_priority_displaces_fallback() {
        let xml = "<xbrl>\
            <context id=\"c1\"><period><instant>2022-12-31</instant></period></context>\
            <uk:ProfitLossForPeriod contextRef=\"c1\">50</uk:ProfitLossForPeriod>\
            <uk:ProfitLoss contextRef=\"c1\">75</uk:ProfitLoss>\
            </xbrl>";
        let rows = document_to_rows(NAME, xml.as_bytes()).unwrap();
        assert_eq!(number(&rows[0], "profit_loss_for_period"), Some(Decimal::from(75)));
    }

    #[test]
    fn test_null_parse_does_not_block_fallback() {
        let xml = "<xbrl>\
            <span name=\"x:EntityDormantTruefalse\">unknown</span>\
            <CompanyDormant>true</CompanyDormant>\
            </xbrl>";
        let rows = document_to_rows(NAME, xml.as_bytes()).unwrap();
        assert_eq!(rows[0].value("company_dormant"), Some(&Value::Flag(true)));
    }

    #[test]
    fn test_custom_rule_splits_creditors_by_context() {
        let xml = "<xbrl>\
            <context id=\"balWithinOneYear\"><period><instant>2022-12-31</instant></period></context>\
            <context id=\"balAfterOneYear\"><period><instant>2022-12-31</instant></period></context>\
            <span name=\"uk:Creditors\" contextRef=\"balWithinOneYear\">300</span>\
            <span name=\"uk:Creditors\" contextRef=\"balAfterOneYear\">700</span>\
            </xbrl>";
        let rows = document_to_rows(NAME, xml.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            number(&rows[0], "creditors_due_within_one_year"),
            Some(Decimal::from(300))
        );
        assert_eq!(
            number(&rows[0], "creditors_due_after_one_year"),
            Some(Decimal::from(700))
        );
    }

    #[test]
    fn test_bad_value_abandons_document_into_error_row() {
        let xml = "<xbrl>\
            <context id=\"c1\"><period><instant>2022-12-31</instant></period></context>\
            <uk:Debtors contextRef=\"c1\">19633</uk:Debtors>\
            <uk:CurrentAssets contextRef=\"c1\">lots</uk:CurrentAssets>\
            </xbrl>";
        let rows = document_to_rows(NAME, xml.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert!(row.error.as_deref().unwrap().contains("lots"));
        assert_eq!(row.company_id, "09355500");
        assert!(row.period_start.is_none());
        assert!(row.periodic.iter().all(Option::is_none));
        assert!(row.general.iter().all(Option::is_none));
    }

    #[test]
    fn test_unparseable_period_date_becomes_error_row() {
        let xml = "<xbrl>\
            <context id=\"c1\"><period><instant>sometime in 2022</instant></period></context>\
            <uk:Debtors contextRef=\"c1\">10</uk:Debtors>\
            </xbrl>";
        let rows = document_to_rows(NAME, xml.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].error.is_some());
    }

    #[test]
    fn test_taxonomy_intersection() {
        let xml = "<xbrl xmlns:pt=\"http://www.xbrl.org/uk/fr/gaap/pt/2004-12-01\" \
             xmlns:other=\"http://example.test/not-a-taxonomy\"/>";
        let rows = document_to_rows(NAME, xml.as_bytes()).unwrap();
        assert_eq!(rows[0].taxonomy, "http://www.xbrl.org/uk/fr/gaap/pt/2004-12-01");
    }

    #[test]
    fn test_taxonomy_empty_when_none_declared() {
        let rows = document_to_rows(NAME, b"<xbrl xmlns=\"http://www.xbrl.org/2003/instance\"/>").unwrap();
        assert_eq!(rows[0].taxonomy, "");
    }

    #[test]
    fn test_sign_and_scale_applied() {
        let xml = "<xbrl>\
            <context id=\"c1\"><period><instant>2022-12-31</instant></period></context>\
            <span name=\"uk:GrossProfitLoss\" contextRef=\"c1\" sign=\"-\" scale=\"3\">1,234</span>\
            </xbrl>";
        let rows = document_to_rows(NAME, xml.as_bytes()).unwrap();
        assert_eq!(
            number(&rows[0], "gross_profit_loss"),
            Some(Decimal::from(-1_234_000))
        );
    }

    #[test]
    fn test_exclude_subtrees_ignored_in_fact_text() {
        let xml = "<xbrl>\
            <context id=\"c1\"><period><instant>2022-12-31</instant></period></context>\
            <span name=\"uk:CurrentAssets\" contextRef=\"c1\">\
            <ix:exclude>(</ix:exclude>1,234<ix:exclude>)</ix:exclude>\
            </span>\
            </xbrl>";
        let rows = document_to_rows(NAME, xml.as_bytes()).unwrap();
        assert_eq!(number(&rows[0], "current_assets"), Some(Decimal::from(1234)));
    }

    #[test]
    fn test_legal_name_resolved_through_span() {
        let xml = "<html xmlns:ix=\"http://www.xbrl.org/2013/inlineXBRL\"><body>\
            <ix:nonNumeric name=\"uk-bus:EntityCurrentLegalOrRegisteredName\">\
            <span>ACME WIDGETS LIMITED</span>\
            </ix:nonNumeric>\
            </body></html>";
        let rows = document_to_rows(NAME, xml.as_bytes()).unwrap();
        assert_eq!(
            rows[0].value("entity_current_legal_name"),
            Some(&Value::Text("ACME WIDGETS LIMITED".to_string()))
        );
    }

    #[test]
    fn test_balance_sheet_date_format_suffix() {
        let xml = "<xbrl>\
            <span name=\"uk:BalanceSheetDate\" format=\"ixt:datedaymonthyear\">10.2.23</span>\
            </xbrl>";
        let rows = document_to_rows(NAME, xml.as_bytes()).unwrap();
        assert_eq!(
            rows[0].value("balance_sheet_date"),
            Some(&Value::Date(NaiveDate::from_ymd_opt(2023, 2, 10).unwrap()))
        );
    }

    #[test]
    fn test_bom_does_not_change_output() {
        let xml = "<xbrl>\
            <context id=\"c1\"><period><instant>2022-12-31</instant></period></context>\
            <uk:CurrentAssets contextRef=\"c1\">100</uk:CurrentAssets>\
            </xbrl>";
        let mut with_bom = vec![0xef, 0xbb, 0xbf];
        with_bom.extend_from_slice(xml.as_bytes());
        assert_eq!(
            document_to_rows(NAME, xml.as_bytes()).unwrap(),
            document_to_rows(NAME, &with_bom).unwrap()
        );
    }

    #[test]
    fn test_rerun_is_deterministic() {
        let xml = "<xbrl>\
            <context id=\"c1\"><period><instant>2022-12-31</instant></period></context>\
            <context id=\"c2\"><period>\
            <startDate>2022-01-01</startDate><endDate>2022-12-31</endDate>\
            </period></context>\
            <uk:CurrentAssets contextRef=\"c1\">100</uk:CurrentAssets>\
            <uk:TurnoverRevenue contextRef=\"c2\">5000</uk:TurnoverRevenue>\
            </xbrl>";
        let first = document_to_rows(NAME, xml.as_bytes()).unwrap();
        let second = document_to_rows(NAME, xml.as_bytes()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }
}
