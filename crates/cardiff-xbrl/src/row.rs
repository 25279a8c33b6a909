//! The fixed output schema and the extracted row type.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::error::{ExtractError, Result};
use crate::rules::{GENERAL_COLUMNS, PERIODIC_COLUMNS};
use crate::value::Value;

/// Columns derived from the bulk-data filename and root namespaces.
const CORE_COLUMNS: &[&str] = &["run_code", "company_id", "date", "file_type", "taxonomy"];

/// The full ordered output schema, including the trailing `error` and
/// `zip_url` columns filled in by the serialisation layer.
pub static SCHEMA: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    let mut columns: Vec<&'static str> = CORE_COLUMNS.to_vec();
    columns.extend(GENERAL_COLUMNS.iter().map(|column| column.name));
    columns.push("period_start");
    columns.push("period_end");
    columns.extend(PERIODIC_COLUMNS.iter().map(|column| column.name));
    columns.push("error");
    columns.push("zip_url");
    columns
});

/// Bulk-data filename grammar: `Prod<digits>_<digits>_<companyId>_<yyyymmdd>.<ext>`.
static DOCUMENT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(Prod\d+_\d+)_([^_]+)_(\d{8})\.(html|xml|zip)$").expect("document name pattern")
});

/// Metadata carried by an accounts document's filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DocumentName {
    pub(crate) run_code: String,
    pub(crate) company_id: String,
    pub(crate) date: NaiveDate,
    pub(crate) file_type: String,
}

impl DocumentName {
    /// Parse a member name, ignoring any leading path components.
    pub(crate) fn parse(name: &str) -> Result<Self> {
        let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
        let captures = DOCUMENT_NAME
            .captures(base)
            .ok_or_else(|| ExtractError::BadFilename(name.to_string()))?;
        let date = NaiveDate::parse_from_str(&captures[3], "%Y%m%d")
            .map_err(|_| ExtractError::BadFilename(name.to_string()))?;
        Ok(Self {
            run_code: captures[1].to_string(),
            company_id: captures[2].to_string(),
            date,
            file_type: captures[4].to_string(),
        })
    }
}

/// One extracted row: the company's general attributes plus, when present,
/// one reported period's financial attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Production batch code from the filename (`Prod<d>_<d>`).
    pub run_code: String,
    /// Company identifier from the filename.
    pub company_id: String,
    /// Archive date from the filename.
    pub date: NaiveDate,
    /// Document extension from the filename (`html`, `xml` or `zip`).
    pub file_type: String,
    /// `;`-joined recognised taxonomy namespaces declared on the root.
    pub taxonomy: String,
    /// General attribute values, ordered as in the schema.
    pub general: Vec<Option<Value>>,
    /// Start of the reported period, when the row carries one.
    pub period_start: Option<NaiveDate>,
    /// End of the reported period, when the row carries one.
    pub period_end: Option<NaiveDate>,
    /// Periodic attribute values, ordered as in the schema.
    pub periodic: Vec<Option<Value>>,
    /// Extraction failure message, when the document was abandoned.
    pub error: Option<String>,
}

impl Row {
    pub(crate) fn new(name: &DocumentName, taxonomy: String) -> Self {
        Self {
            run_code: name.run_code.clone(),
            company_id: name.company_id.clone(),
            date: name.date,
            file_type: name.file_type.clone(),
            taxonomy,
            general: vec![None; GENERAL_COLUMNS.len()],
            period_start: None,
            period_end: None,
            periodic: vec![None; PERIODIC_COLUMNS.len()],
            error: None,
        }
    }

    /// Value of a general or periodic column, by schema name.
    pub fn value(&self, column: &str) -> Option<&Value> {
        if let Some(index) = GENERAL_COLUMNS.iter().position(|c| c.name == column) {
            return self.general[index].as_ref();
        }
        PERIODIC_COLUMNS
            .iter()
            .position(|c| c.name == column)
            .and_then(|index| self.periodic[index].as_ref())
    }

    /// All schema fields as strings, with `zip_url` appended.
    ///
    /// Absent values serialise as empty fields; dates as ISO `yyyy-mm-dd`.
    pub fn fields(&self, zip_url: &str) -> Vec<String> {
        let mut fields = Vec::with_capacity(SCHEMA.len());
        fields.push(self.run_code.clone());
        fields.push(self.company_id.clone());
        fields.push(self.date.format("%Y-%m-%d").to_string());
        fields.push(self.file_type.clone());
        fields.push(self.taxonomy.clone());
        for value in &self.general {
            fields.push(render(value));
        }
        fields.push(render_date(self.period_start));
        fields.push(render_date(self.period_end));
        for value in &self.periodic {
            fields.push(render(value));
        }
        fields.push(self.error.clone().unwrap_or_default());
        fields.push(zip_url.to_string());
        fields
    }
}

fn render(value: &Option<Value>) -> String {
    value.as_ref().map(Value::to_string).unwrap_or_default()
}

fn render_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}
