//! Typed coercion of fact text into column values.
//!
//! Facts arrive as presentational text plus the `sign`, `scale` and
//! `format` attributes of the tagged element. Parsers here re-scale,
//! re-sign and type that text. Empty text and the bare placeholder `-`
//! are treated as absent before any parser runs; text that is present but
//! uncoercible raises [`ExtractError::BadValue`] or
//! [`ExtractError::BadDate`], which abandons the document into its error
//! row.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;

use crate::error::{ExtractError, Result};

/// A typed cell value of an output row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Sanitised free text (legal names, registered numbers).
    Text(String),
    /// Exact base-10 monetary or count value.
    Number(Decimal),
    /// Calendar date.
    Date(NaiveDate),
    /// Boolean fact such as dormancy.
    Flag(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(number) => write!(f, "{number}"),
            Self::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Self::Flag(flag) => write!(f, "{flag}"),
        }
    }
}

/// Which coercion a rule applies to matched fact text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParserKind {
    /// Sanitised string.
    Text,
    /// Signed, scaled exact decimal.
    Number,
    /// Decimal with junk prefixes stripped and the sign discarded.
    EmployeeCount,
    /// Tolerant calendar date.
    Date,
    /// Strict `true`/`false`.
    Flag,
    /// Strict `true`/`false` with the polarity swapped.
    ReversedFlag,
}

/// The value-bearing attributes of a tagged element.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FactAttrs<'a> {
    pub(crate) sign: Option<&'a str>,
    pub(crate) scale: Option<&'a str>,
    pub(crate) format: Option<&'a str>,
}

/// Coerce fact text to a typed value.
///
/// Returns `Ok(None)` for absent values (empty or `-` after trimming, or a
/// boolean that is neither `true` nor `false`); `Err` for text that should
/// have parsed but did not.
pub(crate) fn parse_fact(kind: ParserKind, attrs: FactAttrs<'_>, raw: &str) -> Result<Option<Value>> {
    let text = raw.trim();
    if text.is_empty() || text == "-" {
        return Ok(None);
    }
    match kind {
        ParserKind::Text => Ok(Some(Value::Text(sanitise_text(text)))),
        ParserKind::Number => parse_number(attrs, text).map(Some),
        ParserKind::EmployeeCount => parse_employee_count(attrs, text),
        ParserKind::Date => parse_date(attrs, text).map(Some),
        ParserKind::Flag => Ok(parse_flag(text, false)),
        ParserKind::ReversedFlag => Ok(parse_flag(text, true)),
    }
}

fn sanitise_text(text: &str) -> String {
    text.replace('\n', " ").replace('"', "")
}

fn parse_flag(text: &str, reversed: bool) -> Option<Value> {
    match text {
        "true" => Some(Value::Flag(!reversed)),
        "false" => Some(Value::Flag(reversed)),
        _ => None,
    }
}

/// The transform suffix of a `format` attribute: the part after the last `:`.
fn format_suffix(format: Option<&str>) -> Option<&str> {
    format.map(|f| match f.rsplit_once(':') {
        Some((_, suffix)) => suffix,
        None => f,
    })
}

fn parse_number(attrs: FactAttrs<'_>, text: &str) -> Result<Value> {
    // Thousands-separator conventions vary by declared format transform.
    let cleaned = match format_suffix(attrs.format) {
        Some("numdotcomma") => text.replace('.', "").replace(',', "."),
        Some("numspacedot") => text.replace(' ', ""),
        _ => text.replace(',', ""),
    };

    // Remaining internal whitespace separates decimal summands.
    let mut total = Decimal::ZERO;
    let mut summands = 0;
    for part in cleaned.split_whitespace() {
        let part = Decimal::from_str(part)
            .map_err(|_| ExtractError::BadValue(format!("not a number: {text:?}")))?;
        total += part;
        summands += 1;
    }
    if summands == 0 {
        return Err(ExtractError::BadValue(format!("not a number: {text:?}")));
    }

    let scaled = apply_scale(total, attrs.scale)?;
    let signed = if attrs.sign == Some("-") { -scaled } else { scaled };
    Ok(Value::Number(signed))
}

fn apply_scale(value: Decimal, scale: Option<&str>) -> Result<Decimal> {
    let exponent: i32 = match scale {
        None => 0,
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ExtractError::BadValue(format!("bad scale attribute: {raw:?}")))?,
    };
    if exponent == 0 {
        return Ok(value);
    }
    if !(-28..=28).contains(&exponent) {
        return Err(ExtractError::BadValue(format!("scale out of range: {exponent}")));
    }
    if exponent > 0 {
        let factor = Decimal::from_i128_with_scale(10i128.pow(exponent as u32), 0);
        value
            .checked_mul(factor)
            .ok_or_else(|| ExtractError::BadValue(format!("scaled value overflows: {value}e{exponent}")))
    } else {
        Ok(value * Decimal::new(1, (-exponent) as u32))
    }
}

/// Junk prefixes seen on employee counts: `"FY: 3"`, `"2017 - 2"`.
static EMPLOYEE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*:|.+- )\s*").expect("employee prefix pattern"));

fn parse_employee_count(attrs: FactAttrs<'_>, text: &str) -> Result<Option<Value>> {
    let stripped = EMPLOYEE_PREFIX.replace(text, "");
    let stripped = stripped.trim();
    if stripped.is_empty() || stripped == "-" {
        return Ok(None);
    }
    // A sign spuriously attached to a headcount is meaningless; keep the
    // magnitude.
    match parse_number(attrs, stripped)? {
        Value::Number(count) => Ok(Some(Value::Number(count.abs()))),
        other => Ok(Some(other)),
    }
}

/// Ordinal suffixes immediately following a digit: `1st`, `2nd`, `23RD`.
static ORDINAL_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d)(st|nd|rd|th)\b").expect("ordinal pattern"));

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

#[derive(Debug, Clone)]
enum DateToken {
    Num(String),
    Word(String),
}

fn parse_date(attrs: FactAttrs<'_>, text: &str) -> Result<Value> {
    let suffix = format_suffix(attrs.format);
    let day_first = matches!(
        suffix,
        Some("datedaymonthyear" | "dateslasheu" | "datedoteu")
    );

    // Ordinal suffixes must go while whitespace still marks the word
    // boundary the pattern relies on.
    let mut cleaned = ORDINAL_SUFFIX.replace_all(text, "$1").into_owned();
    if suffix == Some("datedaymonthyearen") {
        cleaned.retain(|c| c != ' ');
    }

    let tokens = tokenize_date(&cleaned);
    if let Some(date) = assemble_date(&tokens, day_first) {
        return Ok(Value::Date(date));
    }

    // Second pass: truncate alphabetic runs to their first three characters,
    // which recovers long-form and misspelled month names.
    let truncated: Vec<DateToken> = tokens
        .iter()
        .map(|token| match token {
            DateToken::Word(word) => DateToken::Word(word.chars().take(3).collect()),
            DateToken::Num(num) => DateToken::Num(num.clone()),
        })
        .collect();
    if let Some(date) = assemble_date(&truncated, day_first) {
        return Ok(Value::Date(date));
    }

    Err(ExtractError::BadDate(text.to_string()))
}

fn tokenize_date(text: &str) -> Vec<DateToken> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut current_is_num = false;
    for c in text.chars() {
        if c.is_ascii_digit() || c.is_alphabetic() {
            let is_num = c.is_ascii_digit();
            if !current.is_empty() && is_num != current_is_num {
                tokens.push(finish_token(&current, current_is_num));
                current.clear();
            }
            current_is_num = is_num;
            current.push(c);
        } else if !current.is_empty() {
            tokens.push(finish_token(&current, current_is_num));
            current.clear();
        }
    }
    if !current.is_empty() {
        tokens.push(finish_token(&current, current_is_num));
    }
    tokens
}

fn finish_token(text: &str, is_num: bool) -> DateToken {
    if is_num {
        DateToken::Num(text.to_string())
    } else {
        DateToken::Word(text.to_string())
    }
}

fn month_from_name(word: &str) -> Option<u32> {
    let lower = word.to_lowercase();
    MONTH_NAMES
        .iter()
        .position(|name| *name == lower || name[..3] == lower)
        .map(|index| index as u32 + 1)
}

fn expand_year(raw: &str) -> Option<i32> {
    let year: i32 = raw.parse().ok()?;
    if raw.len() >= 3 {
        Some(year)
    } else if year < 70 {
        Some(2000 + year)
    } else {
        Some(1900 + year)
    }
}

fn assemble_date(tokens: &[DateToken], day_first: bool) -> Option<NaiveDate> {
    use DateToken::{Num, Word};
    let (year, month, day) = match tokens {
        [Num(packed)] if packed.len() == 8 => (
            packed[..4].parse().ok()?,
            packed[4..6].parse().ok()?,
            packed[6..].parse().ok()?,
        ),
        [Num(a), Num(b), Num(c)] => {
            if a.len() == 4 {
                (a.parse().ok()?, b.parse().ok()?, c.parse().ok()?)
            } else {
                let year = expand_year(c)?;
                let (day, month): (u32, u32) = if day_first {
                    (a.parse().ok()?, b.parse().ok()?)
                } else {
                    (b.parse().ok()?, a.parse().ok()?)
                };
                // An out-of-range month with a plausible day means the
                // convention was the other way round.
                if month > 12 && day <= 12 {
                    (year, day, month)
                } else {
                    (year, month, day)
                }
            }
        }
        [Num(a), Word(name), Num(b)] => {
            let month = month_from_name(name)?;
            if a.len() == 4 && b.len() <= 2 {
                (a.parse().ok()?, month, b.parse().ok()?)
            } else {
                (expand_year(b)?, month, a.parse().ok()?)
            }
        }
        [Word(name), Num(day), Num(year)] => {
            (expand_year(year)?, month_from_name(name)?, day.parse().ok()?)
        }
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}
