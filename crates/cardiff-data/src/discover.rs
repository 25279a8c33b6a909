//! Discovery of accounts archives from the bulk-data index pages.
//!
//! Companies House publishes plain HTML pages listing `.zip` archives:
//! daily bulk files, calendar-month files and whole-year files, each named
//! by a fixed convention that encodes the covered date span.

use std::sync::LazyLock;

use chrono::{Days, NaiveDate};
use regex::Regex;
use scraper::{Html, Selector};
use serde::Serialize;
use url::Url;

use crate::error::{DataError, Result};

/// A discovered accounts archive and the date span it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveRef {
    /// Archive filename, e.g. `Accounts_Bulk_Data-2023-03-02.zip`.
    pub name: String,
    /// Absolute download URL.
    pub url: String,
    /// First day covered by the archive.
    pub start_date: NaiveDate,
    /// Last day covered by the archive.
    pub end_date: NaiveDate,
}

static DAILY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Accounts_Bulk_Data-(\d{4})-(\d{2})-(\d{2})\.zip$").expect("daily pattern")
});

static YEARLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Accounts_Monthly_Data-(?:JanToDec|JanuaryToDecember)(\d{4})\.zip$")
        .expect("yearly pattern")
});

static MONTHLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Accounts_Monthly_Data-([A-Za-z]+)(\d{4})\.zip$").expect("monthly pattern")
});

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

/// Date span encoded in an archive filename, if it follows a known
/// convention.
pub fn parse_archive_name(name: &str) -> Option<(NaiveDate, NaiveDate)> {
    if let Some(captures) = DAILY.captures(name) {
        let day = NaiveDate::from_ymd_opt(
            captures[1].parse().ok()?,
            captures[2].parse().ok()?,
            captures[3].parse().ok()?,
        )?;
        return Some((day, day));
    }
    if let Some(captures) = YEARLY.captures(name) {
        let year: i32 = captures[1].parse().ok()?;
        return Some((
            NaiveDate::from_ymd_opt(year, 1, 1)?,
            NaiveDate::from_ymd_opt(year, 12, 31)?,
        ));
    }
    if let Some(captures) = MONTHLY.captures(name) {
        let month = month_from_name(&captures[1])?;
        let year: i32 = captures[2].parse().ok()?;
        return month_span(year, month);
    }
    None
}

fn month_from_name(word: &str) -> Option<u32> {
    let lower = word.to_lowercase();
    MONTH_NAMES
        .iter()
        .position(|name| *name == lower || name[..3] == lower)
        .map(|index| index as u32 + 1)
}

fn month_span(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((start, next_month.checked_sub_days(Days::new(1))?))
}

/// Archives linked from one index page, in span order.
///
/// Links may be absolute or relative to the page URL; links to archives
/// whose name does not follow a known convention are skipped.
pub fn archives_in_page(page_url: &str, html: &str) -> Result<Vec<ArchiveRef>> {
    let base = Url::parse(page_url)
        .map_err(|err| DataError::Discovery(format!("bad index URL {page_url}: {err}")))?;
    let document = Html::parse_document(html);
    let anchors = Selector::parse("a").expect("anchor selector");

    let mut archives = Vec::new();
    for anchor in document.select(&anchors) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if !href.ends_with(".zip") {
            continue;
        }
        let resolved = if href.starts_with("http://") || href.starts_with("https://") {
            match Url::parse(href) {
                Ok(url) => url,
                Err(_) => continue,
            }
        } else {
            match base.join(href) {
                Ok(url) => url,
                Err(_) => continue,
            }
        };
        let name = resolved
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
            .to_string();
        match parse_archive_name(&name) {
            Some((start_date, end_date)) => archives.push(ArchiveRef {
                name,
                url: resolved.to_string(),
                start_date,
                end_date,
            }),
            None => log::debug!("ignoring unrecognised archive link {resolved}"),
        }
    }
    archives.sort_by(|a, b| (a.start_date, a.end_date).cmp(&(b.start_date, b.end_date)));
    Ok(archives)
}

/// Fetch several index pages and merge their archives into one span-ordered
/// list.
pub async fn discover_archives(
    client: &reqwest::Client,
    index_urls: &[String],
) -> Result<Vec<ArchiveRef>> {
    let mut archives = Vec::new();
    for index_url in index_urls {
        let response = client.get(index_url).send().await?;
        if !response.status().is_success() {
            return Err(DataError::Http(format!(
                "failed to fetch index {index_url}: HTTP {}",
                response.status()
            )));
        }
        let body = response.text().await?;
        archives.extend(archives_in_page(index_url, &body)?);
    }
    archives.sort_by(|a, b| (a.start_date, a.end_date).cmp(&(b.start_date, b.end_date)));
    Ok(archives)
}

/// Keep archives whose span ends strictly after the cutoff.
pub fn retain_after(archives: Vec<ArchiveRef>, cutoff: NaiveDate) -> Vec<ArchiveRef> {
    archives
        .into_iter()
        .filter(|archive| archive.end_date > cutoff)
        .collect()
}
