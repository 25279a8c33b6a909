//! Per-document index of context identifiers to their reporting periods.

use std::collections::HashMap;

use crate::dom::Document;

/// The temporal span of a context, as the raw date strings of the document.
///
/// For an instant context both ends are the instant. Spans stay as strings
/// until row assembly so that the period ordering matches the document's own
/// ISO date representation.
pub(crate) type PeriodSpan = (String, String);

/// Lookup from `contextRef` values to resolved period spans.
///
/// Built by a pre-scan of the document's `context` elements. A context whose
/// period dates cannot be resolved is omitted; facts referencing it are
/// dropped during accumulation.
#[derive(Debug, Default)]
pub(crate) struct ContextTable {
    spans: HashMap<String, PeriodSpan>,
}

impl ContextTable {
    /// Scan a document for `context` elements and index their periods.
    pub(crate) fn build(doc: &Document) -> Self {
        let mut spans = HashMap::new();
        for id in doc.element_ids() {
            if doc.local_name(id) != "context" {
                continue;
            }
            let Some(context_id) = doc.attr(id, "id") else {
                continue;
            };
            if let Some(span) = resolve_period(doc, id) {
                spans.insert(context_id.to_string(), span);
            }
        }
        Self { spans }
    }

    /// Period span for a `contextRef`, if the context exists and is dated.
    pub(crate) fn get(&self, context_ref: &str) -> Option<&PeriodSpan> {
        self.spans.get(context_ref)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.spans.len()
    }
}

fn resolve_period(doc: &Document, context_id: usize) -> Option<PeriodSpan> {
    let period = doc
        .child_elements(context_id)
        .find(|&child| doc.local_name(child) == "period")?;

    if let Some(instant) = doc
        .child_elements(period)
        .find(|&child| doc.local_name(child) == "instant")
    {
        let date = non_empty(doc.text(instant))?;
        return Some((date.clone(), date));
    }

    let start = doc
        .child_elements(period)
        .find(|&child| doc.local_name(child) == "startDate")?;
    let end = doc
        .child_elements(period)
        .find(|&child| doc.local_name(child) == "endDate")?;
    Some((non_empty(doc.text(start))?, non_empty(doc.text(end))?))
}

fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
