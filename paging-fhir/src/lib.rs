//! Decoders turning paged JSON bodies into [`PageEnvelope`]s.
//!
//! Two page shapes are supported:
//! - FHIR `searchset` Bundles: cursor pagination through `link[relation=next]`,
//!   authoritative `total`.
//! - Offset list bodies `{ "count": n, "results": [...] }` as returned by the
//!   care API list endpoints.

use paging_core::{FetchError, PageDescriptor, PageEnvelope};
use serde_json::Value;
use tracing::debug;

/// Decode a searchset Bundle from a JSON string.
pub fn decode_searchset_str(bundle_json: &str) -> Result<PageEnvelope<Value>, FetchError> {
    let value: Value =
        serde_json::from_str(bundle_json).map_err(|err| FetchError::Decode(err.to_string()))?;
    decode_searchset(&value)
}

/// Decode a searchset Bundle page.
///
/// Only `match` entries become items; `_include`d resources and
/// OperationOutcome warnings are skipped, as are resources without an id
/// since they cannot be deduplicated. The next-page link is returned as an
/// opaque cursor.
pub fn decode_searchset(bundle: &Value) -> Result<PageEnvelope<Value>, FetchError> {
    let bundle_type = bundle
        .get("resourceType")
        .and_then(Value::as_str)
        .ok_or_else(|| FetchError::Decode("missing resourceType".into()))?;

    if bundle_type != "Bundle" {
        return Err(FetchError::Decode(format!(
            "Expected resourceType Bundle, received {bundle_type}"
        )));
    }

    if let Some(kind) = bundle.get("type").and_then(Value::as_str) {
        if kind != "searchset" {
            return Err(FetchError::Decode(format!(
                "Expected a searchset Bundle, received {kind}"
            )));
        }
    }

    let entries = bundle
        .get("entry")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut items = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(resource) = entry.get("resource") else {
            continue;
        };

        let mode = entry
            .get("search")
            .and_then(|search| search.get("mode"))
            .and_then(Value::as_str)
            .unwrap_or("match");
        if mode != "match" {
            continue;
        }

        if resource_key(resource).is_none() {
            debug!("skipping searchset entry without resourceType/id");
            continue;
        }

        items.push(resource.clone());
    }

    let next = link_url(bundle, "next").map(PageDescriptor::Cursor);
    let total_count = match bundle.get("total").and_then(Value::as_u64) {
        Some(total) => usize::try_from(total).unwrap_or(usize::MAX),
        // Servers may omit total unless `_total=accurate`. The page size is then
        // only a lower bound and may be below the number of rows already loaded.
        None => items.len(),
    };

    Ok(PageEnvelope::new(items, total_count, next))
}

/// Decode an offset list body `{ count, results }` fetched at `offset`.
///
/// Records without an `id` are dropped; see [`decode_results_page_keyed`].
pub fn decode_results_page(
    body: &Value,
    offset: usize,
    page_size: usize,
) -> Result<PageEnvelope<Value>, FetchError> {
    decode_results_page_keyed(body, offset, page_size, record_id)
}

/// Decode an offset list body, keeping only records for which `key_of`
/// yields a key.
///
/// Keyless records cannot be deduplicated and would otherwise collapse into
/// one row. The next offset is computed from the page as served, so a page
/// made only of keyless records still advances.
pub fn decode_results_page_keyed(
    body: &Value,
    offset: usize,
    page_size: usize,
    key_of: impl Fn(&Value) -> Option<String>,
) -> Result<PageEnvelope<Value>, FetchError> {
    let total = body
        .get("count")
        .and_then(Value::as_u64)
        .ok_or_else(|| FetchError::Decode("missing count".into()))?;

    let results = body
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::Decode("missing results".into()))?;

    let mut page = PageEnvelope::for_offset(
        results.clone(),
        usize::try_from(total).unwrap_or(usize::MAX),
        offset,
        page_size,
    );
    let served = page.items.len();
    page.items.retain(|record| key_of(record).is_some());
    if page.items.len() < served {
        debug!(
            skipped = served - page.items.len(),
            offset,
            "skipping list records without a key"
        );
    }
    Ok(page)
}

/// Dedup key for a FHIR resource: `Type/id`.
pub fn resource_key(resource: &Value) -> Option<String> {
    let resource_type = resource.get("resourceType").and_then(Value::as_str)?;
    let id = resource.get("id").and_then(Value::as_str)?;
    Some(format!("{resource_type}/{id}"))
}

/// Dedup key for a list record: its `id`, string or numeric.
pub fn record_id(record: &Value) -> Option<String> {
    match record.get("id")? {
        Value::String(id) if !id.trim().is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Short human label for a row: code text, patient name, or the key.
pub fn display_label(record: &Value) -> String {
    record
        .get("code")
        .and_then(extract_codeable_text)
        .or_else(|| extract_human_name(record))
        .or_else(|| {
            record
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .or_else(|| resource_key(record))
        .or_else(|| record_id(record))
        .unwrap_or_else(|| "(unnamed)".to_string())
}

fn link_url(bundle: &Value, relation: &str) -> Option<String> {
    bundle
        .get("link")?
        .as_array()?
        .iter()
        .find(|link| link.get("relation").and_then(Value::as_str) == Some(relation))
        .and_then(|link| link.get("url"))
        .and_then(Value::as_str)
        .filter(|url| !url.trim().is_empty())
        .map(str::to_string)
}

fn extract_codeable_text(value: &Value) -> Option<String> {
    if let Some(text) = value.get("text").and_then(Value::as_str) {
        if !text.trim().is_empty() {
            return Some(text.trim().to_string());
        }
    }

    let codings = value.get("coding").and_then(Value::as_array)?;
    codings.iter().find_map(|coding| {
        ["display", "code"].iter().find_map(|field| {
            coding
                .get(field)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string)
        })
    })
}

fn extract_human_name(resource: &Value) -> Option<String> {
    let name = resource.get("name")?.as_array()?.first()?;
    let given = name
        .get("given")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
        .and_then(Value::as_str)
        .unwrap_or("");
    let family = name.get("family").and_then(Value::as_str).unwrap_or("");
    let full = format!("{given} {family}").trim().to_string();
    if full.is_empty() {
        None
    } else {
        Some(full)
    }
}
