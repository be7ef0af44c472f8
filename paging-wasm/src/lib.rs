//! Bridge WASM <-> JavaScript trung lập framework cho danh sách tải theo trang.

use std::time::Duration;

use js_sys::{Function, Promise};
use paging_core::scroll::{DebouncedProximity, ScrollMetrics};
use paging_core::{
    FetchError, IncrementalCollection, Loader, PageDescriptor, PageEnvelope, PageFetcher,
    PagingConfig, PagingError, Query, RequestOutcome,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_wasm_bindgen::{from_value, Serializer};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, JsFuture};

/// Dạng dữ liệu mà hàm fetch phía JS trả về.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum PageFormat {
    /// `{ items, totalCount, next }` đúng như `PageEnvelope`.
    #[default]
    Envelope,
    /// Bundle FHIR `searchset`.
    Searchset,
    /// `{ count, results }` với phân trang offset.
    Results,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct JsPagingOptions {
    #[serde(default)]
    page_size: Option<usize>,
    #[serde(default)]
    scroll_debounce_ms: Option<u32>,
    #[serde(default)]
    scroll_threshold_px: Option<f64>,
    #[serde(default)]
    sentinel_ratio: Option<f64>,
    #[serde(default)]
    format: PageFormat,
    #[serde(default)]
    key_field: Option<String>,
    #[serde(default)]
    initial_cursor: Option<String>,
    #[serde(default)]
    query: Option<Query>,
}

impl JsPagingOptions {
    fn config(&self) -> PagingConfig {
        let mut base = PagingConfig::default();
        if let Some(size) = self.page_size {
            base.page_size = size;
        }
        if let Some(ms) = self.scroll_debounce_ms {
            base.scroll_debounce_ms = ms;
        }
        if let Some(px) = self.scroll_threshold_px {
            base.scroll_threshold_px = px;
        }
        if let Some(ratio) = self.sentinel_ratio {
            base.sentinel_ratio = ratio;
        }
        base
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsEnvelope {
    items: Vec<Value>,
    total_count: usize,
    #[serde(default)]
    next: Option<PageDescriptor>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsSnapshot {
    items: Vec<Value>,
    total_count: Option<usize>,
    has_more: bool,
    loading: bool,
    error: Option<String>,
}

/// Hàm fetch do JS cung cấp: `(descriptor, query) => Promise<page>`.
pub struct JsFetcher {
    fetch: Function,
    format: PageFormat,
    key_field: Option<String>,
    page_size: usize,
}

impl JsFetcher {
    fn start(&self, descriptor: &PageDescriptor, query: &Query) -> Result<JsValue, FetchError> {
        let serializer = Serializer::json_compatible();
        let descriptor_js = descriptor
            .serialize(&serializer)
            .map_err(|err| FetchError::Decode(err.to_string()))?;
        let query_js = query
            .for_page(descriptor)
            .serialize(&serializer)
            .map_err(|err| FetchError::Decode(err.to_string()))?;
        self.fetch
            .call2(&JsValue::NULL, &descriptor_js, &query_js)
            .map_err(js_fetch_error)
    }

    fn decode(&self, descriptor: &PageDescriptor, value: JsValue) -> Result<PageEnvelope<Value>, FetchError> {
        let mut page = match self.format {
            PageFormat::Envelope => {
                let page: JsEnvelope =
                    from_value(value).map_err(|err| FetchError::Decode(err.to_string()))?;
                PageEnvelope::new(page.items, page.total_count, page.next)
            }
            PageFormat::Searchset => {
                let bundle: Value =
                    from_value(value).map_err(|err| FetchError::Decode(err.to_string()))?;
                paging_fhir::decode_searchset(&bundle)?
            }
            PageFormat::Results => {
                let body: Value =
                    from_value(value).map_err(|err| FetchError::Decode(err.to_string()))?;
                let offset = descriptor.as_offset().unwrap_or_default();
                paging_fhir::decode_results_page_keyed(&body, offset, self.page_size, |item| {
                    item_key(self.format, self.key_field.as_deref(), item)
                })?
            }
        };
        retain_keyed(&mut page, self.format, self.key_field.as_deref());
        Ok(page)
    }
}

impl PageFetcher<Value> for JsFetcher {
    async fn fetch(
        &self,
        descriptor: &PageDescriptor,
        query: &Query,
    ) -> Result<PageEnvelope<Value>, FetchError> {
        let returned = self.start(descriptor, query)?;
        let value = JsFuture::from(Promise::resolve(&returned))
            .await
            .map_err(js_fetch_error)?;
        self.decode(descriptor, value)
    }
}

/// `Loader` với nguồn dữ liệu là hàm fetch phía JS.
pub type JsLoader = Loader<Value, String, JsFetcher>;

/// Dựng `Loader` từ hàm fetch và options dạng JS (có thể bỏ trống).
///
/// Dùng chung cho `PagedCollection` và các thành phần giao diện Rust.
pub fn build_js_loader(
    fetch: Function,
    options: Option<JsValue>,
) -> Result<(JsLoader, PagingConfig), JsValue> {
    let options = match options {
        Some(js_options) if !js_options.is_undefined() && !js_options.is_null() => {
            from_value::<JsPagingOptions>(js_options)
                .map_err(|err| JsValue::from_str(&format!("Không đọc được options: {err}")))?
        }
        _ => JsPagingOptions::default(),
    };

    let config = options.config();
    config
        .validate()
        .map_err(|err| JsValue::from_str(&format_paging_error(err)))?;

    let initial = match &options.initial_cursor {
        Some(cursor) => PageDescriptor::Cursor(cursor.clone()),
        None => PageDescriptor::first_offset(),
    };

    let key_of = key_extractor(options.format, options.key_field.clone());
    let mut collection = IncrementalCollection::new(&config, initial, key_of);
    if let Some(query) = options.query {
        collection = collection.with_query(query);
    }

    let fetcher = JsFetcher {
        fetch,
        format: options.format,
        key_field: options.key_field,
        page_size: config.page_size,
    };

    Ok((Loader::new(collection, fetcher), config))
}

/// Danh sách tải dần dùng được trực tiếp từ JavaScript.
#[wasm_bindgen]
pub struct PagedCollection {
    loader: JsLoader,
    config: PagingConfig,
}

#[wasm_bindgen]
impl PagedCollection {
    #[wasm_bindgen(constructor)]
    pub fn new(fetch: Function, options: Option<JsValue>) -> Result<PagedCollection, JsValue> {
        #[cfg(target_arch = "wasm32")]
        console_error_panic_hook::set_once();

        let (loader, config) = build_js_loader(fetch, options)?;
        Ok(Self { loader, config })
    }

    /// Promise trả về `"merged" | "pending" | "exhausted" | "stale"`.
    #[wasm_bindgen(js_name = requestNextPage)]
    pub fn request_next_page(&self) -> Promise {
        let loader = self.loader.clone();
        future_to_promise(async move { outcome_to_js(loader.request_next_page().await) })
    }

    pub fn refetch(&self) -> Promise {
        let loader = self.loader.clone();
        future_to_promise(async move { outcome_to_js(loader.refetch().await) })
    }

    pub fn reset(&self, query: JsValue) -> Result<(), JsValue> {
        let query = if query.is_undefined() || query.is_null() {
            Query::new()
        } else {
            from_value::<Query>(query)
                .map_err(|err| JsValue::from_str(&format!("Không đọc được query: {err}")))?
        };
        self.loader.reset(query);
        Ok(())
    }

    pub fn snapshot(&self) -> Result<JsValue, JsValue> {
        let snapshot = self.loader.snapshot();
        let view = JsSnapshot {
            items: snapshot.items,
            total_count: snapshot.total_count,
            has_more: snapshot.has_more,
            loading: snapshot.pending,
            error: snapshot.error.map(|err| err.to_string()),
        };
        view.serialize(&Serializer::json_compatible())
            .map_err(|err| JsValue::from_str(&format!("Không serialize snapshot: {err}")))
    }

    #[wasm_bindgen(getter, js_name = hasMore)]
    pub fn has_more(&self) -> bool {
        self.loader.has_more()
    }

    #[wasm_bindgen(getter)]
    pub fn loading(&self) -> bool {
        self.loader.is_pending()
    }

    pub fn dispose(&self) {
        self.loader.dispose();
    }

    /// Bộ theo dõi cuộn dùng cấu hình của danh sách này.
    #[wasm_bindgen(js_name = scrollWatcher)]
    pub fn scroll_watcher(&self) -> ScrollWatcher {
        ScrollWatcher {
            trigger: DebouncedProximity::from_config(&self.config),
        }
    }
}

/// Gom sự kiện cuộn cho các framework tự gắn listener.
///
/// Gọi `onScroll` trong listener, rồi `poll` sau `delayMs`; khi `poll` trả về
/// `true` thì gọi `requestNextPage`.
#[wasm_bindgen]
pub struct ScrollWatcher {
    trigger: DebouncedProximity,
}

#[wasm_bindgen]
impl ScrollWatcher {
    #[wasm_bindgen(js_name = onScroll)]
    pub fn on_scroll(&mut self, now_ms: f64, scroll_top: f64, client_height: f64, scroll_height: f64) {
        self.trigger.on_scroll(
            millis(now_ms),
            ScrollMetrics::new(scroll_top, client_height, scroll_height),
        );
    }

    pub fn poll(&mut self, now_ms: f64, collection: &PagedCollection) -> bool {
        let gate = collection
            .loader
            .with_collection(IncrementalCollection::load_gate);
        self.trigger.poll(millis(now_ms), gate)
    }

    #[wasm_bindgen(getter, js_name = delayMs)]
    pub fn delay_ms(&self) -> f64 {
        self.trigger.delay().as_secs_f64() * 1_000.0
    }

    pub fn detach(&mut self) {
        self.trigger.detach();
    }
}

/// Khóa khử trùng lặp của một bản ghi; `None` khi thiếu hoặc rỗng.
fn item_key(format: PageFormat, key_field: Option<&str>, item: &Value) -> Option<String> {
    if let Some(field) = key_field {
        return match item.get(field)? {
            Value::String(key) if !key.trim().is_empty() => Some(key.clone()),
            Value::String(_) | Value::Null => None,
            other => Some(other.to_string()),
        };
    }
    match format {
        PageFormat::Searchset => paging_fhir::resource_key(item),
        PageFormat::Envelope | PageFormat::Results => paging_fhir::record_id(item),
    }
}

/// Bỏ các bản ghi không có khóa; nếu giữ lại chúng sẽ gộp thành một dòng.
fn retain_keyed(page: &mut PageEnvelope<Value>, format: PageFormat, key_field: Option<&str>) {
    page.items.retain(|item| item_key(format, key_field, item).is_some());
}

// Trang đã qua `retain_keyed` nên mọi bản ghi đều có khóa.
fn key_extractor(format: PageFormat, key_field: Option<String>) -> impl Fn(&Value) -> String {
    move |item: &Value| item_key(format, key_field.as_deref(), item).unwrap_or_default()
}

fn millis(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value / 1_000.0)
    } else {
        Duration::ZERO
    }
}

fn outcome_to_js(result: Result<RequestOutcome, PagingError>) -> Result<JsValue, JsValue> {
    match result {
        Ok(outcome) => Ok(JsValue::from_str(outcome_label(outcome))),
        Err(err) => Err(JsValue::from_str(&format_paging_error(err))),
    }
}

fn outcome_label(outcome: RequestOutcome) -> &'static str {
    match outcome {
        RequestOutcome::Merged(_) => "merged",
        RequestOutcome::AlreadyPending => "pending",
        RequestOutcome::Exhausted => "exhausted",
        RequestOutcome::Stale => "stale",
    }
}

fn js_fetch_error(err: JsValue) -> FetchError {
    let detail = err
        .as_string()
        .or_else(|| {
            err.dyn_ref::<js_sys::Error>()
                .map(|error| String::from(error.message()))
        })
        .unwrap_or_else(|| format!("{err:?}"));
    FetchError::Transport(detail)
}

fn format_paging_error(err: PagingError) -> String {
    format!("Paging error: {err}")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn key_field_overrides_format_default() {
        let key_of = key_extractor(PageFormat::Searchset, Some("uuid".into()));
        assert_eq!(key_of(&json!({ "uuid": "x-1", "id": "a" })), "x-1");
        assert_eq!(key_of(&json!({ "uuid": 9 })), "9");
    }

    #[test]
    fn searchset_items_are_keyed_by_type_and_id() {
        let key_of = key_extractor(PageFormat::Searchset, None);
        assert_eq!(
            key_of(&json!({ "resourceType": "Condition", "id": "c1" })),
            "Condition/c1"
        );
    }

    #[test]
    fn records_missing_key_field_are_dropped() {
        let mut page = PageEnvelope::new(
            vec![
                json!({ "uuid": "x-1" }),
                json!({ "id": "a" }),
                json!({ "uuid": "" }),
                json!({ "uuid": null }),
                json!({ "uuid": 7 }),
            ],
            5,
            None,
        );

        retain_keyed(&mut page, PageFormat::Envelope, Some("uuid"));
        assert_eq!(page.items, vec![json!({ "uuid": "x-1" }), json!({ "uuid": 7 })]);
    }

    #[test]
    fn envelope_records_without_id_are_dropped() {
        let mut page = PageEnvelope::new(
            vec![json!({ "name": "x" }), json!({ "id": 3 }), json!({ "name": "y" })],
            3,
            Some(PageDescriptor::Offset(14)),
        );

        retain_keyed(&mut page, PageFormat::Envelope, None);
        assert_eq!(page.items, vec![json!({ "id": 3 })]);
        assert_eq!(page.next, Some(PageDescriptor::Offset(14)));
    }

    #[test]
    fn millis_ignores_invalid_clock_values() {
        assert_eq!(millis(f64::NAN), Duration::ZERO);
        assert_eq!(millis(-5.0), Duration::ZERO);
        assert_eq!(millis(250.0), Duration::from_millis(250));
    }

    #[test]
    fn outcome_labels_are_stable() {
        assert_eq!(outcome_label(RequestOutcome::AlreadyPending), "pending");
        assert_eq!(outcome_label(RequestOutcome::Exhausted), "exhausted");
    }
}
