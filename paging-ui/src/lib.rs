//! Thành phần giao diện danh sách tải dần khi cuộn cho môi trường WebAssembly.

use paging_core::PagingConfig;

#[cfg(target_arch = "wasm32")]
mod hooks;
#[cfg(target_arch = "wasm32")]
mod list;
#[cfg(target_arch = "wasm32")]
mod styles;
#[cfg(target_arch = "wasm32")]
mod trigger;

#[cfg(target_arch = "wasm32")]
pub use hooks::{use_infinite_query, InfiniteQuery};
#[cfg(target_arch = "wasm32")]
pub use list::{InfiniteList, InfiniteListProps};
#[cfg(target_arch = "wasm32")]
pub use trigger::{ScrollListener, SentinelKey, SentinelObserver};

/// Cách phát hiện người dùng đã cuộn tới cuối danh sách.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TriggerStrategy {
    /// Kiểm tra vị trí cuộn sau khi ngừng cuộn một khoảng `scroll_debounce_ms`.
    #[default]
    Debounced,
    /// Theo dõi bản ghi cuối cùng đi vào khung nhìn.
    Sentinel,
}

impl TriggerStrategy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "scroll" | "debounced" => Some(Self::Debounced),
            "sentinel" | "intersection" => Some(Self::Sentinel),
            _ => None,
        }
    }
}

/// Tham số dựng bộ kích hoạt; đổi bất kỳ trường nào thì phải gắn lại.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerSettings {
    pub strategy: TriggerStrategy,
    pub config: PagingConfig,
}

impl TriggerSettings {
    pub fn new(strategy: TriggerStrategy, config: &PagingConfig) -> Self {
        Self {
            strategy,
            config: config.clone(),
        }
    }
}

/// Nhãn đếm bản ghi. Tổng nhỏ hơn số đang hiển thị (máy chủ không trả
/// `total`) thì bị ẩn.
pub fn count_label(shown: usize, total: Option<usize>) -> String {
    match total {
        Some(total) if total >= shown => format!("{shown} / {total} bản ghi"),
        _ => format!("{shown} bản ghi"),
    }
}

#[cfg(target_arch = "wasm32")]
mod wasm_ui {
    use std::rc::Rc;

    use js_sys::Function;
    use wasm_bindgen::prelude::*;
    use web_sys::{Document, Element, Window};

    use crate::list::{InfiniteList, InfiniteListProps};
    use crate::TriggerStrategy;

    #[wasm_bindgen]
    pub fn mount_infinite_list(
        selector: &str,
        fetch: Function,
        options: JsValue,
        strategy: Option<String>,
    ) -> Result<(), JsValue> {
        let window: Window =
            web_sys::window().ok_or_else(|| JsValue::from_str("Không có window"))?;
        let document: Document = window
            .document()
            .ok_or_else(|| JsValue::from_str("Không truy cập được document"))?;

        let target: Element = document
            .query_selector(selector)
            .map_err(|err| JsValue::from_str(&format!("Selector lỗi: {err:?}")))?
            .ok_or_else(|| JsValue::from_str("Không tìm thấy element theo selector"))?;

        let strategy = match strategy.as_deref() {
            Some(name) => TriggerStrategy::from_name(name).ok_or_else(|| {
                JsValue::from_str(&format!("Không hỗ trợ chiến lược cuộn: {name}"))
            })?,
            None => TriggerStrategy::default(),
        };

        let (loader, config) = paging_wasm::build_js_loader(fetch, Some(options))?;
        let query = loader.with_collection(|collection| collection.query().clone());

        yew::Renderer::<InfiniteList>::with_root_and_props(
            target,
            InfiniteListProps {
                loader: Rc::new(loader),
                query,
                config,
                strategy,
            },
        )
        .render();
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
pub use wasm_ui::mount_infinite_list;

#[cfg(not(target_arch = "wasm32"))]
pub fn mount_infinite_list(
    _: &str,
    _: wasm_bindgen::JsValue,
    _: wasm_bindgen::JsValue,
    _: Option<String>,
) -> Result<(), wasm_bindgen::JsValue> {
    Err(wasm_bindgen::JsValue::from_str(
        "paging-ui chỉ hỗ trợ biên dịch target wasm32",
    ))
}
