#![cfg(target_arch = "wasm32")]

use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, Node};

const STYLE_TAG_SELECTOR: &str = "style[data-paging-ui]";

/// CSS mặc định cho danh sách, kèm biến để trang chủ có thể ghi đè.
pub const DEFAULT_STYLES: &str = r#"
:root {
  --paging-font-family: 'Inter', system-ui, -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif;
  --paging-bg: #ffffff;
  --paging-text: #1f2933;
  --paging-muted: #52606d;
  --paging-border: rgba(148, 163, 184, 0.28);
  --paging-row-bg: rgba(248, 250, 252, 0.7);
  --paging-radius: 16px;
  --paging-max-height: 70vh;
  --paging-error: #b42318;
  --paging-error-bg: rgba(180, 35, 24, 0.1);
}

.paging-root {
  font-family: var(--paging-font-family);
  background: var(--paging-bg);
  color: var(--paging-text);
  border-radius: var(--paging-radius);
  display: flex;
  flex-direction: column;
  gap: 16px;
  padding: 20px;
  box-shadow: 0 24px 48px rgba(15, 23, 42, 0.1);
}

.paging-toolbar {
  display: flex;
  align-items: center;
  justify-content: space-between;
  gap: 12px;
}

.paging-count {
  font-size: 0.9rem;
  color: var(--paging-muted);
}

.paging-toolbar button,
.paging-status button {
  border: 1px solid var(--paging-border);
  background: transparent;
  border-radius: 999px;
  padding: 6px 14px;
  font: inherit;
  cursor: pointer;
}

.paging-list {
  list-style: none;
  margin: 0;
  padding: 0;
  display: flex;
  flex-direction: column;
  gap: 10px;
  max-height: var(--paging-max-height);
  overflow-y: auto;
}

.paging-row {
  border-left: 4px solid rgba(148, 163, 184, 0.4);
  padding: 12px 16px;
  background: var(--paging-row-bg);
  border-radius: calc(var(--paging-radius) - 10px);
}

.paging-label {
  font-weight: 600;
}

.paging-status {
  border: 1px dashed rgba(148, 163, 184, 0.5);
  border-radius: calc(var(--paging-radius) - 10px);
  padding: 16px;
  text-align: center;
  color: var(--paging-muted);
  font-style: italic;
  display: flex;
  align-items: center;
  justify-content: center;
  gap: 12px;
}

.paging-status[data-state="loading"] {
  animation: paging-pulse 1.2s ease-in-out infinite;
}

.paging-status[data-state="error"] {
  color: var(--paging-error);
  background: var(--paging-error-bg);
  font-style: normal;
}

@keyframes paging-pulse {
  0%, 100% { opacity: 1; }
  50% { opacity: 0.45; }
}

@media (max-width: 640px) {
  .paging-root {
    padding: 12px;
  }

  .paging-toolbar {
    flex-direction: column;
    align-items: stretch;
  }
}
"#;

pub fn ensure_styles(document: &Document) -> Result<(), JsValue> {
    if document.query_selector(STYLE_TAG_SELECTOR)?.is_some() {
        return Ok(());
    }

    let head = document
        .head()
        .ok_or_else(|| JsValue::from_str("Document không có thẻ <head>"))?;

    let style_el = document.create_element("style")?;
    style_el.set_attribute("data-paging-ui", "v1")?;
    style_el.set_text_content(Some(DEFAULT_STYLES));
    head.append_child(&style_el.clone().dyn_into::<Node>()?)?;

    Ok(())
}
