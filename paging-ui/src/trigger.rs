//! Gắn bộ kích hoạt tải trang vào DOM.
//!
//! Cả hai kiểu đều gỡ listener hoặc observer khi bị drop.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use js_sys::{Array, Function};
use paging_core::scroll::{DebouncedProximity, LoadGate, ScrollMetrics, SentinelVisibility};
use paging_core::PagingConfig;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    console, Element, Event, IntersectionObserver, IntersectionObserverEntry,
    IntersectionObserverInit, Window,
};
use yew::Callback;

/// Khóa phần tử canh gác: (thế hệ danh sách, số bản ghi đang hiển thị).
pub type SentinelKey = (u64, usize);

struct ScrollState {
    trigger: DebouncedProximity,
    timeout: Option<i32>,
}

/// Lắng nghe `scroll` trên khung danh sách; kiểm tra vị trí khi ngừng cuộn.
pub struct ScrollListener {
    window: Window,
    target: Element,
    state: Rc<RefCell<ScrollState>>,
    on_scroll: Closure<dyn FnMut(Event)>,
    _on_settle: Rc<Closure<dyn FnMut()>>,
}

impl ScrollListener {
    pub fn attach(
        target: &Element,
        config: &PagingConfig,
        gate: Callback<(), LoadGate>,
        on_load: Callback<()>,
    ) -> Result<Self, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("Không có window"))?;
        let state = Rc::new(RefCell::new(ScrollState {
            trigger: DebouncedProximity::from_config(config),
            timeout: None,
        }));

        // Mỗi sự kiện cuộn hủy hẹn giờ cũ, nên khi hẹn giờ chạy thì hạn đã tới.
        let on_settle = Rc::new({
            let state = Rc::clone(&state);
            Closure::<dyn FnMut()>::new(move || {
                let fire = {
                    let mut state = state.borrow_mut();
                    state.timeout = None;
                    match state.trigger.deadline() {
                        Some(due) => state.trigger.poll(due, gate.emit(())),
                        None => false,
                    }
                };
                if fire {
                    on_load.emit(());
                }
            })
        });

        let on_scroll = {
            let state = Rc::clone(&state);
            let window = window.clone();
            let target = target.clone();
            let on_settle = Rc::clone(&on_settle);
            Closure::<dyn FnMut(Event)>::new(move |_event: Event| {
                let metrics = ScrollMetrics::new(
                    f64::from(target.scroll_top()),
                    f64::from(target.client_height()),
                    f64::from(target.scroll_height()),
                );
                let mut state = state.borrow_mut();
                state.trigger.on_scroll(now(&window), metrics);

                if let Some(handle) = state.timeout.take() {
                    window.clear_timeout_with_handle(handle);
                }
                let delay = i32::try_from(state.trigger.delay().as_millis()).unwrap_or(i32::MAX);
                match window
                    .set_timeout_with_callback_and_timeout_and_arguments_0(as_function(&on_settle), delay)
                {
                    Ok(handle) => state.timeout = Some(handle),
                    Err(err) => console::error_1(&err),
                }
            })
        };

        target.add_event_listener_with_callback("scroll", on_scroll.as_ref().unchecked_ref())?;

        Ok(Self {
            window,
            target: target.clone(),
            state,
            on_scroll,
            _on_settle: on_settle,
        })
    }
}

impl Drop for ScrollListener {
    fn drop(&mut self) {
        if let Err(err) = self
            .target
            .remove_event_listener_with_callback("scroll", self.on_scroll.as_ref().unchecked_ref())
        {
            console::error_1(&err);
        }
        let mut state = self.state.borrow_mut();
        if let Some(handle) = state.timeout.take() {
            self.window.clear_timeout_with_handle(handle);
        }
        state.trigger.detach();
    }
}

struct SentinelState {
    visibility: SentinelVisibility<SentinelKey>,
    element: Option<Element>,
}

/// Theo dõi bản ghi cuối cùng bằng `IntersectionObserver`.
///
/// Gọi [`SentinelObserver::watch`] sau mỗi lần render để chuyển sang phần tử
/// cuối mới và nạp lại trạng thái.
pub struct SentinelObserver {
    observer: IntersectionObserver,
    state: Rc<RefCell<SentinelState>>,
    _on_intersect: Closure<dyn FnMut(Array, IntersectionObserver)>,
}

impl SentinelObserver {
    pub fn new(
        root: Option<&Element>,
        config: &PagingConfig,
        gate: Callback<(), LoadGate>,
        on_load: Callback<()>,
    ) -> Result<Self, JsValue> {
        let visibility = SentinelVisibility::from_config(config);
        let ratio = visibility.ratio();
        let state = Rc::new(RefCell::new(SentinelState {
            visibility,
            element: None,
        }));

        let on_intersect = {
            let state = Rc::clone(&state);
            Closure::<dyn FnMut(Array, IntersectionObserver)>::new(
                move |entries: Array, _observer: IntersectionObserver| {
                    let mut fire = false;
                    {
                        let mut state = state.borrow_mut();
                        let SentinelState {
                            visibility,
                            element,
                        } = &mut *state;
                        let (Some(key), Some(element)) =
                            (visibility.observed().copied(), element.as_ref())
                        else {
                            return;
                        };
                        for entry in entries.iter() {
                            let Ok(entry) = entry.dyn_into::<IntersectionObserverEntry>() else {
                                continue;
                            };
                            if entry.target() != *element {
                                continue;
                            }
                            fire |= visibility.on_intersection(
                                &key,
                                entry.intersection_ratio(),
                                gate.emit(()),
                            );
                        }
                    }
                    if fire {
                        on_load.emit(());
                    }
                },
            )
        };

        let options = IntersectionObserverInit::new();
        options.set_threshold(&JsValue::from_f64(ratio));
        options.set_root(root);
        let observer =
            IntersectionObserver::new_with_options(on_intersect.as_ref().unchecked_ref(), &options)?;

        Ok(Self {
            observer,
            state,
            _on_intersect: on_intersect,
        })
    }

    /// Chuyển sang theo dõi `element`, kể cả khi khóa không đổi.
    pub fn watch(&self, key: SentinelKey, element: &Element) {
        self.observer.disconnect();
        {
            let mut state = self.state.borrow_mut();
            state.visibility.observe(Some(key));
            state.element = Some(element.clone());
        }
        self.observer.observe(element);
    }

    /// Danh sách rỗng: không có gì để theo dõi.
    pub fn clear(&self) {
        self.observer.disconnect();
        let mut state = self.state.borrow_mut();
        state.visibility.observe(None);
        state.element = None;
    }
}

impl Drop for SentinelObserver {
    fn drop(&mut self) {
        self.observer.disconnect();
        self.state.borrow_mut().visibility.detach();
    }
}

fn as_function(closure: &Closure<dyn FnMut()>) -> &Function {
    closure.as_ref().unchecked_ref()
}

fn now(window: &Window) -> Duration {
    let millis = window
        .performance()
        .map(|performance| performance.now())
        .unwrap_or_default();
    if millis.is_finite() && millis > 0.0 {
        Duration::from_secs_f64(millis / 1_000.0)
    } else {
        Duration::ZERO
    }
}
