use std::rc::Rc;

use paging_core::{PagingConfig, Query};
use paging_fhir::display_label;
use paging_wasm::JsLoader;
use serde_json::Value;
use web_sys::{console, Element};
use yew::prelude::*;

use crate::hooks::use_infinite_query;
use crate::styles;
use crate::trigger::{ScrollListener, SentinelObserver};
use crate::{count_label, TriggerSettings, TriggerStrategy};

#[derive(Properties)]
pub struct InfiniteListProps {
    pub loader: Rc<JsLoader>,
    pub query: Query,
    pub config: PagingConfig,
    #[prop_or_default]
    pub strategy: TriggerStrategy,
}

impl PartialEq for InfiniteListProps {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.loader, &other.loader)
            && self.query == other.query
            && self.config == other.config
            && self.strategy == other.strategy
    }
}

#[function_component(InfiniteList)]
pub fn infinite_list(props: &InfiniteListProps) -> Html {
    use_effect_with((), |_| {
        if let Some(window) = web_sys::window() {
            if let Some(document) = window.document() {
                if let Err(err) = styles::ensure_styles(&document) {
                    console::error_1(&err);
                }
            }
        }
        || ()
    });

    let state = use_infinite_query((*props.loader).clone(), props.query.clone());
    let container = use_node_ref();
    let sentinel = use_node_ref();
    let observer = use_mut_ref(|| None::<SentinelObserver>);

    {
        let container = container.clone();
        let observer = observer.clone();
        let gate = state.gate.clone();
        let on_load = state.fetch_next_page.clone();
        let settings = TriggerSettings::new(props.strategy, &props.config);
        use_effect_with(settings, move |settings| {
            let mut listener = None;
            if let Some(root) = container.cast::<Element>() {
                let config = &settings.config;
                let attached = match settings.strategy {
                    TriggerStrategy::Debounced => {
                        ScrollListener::attach(&root, config, gate, on_load)
                            .map(|attached| listener = Some(attached))
                    }
                    TriggerStrategy::Sentinel => {
                        SentinelObserver::new(Some(&root), config, gate, on_load)
                            .map(|attached| *observer.borrow_mut() = Some(attached))
                    }
                };
                if let Err(err) = attached {
                    console::error_1(&err);
                }
            }
            move || {
                drop(listener);
                observer.borrow_mut().take();
            }
        });
    }

    {
        let observer = observer.clone();
        let sentinel = sentinel.clone();
        let key = (state.generation, state.items.len());
        let settings = TriggerSettings::new(props.strategy, &props.config);
        use_effect_with((settings, key, state.loading), move |(_, key, _)| {
            if let Some(active) = observer.borrow().as_ref() {
                match sentinel.cast::<Element>() {
                    Some(element) => active.watch(*key, &element),
                    None => active.clear(),
                }
            }
            || ()
        });
    }

    let last = state.items.len().saturating_sub(1);
    let rows = state.items.iter().enumerate().map(|(index, item)| {
        let node_ref = if index == last {
            sentinel.clone()
        } else {
            NodeRef::default()
        };
        render_row(item, node_ref)
    });

    let on_refetch = state.refetch.reform(|_: MouseEvent| ());
    let on_retry = state.fetch_next_page.reform(|_: MouseEvent| ());

    html! {
        <section class="paging-root">
            <header class="paging-toolbar">
                <span class="paging-count">{ count_label(state.items.len(), state.total_count) }</span>
                <button type="button" onclick={on_refetch} aria-label="Tải lại danh sách">{"Tải lại"}</button>
            </header>
            <ul class="paging-list" ref={container} aria-busy={state.loading.to_string()}>
                { for rows }
                {
                    if state.loading {
                        html! { <li class="paging-status" data-state="loading">{"Đang tải..."}</li> }
                    } else if let Some(err) = &state.error {
                        html! {
                            <li class="paging-status" data-state="error">
                                <span>{ format!("Không tải được trang: {err}") }</span>
                                <button type="button" onclick={on_retry}>{"Thử lại"}</button>
                            </li>
                        }
                    } else if state.items.is_empty() && !state.has_more {
                        html! { <li class="paging-status" data-state="empty">{"Không có bản ghi nào."}</li> }
                    } else if !state.has_more {
                        html! { <li class="paging-status" data-state="done">{"Đã hiển thị toàn bộ."}</li> }
                    } else {
                        Html::default()
                    }
                }
            </ul>
        </section>
    }
}

fn render_row(item: &Value, node_ref: NodeRef) -> Html {
    html! {
        <li class="paging-row" ref={node_ref}>
            <span class="paging-label">{ display_label(item) }</span>
        </li>
    }
}
