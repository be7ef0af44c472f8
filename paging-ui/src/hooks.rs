use std::hash::Hash;
use std::rc::Rc;

use paging_core::scroll::LoadGate;
use paging_core::{
    FetchError, IncrementalCollection, Loader, PageFetcher, PagingResult, Query, RequestOutcome,
};
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::spawn_local;
use web_sys::console;
use yew::prelude::*;

/// Trạng thái danh sách tại lần render hiện tại, kèm các thao tác tải.
pub struct InfiniteQuery<T> {
    pub items: Rc<Vec<T>>,
    pub total_count: Option<usize>,
    pub has_more: bool,
    pub loading: bool,
    pub error: Option<FetchError>,
    /// Tăng sau mỗi lần đổi bộ lọc hoặc tải lại.
    pub generation: u64,
    pub fetch_next_page: Callback<()>,
    pub refetch: Callback<()>,
    /// Đọc trạng thái tải mới nhất, không phụ thuộc lần render.
    pub gate: Callback<(), LoadGate>,
}

/// Gắn `loader` vào vòng đời thành phần.
///
/// Khi `query` đổi: bỏ danh sách cũ rồi tải trang đầu. Khi thành phần bị gỡ:
/// `dispose`, mọi phản hồi về sau đều bị bỏ qua. `loader` phải giữ nguyên
/// trong suốt vòng đời thành phần.
#[hook]
pub fn use_infinite_query<T, K, F>(loader: Loader<T, K, F>, query: Query) -> InfiniteQuery<T>
where
    T: Clone + 'static,
    K: Hash + Eq + 'static,
    F: PageFetcher<T> + 'static,
{
    let update = use_force_update();

    {
        let loader = loader.clone();
        use_effect_with((), move |_| {
            loader.on_change(move || update.force_update());
            move || loader.dispose()
        });
    }

    {
        let loader = loader.clone();
        use_effect_with(query, move |query| {
            loader.reset(query.clone());
            spawn_next_page(loader);
            || ()
        });
    }

    let fetch_next_page = {
        let loader = loader.clone();
        Callback::from(move |_: ()| spawn_next_page(loader.clone()))
    };

    let refetch = {
        let loader = loader.clone();
        Callback::from(move |_: ()| {
            let loader = loader.clone();
            spawn_local(async move { report(loader.refetch().await) });
        })
    };

    let gate = {
        let loader = loader.clone();
        Callback::from(move |_: ()| loader.with_collection(IncrementalCollection::load_gate))
    };

    let snapshot = loader.snapshot();
    InfiniteQuery {
        items: Rc::new(snapshot.items),
        total_count: snapshot.total_count,
        has_more: snapshot.has_more,
        loading: snapshot.pending,
        error: snapshot.error,
        generation: snapshot.generation,
        fetch_next_page,
        refetch,
        gate,
    }
}

fn spawn_next_page<T, K, F>(loader: Loader<T, K, F>)
where
    T: 'static,
    K: Hash + Eq + 'static,
    F: PageFetcher<T> + 'static,
{
    spawn_local(async move { report(loader.request_next_page().await) });
}

// Lỗi tải đã nằm trong snapshot; chỉ ghi thêm ra console.
fn report(result: PagingResult<RequestOutcome>) {
    if let Err(err) = result {
        console::warn_1(&JsValue::from_str(&format!("Không tải được trang: {err}")));
    }
}
