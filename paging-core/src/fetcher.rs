use std::future::Future;

use crate::{FetchError, PageDescriptor, PageEnvelope, Query};

/// Nguồn dữ liệu phân trang: mỗi lần gọi là một lượt đi về mạng.
///
/// Gọi lại với cùng `descriptor` phải an toàn (chỉ đọc). Hàm không được
/// sửa trạng thái danh sách; bộ tải quyết định cách xử lý lỗi.
pub trait PageFetcher<T> {
    fn fetch(
        &self,
        descriptor: &PageDescriptor,
        query: &Query,
    ) -> impl Future<Output = Result<PageEnvelope<T>, FetchError>>;
}

/// Bọc một closure bất đồng bộ thành [`PageFetcher`].
#[derive(Clone)]
pub struct FnFetcher<F>(F);

/// Dùng closure `(descriptor, query) -> Future` làm nguồn dữ liệu.
pub fn fetch_fn<F>(f: F) -> FnFetcher<F> {
    FnFetcher(f)
}

impl<T, F, Fut> PageFetcher<T> for FnFetcher<F>
where
    F: Fn(PageDescriptor, Query) -> Fut,
    Fut: Future<Output = Result<PageEnvelope<T>, FetchError>>,
{
    fn fetch(
        &self,
        descriptor: &PageDescriptor,
        query: &Query,
    ) -> impl Future<Output = Result<PageEnvelope<T>, FetchError>> {
        (self.0)(descriptor.clone(), query.clone())
    }
}
