use std::cell::RefCell;
use std::hash::Hash;
use std::rc::Rc;

use crate::{
    CollectionSnapshot, IncrementalCollection, NextPage, PageFetcher, PageRequest, PagingResult,
    Query, RequestOutcome,
};

/// Gắn một [`IncrementalCollection`] với nguồn dữ liệu trên một luồng sự kiện duy nhất.
///
/// Bản sao (`clone`) dùng chung trạng thái, nên có thể đưa vào callback giao diện.
/// Không khóa: trạng thái chỉ được mượn trong khoảng giữa các điểm `await`.
pub struct Loader<T, K, F> {
    state: Rc<RefCell<IncrementalCollection<T, K>>>,
    fetcher: Rc<F>,
    listener: Rc<RefCell<Option<Rc<dyn Fn()>>>>,
}

impl<T, K, F> Clone for Loader<T, K, F> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
            fetcher: Rc::clone(&self.fetcher),
            listener: Rc::clone(&self.listener),
        }
    }
}

impl<T, K, F> Loader<T, K, F>
where
    K: Hash + Eq,
    F: PageFetcher<T>,
{
    pub fn new(collection: IncrementalCollection<T, K>, fetcher: F) -> Self {
        Self {
            state: Rc::new(RefCell::new(collection)),
            fetcher: Rc::new(fetcher),
            listener: Rc::new(RefCell::new(None)),
        }
    }

    /// Đăng ký hàm được gọi sau mỗi thay đổi trạng thái (bắt đầu tải, gộp
    /// trang, lỗi, `reset`, `dispose`). Thay thế hàm đã đăng ký trước đó.
    pub fn on_change(&self, listener: impl Fn() + 'static) {
        *self.listener.borrow_mut() = Some(Rc::new(listener));
    }

    fn notify(&self) {
        let listener = self.listener.borrow().clone();
        if let Some(listener) = listener {
            listener();
        }
    }

    /// Tải trang kế tiếp và gộp vào danh sách.
    ///
    /// Trả về ngay `AlreadyPending` khi đang có yêu cầu chạy, `Exhausted` khi đã
    /// hết trang. Nếu future bị drop giữa chừng, yêu cầu được giải phóng.
    pub async fn request_next_page(&self) -> PagingResult<RequestOutcome> {
        let request = match self.state.borrow_mut().begin_next_page()? {
            NextPage::Fetch(request) => request,
            NextPage::Skip(outcome) => return Ok(outcome),
        };
        self.notify();

        let guard = InFlight {
            state: &self.state,
            request: &request,
            armed: true,
        };
        let result = self
            .fetcher
            .fetch(&request.descriptor, &request.query)
            .await;
        guard.disarm();

        let outcome = self.state.borrow_mut().complete(&request, result);
        if !matches!(outcome, Ok(RequestOutcome::Stale)) {
            self.notify();
        }
        outcome
    }

    /// Bỏ danh sách hiện tại và đổi bộ lọc; phản hồi đang chờ sẽ bị loại.
    pub fn reset(&self, query: Query) {
        self.state.borrow_mut().reset(query);
        self.notify();
    }

    /// Tải lại từ trang đầu với bộ lọc hiện tại.
    pub async fn refetch(&self) -> PagingResult<RequestOutcome> {
        let query = self.state.borrow().query().clone();
        self.reset(query);
        self.request_next_page().await
    }

    pub fn dispose(&self) {
        self.state.borrow_mut().dispose();
        self.listener.borrow_mut().take();
    }

    pub fn snapshot(&self) -> CollectionSnapshot<T>
    where
        T: Clone,
    {
        self.state.borrow().snapshot()
    }

    pub fn is_pending(&self) -> bool {
        self.state.borrow().is_pending()
    }

    pub fn has_more(&self) -> bool {
        self.state.borrow().has_more()
    }

    /// Đọc trạng thái mà không sao chép danh sách.
    pub fn with_collection<R>(&self, f: impl FnOnce(&IncrementalCollection<T, K>) -> R) -> R {
        f(&self.state.borrow())
    }
}

/// Giải phóng cấp phép tải nếu future bị drop trước khi có phản hồi.
struct InFlight<'a, T, K>
where
    K: Hash + Eq,
{
    state: &'a RefCell<IncrementalCollection<T, K>>,
    request: &'a PageRequest,
    armed: bool,
}

impl<T, K> InFlight<'_, T, K>
where
    K: Hash + Eq,
{
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<T, K> Drop for InFlight<'_, T, K>
where
    K: Hash + Eq,
{
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut state) = self.state.try_borrow_mut() {
            state.abandon(self.request);
        }
    }
}
