//! Trạng thái danh sách tích lũy qua nhiều trang.
//!
//! Mọi thay đổi đi qua ba thao tác: [`IncrementalCollection::begin_next_page`],
//! [`IncrementalCollection::complete`] và [`IncrementalCollection::reset`]. Phần
//! gọi mạng nằm ngoài (xem [`crate::Loader`]), nên kiểu này không cần khóa.

use std::hash::Hash;

use indexmap::{map::Entry, IndexMap};
use tracing::{debug, trace, warn};

use crate::scroll::LoadGate;
use crate::{
    FetchError, PageDescriptor, PageEnvelope, PagingConfig, PagingError, PagingResult, Query,
    LIMIT_PARAM,
};

/// Vị trí tải tiếp theo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    /// Chưa tải trang nào; lần tải đầu dùng descriptor khởi tạo.
    NotStarted,
    Next(PageDescriptor),
    /// Đã nhận trang cuối; chỉ `reset` mới cho tải lại.
    Exhausted,
}

/// Một yêu cầu tải đã được cấp phép, gắn với thế hệ hiện tại.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub generation: u64,
    pub descriptor: PageDescriptor,
    pub query: Query,
}

/// Số bản ghi được thêm mới và được ghi đè tại chỗ sau một lần gộp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub appended: usize,
    pub replaced: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Merged(MergeReport),
    /// Đang có một yêu cầu chưa xong; không làm gì.
    AlreadyPending,
    /// Không còn trang nào.
    Exhausted,
    /// Phản hồi thuộc thế hệ cũ (sau `reset`/`dispose`) và đã bị bỏ.
    Stale,
}

/// Kết quả của [`IncrementalCollection::begin_next_page`].
#[derive(Debug, Clone, PartialEq)]
pub enum NextPage {
    Fetch(PageRequest),
    Skip(RequestOutcome),
}

/// Ảnh chụp chỉ đọc để hiển thị.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSnapshot<T> {
    pub items: Vec<T>,
    /// `None` khi chưa nhận trang nào.
    pub total_count: Option<usize>,
    pub has_more: bool,
    pub pending: bool,
    pub error: Option<FetchError>,
    pub generation: u64,
}

/// Danh sách khử trùng lặp theo khóa, giữ thứ tự xuất hiện đầu tiên.
pub struct IncrementalCollection<T, K> {
    key_of: Box<dyn Fn(&T) -> K>,
    entries: IndexMap<K, T>,
    initial: PageDescriptor,
    continuation: Continuation,
    total_count: Option<usize>,
    in_flight: Option<u64>,
    query: Query,
    page_size: usize,
    generation: u64,
    last_error: Option<FetchError>,
    disposed: bool,
}

impl<T, K> IncrementalCollection<T, K>
where
    K: Hash + Eq,
{
    /// `key_of` phải là hàm thuần: cùng một bản ghi luôn cho cùng một khóa.
    pub fn new(
        config: &PagingConfig,
        initial: PageDescriptor,
        key_of: impl Fn(&T) -> K + 'static,
    ) -> Self {
        let mut query = Query::new();
        query.insert(LIMIT_PARAM, config.page_size);
        Self {
            key_of: Box::new(key_of),
            entries: IndexMap::new(),
            initial,
            continuation: Continuation::NotStarted,
            total_count: None,
            in_flight: None,
            query,
            page_size: config.page_size,
            generation: 0,
            last_error: None,
            disposed: false,
        }
    }

    /// Đặt bộ lọc ban đầu (trước lần tải đầu tiên).
    pub fn with_query(mut self, query: Query) -> Self {
        self.query = self.with_limit(query);
        self
    }

    fn with_limit(&self, mut query: Query) -> Query {
        query.insert(LIMIT_PARAM, self.page_size);
        query
    }

    /// Cấp phép một lần tải nếu không có yêu cầu nào đang chạy và còn trang.
    pub fn begin_next_page(&mut self) -> PagingResult<NextPage> {
        if self.disposed {
            return Err(PagingError::Disposed);
        }
        if self.in_flight.is_some() {
            return Ok(NextPage::Skip(RequestOutcome::AlreadyPending));
        }

        let descriptor = match &self.continuation {
            Continuation::NotStarted => self.initial.clone(),
            Continuation::Next(descriptor) => descriptor.clone(),
            Continuation::Exhausted => return Ok(NextPage::Skip(RequestOutcome::Exhausted)),
        };

        self.in_flight = Some(self.generation);
        debug!(
            generation = self.generation,
            ?descriptor,
            loaded = self.entries.len(),
            "requesting page"
        );

        Ok(NextPage::Fetch(PageRequest {
            generation: self.generation,
            descriptor,
            query: self.query.clone(),
        }))
    }

    /// Áp dụng kết quả của `request`.
    ///
    /// Phản hồi của thế hệ cũ bị bỏ qua mà không chạm vào trạng thái. Khi lỗi,
    /// danh sách và vị trí tải tiếp giữ nguyên để lần sau thử lại đúng trang đó.
    pub fn complete(
        &mut self,
        request: &PageRequest,
        result: Result<PageEnvelope<T>, FetchError>,
    ) -> PagingResult<RequestOutcome> {
        if self.disposed
            || request.generation != self.generation
            || self.in_flight != Some(request.generation)
        {
            trace!(
                request_generation = request.generation,
                current_generation = self.generation,
                "discarding stale page response"
            );
            return Ok(RequestOutcome::Stale);
        }

        self.in_flight = None;
        match result {
            Ok(envelope) => Ok(RequestOutcome::Merged(self.merge(envelope))),
            Err(err) => {
                warn!(
                    descriptor = ?request.descriptor,
                    error = %err,
                    "page fetch failed; keeping loaded items"
                );
                self.last_error = Some(err.clone());
                Err(err.into())
            }
        }
    }

    /// Hủy cấp phép của một yêu cầu không bao giờ hoàn tất (future bị drop).
    pub fn abandon(&mut self, request: &PageRequest) {
        if self.generation == request.generation && self.in_flight == Some(request.generation) {
            trace!(generation = request.generation, "page request abandoned");
            self.in_flight = None;
        }
    }

    fn merge(&mut self, envelope: PageEnvelope<T>) -> MergeReport {
        let mut report = MergeReport::default();
        for item in envelope.items {
            let key = (self.key_of)(&item);
            match self.entries.entry(key) {
                Entry::Occupied(mut slot) => {
                    slot.insert(item);
                    report.replaced += 1;
                }
                Entry::Vacant(slot) => {
                    slot.insert(item);
                    report.appended += 1;
                }
            }
        }

        self.total_count = Some(envelope.total_count);
        self.continuation = match envelope.next {
            Some(descriptor) => Continuation::Next(descriptor),
            None => Continuation::Exhausted,
        };
        self.last_error = None;

        let exhausted = self.continuation == Continuation::Exhausted;
        if exhausted != (self.entries.len() >= envelope.total_count) {
            debug!(
                total = envelope.total_count,
                loaded = self.entries.len(),
                exhausted,
                "server total disagrees with continuation"
            );
        }
        debug!(
            generation = self.generation,
            appended = report.appended,
            replaced = report.replaced,
            loaded = self.entries.len(),
            "page merged"
        );

        report
    }

    /// Xóa toàn bộ và bắt đầu lại với bộ lọc mới.
    ///
    /// Yêu cầu đang chạy không bị hủy trên mạng, nhưng kết quả của nó sẽ bị bỏ.
    pub fn reset(&mut self, query: Query) {
        self.generation += 1;
        self.entries.clear();
        self.total_count = None;
        self.continuation = Continuation::NotStarted;
        self.in_flight = None;
        self.last_error = None;
        self.query = self.with_limit(query);
        debug!(generation = self.generation, "collection reset");
    }

    /// Kết thúc vòng đời: không nhận thêm yêu cầu hay phản hồi nào.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.generation += 1;
        self.in_flight = None;
    }

    /// Còn trang để tải. Chỉ dựa vào descriptor kế tiếp, không dựa vào tổng số.
    pub fn has_more(&self) -> bool {
        !self.disposed && self.continuation != Continuation::Exhausted
    }

    pub fn is_pending(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn load_gate(&self) -> LoadGate {
        LoadGate {
            pending: self.is_pending(),
            has_more: self.has_more(),
        }
    }

    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }

    pub fn get(&self, key: &K) -> Option<&T> {
        self.entries.get(key)
    }

    /// Khóa của bản ghi cuối đang hiển thị (phần tử canh gác khi cuộn).
    pub fn last_key(&self) -> Option<&K> {
        self.entries.last().map(|(key, _)| key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_count(&self) -> Option<usize> {
        self.total_count
    }

    pub fn continuation(&self) -> &Continuation {
        &self.continuation
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn snapshot(&self) -> CollectionSnapshot<T>
    where
        T: Clone,
    {
        CollectionSnapshot {
            items: self.entries.values().cloned().collect(),
            total_count: self.total_count,
            has_more: self.has_more(),
            pending: self.is_pending(),
            error: self.last_error.clone(),
            generation: self.generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;

    use super::*;
    use crate::{QueryValue, OFFSET_PARAM};

    #[derive(Debug, Clone, PartialEq)]
    struct Record {
        id: &'static str,
        rev: u32,
    }

    fn record(id: &'static str, rev: u32) -> Record {
        Record { id, rev }
    }

    fn collection() -> IncrementalCollection<Record, &'static str> {
        IncrementalCollection::new(
            &PagingConfig::default(),
            PageDescriptor::first_offset(),
            |item: &Record| item.id,
        )
    }

    fn begin(coll: &mut IncrementalCollection<Record, &'static str>) -> PageRequest {
        match coll.begin_next_page().expect("begin thất bại") {
            NextPage::Fetch(request) => request,
            NextPage::Skip(outcome) => panic!("không cấp phép tải: {outcome:?}"),
        }
    }

    fn ids(coll: &IncrementalCollection<Record, &'static str>) -> Vec<&'static str> {
        coll.items().map(|item| item.id).collect()
    }

    #[test]
    fn overlapping_pages_keep_first_position_and_latest_value() {
        let mut coll = collection();

        let request = begin(&mut coll);
        coll.complete(
            &request,
            Ok(PageEnvelope::new(
                vec![record("A", 1), record("B", 1), record("C", 1)],
                4,
                Some(PageDescriptor::Offset(3)),
            )),
        )
        .expect("trang 1");

        let request = begin(&mut coll);
        assert_eq!(request.descriptor, PageDescriptor::Offset(3));
        let outcome = coll
            .complete(
                &request,
                Ok(PageEnvelope::new(
                    vec![record("C", 2), record("D", 1)],
                    4,
                    None,
                )),
            )
            .expect("trang 2");

        assert_eq!(
            outcome,
            RequestOutcome::Merged(MergeReport {
                appended: 1,
                replaced: 1
            })
        );
        assert_eq!(ids(&coll), vec!["A", "B", "C", "D"]);
        assert_eq!(coll.get(&"C"), Some(&record("C", 2)));
        assert!(!coll.has_more());
    }

    #[test]
    fn refetched_record_does_not_move() {
        let mut coll = collection();
        let request = begin(&mut coll);
        coll.complete(
            &request,
            Ok(PageEnvelope::new(
                vec![
                    record("a", 1),
                    record("b", 1),
                    record("c", 1),
                    record("k", 1),
                    record("e", 1),
                ],
                10,
                Some(PageDescriptor::Offset(5)),
            )),
        )
        .expect("trang 1");

        let request = begin(&mut coll);
        coll.complete(
            &request,
            Ok(PageEnvelope::new(
                vec![record("f", 1), record("k", 9)],
                10,
                Some(PageDescriptor::Offset(10)),
            )),
        )
        .expect("trang 2");

        assert_eq!(ids(&coll)[3], "k");
        assert_eq!(coll.items().nth(3), Some(&record("k", 9)));
        assert_eq!(coll.len(), 6);
    }

    #[test]
    fn second_begin_while_pending_is_a_no_op() {
        let mut coll = collection();
        let _request = begin(&mut coll);

        assert_eq!(
            coll.begin_next_page().expect("begin"),
            NextPage::Skip(RequestOutcome::AlreadyPending)
        );
        assert!(coll.is_pending());
        assert!(!coll.load_gate().is_open());
    }

    #[test]
    fn terminal_page_stops_further_requests() {
        let mut coll = collection();
        let request = begin(&mut coll);
        coll.complete(&request, Ok(PageEnvelope::new(vec![record("A", 1)], 1, None)))
            .expect("trang cuối");

        assert!(!coll.has_more());
        assert_eq!(coll.continuation(), &Continuation::Exhausted);
        assert_eq!(
            coll.begin_next_page().expect("begin"),
            NextPage::Skip(RequestOutcome::Exhausted)
        );
    }

    #[test]
    fn response_after_reset_is_discarded() {
        let mut coll = collection();
        let request = begin(&mut coll);

        coll.reset(Query::new().with("status", "active"));
        let outcome = coll
            .complete(
                &request,
                Ok(PageEnvelope::new(
                    vec![record("A", 1)],
                    1,
                    None,
                )),
            )
            .expect("complete");

        assert_eq!(outcome, RequestOutcome::Stale);
        assert!(coll.is_empty());
        assert!(!coll.is_pending());
        assert!(coll.has_more());
        assert_eq!(coll.total_count(), None);
        assert_eq!(coll.continuation(), &Continuation::NotStarted);
    }

    #[test]
    fn reset_keeps_page_size_in_query() {
        let mut coll = collection();
        coll.reset(Query::new().with("status", "active"));

        let request = begin(&mut coll);
        assert_eq!(request.generation, 1);
        assert_eq!(request.descriptor, PageDescriptor::Offset(0));
        assert_eq!(request.query.get(LIMIT_PARAM), Some(&QueryValue::Int(14)));
        assert_eq!(
            request.query.get("status"),
            Some(&QueryValue::Text("active".into()))
        );
        assert_eq!(request.query.get(OFFSET_PARAM), None);
    }

    #[test]
    fn failure_keeps_items_and_retries_same_page() {
        let mut coll = collection();
        let request = begin(&mut coll);
        coll.complete(
            &request,
            Ok(PageEnvelope::new(
                vec![record("A", 1)],
                20,
                Some(PageDescriptor::Offset(14)),
            )),
        )
        .expect("trang 1");

        let request = begin(&mut coll);
        let err = coll
            .complete(&request, Err(FetchError::Transport("timeout".into())))
            .expect_err("phải báo lỗi");
        assert!(matches!(err, PagingError::Fetch(FetchError::Transport(_))));

        assert_eq!(ids(&coll), vec!["A"]);
        assert!(!coll.is_pending());
        assert!(coll.has_more());
        assert_eq!(
            coll.last_error(),
            Some(&FetchError::Transport("timeout".into()))
        );

        let retry = begin(&mut coll);
        assert_eq!(retry.descriptor, PageDescriptor::Offset(14));
        coll.complete(&retry, Ok(PageEnvelope::new(vec![record("B", 1)], 2, None)))
            .expect("thử lại");
        assert_eq!(coll.last_error(), None);
    }

    #[test]
    fn continuation_wins_over_shrinking_total() {
        let mut coll = collection();
        let request = begin(&mut coll);
        coll.complete(
            &request,
            Ok(PageEnvelope::new(
                vec![record("A", 1), record("B", 1), record("C", 1)],
                2,
                Some(PageDescriptor::Offset(3)),
            )),
        )
        .expect("trang 1");

        assert_eq!(coll.total_count(), Some(2));
        assert!(coll.has_more());
    }

    #[test]
    fn disposed_collection_ignores_everything() {
        let mut coll = collection();
        let request = begin(&mut coll);
        coll.dispose();

        assert!(matches!(
            coll.begin_next_page(),
            Err(PagingError::Disposed)
        ));
        let outcome = coll
            .complete(&request, Ok(PageEnvelope::new(vec![record("A", 1)], 1, None)))
            .expect("complete");
        assert_eq!(outcome, RequestOutcome::Stale);
        assert!(coll.is_empty());
        assert!(!coll.has_more());
    }

    #[test]
    fn abandoned_request_releases_pending() {
        let mut coll = collection();
        let request = begin(&mut coll);
        coll.abandon(&request);

        assert!(!coll.is_pending());
        let again = begin(&mut coll);
        assert_eq!(again.descriptor, request.descriptor);
    }

    #[test]
    fn snapshot_reflects_state() {
        let mut coll = collection();
        let request = begin(&mut coll);
        coll.complete(
            &request,
            Ok(PageEnvelope::new(
                vec![record("A", 1)],
                5,
                Some(PageDescriptor::Offset(14)),
            )),
        )
        .expect("trang 1");

        let snapshot = coll.snapshot();
        assert_eq!(snapshot.items, vec![record("A", 1)]);
        assert_eq!(snapshot.total_count, Some(5));
        assert!(snapshot.has_more);
        assert!(!snapshot.pending);
        assert_eq!(snapshot.error, None);
        assert_eq!(coll.last_key(), Some(&"A"));
    }

    proptest! {
        #[test]
        fn merged_items_are_unique_and_ordered_by_first_arrival(
            pages in prop::collection::vec(
                prop::collection::vec((0u8..24, any::<u16>()), 0..10),
                1..6,
            )
        ) {
            let mut coll = IncrementalCollection::new(
                &PagingConfig::default(),
                PageDescriptor::first_offset(),
                |item: &(u8, u16)| item.0,
            );
            let mut first_seen = Vec::new();
            let mut latest = HashMap::new();

            for (index, page) in pages.iter().enumerate() {
                for &(key, value) in page {
                    if !first_seen.contains(&key) {
                        first_seen.push(key);
                    }
                    latest.insert(key, value);
                }

                let request = match coll.begin_next_page().expect("begin") {
                    NextPage::Fetch(request) => request,
                    NextPage::Skip(outcome) => panic!("bị bỏ qua: {outcome:?}"),
                };
                let next = Some(PageDescriptor::Offset((index + 1) * 14));
                coll.complete(&request, Ok(PageEnvelope::new(page.clone(), 1_000, next)))
                    .expect("complete");
            }

            let keys: Vec<u8> = coll.items().map(|item| item.0).collect();
            prop_assert_eq!(&keys, &first_seen);
            for item in coll.items() {
                prop_assert_eq!(Some(&item.1), latest.get(&item.0));
            }
        }
    }
}
