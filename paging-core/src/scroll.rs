//! Quyết định khi nào tải trang kế tiếp dựa trên vị trí cuộn.
//!
//! Hai chiến lược thay thế nhau: kiểm tra vị trí sau khi ngừng cuộn
//! ([`DebouncedProximity`]) hoặc theo dõi phần tử cuối vào khung nhìn
//! ([`SentinelVisibility`]). Cả hai chỉ phát tín hiệu khi [`LoadGate`] mở;
//! việc gọi tải vẫn phải qua `request_next_page`, vốn bỏ qua khi đang tải.
//!
//! Thời gian được truyền vào dưới dạng `Duration` kể từ một mốc tùy ý
//! (ví dụ `performance.now()` trên trình duyệt), không đọc đồng hồ hệ thống.

use std::time::Duration;

use crate::PagingConfig;

/// Điều kiện cho phép kích hoạt tải: không có yêu cầu đang chạy và còn trang.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadGate {
    pub pending: bool,
    pub has_more: bool,
}

impl LoadGate {
    pub fn is_open(&self) -> bool {
        !self.pending && self.has_more
    }
}

/// Kích thước khung cuộn tại một thời điểm, cùng đơn vị (px).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_offset: f64,
    pub viewport_extent: f64,
    pub content_extent: f64,
}

impl ScrollMetrics {
    pub fn new(scroll_offset: f64, viewport_extent: f64, content_extent: f64) -> Self {
        Self {
            scroll_offset,
            viewport_extent,
            content_extent,
        }
    }

    /// Mép dưới khung nhìn đã tới gần cuối nội dung trong phạm vi `threshold`.
    pub fn near_end(&self, threshold: f64) -> bool {
        self.scroll_offset + self.viewport_extent >= self.content_extent - threshold
    }
}

/// Gom chuỗi sự kiện cuộn; chỉ kiểm tra vị trí sau `delay` không có sự kiện mới.
#[derive(Debug, Clone)]
pub struct DebouncedProximity {
    delay: Duration,
    threshold: f64,
    deadline: Option<Duration>,
    latest: Option<ScrollMetrics>,
    attached: bool,
}

impl DebouncedProximity {
    pub fn new(delay: Duration, threshold: f64) -> Self {
        Self {
            delay,
            threshold,
            deadline: None,
            latest: None,
            attached: true,
        }
    }

    pub fn from_config(config: &PagingConfig) -> Self {
        Self::new(
            Duration::from_millis(u64::from(config.scroll_debounce_ms)),
            config.scroll_threshold_px,
        )
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Ghi nhận một sự kiện cuộn và dời hạn kiểm tra.
    pub fn on_scroll(&mut self, now: Duration, metrics: ScrollMetrics) {
        if !self.attached {
            return;
        }
        self.latest = Some(metrics);
        self.deadline = Some(now + self.delay);
    }

    /// Thời điểm sớm nhất mà `poll` có thể trả về `true`.
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Trả về `true` đúng một lần cho mỗi đợt cuộn đã lắng xuống và ở gần cuối.
    pub fn poll(&mut self, now: Duration, gate: LoadGate) -> bool {
        if !self.attached {
            return false;
        }
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                let near_end = self
                    .latest
                    .take()
                    .is_some_and(|metrics| metrics.near_end(self.threshold));
                near_end && gate.is_open()
            }
            _ => false,
        }
    }

    /// Ngắt khỏi khung cuộn; sau đó không bao giờ phát tín hiệu.
    pub fn detach(&mut self) {
        self.attached = false;
        self.deadline = None;
        self.latest = None;
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }
}

/// Theo dõi phần tử cuối cùng (canh gác) đi vào khung nhìn.
///
/// Chỉ nhận tín hiệu của phần tử đang được theo dõi; tín hiệu từ phần tử cũ
/// (trước khi danh sách dài thêm) bị bỏ qua.
#[derive(Debug, Clone)]
pub struct SentinelVisibility<K> {
    ratio: f64,
    observed: Option<K>,
    visible: bool,
    attached: bool,
}

impl<K: PartialEq> SentinelVisibility<K> {
    pub fn new(ratio: f64) -> Self {
        Self {
            ratio,
            observed: None,
            visible: false,
            attached: true,
        }
    }

    pub fn from_config(config: &PagingConfig) -> Self {
        Self::new(config.sentinel_ratio())
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Đặt lại phần tử canh gác sau mỗi lần hiển thị hoặc tải xong.
    ///
    /// Luôn nạp lại trạng thái, kể cả khi khóa không đổi (trang vừa tải toàn
    /// bản ghi trùng), để lần quan sát kế tiếp có thể kích hoạt lại.
    /// Trả về `true` khi phần tử canh gác đổi.
    pub fn observe(&mut self, last_key: Option<K>) -> bool {
        if !self.attached {
            return false;
        }
        self.visible = false;
        let changed = self.observed != last_key;
        self.observed = last_key;
        changed
    }

    pub fn observed(&self) -> Option<&K> {
        self.observed.as_ref()
    }

    /// Xử lý một tín hiệu giao cắt; trả về `true` khi cần tải trang kế tiếp.
    pub fn on_intersection(&mut self, key: &K, ratio: f64, gate: LoadGate) -> bool {
        if !self.attached || self.observed.as_ref() != Some(key) {
            return false;
        }
        let was_visible = self.visible;
        self.visible = ratio >= self.ratio && ratio > 0.0;
        !was_visible && self.visible && gate.is_open()
    }

    pub fn detach(&mut self) {
        self.attached = false;
        self.observed = None;
        self.visible = false;
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPEN: LoadGate = LoadGate {
        pending: false,
        has_more: true,
    };

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn at_bottom() -> ScrollMetrics {
        ScrollMetrics::new(900.0, 300.0, 1250.0)
    }

    #[test]
    fn near_end_respects_threshold() {
        assert!(ScrollMetrics::new(900.0, 300.0, 1250.0).near_end(100.0));
        assert!(!ScrollMetrics::new(700.0, 300.0, 1250.0).near_end(100.0));
    }

    #[test]
    fn burst_of_scroll_events_fires_once() {
        let mut trigger = DebouncedProximity::from_config(&PagingConfig::default());
        let mut fired = 0;

        for step in 0..10 {
            let now = ms(step * 5);
            trigger.on_scroll(now, at_bottom());
            if trigger.poll(now, OPEN) {
                fired += 1;
            }
        }
        assert_eq!(fired, 0);
        assert_eq!(trigger.deadline(), Some(ms(245)));

        for now in [ms(100), ms(245), ms(300), ms(600)] {
            if trigger.poll(now, OPEN) {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
    }

    #[test]
    fn closed_gate_suppresses_trigger() {
        let mut trigger = DebouncedProximity::new(ms(200), 100.0);

        trigger.on_scroll(ms(0), at_bottom());
        let pending = LoadGate {
            pending: true,
            has_more: true,
        };
        assert!(!trigger.poll(ms(200), pending));

        trigger.on_scroll(ms(300), at_bottom());
        let exhausted = LoadGate {
            pending: false,
            has_more: false,
        };
        assert!(!trigger.poll(ms(500), exhausted));
    }

    #[test]
    fn far_from_end_does_not_fire() {
        let mut trigger = DebouncedProximity::new(ms(200), 100.0);
        trigger.on_scroll(ms(0), ScrollMetrics::new(0.0, 300.0, 1250.0));
        assert!(!trigger.poll(ms(250), OPEN));
    }

    #[test]
    fn keeps_listening_after_firing() {
        let mut trigger = DebouncedProximity::new(ms(200), 100.0);
        trigger.on_scroll(ms(0), at_bottom());
        assert!(trigger.poll(ms(200), OPEN));

        trigger.on_scroll(ms(1_000), ScrollMetrics::new(1_900.0, 300.0, 2_250.0));
        assert!(trigger.poll(ms(1_200), OPEN));
    }

    #[test]
    fn detached_debounce_never_fires() {
        let mut trigger = DebouncedProximity::new(ms(200), 100.0);
        trigger.on_scroll(ms(0), at_bottom());
        trigger.detach();

        assert!(!trigger.poll(ms(500), OPEN));
        trigger.on_scroll(ms(600), at_bottom());
        assert_eq!(trigger.deadline(), None);
        assert!(!trigger.is_attached());
    }

    #[test]
    fn sentinel_fires_once_per_entry() {
        let mut sentinel = SentinelVisibility::new(0.5);
        assert!(sentinel.observe(Some("row-14")));

        assert!(!sentinel.on_intersection(&"row-14", 0.2, OPEN));
        assert!(sentinel.on_intersection(&"row-14", 0.6, OPEN));
        assert!(!sentinel.on_intersection(&"row-14", 0.9, OPEN));
    }

    #[test]
    fn sentinel_ignores_previous_last_item() {
        let mut sentinel = SentinelVisibility::new(0.5);
        sentinel.observe(Some(14));
        assert!(sentinel.on_intersection(&14, 1.0, OPEN));

        assert!(sentinel.observe(Some(28)));
        assert!(!sentinel.on_intersection(&14, 1.0, OPEN));
        assert!(sentinel.on_intersection(&28, 1.0, OPEN));
    }

    #[test]
    fn sentinel_rearms_when_last_item_is_unchanged() {
        let mut sentinel = SentinelVisibility::new(0.5);
        sentinel.observe(Some(14));
        assert!(sentinel.on_intersection(&14, 1.0, OPEN));

        assert!(!sentinel.observe(Some(14)));
        assert!(sentinel.on_intersection(&14, 1.0, OPEN));
    }

    #[test]
    fn sentinel_respects_gate_and_detach() {
        let mut sentinel = SentinelVisibility::new(0.5);
        sentinel.observe(Some(1));
        let exhausted = LoadGate {
            pending: false,
            has_more: false,
        };
        assert!(!sentinel.on_intersection(&1, 1.0, exhausted));

        sentinel.observe(Some(1));
        sentinel.detach();
        assert!(!sentinel.on_intersection(&1, 1.0, OPEN));
        assert!(!sentinel.observe(Some(2)));
        assert_eq!(sentinel.observed(), None);
    }
}
