//! Logic lõi tải danh sách theo trang: gộp trang, khử trùng lặp và quyết định khi nào tải tiếp.

mod collection;
mod error;
mod fetcher;
mod loader;
mod page;
pub mod scroll;

use serde::{Deserialize, Serialize};

pub use collection::{
    CollectionSnapshot, Continuation, IncrementalCollection, MergeReport, NextPage, PageRequest,
    RequestOutcome,
};
pub use error::{FetchError, PagingError, PagingResult};
pub use fetcher::{fetch_fn, FnFetcher, PageFetcher};
pub use loader::Loader;
pub use page::{PageDescriptor, PageEnvelope, Query, QueryValue, LIMIT_PARAM, OFFSET_PARAM};

/// Số bản ghi mỗi trang dùng chung cho toàn ứng dụng.
pub const RESULTS_PER_PAGE_LIMIT: usize = 14;

/// Cấu hình kích thước trang và các ngưỡng kích hoạt khi cuộn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PagingConfig {
    /// Số bản ghi yêu cầu cho mỗi trang (tham số `limit`).
    pub page_size: usize,
    /// Thời gian (ms) không có sự kiện cuộn trước khi kiểm tra vị trí.
    pub scroll_debounce_ms: u32,
    /// Khoảng cách (px) tới cuối nội dung được coi là "gần cuối".
    pub scroll_threshold_px: f64,
    /// Tỉ lệ hiển thị của phần tử cuối để coi là đã vào khung nhìn.
    pub sentinel_ratio: f64,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            page_size: RESULTS_PER_PAGE_LIMIT,
            scroll_debounce_ms: 200,
            scroll_threshold_px: 100.0,
            sentinel_ratio: 0.5,
        }
    }
}

impl PagingConfig {
    /// Kiểm tra cấu hình trước khi dùng.
    pub fn validate(&self) -> PagingResult<()> {
        if self.page_size == 0 {
            return Err(PagingError::InvalidConfig(
                "page_size phải lớn hơn 0".into(),
            ));
        }
        if !self.scroll_threshold_px.is_finite() || self.scroll_threshold_px < 0.0 {
            return Err(PagingError::InvalidConfig(
                "scroll_threshold_px phải là số không âm".into(),
            ));
        }
        Ok(())
    }

    /// Tỉ lệ hiển thị đã kẹp về `0.0..=1.0`.
    pub fn sentinel_ratio(&self) -> f64 {
        if self.sentinel_ratio.is_nan() {
            return 0.0;
        }
        self.sentinel_ratio.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_app_page_size() {
        let config = PagingConfig::default();
        assert_eq!(config.page_size, 14);
        assert_eq!(config.scroll_debounce_ms, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let config = PagingConfig {
            page_size: 0,
            ..PagingConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PagingError::InvalidConfig(_))
        ));
    }

    #[test]
    fn sentinel_ratio_is_clamped() {
        let config = PagingConfig {
            sentinel_ratio: 1.7,
            ..PagingConfig::default()
        };
        assert_eq!(config.sentinel_ratio(), 1.0);
    }
}
