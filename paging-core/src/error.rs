/// Lỗi khi tải một trang từ nguồn dữ liệu.
///
/// Giữ lại trong trạng thái để giao diện hiển thị, nên cần `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Lỗi kết nối khi tải trang: {0}")]
    Transport(String),
    #[error("Máy chủ trả về mã {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Không đọc được dữ liệu trang: {0}")]
    Decode(String),
}

/// Lỗi chung của bộ tải danh sách.
#[derive(Debug, thiserror::Error)]
pub enum PagingError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Cấu hình không hợp lệ: {0}")]
    InvalidConfig(String),
    #[error("Danh sách đã bị hủy, không nhận thêm yêu cầu")]
    Disposed,
}

pub type PagingResult<T> = std::result::Result<T, PagingError>;
