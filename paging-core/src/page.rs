use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Tên tham số kích thước trang gửi kèm mỗi yêu cầu.
pub const LIMIT_PARAM: &str = "limit";
/// Tên tham số vị trí bắt đầu cho phân trang kiểu offset.
pub const OFFSET_PARAM: &str = "offset";

/// Vị trí của một trang: offset số hoặc cursor do trang trước trả về.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PageDescriptor {
    Offset(usize),
    Cursor(String),
}

impl PageDescriptor {
    /// Trang đầu tiên của phân trang kiểu offset.
    pub fn first_offset() -> Self {
        Self::Offset(0)
    }

    pub fn as_offset(&self) -> Option<usize> {
        match self {
            Self::Offset(offset) => Some(*offset),
            Self::Cursor(_) => None,
        }
    }

    pub fn as_cursor(&self) -> Option<&str> {
        match self {
            Self::Offset(_) => None,
            Self::Cursor(cursor) => Some(cursor),
        }
    }
}

/// Kết quả của một lần tải trang.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageEnvelope<T> {
    pub items: Vec<T>,
    /// Tổng số bản ghi trên mọi trang theo máy chủ; có thể thay đổi giữa các lần tải.
    pub total_count: usize,
    /// `None` nghĩa là không còn trang nào.
    pub next: Option<PageDescriptor>,
}

impl<T> PageEnvelope<T> {
    pub fn new(items: Vec<T>, total_count: usize, next: Option<PageDescriptor>) -> Self {
        Self {
            items,
            total_count,
            next,
        }
    }

    /// Dựng envelope cho phân trang offset, tự tính offset của trang kế tiếp.
    ///
    /// Trang rỗng luôn là trang cuối, kể cả khi `total_count` còn lớn hơn.
    pub fn for_offset(items: Vec<T>, total_count: usize, offset: usize, page_size: usize) -> Self {
        let next_offset = offset.saturating_add(page_size);
        let next = (!items.is_empty() && next_offset < total_count)
            .then_some(PageDescriptor::Offset(next_offset));
        Self::new(items, total_count, next)
    }

    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }
}

/// Giá trị vô hướng trong tham số truy vấn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<usize> for QueryValue {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for QueryValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Bộ lọc và tham số phân trang gửi cho nguồn dữ liệu, sắp theo tên.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(BTreeMap<String, QueryValue>);

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<QueryValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&QueryValue> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<QueryValue> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryValue)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Tham số cho một trang cụ thể: thêm `offset` khi trang dùng phân trang offset.
    pub fn for_page(&self, descriptor: &PageDescriptor) -> Query {
        let mut query = self.clone();
        if let Some(offset) = descriptor.as_offset() {
            query.insert(OFFSET_PARAM, offset);
        }
        query
    }

    /// Cặp khóa/giá trị dạng chuỗi, sẵn sàng để mã hóa vào URL.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|(key, value)| (key.clone(), value.to_string()))
            .collect()
    }
}

impl<K, V> FromIterator<(K, V)> for Query
where
    K: Into<String>,
    V: Into<QueryValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut query = Query::new();
        for (key, value) in iter {
            query.insert(key, value);
        }
        query
    }
}
