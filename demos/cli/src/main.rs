use anyhow::Context;
use clap::{Parser, ValueEnum};
use paging_core::{
    FetchError, IncrementalCollection, Loader, PageDescriptor, PageEnvelope, PageFetcher,
    PagingConfig, Query, RequestOutcome,
};
use paging_fhir::{decode_results_page, decode_searchset_str, display_label, record_id, resource_key};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Bundle FHIR `searchset`, phân trang theo `link[next]`.
    Fhir,
    /// `{ count, results }`, phân trang bằng `limit`/`offset`.
    Results,
}

#[derive(Parser, Debug)]
#[command(
    name = "paging-cli",
    about = "Tải danh sách theo trang từ một endpoint HTTP và in từng trang."
)]
struct Args {
    /// URL trang đầu (search FHIR hoặc endpoint danh sách).
    #[arg(short, long, env = "PAGING_URL")]
    url: String,

    #[arg(short, long, value_enum, default_value_t = Format::Fhir)]
    format: Format,

    /// Số trang tối đa cần tải.
    #[arg(short, long, default_value_t = 3)]
    pages: usize,

    #[arg(long, env = "PAGING_PAGE_SIZE")]
    page_size: Option<usize>,
}

struct HttpFetcher {
    client: reqwest::Client,
    url: String,
    format: Format,
    page_size: usize,
}

impl PageFetcher<Value> for HttpFetcher {
    async fn fetch(
        &self,
        descriptor: &PageDescriptor,
        query: &Query,
    ) -> Result<PageEnvelope<Value>, FetchError> {
        let request = match descriptor {
            // Link `next` của server đã chứa đủ tham số.
            PageDescriptor::Cursor(url) => self.client.get(url),
            PageDescriptor::Offset(_) => self
                .client
                .get(&self.url)
                .query(&query.for_page(descriptor).to_pairs()),
        };

        let response = request
            .send()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;

        if !status.is_success() {
            return Err(status_error(status.as_u16(), &body));
        }
        decode_page(self.format, self.page_size, descriptor, &body)
    }
}

fn decode_page(
    format: Format,
    page_size: usize,
    descriptor: &PageDescriptor,
    body: &str,
) -> Result<PageEnvelope<Value>, FetchError> {
    match format {
        Format::Fhir => decode_searchset_str(body),
        Format::Results => {
            let value: Value =
                serde_json::from_str(body).map_err(|err| FetchError::Decode(err.to_string()))?;
            let offset = descriptor.as_offset().unwrap_or_default();
            decode_results_page(&value, offset, page_size)
        }
    }
}

fn status_error(status: u16, body: &str) -> FetchError {
    let message = body.trim();
    let message = if message.is_empty() {
        "empty response body".to_string()
    } else {
        message.chars().take(200).collect()
    };
    FetchError::Status { status, message }
}

// Cả hai bộ giải mã đã bỏ bản ghi thiếu khóa.
fn item_key(format: Format) -> fn(&Value) -> String {
    match format {
        Format::Fhir => |item: &Value| resource_key(item).unwrap_or_default(),
        Format::Results => |item: &Value| record_id(item).unwrap_or_default(),
    }
}

/// Tổng do máy chủ báo; `?` khi không có hoặc nhỏ hơn số đã tải
/// (Bundle không kèm `total`).
fn total_label(loaded: usize, total: Option<usize>) -> String {
    match total {
        Some(total) if total >= loaded => total.to_string(),
        _ => "?".to_string(),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("paging=info".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = PagingConfig::default();
    if let Some(size) = args.page_size {
        config.page_size = size;
    }
    config.validate().context("Cấu hình phân trang không hợp lệ")?;

    let initial = match args.format {
        Format::Fhir => PageDescriptor::Cursor(args.url.clone()),
        Format::Results => PageDescriptor::first_offset(),
    };
    let collection = IncrementalCollection::new(&config, initial, item_key(args.format));
    let fetcher = HttpFetcher {
        client: reqwest::Client::new(),
        url: args.url.clone(),
        format: args.format,
        page_size: config.page_size,
    };
    let loader = Loader::new(collection, fetcher);

    for page in 1..=args.pages {
        let outcome = loader
            .request_next_page()
            .await
            .with_context(|| format!("Không tải được trang {page} từ {}", args.url))?;

        match outcome {
            RequestOutcome::Merged(report) => info!(
                page,
                appended = report.appended,
                replaced = report.replaced,
                "page merged"
            ),
            RequestOutcome::Exhausted => {
                info!(page, "no more pages");
                break;
            }
            other => warn!(page, ?other, "page skipped"),
        }
    }

    let snapshot = loader.snapshot();
    let total = total_label(snapshot.items.len(), snapshot.total_count);
    println!(
        "Loaded: {} / {}\nHas more: {}",
        snapshot.items.len(),
        total,
        snapshot.has_more
    );
    for (index, item) in snapshot.items.iter().enumerate() {
        println!("{:>4}. {}", index + 1, display_label(item));
    }

    Ok(())
}
