//! CSV encoding of resource rows
//!
//! Rows are encoded one at a time so an export never holds more than a
//! single encoded line in memory. Quoting follows RFC 4180 as implemented by
//! the `csv` crate: cells containing the delimiter, a quote, CR or LF are
//! quoted and embedded quotes are doubled. Lines end in CRLF.

use axum::body::Bytes;
use futures::stream::{self, BoxStream, StreamExt};

use crate::config::ResourceConfig;
use crate::core::entity::Record;
use crate::core::error::{ApiError, ApiResult};
use crate::core::store::RowStream;

/// Media type of export responses
pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

/// Encode one line of cells
pub fn encode_line<I, S>(cells: I) -> ApiResult<Bytes>
where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::with_capacity(128));
    writer.write_record(cells)?;
    let line = writer
        .into_inner()
        .map_err(|e| ApiError::Internal(format!("CSV buffer flush failed: {}", e)))?;
    Ok(Bytes::from(line))
}

/// Header line: field names in canonical order
pub fn encode_header(resource: &ResourceConfig) -> ApiResult<Bytes> {
    encode_line(resource.fields.iter().map(|f| f.name.as_str()))
}

/// Data line for one row, cells in canonical order
pub fn encode_record(resource: &ResourceConfig, record: &Record) -> ApiResult<Bytes> {
    let cells: Vec<_> = record.values_in_order(resource).map(|v| v.to_csv_cell()).collect();
    encode_line(cells.iter().map(|c| c.as_bytes()))
}

/// Lazily encoded export: the header chunk, then one chunk per row
///
/// The row stream is only polled when the consumer asks for the next chunk.
/// The first error ends the stream after being yielded, so a consumer never
/// sees a clean end after a failed read.
pub fn csv_stream(resource: ResourceConfig, rows: RowStream) -> BoxStream<'static, ApiResult<Bytes>> {
    let header = stream::once({
        let header = encode_header(&resource);
        async move { header }
    });

    let body = rows.map(move |row| {
        row.map_err(ApiError::from)
            .and_then(|record| encode_record(&resource, &record))
    });

    header
        .chain(body)
        .scan(false, |failed, item| {
            if *failed {
                return futures::future::ready(None);
            }
            *failed = item.is_err();
            futures::future::ready(Some(item))
        })
        .boxed()
}
