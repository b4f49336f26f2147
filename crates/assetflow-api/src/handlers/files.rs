//! Range-aware file server: `GET /{name}`.

use std::io;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use futures::StreamExt;
use tokio_util::io::ReaderStream;

use assetflow_core::AppError;
use assetflow_processing::MAX_SNIFF_BYTES;

use crate::error::HttpAppError;
use crate::state::AppState;

const STREAM_CHUNK_SIZE: usize = 8 * 1024;
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// The slice of a stored object a response carries.
///
/// `start <= end < total_size` for non-empty objects. `partial` is false when no Range
/// header was sent, in which case the range spans the whole object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
    pub total_size: u64,
    pub partial: bool,
}

impl ByteRange {
    pub fn full(total_size: u64) -> Self {
        Self {
            start: 0,
            end: total_size.saturating_sub(1),
            total_size,
            partial: false,
        }
    }

    /// Parse a `Range` header value against an object of `total_size` bytes.
    ///
    /// Only the single-range form `bytes=<start>-[<end>]` is accepted. Suffix ranges,
    /// multiple ranges and anything out of bounds are unsatisfiable.
    pub fn parse(value: &str, total_size: u64) -> Result<Self, AppError> {
        let unsatisfiable = || AppError::RangeNotSatisfiable { total_size };

        let range_set = value
            .trim()
            .strip_prefix("bytes=")
            .ok_or_else(unsatisfiable)?;
        let (start, end) = range_set.split_once('-').ok_or_else(unsatisfiable)?;

        let start: u64 = start.parse().map_err(|_| unsatisfiable())?;
        let end: u64 = if end.is_empty() {
            total_size.checked_sub(1).ok_or_else(unsatisfiable)?
        } else {
            end.parse().map_err(|_| unsatisfiable())?
        };

        if end < start || end >= total_size {
            return Err(unsatisfiable());
        }

        Ok(Self {
            start,
            end,
            total_size,
            partial: true,
        })
    }

    pub fn length(&self) -> u64 {
        if self.total_size == 0 {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total_size)
    }
}

/// Content type from the object's leading bytes.
pub fn sniff_content_type(head: &[u8]) -> &'static str {
    infer::get(head)
        .map(|kind| kind.mime_type())
        .unwrap_or(FALLBACK_CONTENT_TYPE)
}

/// Errors that only mean the client went away mid-transfer.
pub fn is_client_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
    )
}

#[tracing::instrument(skip(state, headers), fields(operation = "serve_file"))]
pub async fn serve_file(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<Response, HttpAppError> {
    let total_size = state.storage.content_length(&name).await?;

    let range = match headers.get(header::RANGE) {
        None => ByteRange::full(total_size),
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|_| AppError::RangeNotSatisfiable { total_size })?;
            ByteRange::parse(value, total_size)?
        }
    };

    let head = state.storage.read_head(&name, MAX_SNIFF_BYTES).await?;
    let content_type = sniff_content_type(&head);

    let reader = state
        .storage
        .open_range(&name, range.start, range.length())
        .await?;

    let storage_key = name.clone();
    let body = ReaderStream::with_capacity(reader, STREAM_CHUNK_SIZE).map(move |chunk| {
        if let Err(e) = &chunk {
            if is_client_disconnect(e) {
                tracing::debug!(storage_key = %storage_key, "Client disconnected during transfer");
            } else {
                tracing::error!(error = %e, storage_key = %storage_key, "Failed to stream stored file");
            }
        }
        chunk
    });

    let status = if range.partial {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, range.length())
        .header(header::ACCEPT_RANGES, "bytes");
    if range.partial {
        builder = builder.header(header::CONTENT_RANGE, range.content_range());
    }

    tracing::debug!(
        storage_key = %name,
        start = range.start,
        length = range.length(),
        partial = range.partial,
        "Serving stored file"
    );

    builder.body(Body::from_stream(body)).map_err(|e| {
        tracing::error!(error = %e, "Failed to build response");
        HttpAppError::from(AppError::Internal(e.to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(value: &str, total: u64) -> bool {
        matches!(
            ByteRange::parse(value, total),
            Err(AppError::RangeNotSatisfiable { total_size }) if total_size == total
        )
    }

    #[test]
    fn parses_closed_range() {
        let range = ByteRange::parse("bytes=10-19", 100).unwrap();
        assert_eq!((range.start, range.end, range.length()), (10, 19, 10));
        assert!(range.partial);
        assert_eq!(range.content_range(), "bytes 10-19/100");
    }

    #[test]
    fn open_ended_range_runs_to_last_byte() {
        let range = ByteRange::parse("bytes=90-", 100).unwrap();
        assert_eq!((range.start, range.end, range.length()), (90, 99, 10));
    }

    #[test]
    fn single_byte_ranges_at_both_ends() {
        assert_eq!(ByteRange::parse("bytes=0-0", 5).unwrap().length(), 1);
        assert_eq!(ByteRange::parse("bytes=4-4", 5).unwrap().length(), 1);
    }

    #[test]
    fn rejects_out_of_bounds_and_malformed_ranges() {
        assert!(rejected("bytes=5-4", 100));
        assert!(rejected("bytes=0-100", 100));
        assert!(rejected("bytes=100-", 100));
        assert!(rejected("bytes=-10", 100));
        assert!(rejected("bytes=a-b", 100));
        assert!(rejected("bytes=0-1,4-5", 100));
        assert!(rejected("items=0-1", 100));
        assert!(rejected("bytes=0", 100));
        assert!(rejected("bytes=0-", 0));
    }

    #[test]
    fn full_range_covers_object() {
        let range = ByteRange::full(7);
        assert_eq!((range.start, range.end, range.length()), (0, 6, 7));
        assert!(!range.partial);
        assert_eq!(ByteRange::full(0).length(), 0);
    }

    #[test]
    fn sniffs_known_magic_bytes() {
        assert_eq!(
            sniff_content_type(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
            "image/png"
        );
        assert_eq!(sniff_content_type(b"plain words"), FALLBACK_CONTENT_TYPE);
    }

    #[test]
    fn classifies_disconnects() {
        assert!(is_client_disconnect(&io::Error::from(io::ErrorKind::BrokenPipe)));
        assert!(is_client_disconnect(&io::Error::from(
            io::ErrorKind::ConnectionReset
        )));
        assert!(!is_client_disconnect(&io::Error::from(
            io::ErrorKind::PermissionDenied
        )));
    }
}
