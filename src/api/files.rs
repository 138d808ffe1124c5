use crate::AppState;
use axum::body::Body;
use axum::extract::{Extension, Path as AxumPath};
use axum::http::{HeaderMap, HeaderValue, Response, StatusCode, header};
use axum::response::IntoResponse;
use mime_guess::from_path;
use std::path::{Component, Path};
use tokio::io::{AsyncReadExt as _, AsyncSeekExt as _};
use tokio_util::io::ReaderStream;
use tracing::{debug, error, warn};

#[derive(Debug, PartialEq, Eq)]
enum ByteRange {
    Full,
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

/// `GET /uploads/{filename}`
pub async fn serve_upload(
    Extension(state): Extension<AppState>,
    AxumPath(filename): AxumPath<String>,
    headers: HeaderMap,
) -> Response<Body> {
    serve_file(state.uploads_dir(), &filename, &headers).await
}

/// `GET /temp/{filename}`
pub async fn serve_frame(
    Extension(state): Extension<AppState>,
    AxumPath(filename): AxumPath<String>,
    headers: HeaderMap,
) -> Response<Body> {
    serve_file(state.temp_dir(), &filename, &headers).await
}

async fn serve_file(dir: &Path, filename: &str, headers: &HeaderMap) -> Response<Body> {
    if !is_plain_file_name(filename) {
        warn!(%filename, "Invalid filename");
        return (StatusCode::BAD_REQUEST, "Invalid filename").into_response();
    }

    let path = dir.join(filename);
    debug!(?path, "Request serve file");

    let Ok(mut fh) = tokio::fs::File::open(&path).await else {
        return file_not_found();
    };
    let size = match fh.metadata().await {
        Ok(metadata) if metadata.is_file() => metadata.len(),
        _ => return file_not_found(),
    };

    let (status, start, len) = match parse_range(headers, size) {
        ByteRange::Full => (StatusCode::OK, 0, size),
        ByteRange::Partial { start, end } => (StatusCode::PARTIAL_CONTENT, start, end - start + 1),
        ByteRange::Unsatisfiable => return range_not_satisfiable(size),
    };

    if start > 0
        && let Err(error) = fh.seek(std::io::SeekFrom::Start(start)).await
    {
        error!(?path, %error, "Failed to seek file");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let mut res = Response::new(Body::from_stream(ReaderStream::new(fh.take(len))));
    *res.status_mut() = status;
    let headers = res.headers_mut();
    if let Ok(content_type) = HeaderValue::from_str(from_path(&path).first_or_octet_stream().as_ref()) {
        headers.insert(header::CONTENT_TYPE, content_type);
    }
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    if status == StatusCode::PARTIAL_CONTENT
        && let Ok(content_range) =
            HeaderValue::from_str(&format!("bytes {start}-{}/{size}", start + len - 1))
    {
        headers.insert(header::CONTENT_RANGE, content_range);
    }
    res
}

/// A single normal path component, so requests cannot leave the served directory.
fn is_plain_file_name(filename: &str) -> bool {
    let mut components = Path::new(filename).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !filename.contains(['/', '\\'])
}

fn file_not_found() -> Response<Body> {
    (StatusCode::NOT_FOUND, "File not found").into_response()
}

fn range_not_satisfiable(size: u64) -> Response<Body> {
    let mut res = StatusCode::RANGE_NOT_SATISFIABLE.into_response();
    if let Ok(content_range) = HeaderValue::from_str(&format!("bytes */{size}")) {
        res.headers_mut().insert(header::CONTENT_RANGE, content_range);
    }
    res
}

/// Parses a single `bytes=` range. Anything unparseable is served in full.
fn parse_range(headers: &HeaderMap, file_size: u64) -> ByteRange {
    let Some(spec) = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("bytes="))
    else {
        return ByteRange::Full;
    };
    let Some((start, end)) = spec.trim().split_once('-') else {
        return ByteRange::Full;
    };

    // bytes=-N: the last N bytes
    if start.is_empty() {
        return match end.parse::<u64>() {
            Ok(0) => ByteRange::Unsatisfiable,
            Ok(_) if file_size == 0 => ByteRange::Unsatisfiable,
            Ok(suffix) => ByteRange::Partial {
                start: file_size.saturating_sub(suffix),
                end: file_size - 1,
            },
            Err(_) => ByteRange::Full,
        };
    }

    let Ok(start) = start.parse::<u64>() else {
        return ByteRange::Full;
    };
    if start >= file_size {
        return ByteRange::Unsatisfiable;
    }

    let end = if end.is_empty() {
        file_size - 1
    } else {
        match end.parse::<u64>() {
            Ok(end) => end.min(file_size - 1),
            Err(_) => return ByteRange::Full,
        }
    };
    if end < start {
        return ByteRange::Unsatisfiable;
    }

    ByteRange::Partial { start, end }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::RANGE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_parse_range_absent() {
        assert_eq!(parse_range(&HeaderMap::new(), 100), ByteRange::Full);
        assert_eq!(parse_range(&range("items=0-5"), 100), ByteRange::Full);
        assert_eq!(parse_range(&range("bytes=abc-5"), 100), ByteRange::Full);
    }

    #[test]
    fn test_parse_range_bounded() {
        assert_eq!(
            parse_range(&range("bytes=0-9"), 100),
            ByteRange::Partial { start: 0, end: 9 }
        );
        assert_eq!(
            parse_range(&range("bytes=90-200"), 100),
            ByteRange::Partial { start: 90, end: 99 }
        );
    }

    #[test]
    fn test_parse_range_open_ended_and_suffix() {
        assert_eq!(
            parse_range(&range("bytes=40-"), 100),
            ByteRange::Partial { start: 40, end: 99 }
        );
        assert_eq!(
            parse_range(&range("bytes=-10"), 100),
            ByteRange::Partial { start: 90, end: 99 }
        );
        assert_eq!(
            parse_range(&range("bytes=-500"), 100),
            ByteRange::Partial { start: 0, end: 99 }
        );
    }

    #[test]
    fn test_parse_range_unsatisfiable() {
        assert_eq!(parse_range(&range("bytes=100-"), 100), ByteRange::Unsatisfiable);
        assert_eq!(parse_range(&range("bytes=50-10"), 100), ByteRange::Unsatisfiable);
        assert_eq!(parse_range(&range("bytes=-0"), 100), ByteRange::Unsatisfiable);
        assert_eq!(parse_range(&range("bytes=0-"), 0), ByteRange::Unsatisfiable);
    }

    #[test]
    fn test_plain_file_name() {
        assert!(is_plain_file_name("frame_12.jpg"));
        assert!(is_plain_file_name("my clip.mp4"));
        assert!(!is_plain_file_name(""));
        assert!(!is_plain_file_name("."));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name("../secret"));
        assert!(!is_plain_file_name("/etc/passwd"));
        assert!(!is_plain_file_name("a\\b"));
    }
}
