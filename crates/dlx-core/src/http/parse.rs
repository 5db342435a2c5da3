//! Parse response headers needed for sizing, range and retry decisions.

use std::time::Duration;

use reqwest::header::{
    HeaderMap, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, ETAG, LAST_MODIFIED, RETRY_AFTER,
};

/// Headers of interest from a probe response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseMeta {
    /// `Content-Length`, read from the header itself (reqwest reports 0 for HEAD bodies).
    pub content_length: Option<u64>,
    /// True if the server sent `Accept-Ranges: bytes`.
    pub accept_ranges: bool,
    /// Raw `Content-Range` value.
    pub content_range: Option<String>,
    /// Raw entity tag, quotes kept so it can be echoed in `If-Range`.
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl ResponseMeta {
    /// Value for `If-Range`: a strong ETag, else `Last-Modified`.
    /// Weak tags are not allowed in `If-Range`.
    pub fn validator(&self) -> Option<String> {
        self.etag
            .as_deref()
            .filter(|e| !e.starts_with("W/"))
            .or(self.last_modified.as_deref())
            .map(str::to_string)
    }

    /// Total size from `Content-Range: bytes a-b/total`.
    pub fn range_total(&self) -> Option<u64> {
        self.content_range
            .as_deref()
            .and_then(parse_content_range)
            .and_then(|(_, _, total)| total)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: reqwest::header::HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
}

pub fn parse_headers(headers: &HeaderMap) -> ResponseMeta {
    ResponseMeta {
        content_length: header_str(headers, CONTENT_LENGTH).and_then(|v| v.parse::<u64>().ok()),
        accept_ranges: header_str(headers, ACCEPT_RANGES)
            .map(|v| v.eq_ignore_ascii_case("bytes"))
            .unwrap_or(false),
        content_range: header_str(headers, CONTENT_RANGE).map(str::to_string),
        etag: header_str(headers, ETAG).map(str::to_string),
        last_modified: header_str(headers, LAST_MODIFIED).map(str::to_string),
    }
}

/// `bytes <start>-<end>/<total|*>` -> (start, end, total).
pub fn parse_content_range(value: &str) -> Option<(u64, u64, Option<u64>)> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (range, total) = rest.split_once('/')?;
    let (start, end) = range.split_once('-')?;
    let start = start.trim().parse().ok()?;
    let end = end.trim().parse().ok()?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    Some((start, end, total))
}

/// `Retry-After` in its delta-seconds form. HTTP dates are ignored.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    header_str(headers, RETRY_AFTER)
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Whether a response to `Range: bytes=0-1` shows the server honours ranges.
pub fn range_probe_accepted(meta: &ResponseMeta) -> bool {
    meta.content_range
        .as_deref()
        .map(|v| v.starts_with("bytes 0-1/"))
        .unwrap_or(false)
        || meta.content_length == Some(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(*k, HeaderValue::from_static(*v));
        }
        h
    }

    #[test]
    fn parse_headers_content_length_and_ranges() {
        let m = parse_headers(&headers(&[
            ("content-length", "12345"),
            ("accept-ranges", "bytes"),
        ]));
        assert_eq!(m.content_length, Some(12345));
        assert!(m.accept_ranges);
        assert!(m.etag.is_none());
    }

    #[test]
    fn parse_headers_no_ranges() {
        let m = parse_headers(&headers(&[
            ("content-length", "999"),
            ("accept-ranges", "none"),
        ]));
        assert_eq!(m.content_length, Some(999));
        assert!(!m.accept_ranges);
    }

    #[test]
    fn parse_headers_etag_and_last_modified() {
        let m = parse_headers(&headers(&[
            ("etag", "\"abc-123\""),
            ("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT"),
        ]));
        assert_eq!(m.etag.as_deref(), Some("\"abc-123\""));
        assert_eq!(m.validator().as_deref(), Some("\"abc-123\""));
    }

    #[test]
    fn weak_etag_falls_back_to_last_modified() {
        let m = parse_headers(&headers(&[
            ("etag", "W/\"abc\""),
            ("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT"),
        ]));
        assert_eq!(m.validator().as_deref(), Some("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert!(parse_headers(&headers(&[("etag", "W/\"abc\"")])).validator().is_none());
    }

    #[test]
    fn total_from_content_range() {
        let m = parse_headers(&headers(&[("content-range", "bytes 0-1/100000")]));
        assert_eq!(m.range_total(), Some(100_000));
        let unknown = parse_headers(&headers(&[("content-range", "bytes 0-1/*")]));
        assert_eq!(unknown.range_total(), None);
    }

    #[test]
    fn retry_after_seconds_only() {
        assert_eq!(
            retry_after(&headers(&[("retry-after", "7")])),
            Some(Duration::from_secs(7))
        );
        assert_eq!(
            retry_after(&headers(&[("retry-after", "Wed, 21 Oct 2015 07:28:00 GMT")])),
            None
        );
        assert_eq!(retry_after(&HeaderMap::new()), None);
    }

    #[test]
    fn content_range_forms() {
        assert_eq!(parse_content_range("bytes 0-1/100"), Some((0, 1, Some(100))));
        assert_eq!(parse_content_range("bytes 5-9/*"), Some((5, 9, None)));
        assert_eq!(parse_content_range("bytes */100"), None);
        assert_eq!(parse_content_range("items 0-1/2"), None);
    }

    #[test]
    fn range_probe_by_content_range_or_length() {
        let by_range = parse_headers(&headers(&[
            ("content-range", "bytes 0-1/5000"),
            ("content-length", "2"),
        ]));
        assert!(range_probe_accepted(&by_range));

        let by_length = parse_headers(&headers(&[("content-length", "2")]));
        assert!(range_probe_accepted(&by_length));

        let full_body = parse_headers(&headers(&[("content-length", "5000")]));
        assert!(!range_probe_accepted(&full_body));
    }
}
