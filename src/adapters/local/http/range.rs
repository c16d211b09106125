//! `Range: bytes=...` handling for segment delivery. Only single ranges are
//! honoured; anything else is answered with the full body.

/// Inclusive byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    Full,
    Partial(ByteRange),
    Unsatisfiable,
}

pub fn parse_range(header: Option<&str>, len: u64) -> RangeRequest {
    let Some(spec) = header.and_then(|h| h.trim().strip_prefix("bytes=")) else {
        return RangeRequest::Full;
    };
    if spec.contains(',') {
        return RangeRequest::Full;
    }
    let Some((first, last)) = spec.trim().split_once('-') else {
        return RangeRequest::Full;
    };

    match (first.trim(), last.trim()) {
        ("", "") => RangeRequest::Full,
        ("", suffix) => match suffix.parse::<u64>() {
            Ok(0) => RangeRequest::Unsatisfiable,
            Ok(_) if len == 0 => RangeRequest::Unsatisfiable,
            Ok(n) => RangeRequest::Partial(ByteRange {
                start: len.saturating_sub(n),
                end: len - 1,
            }),
            Err(_) => RangeRequest::Full,
        },
        (start, end) => {
            let Ok(start) = start.parse::<u64>() else {
                return RangeRequest::Full;
            };
            let end = if end.is_empty() {
                None
            } else {
                match end.parse::<u64>() {
                    Ok(end) if end >= start => Some(end),
                    _ => return RangeRequest::Full,
                }
            };
            if start >= len {
                return RangeRequest::Unsatisfiable;
            }
            RangeRequest::Partial(ByteRange {
                start,
                end: end.map_or(len - 1, |e| e.min(len - 1)),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(start: u64, end: u64) -> RangeRequest {
        RangeRequest::Partial(ByteRange { start, end })
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range(None, 1000), RangeRequest::Full);
        assert_eq!(parse_range(Some("bytes=0-99"), 1000), partial(0, 99));
        assert_eq!(parse_range(Some("bytes=500-"), 1000), partial(500, 999));
        assert_eq!(parse_range(Some("bytes=-100"), 1000), partial(900, 999));
        assert_eq!(parse_range(Some("bytes=-5000"), 1000), partial(0, 999));
        assert_eq!(parse_range(Some("bytes=900-5000"), 1000), partial(900, 999));
    }

    #[test]
    fn test_unsatisfiable_ranges() {
        assert_eq!(parse_range(Some("bytes=1000-"), 1000), RangeRequest::Unsatisfiable);
        assert_eq!(parse_range(Some("bytes=2000-3000"), 1000), RangeRequest::Unsatisfiable);
        assert_eq!(parse_range(Some("bytes=-0"), 1000), RangeRequest::Unsatisfiable);
        assert_eq!(parse_range(Some("bytes=0-"), 0), RangeRequest::Unsatisfiable);
    }

    #[test]
    fn test_ignored_ranges() {
        assert_eq!(parse_range(Some("items=0-1"), 1000), RangeRequest::Full);
        assert_eq!(parse_range(Some("bytes=0-1,5-6"), 1000), RangeRequest::Full);
        assert_eq!(parse_range(Some("bytes=9-1"), 1000), RangeRequest::Full);
        assert_eq!(parse_range(Some("bytes=abc"), 1000), RangeRequest::Full);
    }

    #[test]
    fn test_content_range() {
        let range = ByteRange { start: 0, end: 99 };
        assert_eq!(range.len(), 100);
        assert_eq!(range.content_range(1000), "bytes 0-99/1000");
    }
}
