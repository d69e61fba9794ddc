//! Range negotiation for single-file responses
//!
//! Turns a client `Range` header and a known resource length into either a
//! full-content response, one validated [`ByteRange`], or a rejection. Only
//! single-range requests are served; `multipart/byteranges` is never produced.

use crate::error::{GatewayError, Result};
use crate::models::ByteRange;
use http::header::RANGE;
use http::HeaderMap;
use tracing::debug;

/// Outcome of a successful negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOutcome {
    /// No Range header: respond 200 with the full body
    NoRange,
    /// Exactly one satisfiable range: respond 206
    Single(ByteRange),
}

/// Validates and normalizes client byte ranges against a resource length
pub struct RangeNegotiator;

impl RangeNegotiator {
    /// Negotiate the Range header found in `headers`, if any
    ///
    /// Bytes outside visible ASCII are replaced rather than rejected; they can
    /// only make positions unreadable, which is judged like any other text.
    pub fn from_headers(headers: &HeaderMap, total_length: u64) -> Result<RangeOutcome> {
        match headers.get(RANGE) {
            None => Ok(RangeOutcome::NoRange),
            Some(value) => {
                let value = String::from_utf8_lossy(value.as_bytes());
                Self::negotiate(Some(&value), total_length)
            }
        }
    }

    /// Negotiate a raw Range header value against `total_length`
    ///
    /// # Returns
    /// * `Ok(RangeOutcome::NoRange)` when no header is present
    /// * `Ok(RangeOutcome::Single(range))` for exactly one satisfiable byte range
    /// * `Err(MalformedRange)` when the header has no `=` (400)
    /// * `Err(UnsatisfiableRange)` when no member can be satisfied or the unit
    ///   is not exactly `bytes` (416)
    /// * `Err(UnsupportedMultiRange)` when more than one member survives (416)
    ///
    /// # Members
    /// Each comma-separated member is `first-last`, and each position is read
    /// as its leading decimal integer, so trailing junk is ignored.
    /// - `N-` and a bare `N` run to the last byte
    /// - `-N` selects the final N bytes; N larger than the resource is unsatisfiable
    /// - an end past the last byte is clamped to `total_length - 1`
    /// - unreadable, reversed or out-of-range members are dropped before counting
    pub fn negotiate(range_header: Option<&str>, total_length: u64) -> Result<RangeOutcome> {
        let Some(header) = range_header else {
            return Ok(RangeOutcome::NoRange);
        };

        let (unit, set) = header.split_once('=').ok_or_else(|| {
            GatewayError::MalformedRange(format!("missing '=' in range header: {}", header))
        })?;

        let satisfiable: Vec<ByteRange> = set
            .split(',')
            .filter_map(|member| Self::parse_member(member, total_length))
            .collect();

        if satisfiable.is_empty() {
            debug!(
                "No satisfiable range in '{}' for length {}",
                header, total_length
            );
            return Err(GatewayError::UnsatisfiableRange(format!(
                "{} against length {}",
                header, total_length
            )));
        }

        if unit != "bytes" {
            return Err(GatewayError::UnsatisfiableRange(format!(
                "unsupported range unit '{}'",
                unit
            )));
        }

        if satisfiable.len() > 1 {
            return Err(GatewayError::UnsupportedMultiRange(header.to_string()));
        }

        let range = satisfiable[0];
        debug!(
            "Negotiated range {}-{} from '{}' (length {})",
            range.start, range.end, header, total_length
        );
        Ok(RangeOutcome::Single(range))
    }

    /// One `first-last` member, or `None` when it cannot be satisfied
    fn parse_member(member: &str, total_length: u64) -> Option<ByteRange> {
        let mut positions = member.split('-');
        let first = positions.next().and_then(leading_integer);
        let last = positions.next().and_then(leading_integer);

        let size = i128::from(total_length);
        let (start, end) = match (first, last) {
            (None, None) => return None,
            (None, Some(suffix)) => (size - suffix, size - 1),
            (Some(start), None) => (start, size - 1),
            (Some(start), Some(end)) => (start, end.min(size - 1)),
        };

        if start < 0 || start > end {
            return None;
        }
        ByteRange::new(u64::try_from(start).ok()?, u64::try_from(end).ok()?).ok()
    }
}

/// Leading decimal integer of `text`: optional whitespace and `+`, then digits
///
/// Values too large for `i128` saturate; they are past any real length anyway.
fn leading_integer(text: &str) -> Option<i128> {
    let text = text.trim_start();
    let text = text.strip_prefix('+').unwrap_or(text);
    let digits = text.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    Some(text[..digits].parse().unwrap_or(i128::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn single(start: u64, end: u64) -> RangeOutcome {
        RangeOutcome::Single(ByteRange::new(start, end).unwrap())
    }

    #[test]
    fn test_absent_header_is_full_content() {
        assert_eq!(RangeNegotiator::negotiate(None, 10).unwrap(), RangeOutcome::NoRange);
    }

    #[test]
    fn test_simple_range() {
        assert_eq!(
            RangeNegotiator::negotiate(Some("bytes=0-99"), 1000).unwrap(),
            single(0, 99)
        );
    }

    #[test]
    fn test_open_ended_range() {
        assert_eq!(
            RangeNegotiator::negotiate(Some("bytes=900-"), 1000).unwrap(),
            single(900, 999)
        );
    }

    #[test]
    fn test_suffix_range() {
        assert_eq!(
            RangeNegotiator::negotiate(Some("bytes=-100"), 1000).unwrap(),
            single(900, 999)
        );
    }

    #[test]
    fn test_suffix_longer_than_resource_is_unsatisfiable() {
        let result = RangeNegotiator::negotiate(Some("bytes=-5000"), 1000);
        assert!(matches!(result, Err(GatewayError::UnsatisfiableRange(_))));

        assert_eq!(
            RangeNegotiator::negotiate(Some("bytes=-1000"), 1000).unwrap(),
            single(0, 999)
        );
    }

    #[test]
    fn test_bare_start_is_open_ended() {
        assert_eq!(
            RangeNegotiator::negotiate(Some("bytes=5"), 1000).unwrap(),
            single(5, 999)
        );
    }

    #[test]
    fn test_positions_read_leading_digits() {
        assert_eq!(
            RangeNegotiator::negotiate(Some("bytes= 10x-20y"), 1000).unwrap(),
            single(10, 20)
        );
        assert_eq!(
            RangeNegotiator::negotiate(Some("bytes=+3-+4"), 1000).unwrap(),
            single(3, 4)
        );
        // an unreadable end behaves like an open end
        assert_eq!(
            RangeNegotiator::negotiate(Some("bytes=990-abc"), 1000).unwrap(),
            single(990, 999)
        );
    }

    #[test]
    fn test_end_is_clamped() {
        assert_eq!(
            RangeNegotiator::negotiate(Some("bytes=10-5000"), 1000).unwrap(),
            single(10, 999)
        );
    }

    #[test]
    fn test_start_at_length_is_unsatisfiable() {
        let result = RangeNegotiator::negotiate(Some("bytes=1000-100"), 1000);
        assert!(matches!(result, Err(GatewayError::UnsatisfiableRange(_))));

        let result = RangeNegotiator::negotiate(Some("bytes=1000-"), 1000);
        assert!(matches!(result, Err(GatewayError::UnsatisfiableRange(_))));
    }

    #[test]
    fn test_missing_equals_is_malformed() {
        let result = RangeNegotiator::negotiate(Some("bytes 0-99"), 1000);
        assert!(matches!(result, Err(GatewayError::MalformedRange(_))));
    }

    #[test]
    fn test_unreadable_members_are_unsatisfiable() {
        for header in ["bytes=abc-def", "bytes=-", "bytes=", "bytes=-0", "bytes=5-2"] {
            let result = RangeNegotiator::negotiate(Some(header), 1000);
            assert!(
                matches!(result, Err(GatewayError::UnsatisfiableRange(_))),
                "{} should be unsatisfiable, got {:?}",
                header,
                result
            );
        }
    }

    #[test]
    fn test_non_byte_unit_is_unsatisfiable() {
        for header in ["items=0-5", "bytes =0-5", "=0-5"] {
            let result = RangeNegotiator::negotiate(Some(header), 1000);
            assert!(matches!(result, Err(GatewayError::UnsatisfiableRange(_))), "{}", header);
        }
    }

    #[test]
    fn test_multiple_ranges_are_rejected() {
        let result = RangeNegotiator::negotiate(Some("bytes=0-1,5-9"), 1000);
        assert!(matches!(result, Err(GatewayError::UnsupportedMultiRange(_))));
    }

    #[test]
    fn test_unsatisfiable_members_are_dropped_before_counting() {
        assert_eq!(
            RangeNegotiator::negotiate(Some("bytes=0-1, 5000-6000"), 1000).unwrap(),
            single(0, 1)
        );
    }

    #[test]
    fn test_zero_length_resource() {
        for header in ["bytes=0-0", "bytes=0-", "bytes=-1"] {
            let result = RangeNegotiator::negotiate(Some(header), 0);
            assert!(matches!(result, Err(GatewayError::UnsatisfiableRange(_))), "{}", header);
        }
    }

    #[test]
    fn test_huge_positions_do_not_overflow() {
        let result = RangeNegotiator::negotiate(Some("bytes=99999999999999999999999-"), 1000);
        assert!(matches!(result, Err(GatewayError::UnsatisfiableRange(_))));

        assert_eq!(
            RangeNegotiator::negotiate(Some("bytes=0-99999999999999999999999"), 1000).unwrap(),
            single(0, 999)
        );
    }

    #[test]
    fn test_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(
            RangeNegotiator::from_headers(&headers, 10).unwrap(),
            RangeOutcome::NoRange
        );

        headers.insert(RANGE, HeaderValue::from_static("bytes=2-4"));
        assert_eq!(RangeNegotiator::from_headers(&headers, 10).unwrap(), single(2, 4));

        headers.insert(RANGE, HeaderValue::from_bytes(b"bytes=1-\xff").unwrap());
        assert_eq!(RangeNegotiator::from_headers(&headers, 10).unwrap(), single(1, 9));
    }
}
