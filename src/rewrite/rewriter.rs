//! Platform injection into image-create request lines.
//!
//! # Responsibilities
//! - Decide, per scan window, which bytes can be forwarded now and which
//!   must wait for more data
//! - Rewrite the target of a matching request line to carry the configured
//!   `platform` query parameter
//!
//! # Design Decisions
//! - Detection is substring based: the method token opens a candidate line,
//!   the path marker must appear on that same line
//! - A candidate line is only rewritten once its `\n` has arrived
//! - Headers and body are never touched; `Content-Length` stays valid
//! - Only the query of the target is rebuilt; path and fragment bytes are
//!   copied back exactly as the client sent them

use thiserror::Error;
use url::Url;

use crate::config::RewriteConfig;
use crate::rewrite::query::{check_escapes, QueryParams};

const PLATFORM_KEY: &str = "platform";

/// Reasons a candidate request line is forwarded without injection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InjectError {
    /// The line does not split into method, target and version.
    #[error("malformed request line: expected 3 tokens, found {0}")]
    MalformedRequestLine(usize),

    /// The target is not a parseable URL.
    #[error("invalid request target: {0}")]
    InvalidTarget(String),

    /// The target's query string could not be parsed.
    #[error("invalid query string: {0}")]
    InvalidQuery(String),

    /// The scan buffer filled up before the line terminator arrived.
    #[error("request line exceeds {limit} bytes without a terminator")]
    LineTooLong { limit: usize },
}

/// What the relay should do with the current window.
#[derive(Debug, PartialEq, Eq)]
pub enum Decision {
    /// Forward the whole window untouched.
    Pass,
    /// Forward `window[..at]` untouched and re-examine `window[at..]`.
    Split { at: usize },
    /// Nothing can be forwarded yet; read more bytes.
    Hold,
    /// Forward `line` in place of `window[..consumed]`, re-examine the rest.
    Inject { line: Vec<u8>, consumed: usize },
    /// Forward `window[..at]` verbatim even though it looked like a target.
    FailOpen { at: usize, reason: InjectError },
}

/// Scanner and rewriter for one method/path pattern.
#[derive(Debug, Clone)]
pub struct RequestRewriter {
    method: Vec<u8>,
    marker: Vec<u8>,
    platform: String,
}

impl RequestRewriter {
    pub fn new(
        method: impl Into<Vec<u8>>,
        marker: impl Into<Vec<u8>>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            marker: marker.into(),
            platform: platform.into(),
        }
    }

    pub fn from_config(config: &RewriteConfig) -> Self {
        Self::new(
            config.method.as_bytes(),
            config.path_marker.as_bytes(),
            config.platform.as_str(),
        )
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// True if the window contains the path marker anywhere.
    pub fn looks_like_target(&self, window: &[u8]) -> bool {
        find(window, &self.marker).is_some()
    }

    /// Examine one window. `at_capacity` tells whether the window already
    /// fills the scan buffer, in which case holding is no longer possible.
    pub fn decide(&self, window: &[u8], at_capacity: bool) -> Decision {
        let Some(start) = find(window, &self.method) else {
            // A read boundary may have cut the method token in half.
            let tail = partial_suffix(window, &self.method);
            return match tail {
                0 => Decision::Pass,
                t if t == window.len() => Decision::Hold,
                t => Decision::Split {
                    at: window.len() - t,
                },
            };
        };

        if start > 0 {
            return Decision::Split { at: start };
        }

        let Some(eol) = find(window, b"\n") else {
            if at_capacity {
                return Decision::FailOpen {
                    at: window.len(),
                    reason: InjectError::LineTooLong {
                        limit: window.len(),
                    },
                };
            }
            return Decision::Hold;
        };

        let line = &window[..eol];
        if find(line, &self.marker).is_none() {
            return Decision::Split { at: eol };
        }

        match self.inject(line) {
            Ok(line) => Decision::Inject {
                line,
                consumed: eol,
            },
            Err(reason) => Decision::FailOpen { at: eol, reason },
        }
    }

    /// Rewrite a single request line (without its `\n`).
    pub fn inject(&self, line: &[u8]) -> Result<Vec<u8>, InjectError> {
        let tokens: Vec<&[u8]> = line.split(|b| *b == b' ').collect();
        let [method, target, version] = tokens.as_slice() else {
            return Err(InjectError::MalformedRequestLine(tokens.len()));
        };
        if method.is_empty() || target.is_empty() || version.is_empty() {
            return Err(InjectError::MalformedRequestLine(
                tokens.iter().filter(|t| !t.is_empty()).count(),
            ));
        }

        let target = std::str::from_utf8(target)
            .map_err(|_| InjectError::InvalidTarget("target is not valid UTF-8".to_string()))?;
        let target = Target::parse(target)?;

        let mut query = QueryParams::parse(target.query)?;
        query.remove(PLATFORM_KEY);
        query.append(PLATFORM_KEY, &self.platform);

        let target = target.render(&query.encode());
        let mut rewritten =
            Vec::with_capacity(method.len() + target.len() + version.len() + 2);
        rewritten.extend_from_slice(method);
        rewritten.push(b' ');
        rewritten.extend_from_slice(target.as_bytes());
        rewritten.push(b' ');
        rewritten.extend_from_slice(version);
        Ok(rewritten)
    }
}

/// Raw request target split at its first `?` and `#`.
struct Target<'a> {
    path: &'a str,
    query: &'a str,
    fragment: Option<&'a str>,
}

impl<'a> Target<'a> {
    /// Split `raw` without normalizing anything.
    ///
    /// Absolute targets must parse as a URL; origin-form targets (including
    /// ones starting with `//`) are taken as a path and only checked for
    /// well-formed escapes.
    fn parse(raw: &'a str) -> Result<Self, InjectError> {
        if raw.bytes().any(|b| b.is_ascii_control()) {
            return Err(InjectError::InvalidTarget(
                "control character in target".to_string(),
            ));
        }

        let (rest, fragment) = match raw.split_once('#') {
            Some((rest, fragment)) => (rest, Some(fragment)),
            None => (raw, None),
        };
        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));

        match Url::parse(raw) {
            Ok(_) => {}
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                check_escapes(path).map_err(InjectError::InvalidTarget)?
            }
            Err(e) => return Err(InjectError::InvalidTarget(e.to_string())),
        }

        Ok(Self {
            path,
            query,
            fragment,
        })
    }

    fn render(&self, query: &str) -> String {
        let mut target = String::with_capacity(self.path.len() + query.len() + 1);
        target.push_str(self.path);
        target.push('?');
        target.push_str(query);
        if let Some(fragment) = self.fragment {
            target.push('#');
            target.push_str(fragment);
        }
        target
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Length of the longest proper prefix of `token` that ends `window`.
fn partial_suffix(window: &[u8], token: &[u8]) -> usize {
    let longest = token.len().saturating_sub(1).min(window.len());
    (1..=longest)
        .rev()
        .find(|&n| window.ends_with(&token[..n]))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewriter() -> RequestRewriter {
        RequestRewriter::new("POST", "/images/create", "linux/arm64")
    }

    #[test]
    fn test_inject_adds_platform() {
        let line = b"POST /v1.40/images/create?fromImage=x HTTP/1.1\r";
        let rewritten = rewriter().inject(line).unwrap();
        assert_eq!(
            rewritten,
            b"POST /v1.40/images/create?fromImage=x&platform=linux%2Farm64 HTTP/1.1\r"
        );
    }

    #[test]
    fn test_inject_replaces_existing_platform() {
        let line = b"POST /v1.40/images/create?platform=foo&fromImage=x&platform=bar HTTP/1.1\r";
        let rewritten = String::from_utf8(rewriter().inject(line).unwrap()).unwrap();
        assert_eq!(rewritten.matches("platform=").count(), 1);
        assert!(rewritten.contains("platform=linux%2Farm64"));
        assert!(!rewritten.contains("foo"));
        assert!(rewritten.contains("fromImage=x"));
    }

    #[test]
    fn test_inject_without_query() {
        let line = b"POST /images/create HTTP/1.1";
        let rewritten = rewriter().inject(line).unwrap();
        assert_eq!(
            rewritten,
            b"POST /images/create?platform=linux%2Farm64 HTTP/1.1"
        );
    }

    #[test]
    fn test_inject_absolute_target() {
        let line = b"POST http://docker/v1.41/images/create?fromImage=x HTTP/1.1\r";
        let rewritten = rewriter().inject(line).unwrap();
        assert_eq!(
            rewritten,
            b"POST http://docker/v1.41/images/create?fromImage=x&platform=linux%2Farm64 HTTP/1.1\r"
        );
    }

    #[test]
    fn test_inject_keeps_double_slash_path() {
        let line = b"POST //images/create?fromImage=x HTTP/1.1\r";
        assert_eq!(
            rewriter().inject(line).unwrap(),
            b"POST //images/create?fromImage=x&platform=linux%2Farm64 HTTP/1.1\r"
        );

        let line = b"POST //v1.40/images/create?fromImage=x HTTP/1.1\r";
        assert_eq!(
            rewriter().inject(line).unwrap(),
            b"POST //v1.40/images/create?fromImage=x&platform=linux%2Farm64 HTTP/1.1\r"
        );
    }

    #[test]
    fn test_inject_keeps_dot_segments() {
        let line = b"POST /v1.40/../images/create?fromImage=x HTTP/1.1\r";
        assert_eq!(
            rewriter().inject(line).unwrap(),
            b"POST /v1.40/../images/create?fromImage=x&platform=linux%2Farm64 HTTP/1.1\r"
        );
    }

    #[test]
    fn test_inject_keeps_escaped_path_and_fragment() {
        let line = b"POST /v1.40/images%2Fcreate/images/create?tag=1#frag HTTP/1.1";
        assert_eq!(
            rewriter().inject(line).unwrap(),
            b"POST /v1.40/images%2Fcreate/images/create?platform=linux%2Farm64&tag=1#frag HTTP/1.1"
        );
    }

    #[test]
    fn test_inject_rejects_bad_path_escape() {
        let line = b"POST /v1.40/%zz/images/create HTTP/1.1";
        assert!(matches!(
            rewriter().inject(line),
            Err(InjectError::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_inject_rejects_wrong_token_count() {
        assert_eq!(
            rewriter().inject(b"POST /images/create"),
            Err(InjectError::MalformedRequestLine(2))
        );
        assert_eq!(
            rewriter().inject(b"POST /images/create HTTP/1.1 extra"),
            Err(InjectError::MalformedRequestLine(4))
        );
        assert!(matches!(
            rewriter().inject(b"POST  /images/create HTTP/1.1"),
            Err(InjectError::MalformedRequestLine(_))
        ));
    }

    #[test]
    fn test_inject_rejects_bad_query() {
        let line = b"POST /images/create?fromImage=%zz HTTP/1.1";
        assert!(matches!(
            rewriter().inject(line),
            Err(InjectError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_decide_passes_unrelated_traffic() {
        let window = b"GET /v1.40/containers/json HTTP/1.1\r\nHost: docker\r\n\r\n";
        assert_eq!(rewriter().decide(window, false), Decision::Pass);
    }

    #[test]
    fn test_decide_splits_before_method() {
        let window = b"body bytesPOST /v1.40/images/create HTTP/1.1\r\n";
        assert_eq!(
            rewriter().decide(window, false),
            Decision::Split { at: 10 }
        );
    }

    #[test]
    fn test_decide_holds_partial_method() {
        assert_eq!(rewriter().decide(b"PO", false), Decision::Hold);
        assert_eq!(
            rewriter().decide(b"abcPOS", false),
            Decision::Split { at: 3 }
        );
        assert_eq!(rewriter().decide(b"abcPX", false), Decision::Pass);
    }

    #[test]
    fn test_decide_holds_unterminated_line() {
        let window = b"POST /v1.40/ima";
        assert_eq!(rewriter().decide(window, false), Decision::Hold);
    }

    #[test]
    fn test_decide_fails_open_at_capacity() {
        let window = b"POST /v1.40/images/create?fromImage=aaaaaaaa";
        assert_eq!(
            rewriter().decide(window, true),
            Decision::FailOpen {
                at: window.len(),
                reason: InjectError::LineTooLong {
                    limit: window.len()
                },
            }
        );
    }

    #[test]
    fn test_decide_skips_other_post_lines() {
        let window = b"POST /v1.40/containers/create HTTP/1.1\r\nX: /images/create\r\n";
        let eol = window.iter().position(|b| *b == b'\n').unwrap();
        assert_eq!(
            rewriter().decide(window, false),
            Decision::Split { at: eol }
        );
    }

    #[test]
    fn test_decide_injects_first_line_only() {
        let window = b"POST /v1.40/images/create?fromImage=x HTTP/1.1\r\nHost: docker\r\n\r\n";
        let eol = window.iter().position(|b| *b == b'\n').unwrap();
        match rewriter().decide(window, false) {
            Decision::Inject { line, consumed } => {
                assert_eq!(consumed, eol);
                assert!(line.ends_with(b"platform=linux%2Farm64 HTTP/1.1\r"));
            }
            other => panic!("unexpected decision: {:?}", other),
        }
    }

    #[test]
    fn test_decide_fails_open_on_malformed_line() {
        let window = b"POST /images/create\r\nHost: docker\r\n";
        let eol = window.iter().position(|b| *b == b'\n').unwrap();
        assert_eq!(
            rewriter().decide(window, false),
            Decision::FailOpen {
                at: eol,
                reason: InjectError::MalformedRequestLine(2),
            }
        );
    }

    #[test]
    fn test_partial_suffix() {
        assert_eq!(partial_suffix(b"xxP", b"POST"), 1);
        assert_eq!(partial_suffix(b"xxPOS", b"POST"), 3);
        assert_eq!(partial_suffix(b"xxPOST", b"POST"), 0);
        assert_eq!(partial_suffix(b"", b"POST"), 0);
    }
}
