// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Metric name to directory path encoding
//!
//! Dots become path separators. In a run of dots only the first one
//! separates and the rest are escaped as `%2e`; a trailing run is moved
//! after a separator so no directory name ends up empty. `/` and `%` are
//! escaped as `%2f` and `%25`.
//!
//! ```text
//! foo.bar      ─► foo/bar
//! foo..bar     ─► foo/%2ebar
//! foo.bar.     ─► foo/bar/%2e
//! .            ─► %2e
//! fo/o.bar     ─► fo%2fo/bar
//! ```

use std::path::{Path, PathBuf};

use rothko_core::{RothkoError, RothkoResult};

const ESCAPED_DOT: &str = "%2e";

/// Encode a metric name as a relative directory path.
pub fn metric_to_dir(metric: &str) -> String {
    let mut out = String::with_capacity(metric.len() + 8);
    let mut non_dots = false;
    let mut dots = 0usize;

    for ch in metric.chars() {
        if ch == '.' {
            if dots > 0 || !non_dots {
                out.push_str(ESCAPED_DOT);
            } else {
                out.push('/');
            }
            dots += 1;
            continue;
        }

        if !non_dots && dots > 0 {
            out.push('/');
        }
        non_dots = true;
        dots = 0;
        match ch {
            '/' => out.push_str("%2f"),
            '%' => out.push_str("%25"),
            other => out.push(other),
        }
    }

    // a trailing run of dots after other characters becomes its own
    // directory: drop the separator and escapes emitted above and redo them
    if dots > 0 && non_dots {
        let back = 1 + (dots - 1) * ESCAPED_DOT.len();
        out.truncate(out.len() - back);
        out.push('/');
        for _ in 0..dots {
            out.push_str(ESCAPED_DOT);
        }
    }

    out
}

/// Decode a directory path produced by [`metric_to_dir`].
pub fn dir_to_metric(dir: &str) -> RothkoResult<String> {
    let invalid = || RothkoError::InvalidParameters(format!("invalid metric dir: {:?}", dir));

    let mut out = String::with_capacity(dir.len());
    let mut last_dot = false;
    let mut all_dots = false;
    let mut chars = dir.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '/' => {
                if !last_dot {
                    out.push('.');
                    last_dot = true;
                    all_dots = true;
                }
            }
            '%' => {
                if chars.next() != Some('2') {
                    return Err(invalid());
                }
                match chars.next() {
                    Some('e') => {
                        out.push('.');
                        last_dot = true;
                    }
                    Some('f') => {
                        out.push('/');
                        last_dot = false;
                        all_dots = false;
                    }
                    Some('5') => {
                        out.push('%');
                        last_dot = false;
                        all_dots = false;
                    }
                    _ => return Err(invalid()),
                }
            }
            '.' => return Err(invalid()),
            other => {
                out.push(other);
                last_dot = false;
                all_dots = false;
            }
        }
    }

    // "a/%2e%2e" carries one dot too many from the separator
    if all_dots && !dir.is_empty() {
        out.pop();
    }

    Ok(out)
}

/// Path of data file `num` for `metric` under `root`.
pub fn metric_file_path(root: &Path, metric: &str, num: u64) -> PathBuf {
    metric_dir_path(root, metric).join(format!("{}.data", num))
}

/// Directory holding the data files of `metric` under `root`.
pub fn metric_dir_path(root: &Path, metric: &str) -> PathBuf {
    let dir = metric_to_dir(metric);
    if dir.is_empty() {
        root.to_path_buf()
    } else {
        root.join(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_metric_to_dir() {
        let cases = [
            ("foo.bar", "foo/bar"),
            ("foo..bar", "foo/%2ebar"),
            ("foo....bar", "foo/%2e%2e%2ebar"),
            ("fo/o.bar", "fo%2fo/bar"),
            ("fo%o.bar", "fo%25o/bar"),
            ("foo.bar.baz", "foo/bar/baz"),
            ("foo.bar.", "foo/bar/%2e"),
            ("foo.bar..", "foo/bar/%2e%2e"),
            ("", ""),
            (".", "%2e"),
            ("...", "%2e%2e%2e"),
            (".foo.bar", "%2e/foo/bar"),
            ("...foo.bar", "%2e%2e%2e/foo/bar"),
            ("a.b", "a/b"),
            ("a..b", "a/%2eb"),
        ];
        for (metric, dir) in cases {
            assert_eq!(metric_to_dir(metric), dir, "encoding {:?}", metric);
            assert_eq!(dir_to_metric(dir).unwrap(), metric, "decoding {:?}", dir);
        }
    }

    #[test]
    fn test_dir_to_metric_rejects_bad_escapes() {
        assert!(dir_to_metric("foo.bar").is_err());
        assert!(dir_to_metric("foo%").is_err());
        assert!(dir_to_metric("foo%2").is_err());
        assert!(dir_to_metric("foo%2x").is_err());
        assert!(dir_to_metric("foo%3e").is_err());
    }

    #[test]
    fn test_metric_file_path() {
        let root = Path::new("/data");
        assert_eq!(
            metric_file_path(root, "foo.bar", 3),
            PathBuf::from("/data/foo/bar/3.data")
        );
        assert_eq!(metric_file_path(root, "", 0), PathBuf::from("/data/0.data"));
        assert_eq!(
            metric_file_path(root, "...", 1),
            PathBuf::from("/data/%2e%2e%2e/1.data")
        );
    }

    #[test]
    fn test_unicode_passes_through() {
        assert_eq!(metric_to_dir("héllo.wörld"), "héllo/wörld");
        assert_eq!(dir_to_metric("héllo/wörld").unwrap(), "héllo.wörld");
    }

    proptest! {
        #[test]
        fn prop_roundtrip_small_alphabet(metric in "[a./%]{0,12}") {
            let dir = metric_to_dir(&metric);
            prop_assert_eq!(dir_to_metric(&dir).unwrap(), metric);
        }

        #[test]
        fn prop_roundtrip_any_string(metric in "[^\u{0}]{0,24}") {
            let dir = metric_to_dir(&metric);
            prop_assert_eq!(dir_to_metric(&dir).unwrap(), metric);
        }
    }
}
