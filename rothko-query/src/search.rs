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


//! Metric name search
//!
//! A query is whitespace separated terms, every one of which must match.
//! A term `a.b.c` matches a metric that has three consecutive dotted
//! segments matching `*a`, `*b` and `*c`. Matching is ASCII case
//! insensitive and a segment may run past the end of its pattern, so each
//! part behaves like `*part*`.

/// Match `pattern` against the start of `name`. `*` matches any run and `?`
/// any single byte. `name` is lowercased on the fly; `pattern` is expected
/// to be lowercase already.
pub fn glob(pattern: &str, name: &str) -> bool {
    let pattern = pattern.as_bytes();
    let name = name.as_bytes();
    let (mut px, mut nx) = (0usize, 0usize);
    let (mut next_px, mut next_nx) = (0usize, 0usize);

    while px < pattern.len() {
        if nx >= name.len() {
            return false;
        }
        let n = name[nx].to_ascii_lowercase();

        match pattern[px] {
            b'?' => {
                px += 1;
                nx += 1;
                continue;
            }
            b'*' => {
                next_px = px;
                next_nx = nx + 1;
                px += 1;
                continue;
            }
            c if c == n => {
                px += 1;
                nx += 1;
                continue;
            }
            _ => {}
        }

        if 0 < next_nx && next_nx < name.len() {
            px = next_px;
            nx = next_nx;
            continue;
        }
        return false;
    }
    true
}

/// One dotted query term compiled into per-segment globs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spec {
    globs: Vec<String>,
}

impl Spec {
    pub fn new(term: &str) -> Self {
        Self {
            globs: term.split('.').map(globify).collect(),
        }
    }

    /// True if some run of consecutive segments of `metric` matches.
    pub fn matches(&self, metric: &str) -> bool {
        let mut rest = metric;
        while !rest.is_empty() {
            let (part, tail) = split_segment(rest);
            rest = tail;

            let mut segment = part;
            let mut remaining = tail;
            let mut all = true;
            for g in &self.globs {
                if !glob(g, segment) {
                    all = false;
                    break;
                }
                let (next, after) = split_segment(remaining);
                segment = next;
                remaining = after;
            }
            if all {
                return true;
            }
        }
        false
    }
}

fn globify(part: &str) -> String {
    let mut out = String::with_capacity(part.len() + 1);
    out.push('*');
    out.push_str(&part.to_ascii_lowercase());
    out
}

fn split_segment(metric: &str) -> (&str, &str) {
    match metric.find('.') {
        Some(i) => (&metric[..i], &metric[i + 1..]),
        None => (metric, ""),
    }
}

/// Collects up to `capacity` metric names matching every term of a query.
#[derive(Debug, Clone)]
pub struct Search {
    specs: Vec<Spec>,
    capacity: usize,
    matched: Vec<String>,
}

impl Search {
    pub fn new(query: &str, capacity: usize) -> Self {
        Self {
            specs: query.split_whitespace().map(Spec::new).collect(),
            capacity,
            matched: Vec::with_capacity(capacity.min(1024)),
        }
    }

    pub fn matches(&self, metric: &str) -> bool {
        self.specs.iter().all(|s| s.matches(metric))
    }

    /// Offer a name. Returns false once the result set is full, which ends
    /// a metrics iteration.
    pub fn add(&mut self, name: &str) -> bool {
        if self.matched.len() >= self.capacity {
            return false;
        }
        if self.matches(name) {
            self.matched.push(name.to_string());
        }
        true
    }

    pub fn matched(&self) -> &[String] {
        &self.matched
    }

    pub fn into_matched(self) -> Vec<String> {
        self.matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob() {
        assert!(glob("abc*", "abcdefg"));
        assert!(glob("abc", "abcdefg"));
        assert!(glob("a*bc", "afffbcdefg"));
        assert!(!glob("abc", "aabc"));
        assert!(!glob("abcd", "abc"));
        assert!(glob("abc", "ABC"));
        assert!(glob("a?c", "abc"));
        assert!(glob("*", "x"));
        assert!(!glob("*", ""));
    }

    #[test]
    fn test_spec() {
        let spec = Spec::new("foo.bar.baz");
        assert!(spec.matches("a.foo.bar.baz.b"));
        assert!(spec.matches("a.fool.barl.bazl.b"));
        assert!(!spec.matches("a.foe.barl.bazl.b"));
        assert!(!spec.matches("a.foo.baz.bazl.b"));
        assert!(!spec.matches("a.foo.bar.baf.b"));
        assert!(!spec.matches("foo.bar"));
        assert!(Spec::new("a*p*m*").matches("ActionsPerMinute"));
        assert!(Spec::new("_re").matches("success_times_recent"));
        assert!(Spec::new("recent").matches("success_times_recent"));
        assert!(Spec::new("BAR").matches("foo.bar"));
    }

    #[test]
    fn test_search_requires_every_term() {
        let search = Search::new("  web  latency ", 10);
        assert!(search.matches("servers.web01.latency"));
        assert!(!search.matches("servers.web01.errors"));
        assert!(Search::new("", 10).matches("anything"));
    }

    #[test]
    fn test_search_capacity() {
        let mut search = Search::new("a", 2);
        let names = ["a.1", "b.1", "a.2", "a.3", "a.4"];
        let mut offered = 0;
        for name in names {
            if !search.add(name) {
                break;
            }
            offered += 1;
        }
        assert_eq!(search.matched(), &["a.1".to_string(), "a.2".to_string()]);
        assert_eq!(offered, 3);
        assert_eq!(search.into_matched().len(), 2);
    }
}
