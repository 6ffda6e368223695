//! Public Suffix List (PSL) utilities for registrable-domain extraction
//!
//! A [`SuffixList`] holds the three PSL rule kinds (exact, `*.` wildcard and
//! `!` exception). The compiled rule set owns one, so replacing the rule set
//! also replaces the suffix data atomically.
//!
//! # Examples
//!
//! ```
//! use tb_core::psl::SuffixList;
//!
//! let psl = SuffixList::embedded();
//! assert_eq!(psl.registrable_domain("sub.example.com").as_deref(), Some("example.com"));
//! assert_eq!(psl.registrable_domain("sub.example.co.uk").as_deref(), Some("example.co.uk"));
//! ```

use std::collections::HashSet;

use crate::url::is_ip_literal;

/// Common suffixes used when the host does not supply a full list.
///
/// PSL text format: one rule per line, `//` comments, `*.` wildcards and
/// `!` exceptions.
const EMBEDDED_SUFFIXES: &str = "\
// generic
com
net
org
edu
gov
mil
int
info
biz
io
co
me
tv
app
dev
// country code, second level
uk
co.uk
org.uk
gov.uk
ac.uk
ltd.uk
plc.uk
jp
co.jp
ne.jp
or.jp
ac.jp
au
com.au
net.au
org.au
gov.au
nz
co.nz
net.nz
org.nz
za
co.za
in
co.in
kr
co.kr
br
com.br
cn
com.cn
mx
com.mx
tw
com.tw
hk
com.hk
de
fr
it
nl
es
ru
// wildcard and exception
ck
*.ck
!www.ck
";

// =============================================================================
// Suffix List
// =============================================================================

/// PSL rule sets for suffix lookup.
#[derive(Debug, Default, Clone)]
pub struct SuffixList {
    /// Exact rules (e.g., "com", "co.uk")
    exact: HashSet<String>,
    /// Wildcard rules (e.g., "*.ck" stored as "ck")
    wildcard: HashSet<String>,
    /// Exception rules (e.g., "!www.ck" stored as "www.ck")
    exception: HashSet<String>,
}

impl SuffixList {
    /// Create an empty list. Every lookup then uses the fallback heuristic.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in list of common suffixes.
    pub fn embedded() -> Self {
        Self::parse(EMBEDDED_SUFFIXES)
    }

    /// Parse PSL text. Unknown or malformed lines are skipped.
    pub fn parse(text: &str) -> Self {
        let mut list = Self::new();
        for raw_line in text.lines() {
            // Only the first whitespace-delimited token counts
            let line = match raw_line.split_whitespace().next() {
                Some(token) => token,
                None => continue,
            };
            if line.starts_with("//") {
                continue;
            }
            let line = line.to_ascii_lowercase();

            if let Some(rest) = line.strip_prefix('!') {
                list.exception.insert(rest.to_string());
            } else if let Some(rest) = line.strip_prefix("*.") {
                list.wildcard.insert(rest.to_string());
            } else {
                list.exact.insert(line);
            }
        }
        list
    }

    /// Number of rules across all three kinds.
    pub fn len(&self) -> usize {
        self.exact.len() + self.wildcard.len() + self.exception.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the registrable domain (eTLD+1) for a hostname.
    ///
    /// Returns `None` for an empty host. IP literals and hosts that are
    /// themselves public suffixes are returned unchanged.
    pub fn registrable_domain(&self, host: &str) -> Option<String> {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        if host.is_empty() {
            return None;
        }
        if is_ip_literal(&host) {
            return Some(host);
        }

        if host.split('.').any(str::is_empty) {
            return None;
        }

        let registrable = match self.public_suffix_offset(&host) {
            Some(0) => host.as_str(),
            Some(offset) => &host[label_start_before(&host, offset)..],
            None => fallback_registrable(&host),
        };
        Some(registrable.to_string())
    }

    /// Byte offset in `host` where its longest matching public suffix
    /// starts.
    fn public_suffix_offset(&self, host: &str) -> Option<usize> {
        let mut offset = 0;
        loop {
            let suffix = &host[offset..];
            let parent = suffix.find('.').map(|dot| offset + dot + 1);

            // Exception rules override wildcards: the public suffix is one
            // label shorter than the exception.
            if self.exception.contains(suffix) {
                return parent;
            }

            if self.exact.contains(suffix) {
                return Some(offset);
            }

            if let Some(parent) = parent {
                if self.wildcard.contains(&host[parent..]) {
                    return Some(offset);
                }
            }

            offset = parent?;
        }
    }
}

/// Start of the label immediately left of the label starting at `offset`.
/// `offset` must be past a `.` separator.
fn label_start_before(host: &str, offset: usize) -> usize {
    host[..offset - 1].rfind('.').map_or(0, |dot| dot + 1)
}

/// Fallback heuristic: the default PSL rule `*` makes the TLD the public
/// suffix, so the registrable domain is the last two labels.
fn fallback_registrable(host: &str) -> &str {
    match host.rfind('.') {
        Some(dot) => &host[label_start_before(host, dot + 1)..],
        None => host,
    }
}

// =============================================================================
// Host Suffix Walking
// =============================================================================

/// Get the parent domain (strip leftmost label).
pub fn get_parent_domain(host: &str) -> Option<&str> {
    match host.find('.') {
        Some(idx) if idx < host.len() - 1 => Some(&host[idx + 1..]),
        _ => None,
    }
}

/// Iterator for suffix-walking a host from full to registrable domain.
pub struct HostSuffixIter<'a> {
    current: Option<&'a str>,
    floor_len: usize,
}

impl<'a> Iterator for HostSuffixIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        if current.len() < self.floor_len {
            self.current = None;
            return None;
        }

        self.current = get_parent_domain(current).filter(|parent| parent.len() >= self.floor_len);
        Some(current)
    }
}

/// Walk host suffixes from most specific to least specific, stopping at
/// `registrable` (inclusive). `host` must end with `registrable`.
pub fn walk_host_suffixes<'a>(host: &'a str, registrable: &str) -> HostSuffixIter<'a> {
    let current = if host.len() >= registrable.len() {
        Some(host)
    } else {
        None
    };
    HostSuffixIter {
        current,
        floor_len: registrable.len(),
    }
}
