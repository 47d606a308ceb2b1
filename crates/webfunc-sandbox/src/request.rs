//! Request metadata handed to the sandbox, and its file renderings.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use url::form_urlencoded;

/// The parts of an inbound request a guest can see.
///
/// Headers are kept in name order; repeated headers keep their values in
/// insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMetadata {
    /// Header name to values.
    pub headers: BTreeMap<String, Vec<String>>,
    /// Method token, e.g. `GET`.
    pub method: String,
    /// Request path, e.g. `/hello`.
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: String,
}

impl RequestMetadata {
    /// Create metadata for `method` and `path` with no headers or query.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Set the raw query string.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// Append a header value.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_header(name, value);
        self
    }

    /// Append a header value in place.
    pub fn push_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers
            .entry(name.into())
            .or_default()
            .push(value.into());
    }

    /// Render the `headers` file: one `Name: value` line per value.
    #[must_use]
    pub fn render_headers(&self) -> String {
        let mut out = String::new();
        for (name, values) in &self.headers {
            for value in values {
                let _ = writeln!(out, "{name}: {value}");
            }
        }
        out
    }

    /// Render the `query` file: the query re-encoded as
    /// `application/x-www-form-urlencoded` with keys sorted.
    ///
    /// Values of a repeated key keep their original order.
    #[must_use]
    pub fn canonical_query(&self) -> String {
        canonicalize_query(&self.query)
    }
}

/// Re-encode `raw` with keys in sorted order.
#[must_use]
pub fn canonicalize_query(raw: &str) -> String {
    let raw = raw.strip_prefix('?').unwrap_or(raw);
    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect();
    // Stable: repeated keys keep their relative order.
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// Canonical MIME header form: `content-type` becomes `Content-Type`.
///
/// Names containing a space or a byte outside the token set are returned
/// unchanged.
#[must_use]
pub fn canonical_header_name(name: &str) -> String {
    let is_token = |c: char| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c);
    if name.is_empty() || !name.chars().all(is_token) {
        return name.to_owned();
    }

    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}
