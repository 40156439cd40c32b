use std::time::Duration;

use spectre_common::DomainError;

use super::builder::{effective_limit, validate_time_range, QueryBuilder};
use super::params::QueryParams;

/// Builds a Lucene-syntax query for `logstore-http`, the HTTP-backed
/// log store integration. Field predicates are ANDed together; the
/// time range is always present, matching the builder's invariant
/// that an unbounded query is never emitted.
pub struct LuceneQueryBuilder {
    max_limit: usize,
}

impl LuceneQueryBuilder {
    pub fn new(max_limit: usize) -> Self {
        Self { max_limit }
    }
}

impl Default for LuceneQueryBuilder {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl QueryBuilder for LuceneQueryBuilder {
    fn max_limit(&self) -> usize {
        self.max_limit
    }

    fn build(&self, params: &QueryParams) -> Result<String, DomainError> {
        let range = validate_time_range(params)?;
        let mut clauses = Vec::new();

        if let Some(v) = &params.namespace {
            clauses.push(format!("namespace:{}", quote(v)));
        }
        if let Some(v) = &params.pod {
            clauses.push(format!("pod:{}", quote(v)));
        }
        if let Some(v) = &params.container {
            clauses.push(format!("container:{}", quote(v)));
        }
        if let Some(v) = &params.level {
            clauses.push(format!("level:{}", quote(v)));
        }

        clauses.push(format!(
            "timestamp:[{} TO {}]",
            range.start.to_rfc3339(),
            range.end.to_rfc3339()
        ));

        if let Some(limit) = effective_limit(params, self.max_limit) {
            clauses.push(format!("limit:{limit}"));
        }

        Ok(clauses.join(" AND "))
    }

    fn wrap_histogram(&self, base: String, step: Duration) -> String {
        format!("{base} | histogram(step={}s)", step.as_secs())
    }

    fn wrap_aggregation(&self, base: String, group_by: &str) -> String {
        format!("{base} | groupby({})", quote(group_by))
    }
}

/// Quotes a value as a Lucene phrase, escaping the characters Lucene's
/// query parser treats as syntax so user-provided strings can never
/// break out of the field predicate they were placed in.
fn quote(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('"');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::params::TimeRange;
    use chrono::Utc;

    fn range_params() -> QueryParams {
        let start = Utc::now();
        QueryParams {
            time_range: Some(TimeRange { start, end: start + chrono::Duration::hours(1) }),
            ..Default::default()
        }
    }

    #[test]
    fn omits_absent_fields() {
        let built = LuceneQueryBuilder::default().build(&range_params()).unwrap();
        assert!(!built.contains("namespace:"));
        assert!(built.contains("timestamp:["));
    }

    #[test]
    fn escapes_quotes_in_exact_match_values() {
        let mut params = range_params();
        params.pod = Some("pod\" OR 1=1".into());
        let built = LuceneQueryBuilder::default().build(&params).unwrap();
        assert!(built.contains(r#"pod:"pod\" OR 1=1""#));
    }

    #[test]
    fn limit_clause_present_only_when_requested() {
        let params = range_params();
        let built = LuceneQueryBuilder::default().build(&params).unwrap();
        assert!(!built.contains("limit:"));

        let mut with_limit = range_params();
        with_limit.limit = 50;
        let built = LuceneQueryBuilder::default().build(&with_limit).unwrap();
        assert!(built.contains("limit:50"));
    }

    /// Scans a Lucene phrase (including its delimiting quotes) starting
    /// at `start`, respecting `quote`'s escaping, and returns the
    /// un-escaped inner value plus the index just past the closing
    /// quote.
    fn scan_and_unquote(built: &str, start: usize) -> (String, usize) {
        let bytes = built.as_bytes();
        assert_eq!(bytes[start], b'"');
        let mut out = String::new();
        let mut i = start + 1;
        loop {
            match bytes[i] {
                b'\\' => {
                    out.push(bytes[i + 1] as char);
                    i += 2;
                }
                b'"' => {
                    i += 1;
                    break;
                }
                c => {
                    out.push(c as char);
                    i += 1;
                }
            }
        }
        (out, i)
    }

    proptest::proptest! {
        /// Quoting any value for the `pod` field and then reversing the
        /// escaping must reproduce the original value exactly, no
        /// matter how many quotes or backslashes it contains - the
        /// round-trip property that makes `quote` safe to use on
        /// arbitrary user input.
        #[test]
        fn quote_then_unquote_round_trips(value in "[ -~]{0,64}") {
            let mut params = range_params();
            params.pod = Some(value.clone());
            let built = LuceneQueryBuilder::default().build(&params).unwrap();

            let phrase_start = built.find("pod:\"").unwrap() + "pod:".len();
            let (unquoted, _) = scan_and_unquote(&built, phrase_start);

            proptest::prop_assert_eq!(unquoted, value);
        }
    }
}
