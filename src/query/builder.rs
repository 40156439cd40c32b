use std::time::Duration;

use spectre_common::DomainError;

use super::params::{QueryParams, TimeRange};

/// The minimum span a caller may request, shared by every backend.
pub const MIN_TIME_RANGE: Duration = Duration::from_secs(15 * 60);

/// A per-backend translator from [`QueryParams`] to that backend's
/// wire query. Implementations own escaping and field-name mapping;
/// the shared validation and limit-clamping logic lives here so every
/// backend enforces the same safety invariants.
pub trait QueryBuilder: Send + Sync {
    /// The default clamp applied to `params.limit` when the caller did
    /// not request one small enough on their own.
    fn max_limit(&self) -> usize {
        500
    }

    fn build(&self, params: &QueryParams) -> Result<String, DomainError>;

    fn build_histogram(&self, params: &QueryParams, step: Duration) -> Result<String, DomainError> {
        let base = self.build(params)?;
        Ok(self.wrap_histogram(base, step))
    }

    fn build_aggregation(&self, params: &QueryParams, group_by: &str) -> Result<String, DomainError> {
        let base = self.build(params)?;
        Ok(self.wrap_aggregation(base, group_by))
    }

    fn wrap_histogram(&self, base: String, step: Duration) -> String;
    fn wrap_aggregation(&self, base: String, group_by: &str) -> String;
}

/// Validates `params.time_range` against [`MIN_TIME_RANGE`]. Every
/// backend's `build` calls this first; an absent range is a caller
/// bug (see [`QueryParams::with_default_time_range`]), not something
/// this layer papers over.
pub fn validate_time_range(params: &QueryParams) -> Result<&TimeRange, DomainError> {
    let range = params.time_range.as_ref().ok_or_else(|| {
        DomainError::validation(
            "query requires a time range; call QueryParams::with_default_time_range first",
        )
    })?;
    let duration = range.duration()?;
    if duration < MIN_TIME_RANGE {
        return Err(DomainError::validation(format!(
            "time range duration {} is below minimum {}",
            humantime::format_duration(duration),
            humantime::format_duration(MIN_TIME_RANGE),
        )));
    }
    Ok(range)
}

/// The effective limit after clamping to the backend's maximum. `0`
/// means "no limit clause": spec requires omitting it entirely rather
/// than emitting `limit:0`.
pub fn effective_limit(params: &QueryParams, max_limit: usize) -> Option<usize> {
    if params.limit == 0 {
        None
    } else {
        Some(params.limit.min(max_limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn rejects_range_shorter_than_minimum() {
        let start = Utc::now();
        let params = QueryParams {
            time_range: Some(TimeRange {
                start,
                end: start + chrono::Duration::minutes(14),
            }),
            ..Default::default()
        };
        let err = validate_time_range(&params).unwrap_err();
        assert!(err.message.contains("below minimum"));
    }

    #[test]
    fn rejects_absent_range() {
        assert!(validate_time_range(&QueryParams::default()).is_err());
    }

    #[test]
    fn accepts_range_at_exactly_the_minimum() {
        let start = Utc::now();
        let params = QueryParams {
            time_range: Some(TimeRange {
                start,
                end: start + chrono::Duration::minutes(15),
            }),
            ..Default::default()
        };
        assert!(validate_time_range(&params).is_ok());
    }

    #[test]
    fn limit_zero_omits_the_clause() {
        assert_eq!(effective_limit(&QueryParams::default(), 500), None);
    }

    #[test]
    fn limit_above_max_is_clamped() {
        let params = QueryParams { limit: 10_000, ..Default::default() };
        assert_eq!(effective_limit(&params, 500), Some(500));
    }
}
