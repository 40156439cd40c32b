mod builder;
mod lucene;
mod mock;
mod params;
mod results;

pub use builder::{effective_limit, validate_time_range, QueryBuilder, MIN_TIME_RANGE};
pub use lucene::LuceneQueryBuilder;
pub use mock::MockQueryBuilder;
pub use params::{QueryParams, TimeRange};
pub use results::{AggregationGroup, HistogramBucket, QueryResult};
