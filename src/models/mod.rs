pub mod bulk;
pub mod catalog;
pub mod keyword;
pub mod search;

pub use bulk::{BulkAnalysis, BulkKeywordResult};
pub use catalog::{Category, ItemDetails};
pub use keyword::{AggregatedSearchResult, KeywordMetrics, KeywordRecord, TrendSummary};
pub use search::{PlatformSelection, SearchOptions};
