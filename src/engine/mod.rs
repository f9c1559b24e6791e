mod coordinator;
mod cycle;
mod fetcher;
pub mod parser;
mod traits;

pub use coordinator::{Aggregator, DEFAULT_CONCURRENCY};
pub use cycle::{
    CycleOutcome, CycleReport, Phase, RefreshCycle, RefreshError, RefreshOutcome, SourceFailure,
};
pub use fetcher::{FailureKind, FetchError, FetchSettings, ReqwestFetcher};
pub use parser::{parse_list, ParsedList};
pub use traits::SourceFetcher;
