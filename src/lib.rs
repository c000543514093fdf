pub mod config;
pub mod constants;
pub mod enrich;
pub mod error;
pub mod etl;
pub mod extract;
pub mod load;
pub mod logging;
pub mod pipeline;
pub mod report;
pub mod storage;
pub mod types;

pub use error::{EtlError, Result};
pub use pipeline::{clean_house_prices, CleaningPipeline, PipelineConfig, Stage};
pub use types::{CleanRecord, Dataset, Value};
