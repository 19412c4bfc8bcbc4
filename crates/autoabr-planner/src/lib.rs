#![forbid(unsafe_code)]
//! autoabr-planner: from (YAML) job descriptions to a candidate search space.
//!
//! - `search`: default bitrate/resolution sets, the pair filter, variable
//!   expansion, and deterministic candidate pair generation.
//! - `dsl`: job description and pipeline profile documents, resolved into a
//!   backend configuration, an encoding profile, and a `SearchSpace`.
//!
//! No process spawning and no storage access here.

pub mod dsl;
pub mod error;
pub mod search;

pub use dsl::yaml::{load_job_file, parse_job_yaml, parse_pipeline_yaml, JobDescription, ResolvedJob};
pub use error::{Error, Result};
pub use search::{
    expand_variables, generate_pairs, PairFilter, SearchSpace, DEFAULT_BITRATES, DEFAULT_RESOLUTIONS,
};
