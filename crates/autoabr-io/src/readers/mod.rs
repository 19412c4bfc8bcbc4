//! Readers for quality-result artifacts and their sidecars.
//!
//! Parsing is forgiving at the artifact level: a score family that is absent
//! is simply omitted, and unparsable artifacts are skipped with a diagnostic
//! by the bulk loader rather than failing the load.

pub mod cpu_time;
pub mod metadata;
pub mod results;
pub mod vmaf;

pub use cpu_time::parse_cpu_time;
pub use metadata::parse_probed_bitrate;
pub use results::{load_artifacts, load_results, LoadedResults};
pub use vmaf::parse_scores;
