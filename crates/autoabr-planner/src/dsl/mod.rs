//! Job description and pipeline profile documents.

pub mod yaml;
