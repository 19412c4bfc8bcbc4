//! CSV export of quality results, one row per artifact.

use std::fs::File;
use std::io::Write;

use autoabr_core::naming::{basename, dirname};
use autoabr_core::{QualityResult, ScoreFamily};

use crate::error::Result;

pub const COLUMNS: [&str; 12] = [
    "folder",
    "filename",
    "width",
    "height",
    "targetBitrate",
    "actualBitrate",
    "vmaf",
    "vmafHd",
    "vmafHdPhone",
    "cpuTime",
    "realTime",
    "variables",
];

pub struct ResultCsvWriter<W: Write> {
    writer: ::csv::Writer<W>,
    wrote_header: bool,
}

impl ResultCsvWriter<File> {
    pub fn to_path(path: &str) -> Result<Self> {
        let f = File::create(path)?;
        Ok(Self::to_writer(f))
    }
}

impl<W: Write> ResultCsvWriter<W> {
    pub fn to_writer(writer: W) -> Self {
        Self {
            writer: ::csv::WriterBuilder::new().has_headers(false).from_writer(writer),
            wrote_header: false,
        }
    }

    pub fn write_result(&mut self, r: &QualityResult) -> Result<()> {
        if !self.wrote_header {
            self.writer.write_record(COLUMNS)?;
            self.wrote_header = true;
        }
        let opt = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();
        let variables = r
            .variables
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(";");

        self.writer.write_record([
            dirname(&r.source_filename).to_string(),
            basename(&r.source_filename).to_string(),
            r.resolution.width.to_string(),
            r.resolution.height.to_string(),
            r.target_bitrate.to_string(),
            r.actual_bitrate.map(|b| b.to_string()).unwrap_or_default(),
            opt(r.score(ScoreFamily::Vmaf)),
            opt(r.score(ScoreFamily::VmafHd)),
            opt(r.score(ScoreFamily::VmafHdPhone)),
            opt(r.cpu_time.map(|t| t.cpu_time)),
            opt(r.cpu_time.map(|t| t.real_time)),
            variables,
        ])?;
        Ok(())
    }

    pub fn write_all<'a>(&mut self, results: impl IntoIterator<Item = &'a QualityResult>) -> Result<()> {
        for r in results {
            self.write_result(r)?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        if !self.wrote_header {
            self.writer.write_record(COLUMNS)?;
        }
        self.writer.flush()?;
        self.writer
            .into_inner()
            .map_err(|e| crate::error::Error::Io(std::io::Error::new(e.error().kind(), e.error().to_string())))
    }
}
