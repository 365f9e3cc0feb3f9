use std::io::{self, Write};

use serde::Serialize;

use crate::app::{CleanReport, ClinicalIngestReport, GenomicIngestReport};

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_clinical(report: &ClinicalIngestReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_genomic(report: &GenomicIngestReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_clean(report: &CleanReport) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
