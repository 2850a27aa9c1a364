use std::io::{self, Write};

use serde::Serialize;

use crate::app::{DownloadResult, DupesResult, GenesResult, InitResult, SortResult};
use crate::survival::SurvivalResult;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_init(result: &InitResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_download(result: &DownloadResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_sort(result: &SortResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_dupes(result: &DupesResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_genes(result: &GenesResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_survival(result: &SurvivalResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl crate::app::ProgressSink for JsonOutput {
    fn event(&self, _event: crate::app::ProgressEvent) {}
}
