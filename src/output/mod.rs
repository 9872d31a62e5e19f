//! Report serialization: JSON and CSV files, colored text to stdout

use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::Local;
use colored::Colorize;

use crate::error::ScanError;
use crate::scanner::ScanResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Csv,
    Text,
}

impl FromStr for OutputFormat {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "text" | "txt" => Ok(OutputFormat::Text),
            other => Err(ScanError::Config(format!("unknown output format: {other}"))),
        }
    }
}

const CSV_HEADER: &str = "Host,Port,Protocol,Service,Banner,TLS,TLS_Version,TLS_Subject,\
TLS_Issuer,TLS_Expired,TLS_SelfSigned,Vulnerabilities";

/// Writes one timestamped report file per run into the output directory.
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    /// Creates the output directory if missing.
    pub fn new(dir: impl Into<PathBuf>) -> crate::Result<Self> {
        let output_dir = dir.into();
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    /// Write `results` in `format`. File formats return the written path;
    /// text goes to stdout and returns `None`.
    pub fn write(
        &self,
        format: OutputFormat,
        results: &[ScanResult],
    ) -> crate::Result<Option<PathBuf>> {
        match format {
            OutputFormat::Json => self.write_json(results).map(Some),
            OutputFormat::Csv => self.write_csv(results).map(Some),
            OutputFormat::Text => {
                print_text(results);
                Ok(None)
            }
        }
    }

    fn report_path(&self, extension: &str) -> PathBuf {
        let stamp = Local::now().format("%Y%m%d-%H%M%S");
        self.output_dir.join(format!("scan-{stamp}.{extension}"))
    }

    fn write_json(&self, results: &[ScanResult]) -> crate::Result<PathBuf> {
        let path = self.report_path("json");
        let data = serde_json::to_string_pretty(results)?;
        fs::write(&path, data)?;
        Ok(path)
    }

    fn write_csv(&self, results: &[ScanResult]) -> crate::Result<PathBuf> {
        let path = self.report_path("csv");
        let mut out = String::with_capacity(256 + results.len() * 128);
        out.push_str(CSV_HEADER);
        out.push('\n');
        for result in results {
            out.push_str(&csv_row(result));
            out.push('\n');
        }
        fs::write(&path, out)?;
        Ok(path)
    }
}

fn csv_row(result: &ScanResult) -> String {
    let (enabled, version, subject, issuer, expired, self_signed) = match &result.tls {
        Some(tls) => (
            "true".to_string(),
            tls.version.clone(),
            tls.subject.clone(),
            tls.issuer.clone(),
            tls.expired.to_string(),
            tls.self_signed.to_string(),
        ),
        None => (
            "false".to_string(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
        ),
    };

    [
        result.host.clone(),
        result.port.to_string(),
        result.protocol.clone(),
        result.service.to_string(),
        result.banner.clone().unwrap_or_default(),
        enabled,
        version,
        subject,
        issuer,
        expired,
        self_signed,
        // Vulnerability lookups live outside this tool; the column stays.
        String::new(),
    ]
    .iter()
    .map(|field| csv_field(field))
    .collect::<Vec<_>>()
    .join(",")
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Human-readable per-result lines.
pub fn print_text(results: &[ScanResult]) {
    for result in results {
        let tls_note = match &result.tls {
            Some(tls) => format!("{} {}", "tls".bright_green(), tls.version),
            None => "plain".dimmed().to_string(),
        };
        let banner = result
            .banner
            .as_deref()
            .map(|b| b.trim().to_string())
            .unwrap_or_default();
        println!(
            "{} {}:{} [{}{}] {} {}",
            "OPEN".bright_green().bold(),
            result.host.bright_cyan(),
            result.port.to_string().bright_white().bold(),
            result.service.to_string().bright_yellow(),
            result
                .version
                .as_deref()
                .map(|v| format!(" {v}"))
                .unwrap_or_default(),
            tls_note,
            banner.dimmed(),
        );
    }
}
