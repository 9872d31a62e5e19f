use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufReader};
use std::process;
use std::str::FromStr;

use clap::{Arg, Command};
use colored::Colorize;
use log::{info, warn};

use flan_scan::config::Config;
use flan_scan::dns::enumeration::Enumerator;
use flan_scan::output::{OutputFormat, ReportWriter};
use flan_scan::scanner::{targets, CancelToken, ScanEngine};

/// Concurrency for the subdomain enumerator; independent of scan workers.
const ENUM_WORKERS: usize = 32;

#[tokio::main]
async fn main() {
    env_logger::init();

    let matches = Command::new("flan-scan")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Concurrent TCP service scanner with TLS inspection and resumable checkpoints")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("ips")
                .long("ips")
                .value_name("PATH")
                .help("Target list, one hostname/IP/CIDR per line (- for stdin)"),
        )
        .arg(
            Arg::new("domain")
                .long("domain")
                .value_name("NAME")
                .help("Enumerate common subdomains of NAME and scan the hits"),
        )
        .get_matches();

    let config = match matches.get_one::<String>("config") {
        Some(path) => match Config::from_toml_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        },
        None => Config::default(),
    };

    // Port-spec and format problems are startup errors; catch them before
    // any targets are touched.
    let engine = match ScanEngine::new(&config, CancelToken::new()) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };
    let format = match OutputFormat::from_str(&config.output.format) {
        Ok(format) => format,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    let mut targets = Vec::new();
    if let Some(path) = matches.get_one::<String>("ips") {
        let parsed = if path == "-" {
            targets::parse_targets(io::stdin().lock())
        } else {
            match File::open(path) {
                Ok(file) => targets::parse_targets(BufReader::new(file)),
                Err(e) => {
                    eprintln!("Failed to open {path}: {e}");
                    process::exit(1);
                }
            }
        };
        match parsed {
            Ok(mut parsed) => targets.append(&mut parsed),
            Err(e) => {
                eprintln!("Failed to read targets: {e:#}");
                process::exit(1);
            }
        }
    }

    if let Some(domain) = matches.get_one::<String>("domain") {
        let enumerator = Enumerator::new(config.timeout_duration(), ENUM_WORKERS);
        match enumerator.enumerate(domain).await {
            Ok(hosts) => {
                println!(
                    "{} {} hosts under {}",
                    "[~] enumerated".bright_blue(),
                    hosts.len().to_string().bright_white().bold(),
                    domain.bright_cyan()
                );
                targets.extend(hosts);
            }
            Err(e) => {
                eprintln!("Enumeration failed: {e:#}");
                process::exit(1);
            }
        }
    }

    // Dedup across --ips and --domain sources, first seen wins.
    let mut seen = HashSet::new();
    targets.retain(|t| seen.insert(t.clone()));

    if targets.is_empty() {
        eprintln!("No targets to scan (use --ips or --domain)");
        process::exit(1);
    }

    let cancel = engine.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight probes");
            cancel.cancel();
        }
    });

    println!(
        "{} {} targets, {} ports",
        "[~] scanning".bright_blue(),
        targets.len().to_string().bright_white().bold(),
        config
            .port_list()
            .map(|p| p.len())
            .unwrap_or_default()
            .to_string()
            .bright_white()
            .bold(),
    );

    let results = match engine.run(&targets).await {
        Ok(results) => results,
        Err(e) => {
            eprintln!("Scan failed: {e}");
            process::exit(1);
        }
    };
    info!("{} services discovered", results.len());

    // Report failures are not fatal this late; fall back to stdout so the
    // run's results are not lost.
    match ReportWriter::new(&config.output.directory).and_then(|w| w.write(format, &results)) {
        Ok(Some(path)) => {
            println!(
                "{} {}",
                "[+] report written to".bright_green(),
                path.display()
            );
        }
        Ok(None) => {}
        Err(e) => {
            warn!("failed to write report: {e}");
            flan_scan::output::print_text(&results);
        }
    }
}
