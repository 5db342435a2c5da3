//! `dlx get` – submit one job per URI and report progress until all settle.

use anyhow::{bail, Context, Result};
use dlx_core::config::DlxConfig;
use dlx_core::protocol::ProtocolRegistry;
use dlx_core::{naming, Job, JobHandle, JobOptions, Orchestrator, ProgressStats};
use std::path::{Path, PathBuf};
use std::time::Duration;

const PROGRESS_INTERVAL_MS: u64 = 500;

#[derive(Debug, Clone, Default)]
pub struct GetArgs {
    pub uris: Vec<String>,
    pub output: Option<PathBuf>,
    pub workers: Option<usize>,
    pub stream: bool,
    pub slice_size: Option<u64>,
    pub slice_threshold: Option<u64>,
    pub headers: Vec<String>,
    pub method: Option<String>,
    pub data: Option<String>,
    pub cookies: Vec<String>,
    pub sha256: Option<String>,
    pub protocol: Option<String>,
}

/// Parses `Name: value`.
pub fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .with_context(|| format!("header {:?} is not in 'Name: value' form", raw))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("header {:?} has an empty name", raw);
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Parses `name=value`.
pub fn parse_cookie(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once('=')
        .with_context(|| format!("cookie {:?} is not in 'name=value' form", raw))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("cookie {:?} has an empty name", raw);
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Config defaults overridden by command-line flags.
pub fn job_options(cfg: &DlxConfig, args: &GetArgs) -> Result<JobOptions> {
    let mut opts = cfg.job_options();
    opts.force_stream = args.stream;
    if let Some(n) = args.slice_size {
        if n == 0 {
            bail!("--slice-size must be positive");
        }
        opts.slice_size = n;
    }
    if let Some(n) = args.slice_threshold {
        opts.slice_threshold = n;
    }
    opts.headers = args
        .headers
        .iter()
        .map(|h| parse_header(h))
        .collect::<Result<_>>()?;
    opts.cookies = args
        .cookies
        .iter()
        .map(|c| parse_cookie(c))
        .collect::<Result<_>>()?;
    if let Some(method) = &args.method {
        opts.method = method.to_ascii_uppercase();
    }
    opts.body = args.data.as_ref().map(|d| d.as_bytes().to_vec());
    opts.expected_sha256 = args.sha256.clone();
    Ok(opts)
}

fn destinations(args: &GetArgs) -> Result<Vec<PathBuf>> {
    if args.uris.len() > 1 {
        if args.sha256.is_some() {
            bail!("--sha256 only applies to a single URI");
        }
        if let Some(dir) = &args.output {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create output directory {}", dir.display()))?;
        }
    }
    Ok(args
        .uris
        .iter()
        .map(|u| naming::destination_for(u, args.output.as_deref()))
        .collect())
}

fn format_progress(stats: &ProgressStats) -> String {
    let done_mib = stats.bytes_done as f64 / 1_048_576.0;
    let rate_mib = stats.bytes_per_sec() / 1_048_576.0;
    let mut line = match stats.total_bytes {
        Some(total) => format!(
            "{:.1} / {:.1} MiB ({:.1}%)",
            done_mib,
            total as f64 / 1_048_576.0,
            stats.fraction() * 100.0
        ),
        None => format!("{:.1} MiB", done_mib),
    };
    line.push_str(&format!("  {:.2} MiB/s", rate_mib));
    if stats.piece_count > 0 {
        line.push_str(&format!("  pieces {}/{}", stats.pieces_done, stats.piece_count));
    }
    if let Some(eta) = stats.eta_secs() {
        line.push_str(&format!("  ETA {:.0}s", eta));
    }
    line
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub async fn run_get(cfg: &DlxConfig, args: GetArgs) -> Result<bool> {
    let opts = job_options(cfg, &args)?;
    let dests = destinations(&args)?;

    let orch = Orchestrator::new(args.workers.unwrap_or(cfg.workers))?;
    if let Some(name) = &args.protocol {
        let variant = ProtocolRegistry::default()
            .by_name(name)
            .with_context(|| format!("unknown protocol {}", name))?;
        orch.pin_handler(variant)?;
    }

    let mut all_ok = true;
    let mut pending: Vec<JobHandle> = Vec::new();
    for (uri, dest) in args.uris.iter().zip(dests) {
        let job = Job::new(uri.as_str(), dest).with_options(opts.clone());
        match orch.submit(job) {
            Ok(h) => pending.push(h),
            Err(e) => {
                eprintln!("{}: {}", uri, e);
                all_ok = false;
            }
        }
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(PROGRESS_INTERVAL_MS));
    while !pending.is_empty() {
        ticker.tick().await;
        let mut still_running = Vec::with_capacity(pending.len());
        for mut h in pending.drain(..) {
            let name = display_name(&h.job().destination);
            match h.try_outcome() {
                None => {
                    println!("  {}  {}", name, format_progress(&h.progress()));
                    still_running.push(h);
                }
                Some(Ok(outcome)) => {
                    println!("{:<16} {:<5} {}", outcome, h.variant(), h.job().destination.display());
                    all_ok &= outcome.is_success_like();
                }
                Some(Err(e)) => {
                    println!("{:<16} {:<5} {}: {}", "error", h.variant(), name, e);
                    all_ok = false;
                }
            }
        }
        pending = still_running;
    }

    orch.shutdown();
    Ok(all_ok)
}
