//! CLI for the dlx transfer engine.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dlx_core::config;
use std::path::PathBuf;

use commands::{run_checksum, run_get, GetArgs};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "dlx")]
#[command(about = "dlx: resumable HTTP(S), HLS, FTP and SFTP downloader", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download one or more URIs; each becomes its own job.
    Get {
        /// Source URIs (http, https, ftp, ftps, sftp; `.m3u8` playlists go through HLS).
        #[arg(required = true, value_name = "URI")]
        uris: Vec<String>,

        /// Destination file, or directory to place files in (default: current directory).
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Number of jobs run at the same time (default from config).
        #[arg(long, value_name = "N")]
        workers: Option<usize>,

        /// Never split HTTP downloads into slices.
        #[arg(long)]
        stream: bool,

        /// Slice size in bytes for parallel HTTP downloads.
        #[arg(long, value_name = "BYTES")]
        slice_size: Option<u64>,

        /// Resources larger than this many bytes are sliced.
        #[arg(long, value_name = "BYTES")]
        slice_threshold: Option<u64>,

        /// Extra request header, e.g. -H 'Referer: https://example.com/'. Repeatable.
        #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
        headers: Vec<String>,

        /// HTTP method for the download request, e.g. POST.
        #[arg(short = 'X', long, value_name = "METHOD")]
        method: Option<String>,

        /// Request body sent with the download request.
        #[arg(short = 'd', long, value_name = "DATA")]
        data: Option<String>,

        /// Cookie as NAME=VALUE. Repeatable.
        #[arg(short = 'b', long = "cookie", value_name = "NAME=VALUE")]
        cookies: Vec<String>,

        /// Expected SHA-256 of the result (only valid with a single URI).
        #[arg(long, value_name = "HEX")]
        sha256: Option<String>,

        /// Force a protocol handler instead of matching by URI.
        #[arg(long, value_name = "NAME", value_parser = ["hls", "http", "ftp", "sftp"])]
        protocol: Option<String>,
    },

    /// Compute SHA-256 of a file (e.g. after download).
    Checksum {
        /// Path to the file.
        path: PathBuf,
    },
}

impl CliCommand {
    /// Returns false when at least one job did not succeed.
    pub async fn run_from_args() -> Result<bool> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Get {
                uris,
                output,
                workers,
                stream,
                slice_size,
                slice_threshold,
                headers,
                method,
                data,
                cookies,
                sha256,
                protocol,
            } => {
                let cfg = config::load_or_init()?;
                tracing::debug!("loaded config: {:?}", cfg);
                let args = GetArgs {
                    uris,
                    output,
                    workers,
                    stream,
                    slice_size,
                    slice_threshold,
                    headers,
                    method,
                    data,
                    cookies,
                    sha256,
                    protocol,
                };
                run_get(&cfg, args).await
            }
            CliCommand::Checksum { path } => {
                run_checksum(&path).await?;
                Ok(true)
            }
        }
    }
}
