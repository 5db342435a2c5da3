//! dlx core: a resumable multi-protocol transfer engine.
//!
//! Jobs are submitted to an [`Orchestrator`], which picks a protocol variant
//! (HLS, HTTP(S), FTP or SFTP), runs the transfer on an isolated worker and
//! reports an [`Outcome`] through a [`JobHandle`].

pub mod config;
pub mod logging;

pub mod checksum;
pub mod error;
pub mod hls;
pub mod http;
pub mod job;
pub mod limiter;
pub mod naming;
pub mod orchestrator;
pub mod outcome;
pub mod protocol;
pub mod remote;
pub mod retry;
pub mod storage;

pub use config::DlxConfig;
pub use error::TransferError;
pub use job::{Credentials, Job, JobOptions, JobSummary, ProgressStats};
pub use limiter::AdaptiveLimiter;
pub use orchestrator::{JobHandle, Orchestrator, OrchestratorBuilder};
pub use outcome::Outcome;
pub use protocol::{ProtocolHandler, ProtocolRegistry, ProtocolVariant};
