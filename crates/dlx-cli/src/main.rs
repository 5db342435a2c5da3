use dlx_core::logging;

mod cli;

use crate::cli::CliCommand;

#[tokio::main]
async fn main() {
    // Falls back to stderr when the state directory is not writable.
    let target = logging::init();
    tracing::debug!(?target, "logging initialised");

    match CliCommand::run_from_args().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("dlx error: {:#}", err);
            std::process::exit(1);
        }
    }
}
