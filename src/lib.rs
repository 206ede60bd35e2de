pub mod capture;
pub mod cli;
pub mod db;
pub mod detect;
pub mod error;
pub mod frame;
pub mod proctor;
pub mod sensing;
pub mod session;
pub mod settings;
pub mod stores;
mod utils;
pub mod violations;

use clap::Parser;

pub use error::{CaptureError, DetectionError, SessionError, StartError};
pub use proctor::Proctor;
pub use session::{ExamSessionController, SessionOutcome, SessionStatus, TerminationReason};

pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = cli::Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("failed to start async runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(cli::execute(cli)) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
