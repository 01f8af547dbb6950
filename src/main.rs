mod backend;
mod cli;
mod error;
mod intake;
mod logging;
mod model;
mod notify;
mod ocr;
mod orchestrator;
mod store;
#[cfg(feature = "tui")]
mod tui;
mod vqa;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_non_tui = !args.is_interactive();

    let level = args.log_level.as_deref();
    if is_non_tui {
        logging::init_stderr(level)?;
    } else {
        let dir = args
            .state_dir
            .clone()
            .unwrap_or_else(store::default_state_dir);
        logging::init_file(level, &dir)?;
    }

    match cli::run(args).await {
        Ok(()) => {
            // Exit explicitly so lingering blocking reads don't hold the process.
            if is_non_tui {
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => {
            if is_non_tui {
                eprintln!("Error: {e:#}");
                std::process::exit(1);
            }
            Err(e)
        }
    }
}
