use clap::Parser;

mod cli;

use cli::args::Cli;
use cli::commands::{dispatch, exit_code_for, render_error};

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = Cli::parse();
    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("{}", render_error(&e));
            exit_code_for(&e)
        }
    };
    std::process::exit(code);
}
