use anyhow::Result;
use clap::Parser;
use cmdref::Args;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) -> Result<()> {
    let directive = if verbose { "cmdref=debug" } else { "cmdref=info" };

    // stdout carries command output; logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_tracing(args.verbose) {
        eprintln!("warning: logging disabled: {}", e);
    }

    match args.run().await {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
