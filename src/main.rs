//! `crxm` command line: `crxm build` or `crxm dev`, with an optional config path.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crxm::{ConfigLoader, CrxmError, DevSession, TracingReloadChannel};

#[derive(Parser, Debug)]
#[command(name = "crxm")]
#[command(about = "Build a Chrome extension and a userscript from one manifest")]
#[command(version)]
struct Cli {
    /// Config file to use instead of searching for crxm.config.toml
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Emit the extension and the userscript once
    Build,
    /// Watch the project and re-emit on every change
    Dev,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        report(&e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CrxmError> {
    let loader = match cli.config {
        Some(path) => ConfigLoader::with_file(path),
        None => {
            let cwd = std::env::current_dir().map_err(|e| CrxmError::io(".", e))?;
            ConfigLoader::new(cwd)
        }
    };

    match cli.command {
        Command::Build => {
            let report = crxm::build(loader)?;
            if let Some(manifest) = &report.manifest {
                println!("extension: {}", manifest.display());
            }
            if let Some(userjs) = &report.userjs {
                println!("userscript: {}", userjs.display());
            }
            println!("{} file(s) written", report.written);
        }
        Command::Dev => {
            let mut session = DevSession::start(loader, Arc::new(TracingReloadChannel))?;
            session.run();
            session.shutdown();
        }
    }
    Ok(())
}

fn report(e: &CrxmError) {
    eprintln!("{}: {}", e.name(), e);
    let mut source = e.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }
}
