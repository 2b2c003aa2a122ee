use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use svcgen::{Config, Controller, Mode};
use tracing_subscriber::EnvFilter;

/// Scan a Go service project and print its model as JSON.
#[derive(Debug, Parser)]
#[command(name = "svcgen-scan", version)]
struct Args {
    /// Project directory containing go.mod.
    #[arg(default_value = ".")]
    project: PathBuf,

    /// Module cache root; defaults to GOMODCACHE, GOPATH or ~/go.
    #[arg(long, value_name = "DIR")]
    mod_cache: Option<PathBuf>,

    /// Go installation root, for standard library types.
    #[arg(long, value_name = "DIR")]
    goroot: Option<PathBuf>,

    /// Module path of the service framework.
    #[arg(long, value_name = "MODULE")]
    framework: Option<String>,

    /// Drop functions whose types cannot be resolved instead of failing.
    #[arg(long)]
    permissive: bool,

    /// More logging; repeat for more.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::from_env()?;
    if let Some(dir) = args.mod_cache {
        config = config.with_mod_cache(dir);
    }
    if let Some(dir) = args.goroot {
        config = config.with_goroot(dir);
    }
    if let Some(module) = args.framework {
        config = config.with_framework(module);
    }
    if args.permissive {
        config = config.with_mode(Mode::Permissive);
    }

    let project = args
        .project
        .canonicalize()
        .with_context(|| format!("resolving {}", args.project.display()))?;

    let model = Controller::new(config)
        .run(&project)
        .with_context(|| format!("scanning {}", project.display()))?;
    println!("{}", model.to_json_pretty()?);
    Ok(())
}
