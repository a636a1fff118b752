use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use ninex_initrd::preflight::check_host_tools;
use ninex_initrd::report::write_report;
use ninex_initrd::{build_image, BuildError, ImageConfig, SystemRunner};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Build,
    Manifest,
    CheckTools,
    Help,
}

#[derive(Debug)]
struct Invocation {
    command: Command,
    config: Option<PathBuf>,
    report: Option<PathBuf>,
    verbose: bool,
}

fn usage() -> &'static str {
    "Usage:\n  mkinitrd [build] [--config <path>] [--report <path>] [--verbose]\n  mkinitrd manifest [--config <path>]\n  mkinitrd check-tools [--config <path>]"
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = match parse_args(&args) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };
    if invocation.command == Command::Help {
        println!("{}", usage());
        return ExitCode::SUCCESS;
    }
    init_logging(invocation.verbose);

    match run(&invocation) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[mkinitrd] error: {e:#}");
            let code = e
                .downcast_ref::<BuildError>()
                .map_or(1, BuildError::exit_code);
            ExitCode::from(code)
        }
    }
}

fn parse_args(args: &[String]) -> Result<Invocation> {
    let (command, rest) = match args.split_first() {
        Some((first, rest)) if first == "build" => (Command::Build, rest),
        Some((first, rest)) if first == "manifest" => (Command::Manifest, rest),
        Some((first, rest)) if first == "check-tools" => (Command::CheckTools, rest),
        _ => (Command::Build, args),
    };

    let mut invocation = Invocation {
        command,
        config: None,
        report: None,
        verbose: false,
    };
    let mut iter = rest.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let value = iter.next().context("--config requires a path")?;
                invocation.config = Some(PathBuf::from(value));
            }
            "--report" if command == Command::Build => {
                let value = iter.next().context("--report requires a path")?;
                invocation.report = Some(PathBuf::from(value));
            }
            "--verbose" | "-v" => invocation.verbose = true,
            "--help" | "-h" => invocation.command = Command::Help,
            other => bail!("unexpected argument '{}'\n{}", other, usage()),
        }
    }
    Ok(invocation)
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(invocation: &Invocation) -> Result<()> {
    let config = ImageConfig::load_or_default(invocation.config.as_deref())?;
    match invocation.command {
        Command::Build => build(&config, invocation.report.as_deref()),
        Command::Manifest => {
            print_manifest(&config);
            Ok(())
        }
        Command::Help => Ok(()),
        Command::CheckTools => {
            let options = config.options();
            check_host_tools(&options, &config.plan_manifest())?;
            println!("[mkinitrd] all required host tools found");
            Ok(())
        }
    }
}

fn build(config: &ImageConfig, report_path: Option<&Path>) -> Result<()> {
    let options = config.options();
    check_host_tools(&options, &config.plan_manifest())?;

    let manifest = config.build_manifest()?;
    let report = build_image(manifest, &options, &SystemRunner)?;

    if let Some(path) = report_path {
        write_report(path, &report)?;
    }
    println!(
        "[mkinitrd] {} entries; image at {} (sha256 {})",
        report.entries.len(),
        report.artifact.display(),
        report.sha256
    );
    Ok(())
}

fn print_manifest(config: &ImageConfig) {
    let manifest = config.plan_manifest();
    for (path, entry) in &manifest {
        println!("{:<5} {:<40} {}", entry.kind(), path, entry);
    }
    for ancestor in manifest.missing_ancestors() {
        println!("[mkinitrd] warning: ancestor directory '{ancestor}' is not registered");
    }
}
