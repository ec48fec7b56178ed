//! TransferPool CLI - batch file transfer through a bounded worker pool
//!
//! Every file of the source tree becomes one task; tasks are retried until
//! they succeed and the process exits once the whole batch is done.

use clap::Parser;
use tracing_subscriber::EnvFilter;
use transferpool::config::{CliArgs, Commands, DispatchConfig, LogFormat, OutputFormat};
use transferpool::core::Dispatcher;
use transferpool::error::Result;
use transferpool::progress::ProgressReporter;
use transferpool::transfer::TransferPlan;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Initialize logging
    init_logging(&args);

    // Handle result
    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(args: &CliArgs) {
    let level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("transferpool={}", level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match args.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn run(args: CliArgs) -> Result<()> {
    let config = DispatchConfig::from_cli(&args)?;

    // Handle subcommands
    if let Some(command) = &args.command {
        return handle_command(command, &config);
    }

    if let Err(e) = config.validate() {
        eprintln!("Usage: transferpool <SOURCE> <DESTINATION> [OPTIONS]");
        eprintln!("       transferpool --help for more information");
        eprintln!("       transferpool plan <SOURCE> <DESTINATION>");
        return Err(e);
    }

    if args.verbose > 0 && !args.quiet {
        print_config(&config);
    }

    let plan = TransferPlan::scan(&config.source, &config.destination, &config.transfer_options())?;

    if config.dry_run {
        println!("=== Dry Run Mode ===");
        println!("No files will be transferred.");
        println!();
        plan.print_listing();
        return Ok(());
    }

    let progress = if args.progress && !args.quiet {
        ProgressReporter::new()
    } else {
        ProgressReporter::disabled()
    };

    let report = Dispatcher::new(plan.into_tasks(), config.capacity())?
        .with_policy(config.retry_policy())
        .with_progress(progress)
        .run()?;

    match args.output_format {
        OutputFormat::Text => {
            if !args.quiet {
                report.print_summary();
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    report.into_result()?;
    Ok(())
}

fn handle_command(command: &Commands, config: &DispatchConfig) -> Result<()> {
    match command {
        Commands::Plan { source, destination } => {
            let plan = TransferPlan::scan(source, destination, &config.transfer_options())?;
            plan.print_listing();
            Ok(())
        }
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(config)?);
            Ok(())
        }
    }
}

fn print_config(config: &DispatchConfig) {
    println!("=== Configuration ===");
    println!("Source:       {}", config.source.display());
    println!("Destination:  {}", config.destination.display());
    println!("Workers:      {}", config.capacity());
    match config.retry.max_attempts {
        0 => println!("Attempts:     unbounded"),
        n => println!("Attempts:     {}", n),
    }
    println!(
        "Retry delay:  {} (max {})",
        humantime::format_duration(std::time::Duration::from_millis(config.retry.base_delay_ms)),
        humantime::format_duration(std::time::Duration::from_millis(config.retry.max_delay_ms))
    );
    println!("Hidden files: {}", config.include_hidden);
    println!();
}
