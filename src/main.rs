use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{error, info};

use malcolmdb::{
    Db,
    driver::MemoryDriver,
    params,
    script::{self, DriverSpec, Report, ScriptError},
};

#[derive(Parser, Debug)]
#[command(name = "malcolm", version, about = "Storage agnostic query facade")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a JSON-lines query script against in-memory drivers
    Run {
        /// Script to execute
        script: PathBuf,

        /// Drivers to register, as `name` or `name:buffered`
        #[arg(short, long = "driver", env = params::ENV_DRIVERS, value_delimiter = ',')]
        drivers: Vec<DriverSpec>,
    },
}

fn print_report(report: Report) {
    println!(
        "{} {}",
        format!("[line {}]", report.line).dimmed(),
        report.command.bold()
    );

    for (driver, outcome) in report.outcomes {
        match outcome {
            Ok(value) => println!("  {} {}", driver.green(), value),
            Err(err) => println!("  {} {}", driver.red(), err),
        }
    }
}

async fn run(script_path: PathBuf, drivers: Vec<DriverSpec>) -> Result<(), ScriptError> {
    let src = tokio::fs::read_to_string(&script_path).await?;
    let steps = script::parse(&src)?;

    let mut db = Db::new();
    if drivers.is_empty() {
        db.add_driver(params::DEFAULT_DRIVER_NAME, MemoryDriver::new);
    }
    for spec in drivers {
        let capability = spec.capability;
        db.add_driver(spec.name, move || MemoryDriver::with_capability(capability));
    }

    info!(
        "running {} command(s) from {} on {} driver(s)",
        steps.len(),
        script_path.display(),
        db.drivers().len()
    );

    script::run(&db, steps, print_report).await;

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let res = match cli.command {
        Commands::Run { script, drivers } => run(script, drivers).await,
    };

    if let Err(err) = res {
        error!("{err}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
