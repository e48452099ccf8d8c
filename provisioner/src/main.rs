//! rmprov - Entry Point
//!
//! Installs scripts on a reMarkable tablet and backs up its documents over SSH.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{error, info};

use rmprov::app::console::ConsoleObserver;
use rmprov::app::options::{AppOptions, ServerOptions};
use rmprov::app::run;
use rmprov::bootstrap::setup::DEFAULT_BASE_DIR;
use rmprov::filesys::dir::Dir;
use rmprov::filesys::file::File;
use rmprov::install::plan::InstallPlan;
use rmprov::logs::{init_logging, LogOptions};
use rmprov::remote::ssh::SshConnector;
use rmprov::storage::settings::Settings;
use rmprov::utils::version_info;

#[derive(Parser)]
#[command(name = "rmprov", version)]
#[command(about = "Install scripts on a reMarkable tablet and back up its documents", long_about = None)]
struct Cli {
    /// Settings file; process environment variables take precedence
    #[arg(long, global = true, env = "RMPROV_ENV_FILE", default_value = ".env")]
    env_file: PathBuf,

    /// Log in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Transfer and run the scripts of the install plan, in order
    Install,

    /// Copy the device document store into a new timestamped directory
    Backup,

    /// Show the install plan in execution order
    Plan {
        /// Rewrite the plan file with normalized formatting
        #[arg(long)]
        rewrite: bool,
    },

    /// Print the effective settings, password redacted
    Config,

    /// Run the status web service (on the device)
    ServeStatus {
        /// Address to bind [default: 0.0.0.0]
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on [default: 5000]
        #[arg(long)]
        port: Option<u16>,
    },

    /// Create the scripts directory layout (on the device)
    SetupDirs {
        #[arg(long, default_value = DEFAULT_BASE_DIR)]
        base: PathBuf,
    },

    /// Print version information as JSON
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    // Commands that run on the device need no settings
    match cli.cmd {
        Command::Version => {
            println!("{}", serde_json::to_string_pretty(&version_info())?);
            return Ok(ExitCode::SUCCESS);
        }
        Command::ServeStatus { host, port } => {
            let _guard = init_logging(log_options(LogOptions::default(), cli.json_logs))?;
            let defaults = ServerOptions::default();
            let options = ServerOptions {
                host: host.unwrap_or(defaults.host),
                port: port.unwrap_or(defaults.port),
            };
            run::serve_status(options).await?;
            return Ok(ExitCode::SUCCESS);
        }
        Command::SetupDirs { base } => {
            let _guard = init_logging(log_options(LogOptions::default(), cli.json_logs))?;
            run::setup_dirs(Dir::new(base)).await?;
            println!("{}", "Directory structure set up".green());
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let settings = Settings::load(&cli.env_file)
        .with_context(|| format!("loading settings from {}", cli.env_file.display()))?;
    let options = AppOptions::from_settings(&settings);
    let _guard = init_logging(log_options(options.logging.clone(), cli.json_logs))?;
    info!("rmprov {}", version_info().version);

    let observer = ConsoleObserver::new();
    let code = match cli.cmd {
        Command::Install => match run::install(SshConnector::new(), options, &observer).await {
            Ok(report) => {
                println!(
                    "{} {} scripts transferred, {} executed",
                    "All scripts installed:".green().bold(),
                    report.transferred.len(),
                    report.executed.len()
                );
                ExitCode::SUCCESS
            }
            Err(_) => ExitCode::FAILURE,
        },
        Command::Backup => match run::backup(SshConnector::new(), options, &observer).await {
            Ok(report) => {
                println!("Backup location: {}", report.destination.display());
                if report.failed() > 0 {
                    println!(
                        "{}",
                        format!("{} of {} files could not be copied", report.failed(), report.discovered)
                            .yellow()
                    );
                    for failure in &report.failures {
                        println!("  {}: {}", failure.remote_path, failure.reason);
                    }
                }
                ExitCode::SUCCESS
            }
            Err(_) => ExitCode::FAILURE,
        },
        Command::Plan { rewrite } => show_plan(&settings, rewrite).await?,
        Command::Config => {
            print_settings(&settings);
            ExitCode::SUCCESS
        }
        Command::Version | Command::ServeStatus { .. } | Command::SetupDirs { .. } => {
            ExitCode::SUCCESS
        }
    };
    Ok(code)
}

fn log_options(base: LogOptions, json_logs: bool) -> LogOptions {
    LogOptions {
        json_format: json_logs,
        ..base
    }
}

async fn show_plan(settings: &Settings, rewrite: bool) -> anyhow::Result<ExitCode> {
    let plan_file = File::new(settings.plan_file());
    let (plan, load_error) = InstallPlan::load_or_empty(&plan_file).await;
    if let Some(e) = load_error {
        eprintln!("{} {}", "Configuration error:".red().bold(), e);
        eprintln!("The install plan is treated as empty.");
        return Ok(ExitCode::FAILURE);
    }

    println!("Install plan: {}", plan_file.path().display());
    println!("{:>8}  {:<24} {:<8} {}", "Order", "Script", "Execute", "Description");
    for script in plan.ordered() {
        println!(
            "{:>8}  {:<24} {:<8} {}",
            script.order,
            script.name,
            if script.execute { "yes" } else { "no" },
            script.description
        );
    }

    if rewrite {
        plan.save(&plan_file).await?;
        println!("Rewrote {}", plan_file.path().display());
    }
    Ok(ExitCode::SUCCESS)
}

fn print_settings(settings: &Settings) {
    let rows = [
        ("remarkable_wifi_ip", settings.remarkable_wifi_ip.clone()),
        ("remarkable_ip", settings.remarkable_ip.clone()),
        ("remarkable_ssh_port", settings.remarkable_ssh_port.to_string()),
        ("remarkable_user", settings.remarkable_user.clone()),
        ("remarkable_password", "********".to_string()),
        (
            "remarkable_endpoint_preference",
            settings.remarkable_endpoint_preference.as_str().to_string(),
        ),
        (
            "remarkable_connect_timeout_secs",
            settings.remarkable_connect_timeout_secs.to_string(),
        ),
        ("local_script_dir", settings.local_script_dir().display().to_string()),
        ("remote_base_dir", settings.remote_base_dir()),
        ("install_plan", settings.plan_file().display().to_string()),
        ("remarkable_documents_dir", settings.remarkable_documents_dir.clone()),
        ("remarkable_backups", settings.backups_dir().display().to_string()),
        ("remote_interpreter", settings.remote_interpreter.clone()),
        (
            "script_timeout_secs",
            settings
                .script_timeout_secs
                .map(|secs| secs.to_string())
                .unwrap_or_else(|| "none".to_string()),
        ),
        ("log_level", settings.log_level.to_filter_string().to_string()),
        (
            "window_size",
            format!("{}x{}", settings.window_width, settings.window_height),
        ),
    ];
    for (key, value) in rows {
        println!("{:<32} {}", key.bold(), value);
    }
}
