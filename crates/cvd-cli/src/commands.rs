use std::collections::HashMap;

use clap::{Parser, Subcommand};
use cvd_core::instance::InstanceStatus;
use tabled::Table;

use crate::daemon::CvdDaemon;
use crate::display::{instance_rows, GroupRow};
use crate::ui;

#[derive(Parser)]
#[command(name = "cvd", version, about = "Instance allocation, creation analysis, and acloud-compatible translation")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format for list/status commands.
    #[arg(long, short = 'o', global = true, default_value = "table")]
    pub output: OutputFormat,
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new instance group (spec §4.D).
    Create {
        /// Selector flags and trailing query args, e.g. `--num_instances 2`.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        selector_args: Vec<String>,
    },
    /// Mark every instance in a group as starting.
    Start { group_name: String },
    /// Mark every instance in a group as stopped.
    Stop { group_name: String },
    /// Remove a group and release its locks.
    Clear {
        group_name: String,
        #[arg(long)]
        yes: bool,
    },
    /// List all groups.
    Status,
    /// List every instance across every group.
    Fleet,
    /// Translate a legacy `acloud create` invocation (spec §4.E).
    Acloud {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut daemon = CvdDaemon::new()?;

    match cli.command {
        Commands::Create { selector_args } => {
            let envs: HashMap<String, String> = std::env::vars().collect();
            let name = daemon.create_group(&envs, &selector_args)?;
            ui::success(&format!("created group {name:?}"));
        }
        Commands::Start { group_name } => {
            daemon.set_group_status(&group_name, InstanceStatus::Starting)?;
            ui::success(&format!("started group {group_name:?}"));
        }
        Commands::Stop { group_name } => {
            daemon.set_group_status(&group_name, InstanceStatus::Stopped)?;
            ui::success(&format!("stopped group {group_name:?}"));
        }
        Commands::Clear { group_name, yes } => {
            if !yes && !ui::confirm(&format!("remove group {group_name:?}?")) {
                ui::warn("aborted");
                return Ok(());
            }
            daemon.remove_group(&group_name)?;
            ui::success(&format!("removed group {group_name:?}"));
        }
        Commands::Status => {
            let rows: Vec<GroupRow> = daemon.db().groups().map(GroupRow::from).collect();
            print_rows(&cli.output, rows)?;
        }
        Commands::Fleet => {
            let rows = instance_rows(daemon.db().groups());
            print_rows(&cli.output, rows)?;
        }
        Commands::Acloud { args } => {
            let parsed = cvd_acloud::parse_acloud_args(&args)?;
            let envs: HashMap<String, String> = std::env::vars().collect();
            let requests = cvd_acloud::translate(&parsed, &envs)?;
            for request in requests {
                ui::info(&format!("{} {}", request.program, request.args.join(" ")));
            }
        }
    }

    Ok(())
}

fn print_rows<T>(format: &OutputFormat, rows: Vec<T>) -> anyhow::Result<()>
where
    T: tabled::Tabled + serde::Serialize,
{
    match format {
        OutputFormat::Table => println!("{}", Table::new(rows)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
    }
    Ok(())
}
