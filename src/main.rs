pub mod args;
pub mod audit;

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;
use log::error;

use crate::args::{Args, Command};

const VERSION: Option<&str> = option_env!("CARGO_PKG_VERSION");

fn main() -> ExitCode {
    println!("This is baudit version {}", VERSION.unwrap_or("unknown"));

    let args = Args::parse();
    let env = Env::new().default_filter_or({
        if args.verbose {
            "debug"
        } else {
            "info"
        }
    });
    let _ = env_logger::try_init_from_env(env);

    let result = match &args.command {
        Command::ReadStructure { dir } => audit::run_read_structure(Path::new(dir)),
        Command::ReadReported { dir } => audit::run_read_reported(Path::new(dir)),
        Command::ReadSeed { dir } => audit::run_read_seed(Path::new(dir)),
        Command::MakeAuditOrders { dir } => audit::run_make_audit_orders(Path::new(dir)),
        Command::ReadAudited { dir } => audit::run_read_audited(Path::new(dir)),
        Command::Stage { stage, dir } => match stage.parse::<u32>() {
            Ok(stage_index) => audit::run_stage(Path::new(dir), stage_index),
            Err(_) => {
                error!("stage must be a number like 000 or 001, got `{}`", stage);
                return ExitCode::FAILURE;
            }
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
