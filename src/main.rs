use std::process;

use deckcache::{
    application::{
        error::AppError,
        simulation::{self, SimulationPlan},
    },
    config::{self, Command, SimulateArgs},
    infra::telemetry,
};
use tracing::{Dispatch, Level, dispatcher, error};
use tracing_subscriber::fmt as tracing_fmt;

fn main() {
    if let Err(error) = run() {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or_else(|| Command::Simulate(SimulateArgs::default()));

    telemetry::init(&settings.logging)?;

    match command {
        Command::ShowConfig(_) => run_show_config(&settings),
        Command::Simulate(args) => run_simulate(&settings, &args),
    }
}

fn run_show_config(settings: &config::Settings) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}

fn run_simulate(settings: &config::Settings, args: &SimulateArgs) -> Result<(), AppError> {
    if args.flips == 0 {
        return Err(AppError::validation("simulate requires at least one flip"));
    }

    let report = simulation::run(&settings.cache, SimulationPlan::from(args))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
