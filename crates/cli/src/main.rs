mod args;
mod logging;
mod op;
mod ops;
mod state;

use std::process::ExitCode;

use args::Args;
use clap::{Parser, Subcommand};
use logging::LogSettings;
use op::Op;
use ops::{AddVersion, Cat, Cp, Gc, Init, Ls, Mkdir, Mv, Put, Rm, RmVersion, Versions};

command_enum! {
    (Init, Init),
    (Ls, Ls),
    (Mkdir, Mkdir),
    (Put, Put),
    (AddVersion, AddVersion),
    (Cat, Cat),
    (Versions, Versions),
    (Mv, Mv),
    (Cp, Cp),
    (Rm, Rm),
    (RmVersion, RmVersion),
    (Gc, Gc),
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let ctx = op::OpContext::new(args.config_path, args.owner);

    // Before `init` there is no config to read the log settings from
    let settings = match ctx.load_state() {
        Ok(state) => LogSettings::from_config(&state.config),
        Err(_) => LogSettings::default(),
    };
    let guards = logging::init_logging(&settings);

    let code = match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    };

    // flush the non-blocking writers before exiting
    drop(guards);
    code
}
