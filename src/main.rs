//! # Command Line Interface
//!
//! The command tree is built in `cli.rs`, which is shared with the build script.
//! The subcommands themselves are in the `commands` module.

use env_logger;
use phloppy::commands;

mod cli;

fn main() -> Result<(),Box<dyn std::error::Error>>
{
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let matches = cli::build_cli().get_matches();

    if let Some(cmd) = matches.subcommand_matches("connect") {
        return commands::repl::connect(cmd);
    }

    if let Some(cmd) = matches.subcommand_matches("mkimg") {
        return commands::mkimg::mkimg(cmd);
    }

    eprintln!("No subcommand was found, try `phloppy --help`");
    return Err(Box::new(commands::CommandError::InvalidCommand));
}
