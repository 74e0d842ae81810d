//! # Front End Commands
//!
//! Contains modules that run the subcommands, and the parser for the interactive
//! command language.  None of this touches drive state directly, everything goes
//! through `emulator::DriveControl`.

pub mod mkimg;
pub mod repl;

use std::str::FromStr;
use crate::protocol::DRIVES;

pub const INSERT_USAGE: &str = "usage: insert 0|1|2|3 PATH";
pub const EJECT_USAGE: &str = "usage: e[ject] 0|1|2|3";
pub const PROTECT_USAGE: &str = "usage: p[rotect] 0|1|2|3";
pub const UNPROTECT_USAGE: &str = "usage: u[nprotect] 0|1|2|3";

pub const HELP: &str = "commands:

q[uit], exit           - exit program
i[nsert] 0|1|2|3 PATH  - insert floppy image
e[ject] 0|1|2|3        - eject floppy image
s[tatus]               - print current status
p[rotect] 0|1|2|3      - write protect floppy image
u[nprotect] 0|1|2|3    - write un-protect floppy image
h[elp]                 - print this information
";

#[derive(thiserror::Error,Debug)]
pub enum CommandError {
    #[error("{0}")]
    Usage(&'static str),
    #[error("unknown command `{0}`, try `help`")]
    UnknownCommand(String),
    #[error("Command could not be interpreted")]
    InvalidCommand,
    #[error("File {0} already exists, use --force to overwrite")]
    FileExists(String),
    #[error("Image kind is not supported")]
    UnsupportedImageKind
}

/// One line of input to the interactive loop
#[derive(PartialEq,Eq,Clone,Debug)]
pub enum ReplCommand {
    Nothing,
    Quit,
    Insert(usize,String),
    Eject(usize),
    Status,
    Protect(usize),
    Unprotect(usize),
    Help
}

fn drive_arg(tokens: &[&str],usage: &'static str) -> Result<usize,CommandError> {
    if tokens.len() != 2 {
        return Err(CommandError::Usage(usage));
    }
    parse_drive(tokens[1]).ok_or(CommandError::Usage(usage))
}

/// Accepts exactly the digits of existing drives
pub fn parse_drive(s: &str) -> Option<usize> {
    let names = ["0","1","2","3"];
    names[0..DRIVES].iter().position(|x| *x==s)
}

impl FromStr for ReplCommand {
    type Err = CommandError;
    /// Command words can be abbreviated to any prefix, the first match in the help order wins.
    fn from_str(line: &str) -> Result<Self,Self::Err> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let cmd = match tokens.first() {
            Some(cmd) => *cmd,
            None => return Ok(Self::Nothing)
        };
        if cmd.starts_with('q') || cmd.starts_with("exit") {
            Ok(Self::Quit)
        } else if "insert".starts_with(cmd) {
            match tokens.get(1).and_then(|d| parse_drive(d)) {
                Some(drive) if tokens.len() >= 3 => Ok(Self::Insert(drive,tokens[2..].join(" "))),
                _ => Err(CommandError::Usage(INSERT_USAGE))
            }
        } else if "eject".starts_with(cmd) {
            Ok(Self::Eject(drive_arg(&tokens,EJECT_USAGE)?))
        } else if "status".starts_with(cmd) {
            Ok(Self::Status)
        } else if "protect".starts_with(cmd) {
            Ok(Self::Protect(drive_arg(&tokens,PROTECT_USAGE)?))
        } else if "unprotect".starts_with(cmd) {
            Ok(Self::Unprotect(drive_arg(&tokens,UNPROTECT_USAGE)?))
        } else if "help".starts_with(cmd) {
            Ok(Self::Help)
        } else {
            Err(CommandError::UnknownCommand(cmd.to_string()))
        }
    }
}
