//! Interactive loop that drives a connected emulator

use std::io::{BufRead,Write};
use std::str::FromStr;
use std::time::Duration;
use log::error;
use crate::drive::SlotStatus;
use crate::emulator::{self,DriveControl,Emulator,EmulatorConfig};
use crate::STDRESULT;
use super::{CommandError,ReplCommand,HELP};

const PROMPT: &str = "phloppy> ";

/// One line per drive, e.g. `drive 0: df0.adf [write protection = on]`
pub fn format_status(stat: &[SlotStatus]) -> String {
    let mut ans = Vec::new();
    for (drive,slot) in stat.iter().enumerate() {
        let wp = match slot.write_protected {
            true => "on",
            false => "off"
        };
        ans.push(format!("drive {}: {} [write protection = {}]",drive,slot.path,wp));
    }
    ans.join("\n")
}

/// Carry out one command.  Failures the user can do something about are printed,
/// losing the processor is returned as an error.
fn execute<W: Write>(ctl: &mut dyn DriveControl,cmd: ReplCommand,out: &mut W) -> STDRESULT {
    let result = match cmd {
        ReplCommand::Nothing | ReplCommand::Quit => Ok(()),
        ReplCommand::Insert(drive,path) => ctl.insert(drive,&path),
        ReplCommand::Eject(drive) => ctl.eject(drive),
        ReplCommand::Protect(drive) => ctl.set_protection(drive,true),
        ReplCommand::Unprotect(drive) => ctl.set_protection(drive,false),
        ReplCommand::Status => match ctl.status() {
            Ok(stat) => {
                writeln!(out,"{}",format_status(&stat))?;
                Ok(())
            },
            Err(e) => Err(e)
        },
        ReplCommand::Help => {
            writeln!(out,"{}",HELP)?;
            Ok(())
        }
    };
    match result {
        Err(e) if matches!(e.downcast_ref::<emulator::Error>(),Some(emulator::Error::Disconnected)) => Err(e),
        Err(e) => {
            writeln!(out,"{}",e)?;
            Ok(())
        },
        Ok(()) => Ok(())
    }
}

/// Read commands from `input` until `quit` or end of input.
/// The prompt is only wanted when a person is typing.
pub fn run<R: BufRead,W: Write>(ctl: &mut dyn DriveControl,mut input: R,out: &mut W,prompt: bool) -> STDRESULT {
    loop {
        if prompt {
            write!(out,"{}",PROMPT)?;
            out.flush()?;
        }
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            if prompt {
                writeln!(out)?;
            }
            return Ok(());
        }
        match ReplCommand::from_str(&line) {
            Ok(ReplCommand::Quit) => return Ok(()),
            Ok(cmd) => execute(ctl,cmd,out)?,
            Err(CommandError::Usage(usage)) => writeln!(out,"{}",usage)?,
            Err(e) => writeln!(out,"{}",e)?
        }
    }
}

/// Handle the `connect` subcommand
pub fn connect(cmd: &clap::ArgMatches) -> STDRESULT {
    let mut config = EmulatorConfig::default();
    if let Some(address) = cmd.get_one::<String>("address") {
        config.address = address.to_string();
    }
    if let Some(port) = cmd.get_one::<u16>("port") {
        config.port = *port;
    }
    if let Some(ms) = cmd.get_one::<u64>("tick") {
        config.tick = Duration::from_millis(*ms);
    }
    config.announce_type = cmd.get_flag("announce-type");
    let mut emu = match Emulator::connect(&config) {
        Ok(emu) => emu,
        Err(e) => {
            error!("could not connect to {}:{}",config.address,config.port);
            return Err(e);
        }
    };
    let interactive = atty::is(atty::Stream::Stdin);
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let result = run(&mut emu,stdin.lock(),&mut stdout,interactive);
    let closed = emu.close();
    result?;
    closed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DYNERR;
    use crate::image::ImageKind;

    /// Records calls instead of talking to a device
    struct Recorder {
        calls: Vec<String>,
        slots: Vec<SlotStatus>,
        fail_insert: bool,
        disconnected: bool
    }

    impl Recorder {
        fn new() -> Self {
            let empty = SlotStatus { path: String::new(), write_protected: true, kind: ImageKind::Other, size: 0 };
            Self {
                calls: Vec::new(),
                slots: vec![empty;4],
                fail_insert: false,
                disconnected: false
            }
        }
        fn check(&self) -> STDRESULT {
            match self.disconnected {
                true => Err(Box::new(emulator::Error::Disconnected)),
                false => Ok(())
            }
        }
    }

    impl DriveControl for Recorder {
        fn insert(&mut self,drive: usize,path: &str) -> STDRESULT {
            self.check()?;
            self.calls.push(format!("insert {} {}",drive,path));
            if self.fail_insert {
                return Err(Box::new(emulator::Error::Rejected("No such file or directory".to_string())));
            }
            self.slots[drive].path = path.to_string();
            Ok(())
        }
        fn eject(&mut self,drive: usize) -> STDRESULT {
            self.check()?;
            self.calls.push(format!("eject {}",drive));
            self.slots[drive].path = String::new();
            Ok(())
        }
        fn set_protection(&mut self,drive: usize,flag: bool) -> STDRESULT {
            self.check()?;
            self.calls.push(format!("protect {} {}",drive,flag));
            self.slots[drive].write_protected = flag;
            Ok(())
        }
        fn status(&mut self) -> Result<Vec<SlotStatus>,DYNERR> {
            self.check()?;
            Ok(self.slots.clone())
        }
    }

    fn session(ctl: &mut Recorder,input: &str) -> (STDRESULT,String) {
        let mut out = Vec::new();
        let res = run(ctl,input.as_bytes(),&mut out,false);
        (res,String::from_utf8(out).unwrap())
    }

    #[test]
    fn commands_map_to_calls() {
        let mut ctl = Recorder::new();
        let (res,out) = session(&mut ctl,"i 1 work disk.adf\nunprotect 1\n\ne 0\nstatus\nquit\neject 2\n");
        assert!(res.is_ok());
        assert_eq!(ctl.calls,vec!["insert 1 work disk.adf","protect 1 false","eject 0"]);
        assert!(out.contains("drive 0:  [write protection = on]"));
        assert!(out.contains("drive 1: work disk.adf [write protection = off]"));
    }

    #[test]
    fn errors_are_printed() {
        let mut ctl = Recorder::new();
        ctl.fail_insert = true;
        let (res,out) = session(&mut ctl,"insert 0 missing.adf\neject 9\nformat\nhelp\n");
        assert!(res.is_ok());
        assert!(out.contains("No such file or directory"));
        assert!(out.contains(super::super::EJECT_USAGE));
        assert!(out.contains("unknown command `format`"));
        assert!(out.contains("write un-protect floppy image"));
    }

    #[test]
    fn lost_processor_ends_loop() {
        let mut ctl = Recorder::new();
        ctl.disconnected = true;
        let (res,_) = session(&mut ctl,"status\nstatus\n");
        assert!(res.is_err());
    }

    #[test]
    fn prompt_when_interactive() {
        let mut ctl = Recorder::new();
        let mut out = Vec::new();
        run(&mut ctl,"".as_bytes(),&mut out,true).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(),"phloppy> \n");
    }
}
