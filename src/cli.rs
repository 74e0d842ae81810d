use clap::{value_parser, crate_version, Arg, ArgAction, Command, ValueHint};

const ANNOUNCE_LONG_HELP: &str = "Before filling a drive, tell the device whether the image is ADF or RAW.
Only images of exactly 901120 (ADF) or 2026880 (RAW) bytes are announced.
With RAW images, tracks written back by the device are 12668 bytes each.";

fn dimg_arg(req: bool) -> Arg {
    Arg::new("dimg").short('d').long("dimg").help("path to disk image itself")
        .value_name("PATH")
        .value_hint(ValueHint::FilePath)
        .required(req)
}

pub fn build_cli() -> Command {
    let long_help = "phloppy is always invoked with exactly one subcommand.
The `connect` subcommand opens an interactive session with the drive emulator.
Set RUST_LOG environment variable to control logging level.
  levels: trace,debug,info,warn,error

Examples:
---------
connect to the device:  `phloppy connect -a 192.168.4.1 -p 4500`
create blank ADF:       `phloppy mkimg -t adf -n Work -d work.adf`
create blank RAW:       `phloppy mkimg -t raw -d work.raw`";

    let mut main_cmd = Command::new("phloppy")
        .about("Controls a networked Amiga floppy drive emulator.")
        .after_long_help(long_help)
        .version(crate_version!());

    main_cmd = main_cmd.subcommand(
        Command::new("connect")
            .arg(
                Arg::new("address").short('a').long("address").help("drive IP address")
                    .value_name("ADDRESS")
                    .value_hint(ValueHint::Hostname)
                    .default_value("192.168.4.1"),
            )
            .arg(
                Arg::new("port").short('p').long("port").help("drive TCP port")
                    .value_name("PORT")
                    .value_parser(value_parser!(u16))
                    .default_value("4500"),
            )
            .arg(
                Arg::new("tick").long("tick").help("keepalive interval in milliseconds")
                    .value_name("MS")
                    .value_parser(value_parser!(u64).range(10..60000))
                    .default_value("500"),
            )
            .arg(
                Arg::new("announce-type").long("announce-type").help("send image type on insert")
                    .long_help(ANNOUNCE_LONG_HELP)
                    .action(ArgAction::SetTrue),
            )
            .about("connect to the emulator and read commands from stdin"),
    );
    main_cmd = main_cmd.subcommand(
        Command::new("mkimg")
            .arg(
                Arg::new("type").short('t').long("type").help("type of disk image to create")
                    .value_name("TYPE")
                    .value_parser(["adf", "raw"])
                    .required(true),
            )
            .arg(
                Arg::new("name").short('n').long("name").help("volume name, defaults to the file name")
                    .value_name("NAME")
                    .required(false),
            )
            .arg(dimg_arg(true))
            .arg(
                Arg::new("force").long("force").help("overwrite an existing file")
                    .action(ArgAction::SetTrue),
            )
            .about("write a blank disk image to the given path"),
    );
    main_cmd
}
