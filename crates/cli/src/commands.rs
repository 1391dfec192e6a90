//! Clap command tree definition.

use clap::{Arg, ArgAction, Command};

/// Build the complete CLI command tree.
pub fn build_cli() -> Command {
    Command::new("savestate")
        .about("Inspect, verify and clean savestate save files")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .help("Pipeline config file (savestate.toml) to take the magic marker from")
                .global(true),
        )
        .arg(
            Arg::new("magic")
                .long("magic")
                .help("Four-byte magic marker (default: SAVE); overrides --config")
                .global(true),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("JSON output mode")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(build_inspect())
        .subcommand(build_verify())
        .subcommand(build_clean())
}

fn build_inspect() -> Command {
    Command::new("inspect")
        .about("Print the header and decoded fields of a save file")
        .arg(Arg::new("file").required(true).help("Save file"))
}

fn build_verify() -> Command {
    Command::new("verify")
        .about("Check header, checksum and payload of save files")
        .arg(
            Arg::new("files")
                .required(true)
                .num_args(1..)
                .help("Save files"),
        )
}

fn build_clean() -> Command {
    Command::new("clean")
        .about("Delete temp files left by interrupted writes")
        .arg(Arg::new("dir").required(true).help("Storage directory"))
        .arg(
            Arg::new("suffix")
                .long("suffix")
                .default_value(".tmp")
                .help("Temp file suffix"),
        )
        .arg(
            Arg::new("extension")
                .long("extension")
                .help("Slot file extension (default: from --config, else sav)"),
        )
}
