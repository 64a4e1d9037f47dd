use std::path::PathBuf;

use anyhow::Context as _;
use anyhow::Result;

use clap::ArgAction;
use clap::Args as Arguments;
use clap::Parser;
use clap::Subcommand;

use framesym::register::Register;
use framesym::Addr;


/// Parse a number from a string, in hexadecimal if `0x` prefixed and
/// in decimal otherwise.
fn parse_number(s: &str) -> Result<u64> {
    if let Some(hex) = s.strip_prefix("0x") {
        u64::from_str_radix(hex, 16)
    } else {
        s.parse::<u64>()
    }
    .with_context(|| format!("failed to parse number: {s}"))
}

/// Parse a PID from a string.
fn parse_pid(s: &str) -> Result<u32> {
    let pid = parse_number(s)?;
    u32::try_from(pid).with_context(|| format!("PID out of range: {s}"))
}

/// Parse an address from a string.
fn parse_addr(s: &str) -> Result<Addr> {
    // Addresses are always represented in hex, with or without 0x
    // prefix.
    Addr::from_str_radix(s.trim_start_matches("0x"), 16)
        .with_context(|| format!("failed to parse address: {s}"))
}

/// Parse a symbol tag from a string.
fn parse_tag(s: &str) -> Result<u32> {
    let tag = parse_number(s)?;
    u32::try_from(tag).with_context(|| format!("tag out of range: {s}"))
}

/// Parse a `NAME=VALUE` register assignment.
fn parse_reg(s: &str) -> Result<(Register, u64)> {
    let (name, value) = s
        .split_once('=')
        .with_context(|| format!("register assignment `{s}` is not of the form NAME=VALUE"))?;
    let reg = name
        .trim()
        .parse::<Register>()
        .map_err(anyhow::Error::msg)?;
    let value = parse_number(value.trim())?;
    Ok((reg, value))
}


/// A command line interface for framesym.
#[derive(Debug, Parser)]
#[clap(version = env!("VERSION"))]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
    /// Increase verbosity (can be supplied multiple times).
    #[arg(short = 'v', long = "verbose", global = true, action = ArgAction::Count)]
    pub verbosity: u8,
}


#[derive(Debug, Subcommand)]
pub enum Command {
    /// Dump all symbols of a module.
    Module(Module),
    /// Dump all symbols of a debug information file loaded at a given
    /// base address.
    Pdb(Pdb),
    /// Dump the variables and parameters of a function activation in a
    /// live process.
    Locals(Locals),
    /// Print the names of one or more symbol tags.
    Tag(Tag),
}


#[derive(Debug, Arguments)]
pub struct Module {
    /// The path to the module.
    pub path: PathBuf,
}

#[derive(Debug, Arguments)]
pub struct Pdb {
    /// The path to the debug information file.
    pub path: PathBuf,
    /// The address to load the file at.
    #[clap(short, long)]
    #[arg(value_parser = parse_addr)]
    pub base: Addr,
}

#[derive(Debug, Arguments)]
pub struct Locals {
    /// The PID of the process to inspect. `0` refers to fsymcli itself.
    #[clap(short, long)]
    #[arg(value_parser = parse_pid)]
    pub pid: u32,
    /// The address of an instruction inside the function of interest.
    #[clap(short, long)]
    #[arg(value_parser = parse_addr)]
    pub addr: Addr,
    /// Interpret register values as a 32 bit context of a process
    /// running under emulation.
    #[clap(long)]
    pub emulated32: bool,
    /// A register value of the thread, as NAME=VALUE (e.g., rbp=0x7ffc1000).
    ///
    /// Registers not provided are assumed to be zero.
    #[clap(short, long = "reg")]
    #[arg(value_parser = parse_reg)]
    pub regs: Vec<(Register, u64)>,
    /// An additional debug information file to load.
    #[clap(long)]
    pub debug_file: Option<PathBuf>,
    /// The address to load `--debug-file` at.
    #[clap(long, requires = "debug_file", default_value = "0")]
    #[arg(value_parser = parse_addr)]
    pub debug_base: Addr,
}

#[derive(Debug, Arguments)]
pub struct Tag {
    /// The raw tag values.
    #[arg(value_parser = parse_tag, required = true)]
    pub tags: Vec<u32>,
}


#[cfg(test)]
mod tests {
    use super::*;


    /// Check that numbers and register assignments are parsed as
    /// expected.
    #[test]
    fn value_parsing() {
        assert_eq!(parse_number("42").unwrap(), 42);
        assert_eq!(parse_number("0x42").unwrap(), 0x42);
        assert!(parse_number("zz").is_err());
        assert_eq!(parse_addr("7ffc1000").unwrap(), 0x7ffc1000);
        assert_eq!(parse_addr("0x7ffc1000").unwrap(), 0x7ffc1000);
        assert!(parse_pid("0x100000000").is_err());

        assert_eq!(parse_reg("rbp=0x1000").unwrap(), (Register::Rbp, 0x1000));
        assert_eq!(parse_reg("EBP = 16").unwrap(), (Register::Ebp, 16));
        assert!(parse_reg("rbp").is_err());
        assert!(parse_reg("xyz=1").is_err());
    }

    /// Check that a full `locals` invocation is understood.
    #[test]
    fn locals_parsing() {
        let args = Args::try_parse_from([
            "fsymcli", "-vv", "locals", "--pid", "1234", "--addr", "0x401000", "--reg",
            "rsp=0x7ffc0ff0", "--reg", "rbp=0x7ffc1000",
        ])
        .unwrap();
        assert_eq!(args.verbosity, 2);

        let locals = match args.command {
            Command::Locals(locals) => locals,
            command => panic!("unexpected command: {command:?}"),
        };
        assert_eq!(locals.pid, 1234);
        assert_eq!(locals.addr, 0x401000);
        assert!(!locals.emulated32);
        assert_eq!(
            locals.regs,
            vec![(Register::Rsp, 0x7ffc0ff0), (Register::Rbp, 0x7ffc1000)]
        );
        assert_eq!(locals.debug_file, None);
    }
}
