#![allow(clippy::let_and_return, clippy::let_unit_value)]

mod args;

use std::io;

use anyhow::anyhow;
use anyhow::bail;
use anyhow::Context;
use anyhow::Result;

use clap::Parser as _;

use framesym::backend::default_backend;
use framesym::backend::Backend as _;
use framesym::initialize_debug_binding;
use framesym::ContextMode;
use framesym::LocalSymbol;
use framesym::ModuleSymbol;
use framesym::RegisterSnapshot;
use framesym::Session;
use framesym::Storage;
use framesym::SymTag;

use tracing::subscriber::set_global_default as set_global_subscriber;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::time::SystemTime;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::FmtSubscriber;


fn print_module_syms(syms: &[ModuleSymbol]) {
    for sym in syms {
        let ModuleSymbol {
            name,
            size,
            addr,
            tag,
            value,
            file,
            line,
        } = sym;

        let tag = tag.name();
        let src_loc = if *line != 0 {
            format!(" {file}:{line}")
        } else {
            String::new()
        };
        let value = if *value != 0 {
            format!(" = {value:#x}")
        } else {
            String::new()
        };
        println!("{addr:#016x} {size:>#8x} {tag:<20} {name}{value}{src_loc}");
    }
}

fn print_local_syms(syms: &[LocalSymbol]) {
    for sym in syms {
        let LocalSymbol {
            name,
            size,
            addr,
            tag,
            storage,
            resolved,
            file,
            line,
            ..
        } = sym;

        let storage = match storage {
            Storage::Static => "static".to_string(),
            Storage::RegisterRelative { register, offset } => {
                format!("[{register}{offset:+}]")
            }
            Storage::Register { register } => format!("reg {register}"),
        };
        let tag = tag.name();
        let unresolved = if *resolved { "" } else { " <unresolved>" };
        let src_loc = if *line != 0 {
            format!(" {file}:{line}")
        } else {
            String::new()
        };
        println!("{addr:#016x} {size:>#6x} {tag:<15} {name} ({storage}){unresolved}{src_loc}");
    }
}


/// The handler for the 'module' command.
fn module(module: args::Module) -> Result<()> {
    let mut session = Session::new(default_backend()).context("failed to create session")?;
    let syms = session
        .module_symbols(&module.path)
        .with_context(|| format!("failed to retrieve symbols of `{}`", module.path.display()))?;
    let () = print_module_syms(&syms);
    Ok(())
}

/// The handler for the 'pdb' command.
fn pdb(pdb: args::Pdb) -> Result<()> {
    let mut session = Session::new(default_backend()).context("failed to create session")?;
    let syms = session
        .module_symbols_at(&pdb.path, pdb.base)
        .with_context(|| {
            format!(
                "failed to retrieve symbols of `{}` at {:#x}",
                pdb.path.display(),
                pdb.base
            )
        })?;
    let () = print_module_syms(&syms);
    Ok(())
}

/// The handler for the 'locals' command.
fn locals(locals: args::Locals) -> Result<()> {
    let args::Locals {
        pid,
        addr,
        emulated32,
        regs,
        debug_file,
        debug_base,
    } = locals;

    let mode = if emulated32 {
        ContextMode::Emulated32
    } else {
        ContextMode::Native64
    };
    let mut snapshot = RegisterSnapshot::zeroed(mode);
    for (reg, value) in regs {
        if !snapshot.set(reg, value) {
            bail!("register `{reg}` is not part of a {mode} context");
        }
    }

    let backend = default_backend();
    let process = backend
        .open_process(pid)
        .map_err(|code| anyhow!("failed to open process {pid}: diagnostic code {code}"))?;

    let result = initialize_debug_binding(backend, process, debug_file.as_deref(), debug_base)
        .with_context(|| format!("failed to initialize debug information for process {pid}"))
        .and_then(|()| {
            let mut session = Session::with_process(backend, process);
            session
                .local_symbols(addr, &snapshot)
                .with_context(|| format!("failed to retrieve local symbols at {addr:#x}"))
        });
    let () = backend.close_process(process);

    let () = print_local_syms(&result?);
    Ok(())
}

/// The handler for the 'tag' command.
fn tag(tag: args::Tag) -> Result<()> {
    for value in tag.tags {
        println!("{value}: {}", SymTag(value));
    }
    Ok(())
}


fn main() -> Result<()> {
    let args = args::Args::parse();
    let level = match args.verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::FULL)
        .with_timer(SystemTime)
        .with_writer(io::stderr)
        .finish();

    let () =
        set_global_subscriber(subscriber).with_context(|| "failed to set tracing subscriber")?;

    match args.command {
        args::Command::Module(module) => self::module(module),
        args::Command::Pdb(pdb) => self::pdb(pdb),
        args::Command::Locals(locals) => self::locals(locals),
        args::Command::Tag(tag) => self::tag(tag),
    }
}
