mod toolchain;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use miette::{Context, IntoDiagnostic};

use tileasm_frontend::{CompileOptions, ConstValue, compile_kernel, default_host_spec};
use tileasm_host::{infer_host_spec, parse_host_spec, prepend_host_spec};

use crate::toolchain::{MemoryModel, ToolchainConfig};

/// tileasm: kernel source to tile assembly compiler
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Log compiler progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile one kernel function to a tile assembly module
    Compile(CompileArgs),
    /// List the kernel functions defined in a source file
    List {
        /// Kernel source file
        input: PathBuf,
    },
    /// Print the host spec of a module as JSON (sidecar, else inferred)
    HostSpec {
        /// Tile assembly module
        input: PathBuf,
    },
}

#[derive(clap::Args)]
struct CompileArgs {
    /// Kernel source file
    input: PathBuf,

    /// Kernel function to compile (required when the file defines several)
    #[arg(short, long)]
    kernel: Option<String>,

    /// Compile-time constant NAME=VALUE (repeatable)
    #[arg(long = "const", value_name = "NAME=VALUE", value_parser = parse_const)]
    consts: Vec<(String, ConstValue)>,

    /// Do not prepend the host spec sidecar
    #[arg(long)]
    no_host_spec: bool,

    /// Output path (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Device spec module attribute
    #[arg(long)]
    device_spec: Option<String>,

    /// Memory model of the downstream toolchain: MEMORY_BASE or REGISTER_BASE
    #[arg(long, default_value = "MEMORY_BASE", value_parser = parse_memory_model)]
    memory_model: MemoryModel,

    /// Disable automatic pipeline synchronization in the downstream toolchain
    #[arg(long)]
    no_insert_sync: bool,

    /// Print the downstream toolchain command line to stderr
    #[arg(long)]
    print_toolchain_cmd: bool,
}

fn parse_const(s: &str) -> Result<(String, ConstValue), String> {
    let (name, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid constant '{s}', expected NAME=VALUE"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("invalid constant '{s}': empty name"));
    }
    let value = match raw.parse::<ConstValue>() {
        Ok(value) => value,
        Err(never) => match never {},
    };
    Ok((name.to_string(), value))
}

fn parse_memory_model(s: &str) -> Result<MemoryModel, String> {
    s.parse().map_err(|e: tileasm_ir::CompileError| e.to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn read_source(path: &Path) -> miette::Result<String> {
    std::fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", path.display()))
}

fn run(command: Command) -> miette::Result<()> {
    match command {
        Command::Compile(args) => compile(args),
        Command::List { input } => {
            let source = read_source(&input)?;
            let names = tileasm_parser::list_kernel_functions(&source)
                .map_err(|e| miette::miette!("{e}"))
                .wrap_err("parse failed")?;
            for name in names {
                println!("{name}");
            }
            Ok(())
        }
        Command::HostSpec { input } => {
            let text = read_source(&input)?;
            let spec = match parse_host_spec(&text).map_err(|e| miette::miette!("{e}"))? {
                Some(spec) => spec,
                None => {
                    log::info!("{} has no host spec sidecar; inferring", input.display());
                    infer_host_spec(&text).map_err(|e| miette::miette!("{e}"))?
                }
            };
            let json = serde_json::to_string_pretty(&spec).into_diagnostic()?;
            println!("{json}");
            Ok(())
        }
    }
}

fn compile(args: CompileArgs) -> miette::Result<()> {
    let source = read_source(&args.input)?;

    let mut options = CompileOptions::default();
    if let Some(kernel) = args.kernel {
        options = options.with_kernel(kernel);
    }
    if let Some(device_spec) = args.device_spec {
        options = options.with_device_spec(device_spec);
    }
    for (name, value) in args.consts {
        options = options.with_const(name, value);
    }

    let kernel = compile_kernel(&source, &options)
        .map_err(|e| miette::miette!("{e}"))
        .wrap_err_with(|| format!("failed to compile {}", args.input.display()))?;

    let text = if args.no_host_spec {
        kernel.text.clone()
    } else {
        let spec = default_host_spec(&kernel).map_err(|e| miette::miette!("{e}"))?;
        prepend_host_spec(&kernel.text, &spec).map_err(|e| miette::miette!("{e}"))?
    };

    match &args.output {
        Some(path) => std::fs::write(path, &text)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to write {}", path.display()))?,
        None => print!("{text}"),
    }

    if args.print_toolchain_cmd {
        let config = ToolchainConfig {
            memory_model: args.memory_model,
            enable_insert_sync: !args.no_insert_sync,
            ..ToolchainConfig::default()
        };
        let module = args
            .output
            .unwrap_or_else(|| PathBuf::from(format!("{}.pto", kernel.name)));
        let generated = module.with_extension("cpp");
        eprintln!("toolchain: {}", config.command(&module, &generated).join(" "));
        for line in config.source_preamble() {
            eprintln!("toolchain preamble: {line}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn const_flag_values() {
        assert_eq!(parse_const("N=4").unwrap(), ("N".into(), ConstValue::Int(4)));
        assert_eq!(
            parse_const("SCALE=0.5").unwrap(),
            ("SCALE".into(), ConstValue::Float(0.5))
        );
        assert_eq!(
            parse_const("MODE=row=major").unwrap(),
            ("MODE".into(), ConstValue::Str("row=major".into()))
        );
        assert!(parse_const("N").is_err());
        assert!(parse_const("=1").is_err());
    }

    #[test]
    fn cli_arguments() {
        let cli = Cli::try_parse_from([
            "tileasm",
            "compile",
            "k.py",
            "--const",
            "K_TILES=4",
            "--memory-model",
            "REGISTER_BASE",
            "--no-insert-sync",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Command::Compile(args) = cli.command else {
            panic!("expected compile");
        };
        assert_eq!(args.consts, [("K_TILES".to_string(), ConstValue::Int(4))]);
        assert_eq!(args.memory_model, MemoryModel::RegisterBase);
        assert!(args.no_insert_sync);

        assert!(
            Cli::try_parse_from(["tileasm", "compile", "k.py", "--memory-model", "FLAT"]).is_err()
        );
    }
}
