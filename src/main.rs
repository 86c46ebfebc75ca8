use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use lygos::compiler::{
    self,
    config::{CompileOptions, OptLevel},
    error,
};
use std::{path::PathBuf, process::ExitCode};

#[derive(Parser)]
#[command(name = "lygos")]
#[command(about = "The lygos compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(name = "build", about = "build <file> | Compile a lygos program into an object file")]
    Build {
        file: PathBuf,
        /// Where to write the object file (default: `<stem>.o`)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Also write the Cranelift IR to `<stem>.clif`
        #[arg(long)]
        emit_ir: bool,
        #[command(flatten)]
        common: CommonArgs,
    },
    #[command(name = "run", about = "run <file> | JIT-compile a lygos program and run its main")]
    Run {
        file: PathBuf,
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    #[arg(long, value_enum, default_value_t = OptArg::None)]
    opt_level: OptArg,
    /// Directory searched for `#include` files; may be repeated
    #[arg(long = "include-dir")]
    include_dirs: Vec<PathBuf>,
    /// Log compiler phases at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum OptArg {
    None,
    Speed,
    SpeedAndSize,
}

impl From<OptArg> for OptLevel {
    fn from(arg: OptArg) -> Self {
        match arg {
            OptArg::None => OptLevel::None,
            OptArg::Speed => OptLevel::Speed,
            OptArg::SpeedAndSize => OptLevel::SpeedAndSize,
        }
    }
}

impl CommonArgs {
    fn options(&self, emit_ir: bool) -> CompileOptions {
        CompileOptions {
            opt_level: self.opt_level.into(),
            emit_ir,
            include_dirs: self.include_dirs.clone(),
            ..CompileOptions::default()
        }
    }
}

/// `RUST_LOG` is honoured only when set; `--verbose` forces `debug`.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = if verbose {
        EnvFilter::new("debug")
    } else if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        return;
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            file,
            output,
            emit_ir,
            common,
        } => {
            init_tracing(common.verbose);
            match compiler::build(&file, output, &common.options(emit_ir)) {
                Ok(path) => {
                    eprintln!("{} {}", "wrote".green().bold(), path.display());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error::report(&e);
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Run { file, common } => {
            init_tracing(common.verbose);
            match compiler::run(&file, &common.options(false)) {
                // the process status carries the low byte, as a C runtime would
                Ok(code) => ExitCode::from(code as u8),
                Err(e) => {
                    error::report(&e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}
