//! bxc - BX front end
//!
//! Lexes, parses and resolves BX programs, and reports the first error.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;

use bxc::feedback::ErrorReport;
use bxc::frontend::decode::{decode_program, encode_program};
use bxc::frontend::parser::parse_source;
use bxc::frontend::semantic::resolve_program;
use bxc::Error;

/// BX front end
#[derive(Parser, Debug)]
#[command(name = "bxc")]
#[command(version)]
#[command(about = "BX front end - lexing, parsing, and scope and overload resolution")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a source file for errors
    Check {
        /// Input source file
        input: PathBuf,

        /// Report the diagnostic as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the AST of a source file as JSON
    Ast {
        /// Input source file
        input: PathBuf,

        /// Resolve names and types first
        #[arg(long)]
        resolved: bool,
    },
    /// Decode a JSON-encoded AST and resolve it
    Decode {
        /// Input JSON file
        input: PathBuf,

        /// Report the diagnostic as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    match &cli.command {
        Commands::Check { input, json } => {
            let source = read(input)?;
            match bxc::compile(&source) {
                Ok(program) => {
                    info!("{}: {} procedures resolved", input.display(), program.procedures.len());
                    println!("ok");
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => Ok(report(&err, input, Some(&source), *json)),
            }
        }
        Commands::Ast { input, resolved } => {
            let source = read(input)?;
            let result = if *resolved {
                bxc::compile(&source)
            } else {
                parse_source(&source)
            };
            match result {
                Ok(program) => {
                    println!("{}", encode_program(&program).context("encoding AST")?);
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => Ok(report(&err, input, Some(&source), false)),
            }
        }
        Commands::Decode { input, json } => {
            let text = read(input)?;
            let result = decode_program(&text).and_then(|mut program| {
                resolve_program(&mut program)?;
                Ok(program)
            });
            match result {
                Ok(program) => {
                    info!("{}: decoded and resolved", input.display());
                    println!("ok ({} procedures)", program.procedures.len());
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => Ok(report(&err, input, None, *json)),
            }
        }
    }
}

fn read(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

/// Print a diagnostic and give the failing exit status
fn report(err: &Error, input: &Path, source: Option<&str>, json: bool) -> ExitCode {
    let report = ErrorReport::from_error(err, &input.display().to_string(), source);
    if json {
        println!("{}", report.to_json());
    } else {
        eprintln!("{}", report.render());
    }
    ExitCode::FAILURE
}
