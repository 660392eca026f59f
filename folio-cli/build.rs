use clap::{Arg, ArgAction, Command, ValueHint};
use clap_complete::{generate_to, shells::*};
use std::env;
use std::io::Error;

// Mirror of CONVERT_TARGETS and INSPECT_VIEWS in src/main.rs
// We need to duplicate these here since build scripts can't access src/ modules
const CONVERT_TARGETS: &[&str] = &["tree-json", "ir-json", "docx"];
const INSPECT_VIEWS: &[&str] = &["outline", "ir-json", "tree-json", "stats", "warnings"];

fn input_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .help(help)
        .required(true)
        .index(1)
        .value_hint(ValueHint::FilePath)
}

fn main() -> Result<(), Error> {
    let outdir = match env::var_os("OUT_DIR") {
        None => return Ok(()),
        Some(outdir) => outdir,
    };

    let mut cmd = Command::new("folio")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Import .docx, LaTeX and Markdown into a normalized document tree")
        .arg_required_else_help(true)
        .arg(
            Arg::new("list-formats")
                .long("list-formats")
                .help("List available formats")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("Path to a folio.toml configuration file")
                .value_hint(ValueHint::FilePath)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Log debug output to stderr")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("convert")
                .arg(input_arg("input", "Input file path"))
                .arg(Arg::new("from").long("from").value_hint(ValueHint::Other))
                .arg(
                    Arg::new("to")
                        .long("to")
                        .value_parser(clap::builder::PossibleValuesParser::new(CONVERT_TARGETS)),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .value_hint(ValueHint::FilePath),
                ),
        )
        .subcommand(
            Command::new("inspect")
                .arg(input_arg("path", "Path to the document"))
                .arg(
                    Arg::new("view")
                        .index(2)
                        .value_parser(clap::builder::PossibleValuesParser::new(INSPECT_VIEWS)),
                )
                .arg(Arg::new("from").long("from").value_hint(ValueHint::Other)),
        )
        .subcommand(
            Command::new("optimize")
                .arg(input_arg("image", "Path to the image"))
                .arg(
                    Arg::new("analyze")
                        .long("analyze")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .value_hint(ValueHint::FilePath),
                ),
        );

    // Generate completions for bash
    generate_to(Bash, &mut cmd, "folio", &outdir)?;

    // Generate completions for zsh
    generate_to(Zsh, &mut cmd, "folio", &outdir)?;

    // Generate completions for fish
    generate_to(Fish, &mut cmd, "folio", &outdir)?;

    println!("cargo:warning=Shell completions generated in {outdir:?}");

    Ok(())
}
