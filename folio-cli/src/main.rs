// Command-line interface for folio
//
// This binary imports word-processing packages, LaTeX and Markdown into the normalized
// section/block/asset tree, inspects the result, and exports trees back to .docx.
// All of the work happens in the folio-babel library; this crate only wires files, flags
// and configuration to it and decides what goes to stdout.
//
// Usage:
//  folio <input> [--to <target>] [--from <format>] [-o <file>]  - Convert (default command)
//  folio convert <input> [--to <target>] [--from <format>] [-o <file>]
//  folio inspect <input> [<view>]                                 - Look at one stage of an import
//  folio optimize <image> [--analyze] [-o <file>]                 - Run the image optimizer alone
//  folio --list-formats                                           - List available formats
//
// Configuration:
//
// The embedded defaults are layered with ./folio.toml (if present) and then with the file
// given to --config. Single keys can be overridden with --extra-<dotted.key> <value>, e.g.
//  folio convert paper.docx --extra-convert.max_blocks 500 --extra-parse.heading.heuristics false
//
// Logging goes to stderr through tracing. RUST_LOG wins; otherwise -v switches from warn to debug.

use clap::{Arg, ArgAction, ArgMatches, Command, ValueHint};
use folio_babel::convert::Statistics;
use folio_babel::ir::Warning;
use folio_babel::media::{mime_from_extension, ImageOptimizer};
use folio_babel::pipeline::{import_file_with, parse_file, ImportOptions, ImportOutcome};
use folio_babel::tree::{Document, Section};
use folio_babel::{ConvertHooks, FormatRegistry};
use folio_config::{FolioConfig, Loader, LOCAL_CONFIG_FILE};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const CONVERT_TARGETS: &[&str] = &["tree-json", "ir-json", "docx"];
const INSPECT_VIEWS: &[&str] = &["outline", "ir-json", "tree-json", "stats", "warnings"];
const SUBCOMMANDS: &[&str] = &["convert", "inspect", "optimize", "help"];

/// Parse extra-* arguments from command line args
/// Returns (cleaned_args_without_extras, extra_params_map)
///
/// Supports both:
/// - `--extra-<key> <value>` (explicit value)
/// - `--extra-<key>` (boolean flag, defaults to "true")
/// - `--extras-<key>` (alias for `--extra-<key>`)
fn parse_extra_args(args: &[String]) -> (Vec<String>, HashMap<String, String>) {
    let mut cleaned_args = Vec::new();
    let mut extra_params = HashMap::new();
    let mut i = 0;

    while i < args.len() {
        let arg = &args[i];

        let key_opt = if let Some(key) = arg.strip_prefix("--extra-") {
            Some(key)
        } else {
            arg.strip_prefix("--extras-")
        };

        if let Some(key) = key_opt {
            let has_value = args.get(i + 1).is_some_and(|next| !next.starts_with('-'));

            if has_value {
                extra_params.insert(key.to_string(), args[i + 1].clone());
                i += 2;
            } else {
                extra_params.insert(key.to_string(), "true".to_string());
                i += 1;
            }
            continue;
        }

        cleaned_args.push(arg.clone());
        i += 1;
    }

    (cleaned_args, extra_params)
}

fn build_cli() -> Command {
    Command::new("folio")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Import .docx, LaTeX and Markdown into a normalized document tree")
        .long_about(
            "folio converts documents into a tree of sections and blocks whose content is\n\
            LaTeX-flavoured markup, with images extracted as hashed assets.\n\n\
            Commands:\n  \
            - convert:  Import a document and write the tree, the flat elements or a .docx\n  \
            - inspect:  Look at the outline, statistics or warnings of an import\n  \
            - optimize: Recompress a single image with the import settings\n\n\
            Extra Parameters:\n  \
            Use --extra-<dotted.key> [value] to override one configuration key.\n  \
            Boolean keys can omit the value (defaults to 'true').\n\n\
            Examples:\n  \
            folio paper.docx                           # Tree as JSON on stdout\n  \
            folio inspect thesis.tex                   # Section outline\n  \
            folio notes.md --to docx -o notes.docx     # Markdown to .docx\n  \
            folio optimize photo.jpg --analyze         # What the optimizer would do",
        )
        .arg_required_else_help(true)
        .subcommand_required(false)
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
                .about("Import a document and write the result (default command)")
                .long_about(
                    "Import a document and write one of its representations.\n\n\
                    Targets:\n  \
                    - tree-json: normalized tree with warnings and statistics (default)\n  \
                    - ir-json:   flat intermediate elements, before tree building\n  \
                    - docx:      word-processing package (requires -o)\n\n\
                    The source format is auto-detected from the file extension.\n\
                    Output goes to stdout by default, or use -o to specify a file.",
                )
                .arg(
                    Arg::new("input")
                        .help("Input file path")
                        .required(true)
                        .index(1)
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("from")
                        .long("from")
                        .help("Source format (auto-detected from file extension if not specified)")
                        .value_hint(ValueHint::Other),
                )
                .arg(
                    Arg::new("to")
                        .long("to")
                        .help("Output representation")
                        .default_value("tree-json")
                        .value_parser(clap::builder::PossibleValuesParser::new(CONVERT_TARGETS))
                        .value_hint(ValueHint::Other),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .help("Output file path (defaults to stdout)")
                        .value_hint(ValueHint::FilePath),
                ),
        )
        .subcommand(
            Command::new("inspect")
                .about("Inspect one stage of an import")
                .long_about(
                    "View a document at different processing stages.\n\n\
                    Views:\n  \
                    - outline:   section titles as an indented tree (default)\n  \
                    - ir-json:   intermediate elements as JSON\n  \
                    - tree-json: normalized tree as JSON\n  \
                    - stats:     conversion statistics\n  \
                    - warnings:  one line per warning",
                )
                .arg(
                    Arg::new("path")
                        .help("Path to the document")
                        .required(true)
                        .index(1)
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("view")
                        .help("What to show. Defaults to 'outline'")
                        .required(false)
                        .value_parser(clap::builder::PossibleValuesParser::new(INSPECT_VIEWS))
                        .index(2)
                        .value_hint(ValueHint::Other),
                )
                .arg(
                    Arg::new("from")
                        .long("from")
                        .help("Source format (auto-detected from file extension if not specified)")
                        .value_hint(ValueHint::Other),
                ),
        )
        .subcommand(
            Command::new("optimize")
                .about("Recompress and downscale one image")
                .long_about(
                    "Run the image optimizer on a PNG or JPEG with the configured settings.\n\n\
                    A JSON summary is printed to stdout. With -o the resulting bytes are\n\
                    written to that file; with --analyze nothing is encoded and the\n\
                    estimate is printed instead.",
                )
                .arg(
                    Arg::new("image")
                        .help("Path to the image")
                        .required(true)
                        .index(1)
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("analyze")
                        .long("analyze")
                        .help("Only report what would be done")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .help("Where to write the optimized image")
                        .value_hint(ValueHint::FilePath),
                ),
        )
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let (cleaned_args, extra_params) = parse_extra_args(&args);

    // A bare file path means `convert`.
    let cli = build_cli();
    let matches = match cli.clone().try_get_matches_from(&cleaned_args) {
        Ok(m) => m,
        Err(e) => {
            if cleaned_args.len() > 1
                && !cleaned_args[1].starts_with('-')
                && !SUBCOMMANDS.contains(&cleaned_args[1].as_str())
            {
                let mut new_args = vec![cleaned_args[0].clone(), "convert".to_string()];
                new_args.extend_from_slice(&cleaned_args[1..]);
                match cli.try_get_matches_from(&new_args) {
                    Ok(m) => m,
                    Err(e2) => e2.exit(),
                }
            } else {
                e.exit();
            }
        }
    };

    init_logging(matches.get_flag("verbose"));

    if matches.get_flag("list-formats") {
        handle_list_formats_command();
        return;
    }

    if let Err(message) = run(&matches, &extra_params) {
        eprintln!("Error: {message}");
        std::process::exit(1);
    }
}

fn run(matches: &ArgMatches, extra_params: &HashMap<String, String>) -> Result<(), String> {
    let config = load_cli_config(
        matches.get_one::<String>("config").map(|s| s.as_str()),
        extra_params,
    )?;

    match matches.subcommand() {
        Some(("convert", sub_matches)) => {
            let input = required(sub_matches, "input")?;
            let to = sub_matches
                .get_one::<String>("to")
                .map(|s| s.as_str())
                .unwrap_or("tree-json");
            let from = sub_matches.get_one::<String>("from").map(|s| s.as_str());
            let output = sub_matches.get_one::<String>("output").map(|s| s.as_str());
            handle_convert_command(input, from, to, output, &config)
        }
        Some(("inspect", sub_matches)) => {
            let path = required(sub_matches, "path")?;
            let view = sub_matches
                .get_one::<String>("view")
                .map(|s| s.as_str())
                .unwrap_or("outline");
            let from = sub_matches.get_one::<String>("from").map(|s| s.as_str());
            handle_inspect_command(path, from, view, &config)
        }
        Some(("optimize", sub_matches)) => {
            let image = required(sub_matches, "image")?;
            let output = sub_matches.get_one::<String>("output").map(|s| s.as_str());
            handle_optimize_command(image, sub_matches.get_flag("analyze"), output, &config)
        }
        _ => Err("Unknown subcommand. Use --help for usage information.".to_string()),
    }
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str, String> {
    matches
        .get_one::<String>(name)
        .map(|s| s.as_str())
        .ok_or_else(|| format!("missing argument <{name}>"))
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// The tree as persistence consumes it.
#[derive(Serialize)]
struct TreeOutput<'a> {
    #[serde(flatten)]
    document: &'a Document,
    warnings: &'a [Warning],
    statistics: &'a Statistics,
}

impl<'a> From<&'a ImportOutcome> for TreeOutput<'a> {
    fn from(outcome: &'a ImportOutcome) -> Self {
        TreeOutput {
            document: &outcome.result.document,
            warnings: &outcome.result.warnings,
            statistics: &outcome.result.statistics,
        }
    }
}

fn import_options(config: &FolioConfig, from: Option<&str>) -> ImportOptions {
    let mut options = config.import_options();
    options.format = from.map(str::to_string);
    options
}

fn import(path: &Path, options: &ImportOptions) -> Result<ImportOutcome, String> {
    import_file_with(
        &FormatRegistry::default(),
        path,
        options,
        &mut ConvertHooks::none(),
    )
    .map_err(|e| e.to_string())
}

/// Handle the convert command
fn handle_convert_command(
    input: &str,
    from: Option<&str>,
    to: &str,
    output: Option<&str>,
    config: &FolioConfig,
) -> Result<(), String> {
    let registry = FormatRegistry::default();
    if let Some(from) = from {
        registry.get(from).map_err(|e| e.to_string())?;
    }
    let path = Path::new(input);
    let options = import_options(config, from);

    let data = match to {
        "ir-json" => {
            let doc = parse_file(&registry, path, &options).map_err(|e| e.to_string())?;
            to_json(&doc)?.into_bytes()
        }
        "docx" => {
            if output.is_none() {
                return Err("docx is a binary format and requires an output file. Use -o <path>."
                    .to_string());
            }
            let outcome = import(path, &options)?;
            registry
                .export(&outcome.result.document, "docx")
                .map_err(|e| format!("Serialization error: {e}"))?
        }
        _ => {
            let outcome = import(path, &options)?;
            to_json(&TreeOutput::from(&outcome))?.into_bytes()
        }
    };

    write_output(output, &data)
}

/// Handle the inspect command
fn handle_inspect_command(
    path: &str,
    from: Option<&str>,
    view: &str,
    config: &FolioConfig,
) -> Result<(), String> {
    let path = Path::new(path);
    let options = import_options(config, from);

    if view == "ir-json" {
        let doc =
            parse_file(&FormatRegistry::default(), path, &options).map_err(|e| e.to_string())?;
        println!("{}", to_json(&doc)?);
        return Ok(());
    }

    let outcome = import(path, &options)?;
    let result = &outcome.result;
    match view {
        "tree-json" => println!("{}", to_json(&TreeOutput::from(&outcome))?),
        "stats" => println!("{}", to_json(&result.statistics)?),
        "warnings" => {
            for warning in &result.warnings {
                println!("{}", warning_line(warning));
            }
        }
        _ => {
            println!("{}", result.document.title);
            for line in outline_lines(&result.document.sections, 1) {
                println!("{line}");
            }
        }
    }
    Ok(())
}

/// Handle the optimize command
fn handle_optimize_command(
    image: &str,
    analyze: bool,
    output: Option<&str>,
    config: &FolioConfig,
) -> Result<(), String> {
    let bytes = fs::read(image).map_err(|e| format!("Error reading file '{image}': {e}"))?;
    let mime = mime_from_extension(image)
        .ok_or_else(|| format!("Could not detect the image type of '{image}'"))?;
    let optimizer = ImageOptimizer::new((&config.optimizer).into());

    if analyze {
        println!("{}", to_json(&optimizer.analyze(&bytes, mime))?);
        return Ok(());
    }

    let optimized = optimizer.optimize(&bytes, mime);
    if let Some(path) = output {
        fs::write(path, &optimized.bytes)
            .map_err(|e| format!("Error writing file '{path}': {e}"))?;
    }
    println!("{}", to_json(&optimized)?);
    Ok(())
}

/// Handle the list-formats command
fn handle_list_formats_command() {
    println!("Available formats:\n");
    let registry = FormatRegistry::default();
    for format in registry.formats() {
        let mut modes = Vec::new();
        if format.supports_parsing() {
            modes.push("import");
        }
        if format.supports_export() {
            modes.push("export");
        }
        println!(
            "  {:<10} {} [{}] (.{})",
            format.name(),
            format.description(),
            modes.join(", "),
            format.file_extensions().join(", .")
        );
    }

    println!("\nConvert targets:");
    for target in CONVERT_TARGETS {
        println!("  {target}");
    }
}

fn load_cli_config(
    explicit_path: Option<&str>,
    overrides: &HashMap<String, String>,
) -> Result<FolioConfig, String> {
    let mut loader = Loader::new().with_optional_file(LOCAL_CONFIG_FILE);
    if let Some(path) = explicit_path {
        loader = loader.with_file(path);
    }

    let mut keys: Vec<&String> = overrides.keys().collect();
    keys.sort();
    for key in keys {
        loader = loader
            .set_override(key, overrides[key].clone())
            .map_err(|err| format!("Invalid override '{key}': {err}"))?;
    }

    let config = loader
        .build()
        .map_err(|err| format!("Failed to load configuration: {err}"))?;
    debug!(
        explicit = explicit_path.unwrap_or("-"),
        overrides = overrides.len(),
        "configuration loaded"
    );
    Ok(config)
}

fn outline_lines(sections: &[Section], depth: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for section in sections {
        let blocks = section.blocks.len();
        lines.push(format!(
            "{}{} ({} block{})",
            "  ".repeat(depth),
            section.title,
            blocks,
            if blocks == 1 { "" } else { "s" }
        ));
        lines.extend(outline_lines(&section.children, depth + 1));
    }
    lines
}

fn warning_line(warning: &Warning) -> String {
    match warning.element_index {
        Some(index) => format!("{} [{index}]: {}", warning.kind.as_str(), warning.message),
        None => format!("{}: {}", warning.kind.as_str(), warning.message),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("Serialization error: {e}"))
}

fn write_output(output: Option<&str>, data: &[u8]) -> Result<(), String> {
    match output {
        Some(path) => {
            fs::write(path, data).map_err(|e| format!("Error writing file '{path}': {e}"))
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(data)
                .and_then(|_| stdout.write_all(b"\n"))
                .map_err(|e| format!("Error writing to stdout: {e}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_babel::ir::WarningKind;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_parse_extra_args_empty() {
        let args = args(&["folio", "inspect", "paper.md"]);
        let (cleaned, extra) = parse_extra_args(&args);

        assert_eq!(cleaned, args);
        assert!(extra.is_empty());
    }

    #[test]
    fn test_parse_extra_args_single_param() {
        let (cleaned, extra) = parse_extra_args(&args(&[
            "folio",
            "convert",
            "paper.md",
            "--extra-convert.max_blocks",
            "20",
        ]));

        assert_eq!(cleaned, args(&["folio", "convert", "paper.md"]));
        assert_eq!(extra.len(), 1);
        assert_eq!(extra.get("convert.max_blocks"), Some(&"20".to_string()));
    }

    #[test]
    fn test_parse_extra_args_mixed_with_regular_args() {
        let (cleaned, extra) = parse_extra_args(&args(&[
            "folio",
            "convert",
            "paper.docx",
            "--to",
            "ir-json",
            "--extra-parse.extract_images",
            "false",
            "--from",
            "docx",
        ]));

        assert_eq!(
            cleaned,
            args(&["folio", "convert", "paper.docx", "--to", "ir-json", "--from", "docx"])
        );
        assert_eq!(extra.get("parse.extract_images"), Some(&"false".to_string()));
    }

    #[test]
    fn test_parse_extra_args_boolean_flag_and_alias() {
        let (cleaned, extra) = parse_extra_args(&args(&[
            "folio",
            "inspect",
            "paper.docx",
            "--extra-convert.include_headers_footers",
            "--extras-optimizer.max_dimension",
            "800",
        ]));

        assert_eq!(cleaned, args(&["folio", "inspect", "paper.docx"]));
        assert_eq!(
            extra.get("convert.include_headers_footers"),
            Some(&"true".to_string())
        );
        assert_eq!(extra.get("optimizer.max_dimension"), Some(&"800".to_string()));
    }

    #[test]
    fn overrides_reach_the_import_options() {
        let mut overrides = HashMap::new();
        overrides.insert("convert.max_blocks".to_string(), "20".to_string());
        overrides.insert("parse.heading.heuristics".to_string(), "false".to_string());

        let config = load_cli_config(None, &overrides).unwrap();
        let options = import_options(&config, Some("latex"));
        assert_eq!(options.convert.max_blocks, 20);
        assert!(!options.parse.heading.heuristics);
        assert_eq!(options.format.as_deref(), Some("latex"));
    }

    #[test]
    fn bad_override_values_are_reported() {
        let mut overrides = HashMap::new();
        overrides.insert("convert.max_blocks".to_string(), "many".to_string());
        let err = load_cli_config(None, &overrides).unwrap_err();
        assert!(err.starts_with("Failed to load configuration"));
    }

    #[test]
    fn outline_indents_children() {
        let section = |id, title: &str, children| Section {
            id,
            parent_id: None,
            title: title.to_string(),
            level: 1,
            sort_order: 0,
            blocks: vec![],
            children,
        };
        let tree = vec![section(1, "Intro", vec![section(2, "Scope", vec![])])];
        assert_eq!(
            outline_lines(&tree, 1),
            vec!["  Intro (0 blocks)", "    Scope (0 blocks)"]
        );
    }

    #[test]
    fn warning_lines_name_the_kind() {
        let warning = Warning::new(WarningKind::ContentTruncated, "block limit reached").at(7);
        assert_eq!(
            warning_line(&warning),
            "content_truncated [7]: block limit reached"
        );
    }

    #[test]
    fn cli_definition_is_consistent() {
        build_cli().debug_assert();
    }
}
