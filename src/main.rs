//! restruct CLI - inspect and transform flat CSV files
//!
//! ```bash
//! restruct parse input.csv              # CSV to JSON records (inferred schema)
//! restruct infer input.csv              # print the inferred schema
//! restruct transform input.csv -r rules.json   # apply mapping rules
//! ```

use clap::{Parser, Subcommand};
use restruct::{Importer, MappingRule};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "restruct")]
#[command(about = "Rebuild structured records out of flat CSV rows", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a CSV file and output JSON records
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the schema inferred from the header row
    Infer {
        /// Input CSV file
        input: PathBuf,

        /// Name for the inferred schema
        #[arg(short, long, default_value = "csv")]
        name: String,
    },

    /// Apply mapping rules to each row and output transformed JSON records
    Transform {
        /// Input CSV file
        input: PathBuf,

        /// Mapping rules JSON file
        #[arg(short, long)]
        rules: PathBuf,

        /// Copy source columns into the output records
        #[arg(long)]
        carry: bool,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Parse {
            input,
            delimiter,
            output,
        } => cmd_parse(&input, delimiter, output.as_deref()),

        Commands::Infer { input, name } => cmd_infer(&input, &name),

        Commands::Transform {
            input,
            rules,
            carry,
            output,
        } => cmd_transform(&input, &rules, carry, output.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_parse(
    input: &Path,
    delimiter: Option<char>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("parsing {}", input.display());
    let bytes = fs::read(input)?;

    let importer = match delimiter {
        Some(d) => Importer::new().with_separator(d),
        None => Importer::new(),
    };

    let mut records = Vec::new();
    let info = match delimiter {
        Some(_) => {
            let schema = importer.infer_schema(&bytes[..])?;
            importer.import_flat(&bytes[..], &schema, |r| records.push(r.to_json()))?;
            None
        }
        None => {
            let (schema, info) = importer.infer_schema_auto(&bytes)?;
            importer
                .with_separator(info.delimiter)
                .import_flat(&bytes[..], &schema, |r| records.push(r.to_json()))?;
            Some(info)
        }
    };

    if let Some(info) = info {
        eprintln!("  encoding:  {}", info.encoding);
        eprintln!("  delimiter: '{}'", format_delimiter(info.delimiter));
        eprintln!("  columns:   {}", info.headers.join(", "));
    }
    eprintln!("parsed {} records", records.len());

    let json = serde_json::to_string_pretty(&records)?;
    write_output(&json, output)
}

fn cmd_infer(input: &Path, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = fs::read(input)?;
    let (schema, info) = Importer::new()
        .with_type_name(name)
        .infer_schema_auto(&bytes)?;

    println!("schema {} ({} fields)", schema.name(), schema.len());
    for field in schema.fields() {
        println!("  {}: {:?}", field.name, field.kind);
    }
    eprintln!("delimiter '{}'", format_delimiter(info.delimiter));
    Ok(())
}

fn cmd_transform(
    input: &Path,
    rules_path: &Path,
    carry: bool,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("transforming {}", input.display());

    let rules: Vec<MappingRule> = serde_json::from_str(&fs::read_to_string(rules_path)?)?;
    eprintln!("  {} mapping rules", rules.len());

    let bytes = fs::read(input)?;
    let (_, info) = Importer::new().infer_schema_auto(&bytes)?;

    let importer = Importer::new()
        .with_separator(info.delimiter)
        .with_transformer(rules, carry);
    let schema = importer.infer_schema(&bytes[..])?;

    let mut records = Vec::new();
    importer.import_flat(&bytes[..], &schema, |r| records.push(r.to_json()))?;
    eprintln!("transformed {} records", records.len());

    let json = serde_json::to_string_pretty(&records)?;
    write_output(&json, output)
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("output written to {}", p.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}
