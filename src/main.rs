mod cli;

use std::{
    io::{self, Write},
    path::PathBuf,
    process,
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::LevelFilter;

use epub_footnote_links::{
    converter::{convert, validate_input},
    types::ConversionReport,
};

fn main() {
    let cli = cli::Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.as_str()))
        .init();

    println!("EPUB footnote link converter");
    println!("{}", "=".repeat(40));

    match run(&cli) {
        Ok(report) => {
            println!();
            println!("{}", "=".repeat(40));
            println!(
                "Conversion succeeded! The new file was saved as: {}",
                report.output_path.display()
            );
            if !report.warnings.is_empty() {
                println!("{} warning(s):", report.warnings.len());
                for warning in &report.warnings {
                    println!("  ! {}", warning);
                }
            }
            println!("Open the new file in an EPUB reader to check the result");
            println!("{}", "=".repeat(40));
        }
        Err(err) => {
            eprintln!();
            eprintln!("Conversion failed: {:#}", err);
            process::exit(1);
        }
    }
}

fn run(cli: &cli::Cli) -> Result<ConversionReport> {
    let input = match &cli.input {
        Some(input) => input.clone(),
        None => prompt_input()?,
    };

    let input = validate_input(&input)?;
    let config = cli.config();

    println!();
    println!("Converting EPUB file...");
    convert(&input, &config).with_context(|| format!("Unable to convert \"{}\"", input.display()))
}

/// Asks for the input path on stdin
fn prompt_input() -> Result<PathBuf> {
    print!("Please enter the EPUB file path: ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("Unable to read the input path")?;

    let input = line.trim();
    if input.is_empty() {
        bail!("No input file given");
    }

    Ok(PathBuf::from(input))
}
