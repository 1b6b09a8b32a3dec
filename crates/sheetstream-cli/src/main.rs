//! sheetstream CLI - inspect, export and copy large XLSX files without loading them

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sheetstream::prelude::*;
use sheetstream::CellAddress;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "sheetstream")]
#[command(author, version, about = "Streaming XLSX inspection and conversion tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct Window {
    /// Sheet name or alias (default: first sheet)
    #[arg(short, long)]
    sheet: Option<String>,

    /// Treat the first row of the window as a header
    #[arg(long)]
    header: bool,

    /// First row to read (1-based)
    #[arg(long, default_value = "1")]
    start_row: u32,

    /// Last row to read (1-based, inclusive)
    #[arg(long)]
    end_row: Option<u32>,

    /// First column to read (1-based)
    #[arg(long, default_value = "1")]
    start_column: u32,

    /// Last column to read (1-based, inclusive)
    #[arg(long)]
    end_column: Option<u32>,

    /// Give covered merge cells the value of their anchor
    #[arg(long)]
    fill_merged: bool,

    /// Skip rows with no values
    #[arg(long)]
    skip_empty: bool,
}

impl Window {
    fn query(&self) -> QueryOptions {
        QueryOptions {
            has_header: self.header,
            start_row: self.start_row,
            start_column: self.start_column,
            end_row: self.end_row,
            end_column: self.end_column,
        }
    }

    fn read_options(&self) -> ReadOptions {
        ReadOptions {
            fill_merged_cells: self.fill_merged,
            ignore_empty_rows: self.skip_empty,
            ..ReadOptions::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Export a sheet as CSV to stdout or a file
    #[command(alias = "csv")]
    ToCsv {
        /// Input workbook
        input: PathBuf,

        /// Output CSV file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Field delimiter (default: comma)
        #[arg(short, long, default_value = ",")]
        delimiter: char,

        #[command(flatten)]
        window: Window,
    },

    /// Show sheets, extents and merge regions of a workbook
    Info {
        /// Input workbook
        input: PathBuf,
    },

    /// List all sheets in a workbook
    Sheets {
        /// Input workbook
        input: PathBuf,
    },

    /// Stream a sheet into a new workbook, or into an existing one with --into
    Copy {
        /// Input workbook
        input: PathBuf,

        /// Output workbook
        output: PathBuf,

        /// Name of the sheet in the output (default: the source sheet's name)
        #[arg(long)]
        name: Option<String>,

        /// Add the sheet to `output` instead of creating a new workbook
        #[arg(long)]
        into: bool,

        /// With --into, replace a sheet of the same name
        #[arg(long)]
        overwrite: bool,

        /// Size columns to their content
        #[arg(long)]
        auto_width: bool,

        /// Compress entries as they are written instead of buffering them
        #[arg(long, conflicts_with = "auto_width")]
        streamed: bool,

        #[command(flatten)]
        window: Window,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::ToCsv {
            input,
            output,
            delimiter,
            window,
        } => to_csv(&input, output.as_deref(), delimiter, &window),
        Commands::Info { input } => show_info(&input),
        Commands::Sheets { input } => list_sheets(&input),
        Commands::Copy {
            input,
            output,
            name,
            into,
            overwrite,
            auto_width,
            streamed,
            window,
        } => {
            let options = WriteOptions {
                entry_mode: if streamed {
                    EntryMode::Streamed
                } else {
                    EntryMode::Patchable
                },
                auto_column_width: auto_width,
                ..WriteOptions::default()
            };
            copy_sheet(&input, &output, name, into, overwrite, options, &window)
        }
    }
}

fn open(input: &Path, options: ReadOptions) -> Result<XlsxDocument<std::io::BufReader<File>>> {
    XlsxDocument::open_path(input, options)
        .with_context(|| format!("Failed to open '{}'", input.display()))
}

fn to_csv(input: &Path, output: Option<&Path>, delimiter: char, window: &Window) -> Result<()> {
    let mut doc = open(input, window.read_options())?;
    let mut out: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create '{}'", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let mut rows = doc
        .rows(window.sheet.as_deref(), &window.query())
        .context("Failed to read sheet")?;
    let mut count = 0u64;
    let mut wrote_header = !window.header;
    while let Some(row) = rows.next() {
        let row = row.with_context(|| format!("Failed after {} rows", count))?;
        if !wrote_header {
            let keys: Vec<String> = rows.keys().iter().map(|k| csv_field(k, delimiter)).collect();
            writeln!(out, "{}", keys.join(&delimiter.to_string()))?;
            wrote_header = true;
        }
        let fields: Vec<String> = row
            .values()
            .iter()
            .map(|v| csv_field(&cell_text(v), delimiter))
            .collect();
        writeln!(out, "{}", fields.join(&delimiter.to_string()))?;
        count += 1;
    }
    out.flush()?;

    if let Some(path) = output {
        eprintln!("Wrote {} rows to '{}'", count, path.display());
    }
    Ok(())
}

/// Text of a value for CSV output
fn cell_text(value: &CellValue) -> String {
    match value {
        CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
        CellValue::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
        other => other.to_string(),
    }
}

/// Quote if necessary
fn csv_field(text: &str, delimiter: char) -> String {
    if text.contains(delimiter) || text.contains('"') || text.contains('\n') || text.contains('\r')
    {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

fn show_info(input: &Path) -> Result<()> {
    let mut doc = open(input, ReadOptions::default())?;

    println!("File: {}", input.display());
    println!("Sheets: {}", doc.sheets().len());
    println!("Date system: {}", if doc.date1904() { "1904" } else { "1900" });
    println!(
        "Shared strings: {}{}",
        doc.shared_strings().len(),
        if doc.shared_strings().is_disk_backed() {
            " (disk-backed)"
        } else {
            ""
        }
    );

    let names: Vec<String> = doc.sheet_names().iter().map(|s| s.to_string()).collect();
    for (i, name) in names.iter().enumerate() {
        let dimension = doc
            .dimension(Some(name))
            .with_context(|| format!("Failed to scan sheet '{}'", name))?;
        let merges = doc.merges(Some(name))?;

        println!();
        println!("  Sheet {}: \"{}\"", i, name);
        match dimension.range() {
            Some(range) => println!(
                "    Extent: {} ({} rows x {} columns{})",
                range,
                range.end.row + 1,
                range.end.col + 1,
                if dimension.declared { "" } else { ", scanned" }
            ),
            None => println!("    Extent: empty"),
        }
        println!("    Merged regions: {}", merges.regions().len());
    }

    Ok(())
}

fn list_sheets(input: &Path) -> Result<()> {
    let doc = open(input, ReadOptions::default())?;
    for (i, sheet) in doc.sheets().iter().enumerate() {
        println!("{}\t{}\t{}", i, sheet.name, sheet.state.as_str());
    }
    Ok(())
}

fn copy_sheet(
    input: &Path,
    output: &Path,
    name: Option<String>,
    into: bool,
    overwrite: bool,
    mut options: WriteOptions,
    window: &Window,
) -> Result<()> {
    if overwrite && !into {
        bail!("--overwrite only applies together with --into");
    }
    let mut doc = open(input, window.read_options())?;
    let source = match window.sheet.as_deref() {
        Some(sheet) => doc.sheet(sheet)?.name.clone(),
        None => match doc.sheets().first() {
            Some(sheet) => sheet.name.clone(),
            None => bail!("'{}' has no worksheets", input.display()),
        },
    };
    let target = name.unwrap_or_else(|| source.clone());

    // Without a header the rows are copied verbatim, so no header row is written
    let query = window.query();
    let mut rows = doc.rows(Some(&source), &query)?;
    let first = rows.next().transpose()?;
    let columns: Vec<ColumnInfo> = rows.keys().iter().map(ColumnInfo::new).collect();
    if columns.is_empty() {
        bail!("sheet '{}' has no columns in the selected window", source);
    }
    options.write_header = window.header;
    options.auto_filter = window.header;
    let rows = first
        .into_iter()
        .map(Ok::<Row, XlsxError>)
        .chain(rows)
        .map(|row| row.map(|r| r.into_values()));

    let written = if into {
        sheetstream::try_insert_sheet_file(output, &target, &columns, rows, overwrite, &options)
            .with_context(|| format!("Failed to update '{}'", output.display()))?
    } else {
        let mut writer = WorkbookWriter::create_file(output, options)
            .with_context(|| format!("Failed to create '{}'", output.display()))?;
        let written = writer.try_add_sheet(&target, &columns, rows)?;
        writer.finish()?;
        written
    };

    eprintln!(
        "Copied {} rows from '{}' to sheet '{}' of '{}' (starting at {})",
        written,
        source,
        target,
        output.display(),
        CellAddress::new(query.start_row - 1, query.start_column - 1)
    );
    Ok(())
}
