// Entry point and high-level CLI flow.
//
// With `--input` and no `--interactive` the binary runs once: load, filter,
// print every report and optionally export. Otherwise it drops into the menu:
// - Option [1] loads a remark file, printing diagnostics.
// - Option [2] selects the date range.
// - Option [3] prints the reports for the current range.
// - Option [4] exports the workbook.
use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use remark_report::loader::LoadReport;
use remark_report::output;
use remark_report::reports::ReportSet;
use remark_report::types::GroupField;
use remark_report::util::{format_int, format_number};
use remark_report::{ReportConfig, Session};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Productivity reports for call-center remark files
#[derive(Parser, Debug)]
#[command(name = "remark_report", version)]
struct Cli {
    /// Remark file to load (.xlsx, .xls, .ods or .csv)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// JSON file overriding keyword lists, column names and formula toggles
    #[arg(short, long, env = "REMARK_REPORT_CONFIG")]
    config: Option<PathBuf>,

    /// First day of the report range (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last day of the report range (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Write the styled workbook to this path
    #[arg(long)]
    export: Option<PathBuf>,

    /// Write headline figures as JSON to this path
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// Extra collection table grouped by these columns
    #[arg(long, value_enum, value_delimiter = ',')]
    group_by: Vec<GroupField>,

    /// Use human call drops for the call drop ratio
    #[arg(long)]
    manual_correction: bool,

    /// Rows shown per table in the terminal
    #[arg(long)]
    max_rows: Option<usize>,

    /// Run the menu even when --input is given
    #[arg(long)]
    interactive: bool,

    /// Logging level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn setup_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .init();
}

/// One trimmed line, or `None` once the input is closed.
fn read_input(input: &mut impl BufRead) -> Option<String> {
    let mut buf = String::new();
    match input.read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

/// Print `label` and read one line from stdin.
fn prompt(label: &str) -> Option<String> {
    print!("{}", label);
    let _ = io::stdout().flush();
    read_input(&mut io::stdin().lock())
}

/// Ask the user whether to go back to the menu after showing reports.
///
/// Returns `true` if the user chose `Y`, `false` if they chose `N` or
/// closed the input.
fn prompt_back_to_menu() -> bool {
    loop {
        let Some(answer) = prompt("Back to Report Selection (Y/N): ") else {
            return false;
        };
        match answer.to_uppercase().as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

fn print_load_report(report: &LoadReport) {
    println!(
        "Processing remark file... ({} rows read, {} kept)",
        format_int(report.total_rows),
        format_int(report.kept_rows)
    );
    if report.weekday_dropped > 0 {
        println!(
            "Note: {} rows dropped for excluded weekdays.",
            format_int(report.weekday_dropped)
        );
    }
    if report.null_dates > 0 {
        println!(
            "Note: {} rows have no usable date and fall outside every range.",
            format_int(report.null_dates)
        );
    }
    if report.coerced_values > 0 {
        println!(
            "Info: {} unparseable values were treated as zero/blank.",
            format_int(report.coerced_values)
        );
    }
    println!();
}

fn print_reports(set: &ReportSet, max_rows: Option<usize>) {
    for table in set.tables() {
        output::preview_table(table, max_rows);
    }
    let s = &set.summary;
    println!(
        "Summary: {} rows, {} accounts, {} connected, {} PTP accounts, PTP amount {}, talk time {}\n",
        format_int(s.total_rows),
        format_int(s.accounts),
        format_int(s.connected_accounts),
        format_int(s.ptp_accounts),
        format_number(s.total_ptp_amount, 2),
        s.total_talk_time
    );
}

fn export(set: &ReportSet, path: &Path) -> Result<()> {
    output::export_workbook(path, &set.tables())
        .with_context(|| format!("exporting {}", path.display()))?;
    println!("(Workbook exported to {})\n", path.display());
    Ok(())
}

/// Narrow the session range with any explicit `--from` / `--to`.
fn apply_range(
    session: &mut Session,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<()> {
    let current = session.range();
    let start = from.or(current.map(|r| r.start));
    let end = to.or(current.map(|r| r.end));
    if let (Some(start), Some(end)) = (start, end) {
        session.set_range(start, end)?;
    }
    Ok(())
}

fn run_once(session: &mut Session, cli: &Cli, input: &Path) -> Result<()> {
    let report = session
        .load(input)
        .with_context(|| format!("loading {}", input.display()))?;
    print_load_report(&report);
    apply_range(session, cli.from, cli.to)?;

    let Some(set) = session.reports() else {
        return Ok(());
    };
    print_reports(&set, cli.max_rows);
    if let Some(path) = &cli.export {
        export(&set, path)?;
    }
    if let Some(path) = &cli.summary_json {
        output::write_json(path, &set.summary)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

fn handle_load(session: &mut Session, default: Option<&Path>) {
    let hint = default
        .map(|p| format!(" [{}]", p.display()))
        .unwrap_or_default();
    let answer = prompt(&format!("Remark file path{}: ", hint)).unwrap_or_default();
    let path = match (answer.is_empty(), default) {
        (true, Some(p)) => p.to_path_buf(),
        (true, None) => {
            println!("No file given.\n");
            return;
        }
        (false, _) => PathBuf::from(answer),
    };
    match session.load(&path) {
        Ok(report) => print_load_report(&report),
        Err(e) => eprintln!("Failed to load file: {}\n", e),
    }
}

fn read_date(label: &str, default: NaiveDate) -> Option<NaiveDate> {
    let answer = prompt(&format!("{} [{}]: ", label, default))?;
    if answer.is_empty() {
        return Some(default);
    }
    match answer.parse::<NaiveDate>() {
        Ok(d) => Some(d),
        Err(_) => {
            println!("Invalid date. Please use YYYY-MM-DD.\n");
            None
        }
    }
}

fn handle_range(session: &mut Session) {
    let Some((min, max)) = session.date_bounds() else {
        println!("Error: No dated rows loaded. Please load a remark file first (option 1).\n");
        return;
    };
    println!("Data covers {} to {}.", min, max);
    let current = session.range();
    let Some(start) = read_date("Start date", current.map_or(min, |r| r.start)) else {
        return;
    };
    let Some(end) = read_date("End date", current.map_or(max, |r| r.end)) else {
        return;
    };
    match session.set_range(start, end) {
        Ok(()) => println!("Range set to {} through {}.\n", start, end),
        Err(e) => println!("Error: {}\n", e),
    }
}

fn run_interactive(session: &mut Session, cli: &Cli) -> Result<()> {
    loop {
        println!("Select an option:");
        println!("[1] Load remark file");
        println!("[2] Select date range");
        println!("[3] Show reports");
        println!("[4] Export workbook");
        println!("[5] Exit\n");
        let Some(choice) = prompt("Enter choice: ") else {
            println!("\nInput closed. Exiting the program.");
            return Ok(());
        };
        match choice.as_str() {
            "1" => handle_load(session, cli.input.as_deref()),
            "2" => handle_range(session),
            "3" => {
                let Some(set) = session.reports() else {
                    println!(
                        "Error: No data loaded. Please load a remark file first (option 1).\n"
                    );
                    continue;
                };
                println!();
                print_reports(&set, cli.max_rows);
                if !prompt_back_to_menu() {
                    println!("Exiting the program.");
                    return Ok(());
                }
            }
            "4" => {
                let Some(set) = session.reports() else {
                    println!(
                        "Error: No data loaded. Please load a remark file first (option 1).\n"
                    );
                    continue;
                };
                let default = cli
                    .export
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("remark_report.xlsx"));
                let answer =
                    prompt(&format!("Export path [{}]: ", default.display())).unwrap_or_default();
                let path = if answer.is_empty() { default } else { PathBuf::from(answer) };
                if let Err(e) = export(&set, &path) {
                    eprintln!("Export error: {:#}\n", e);
                }
            }
            "5" => {
                println!("Exiting the program.");
                return Ok(());
            }
            _ => println!("Invalid choice. Please enter 1 to 5.\n"),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);
    tracing::debug!(?cli, "Starting remark_report v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => ReportConfig::load_from(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ReportConfig::default(),
    };
    if cli.manual_correction {
        config.manual_correction = true;
    }

    let mut session = Session::new(config, cli.group_by.clone());
    match (&cli.input, cli.interactive) {
        (Some(input), false) => run_once(&mut session, &cli, input),
        _ => run_interactive(&mut session, &cli),
    }
}
