use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use contact_sheets::config::{
    DEFAULT_BATCH_DELAY_MS, DEFAULT_CREDENTIALS_PATH, DEFAULT_EXPORT_DIR, DEFAULT_SHEET_NAME,
    DEFAULT_TOKEN_PATH, ExportConfig,
};
use contact_sheets::model::ColumnLayout;
use contact_sheets::sync::{self, SetupOutcome};
use contact_sheets::upload::{DEFAULT_BATCH_SIZE, UploadOptions};
use contact_sheets::{ExportError, Result};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = init_logging(cli.verbose).and_then(|()| run(cli)) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|error| ExportError::Logging(error.to_string()))?;
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| ExportError::Logging(error.to_string()))
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Setup(args) => execute_setup(args),
        Command::Run(args) => execute_run(args),
        Command::ExportCsv(args) => execute_export_csv(args),
    }
}

fn execute_setup(args: SetupArgs) -> Result<()> {
    let config = args.settings.into_config();
    match sync::setup(&config, args.auth_code.as_deref())? {
        SetupOutcome::Ready => {
            println!("Setup complete. Authorization found at {}.", config.token.display());
        }
        SetupOutcome::TokenSaved(path) => {
            println!("Authorization saved to {}.", path.display());
        }
        SetupOutcome::ConsentRequired(url) => {
            println!("Open this URL in a browser and grant spreadsheet access:\n\n  {url}\n");
            println!(
                "After approving, copy the `code` parameter from the localhost address \
                 and run:\n\n  contact-sheets setup --auth-code <CODE>"
            );
        }
    }
    Ok(())
}

fn execute_run(args: RunArgs) -> Result<()> {
    if !args.input.exists() {
        return Err(ExportError::MissingInput(args.input));
    }
    let config = args.settings.into_config();
    let layout = ColumnLayout::from(args.layout);
    let take_backup = !args.no_backup;

    let summary = match args.destination {
        Destination::Sheets => {
            sync::export_to_google_sheets(&args.input, layout, &config, take_backup)?
        }
        Destination::Xlsx => {
            let output = args.output.unwrap_or_else(|| config.export_dir.join("contacts.xlsx"));
            let summary =
                sync::export_to_xlsx(&args.input, &output, layout, &config, take_backup)?;
            println!("Workbook written to {}", output.display());
            summary
        }
    };
    println!("{summary}");
    Ok(())
}

fn execute_export_csv(args: ExportCsvArgs) -> Result<()> {
    if !args.input.exists() {
        return Err(ExportError::MissingInput(args.input));
    }
    let summary = sync::export_to_csv(&args.input, &args.output, ColumnLayout::from(args.layout))?;
    println!("{summary}");
    println!("CSV written to {}", args.output.display());
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Export an address book into a formatted spreadsheet."
)]
struct Cli {
    /// Log debug detail (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the export directory and authorize spreadsheet access.
    Setup(SetupArgs),
    /// Export contacts into the spreadsheet.
    Run(RunArgs),
    /// Export contacts to a CSV file for manual import.
    ExportCsv(ExportCsvArgs),
}

#[derive(Args)]
struct Settings {
    /// Target spreadsheet id.
    #[arg(long, env = "GOOGLE_SHEET_ID")]
    sheet_id: Option<String>,

    /// Tab within the spreadsheet.
    #[arg(long, env = "SHEET_NAME", default_value = DEFAULT_SHEET_NAME)]
    sheet_name: String,

    /// Directory for backups and default outputs.
    #[arg(long, env = "EXPORT_DIR", default_value = DEFAULT_EXPORT_DIR)]
    export_dir: PathBuf,

    /// OAuth client secrets downloaded from the cloud console.
    #[arg(long, env = "GOOGLE_CREDENTIALS", default_value = DEFAULT_CREDENTIALS_PATH)]
    credentials: PathBuf,

    /// Cached authorization.
    #[arg(long, env = "GOOGLE_TOKEN", default_value = DEFAULT_TOKEN_PATH)]
    token: PathBuf,

    /// Rows per write request.
    #[arg(long, env = "BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Pause between write requests, in milliseconds.
    #[arg(long, env = "BATCH_DELAY_MS", default_value_t = DEFAULT_BATCH_DELAY_MS)]
    batch_delay_ms: u64,
}

impl Settings {
    fn into_config(self) -> ExportConfig {
        ExportConfig {
            sheet_id: self.sheet_id,
            sheet_name: self.sheet_name,
            export_dir: self.export_dir,
            credentials: self.credentials,
            token: self.token,
            upload: UploadOptions::new(
                self.batch_size,
                Duration::from_millis(self.batch_delay_ms),
            ),
        }
    }
}

#[derive(Args)]
struct SetupArgs {
    /// Authorization code returned after granting access.
    #[arg(long)]
    auth_code: Option<String>,

    #[command(flatten)]
    settings: Settings,
}

#[derive(Args)]
struct RunArgs {
    /// Address-book export (.vcf or .json).
    #[arg(long)]
    input: PathBuf,

    /// Column set to export.
    #[arg(long, value_enum, default_value_t = LayoutArg::Standard)]
    layout: LayoutArg,

    /// Where the rows are written.
    #[arg(long, value_enum, default_value_t = Destination::Sheets)]
    destination: Destination,

    /// Workbook path for the xlsx destination.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Skip the JSON backup.
    #[arg(long)]
    no_backup: bool,

    #[command(flatten)]
    settings: Settings,
}

#[derive(Args)]
struct ExportCsvArgs {
    /// Address-book export (.vcf or .json).
    #[arg(long)]
    input: PathBuf,

    /// CSV file to write.
    #[arg(long)]
    output: PathBuf,

    /// Column set to export.
    #[arg(long, value_enum, default_value_t = LayoutArg::Standard)]
    layout: LayoutArg,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum LayoutArg {
    Standard,
    Full,
}

impl From<LayoutArg> for ColumnLayout {
    fn from(layout: LayoutArg) -> Self {
        match layout {
            LayoutArg::Standard => ColumnLayout::Standard,
            LayoutArg::Full => ColumnLayout::Full,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Destination {
    Sheets,
    Xlsx,
}
