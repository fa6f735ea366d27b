//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use codejson_core::assembler::write_artifact;
use codejson_core::join::parse_key;
use codejson_core::pipeline::{ExportPhase, ExportSummary, Exporter, ProgressReporter};
use codejson_lists::{
    APPEND_FIELDS, IMPORT_FIELDS, MemoryCollection, PagedCollection, SharePointClient,
};
use codejson_metadata::GitHubClient;
use codejson_shared::{
    AppConfig, AppendRecord, ExportSettings, ImportRecord, SharePointConfig, init_config,
    load_config, resolve_token, validate_sharepoint,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

const IMPORT_LABEL: &str = "ImportData";
const APPEND_LABEL: &str = "AppendData";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// codejson: export the code.json software inventory.
#[derive(Parser)]
#[command(
    name = "codejson",
    version,
    about = "Build the code.json inventory manifest from the import and append lists.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Where the two collections are read from.
#[derive(Args, Debug, Default)]
pub(crate) struct SourceArgs {
    /// SharePoint site URL (overrides config).
    #[arg(long)]
    pub site: Option<String>,

    /// Import list GUID (overrides config).
    #[arg(long)]
    pub import_list: Option<String>,

    /// Append list GUID (overrides config).
    #[arg(long)]
    pub append_list: Option<String>,

    /// Read the import collection from a JSON export instead of SharePoint.
    #[arg(long, requires = "append_file")]
    pub import_file: Option<PathBuf>,

    /// Read the append collection from a JSON export instead of SharePoint.
    #[arg(long, requires = "import_file")]
    pub append_file: Option<PathBuf>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run an export and write code.json.
    Export {
        #[command(flatten)]
        source: SourceArgs,

        /// Output directory for code.json.
        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        /// Print the manifest to stdout instead of writing a file.
        #[arg(long)]
        stdout: bool,
    },

    /// Show append rows and whether their keys resolve.
    Validate {
        #[command(flatten)]
        source: SourceArgs,

        /// Exit with an error if any key is unresolved.
        #[arg(long)]
        strict: bool,
    },

    /// Edit the append list.
    Append {
        #[command(subcommand)]
        action: AppendAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Append list subcommands.
#[derive(Subcommand)]
pub(crate) enum AppendAction {
    /// Create an item from a JSON file.
    Create {
        /// JSON object with append columns (Title, codeVersion, ...).
        #[arg(long)]
        from: PathBuf,

        #[command(flatten)]
        target: TargetArgs,
    },
    /// Overwrite the editable columns of an item.
    Update {
        /// Item id.
        #[arg(long)]
        id: i64,

        #[arg(long)]
        from: PathBuf,

        #[command(flatten)]
        target: TargetArgs,
    },
    /// Move an item to the recycle bin.
    Delete {
        #[arg(long)]
        id: i64,

        #[command(flatten)]
        target: TargetArgs,
    },
}

/// Overrides for the append list being edited.
#[derive(Args, Debug, Default)]
pub(crate) struct TargetArgs {
    #[arg(long)]
    pub site: Option<String>,

    #[arg(long)]
    pub append_list: Option<String>,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "codejson=info",
        1 => "codejson=debug",
        _ => "codejson=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Export {
            source,
            out,
            stdout,
        } => cmd_export(&source, &out, stdout).await,
        Command::Validate { source, strict } => cmd_validate(&source, strict).await,
        Command::Append { action } => match action {
            AppendAction::Create { from, target } => cmd_append_create(&from, &target).await,
            AppendAction::Update { id, from, target } => {
                cmd_append_update(id, &from, &target).await
            }
            AppendAction::Delete { id, target } => cmd_append_delete(id, &target).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

async fn cmd_export(source: &SourceArgs, out: &Path, stdout: bool) -> Result<()> {
    let mut config = load_config()?;
    apply_source_overrides(&mut config.sharepoint, source);
    let settings = ExportSettings::from(&config);
    let github = GitHubClient::new(
        &config.github.api_url,
        resolve_token(&config.github.token_env),
    )?;

    info!(offline = source.import_file.is_some(), "exporting code.json");

    let (summary, path) = match (&source.import_file, &source.append_file) {
        (Some(import_path), Some(append_path)) => {
            let (imports, appends) = load_files(&settings, import_path, append_path)?;
            export_with(&settings, &imports, &appends, &github, out, stdout).await?
        }
        _ => {
            let sp = sharepoint_client(&config.sharepoint)?;
            let (imports, appends) = remote_lists(&sp, &config.sharepoint)?;
            export_with(&settings, &imports, &appends, &github, out, stdout).await?
        }
    };

    if stdout {
        return Ok(());
    }

    println!();
    println!("  code.json exported!");
    if let Some(path) = path {
        println!("  Path:      {}", path.display());
    }
    println!("  Run:       {}", summary.run_id);
    println!("  Releases:  {}", summary.releases);
    println!(
        "  Read:      {} import / {} append rows",
        summary.imports_read, summary.appends_read
    );
    println!(
        "  Lookups:   {} fetched, {} skipped, {} failed",
        summary.enrichment.fetched, summary.enrichment.skipped, summary.enrichment.failed
    );
    println!("  Unmatched: {}", summary.unmatched.len());
    for key in &summary.unmatched {
        println!("             {key}");
    }
    println!("  SHA-256:   {}", summary.sha256);
    println!("  Time:      {:.1}s", summary.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn export_with<I, A>(
    settings: &ExportSettings,
    imports: &I,
    appends: &A,
    github: &GitHubClient,
    out: &Path,
    stdout: bool,
) -> Result<(ExportSummary, Option<PathBuf>)>
where
    I: PagedCollection<Item = ImportRecord>,
    A: PagedCollection<Item = AppendRecord>,
{
    let reporter = CliProgress::new();
    let outcome = Exporter::new(settings, imports, appends, github)
        .run(&reporter)
        .await;
    reporter.finish();
    let outcome = outcome?;

    if stdout {
        println!("{}", outcome.artifact.body);
        return Ok((outcome.summary, None));
    }

    let path = write_artifact(out, &outcome.artifact)?;
    Ok((outcome.summary, Some(path)))
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

async fn cmd_validate(source: &SourceArgs, strict: bool) -> Result<()> {
    let mut config = load_config()?;
    apply_source_overrides(&mut config.sharepoint, source);
    let settings = ExportSettings::from(&config);
    let github = GitHubClient::new(&config.github.api_url, None)?;
    let reporter = CliProgress::new();

    let view = match (&source.import_file, &source.append_file) {
        (Some(import_path), Some(append_path)) => {
            let (imports, appends) = load_files(&settings, import_path, append_path)?;
            Exporter::new(&settings, &imports, &appends, &github)
                .preview(&reporter)
                .await
        }
        _ => {
            let sp = sharepoint_client(&config.sharepoint)?;
            let (imports, appends) = remote_lists(&sp, &config.sharepoint)?;
            Exporter::new(&settings, &imports, &appends, &github)
                .preview(&reporter)
                .await
        }
    };
    reporter.finish();
    let view = view?;

    println!();
    println!("  {:>6}  {:<10}  {:<3}  SYSTEM", "ID", "KEY", "OK");
    for row in &view {
        let id = row
            .record
            .id
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        let ok = if row.validated() { "yes" } else { "no" };
        println!(
            "  {id:>6}  {:<10}  {ok:<3}  {}",
            row.record.title,
            row.system_name.as_deref().unwrap_or("-")
        );
    }

    let unresolved = view.iter().filter(|r| !r.validated()).count();
    println!();
    println!("  {} rows, {unresolved} unresolved", view.len());
    println!();

    if strict && unresolved > 0 {
        return Err(eyre!("{unresolved} append rows have keys that match no import record"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Append list editing
// ---------------------------------------------------------------------------

async fn cmd_append_create(from: &Path, target: &TargetArgs) -> Result<()> {
    let record = read_append_record(from)?;
    let (sp, list_id) = append_target(target)?;

    let created = sp.create_item(&list_id, &record).await?;
    println!(
        "Created item {} (key '{}')",
        created.id.map_or_else(|| "?".to_string(), |id| id.to_string()),
        created.title
    );
    Ok(())
}

async fn cmd_append_update(id: i64, from: &Path, target: &TargetArgs) -> Result<()> {
    let record = read_append_record(from)?;
    let (sp, list_id) = append_target(target)?;

    sp.update_item(&list_id, id, &record).await?;
    println!("Updated item {id}");
    Ok(())
}

async fn cmd_append_delete(id: i64, target: &TargetArgs) -> Result<()> {
    let (sp, list_id) = append_target(target)?;

    sp.recycle_item(&list_id, id).await?;
    println!("Moved item {id} to the recycle bin");
    Ok(())
}

/// Parse an append row from a JSON file and check that its key is numeric.
fn read_append_record(path: &Path) -> Result<AppendRecord> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| eyre!("cannot read '{}': {e}", path.display()))?;
    let record: AppendRecord = serde_json::from_str(&content)
        .map_err(|e| eyre!("'{}' is not a valid append item: {e}", path.display()))?;

    if parse_key(&record.title).is_none() {
        return Err(eyre!(
            "Title '{}' is not a system id; it must start with the import key",
            record.title
        ));
    }
    Ok(record)
}

fn append_target(target: &TargetArgs) -> Result<(SharePointClient, String)> {
    let mut config = load_config()?;
    if let Some(site) = &target.site {
        config.sharepoint.site_url = Some(site.clone());
    }
    if let Some(list) = &target.append_list {
        config.sharepoint.append_list = Some(list.clone());
    }

    let list_id = config
        .sharepoint
        .append_list
        .clone()
        .filter(|l| !l.is_empty())
        .ok_or_else(|| eyre!("no append list configured; pass --append-list"))?;
    let sp = sharepoint_client(&config.sharepoint)?;
    Ok((sp, list_id))
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

fn apply_source_overrides(config: &mut SharePointConfig, source: &SourceArgs) {
    if let Some(site) = &source.site {
        config.site_url = Some(site.clone());
    }
    if let Some(list) = &source.import_list {
        config.import_list = Some(list.clone());
    }
    if let Some(list) = &source.append_list {
        config.append_list = Some(list.clone());
    }
}

fn load_files(
    settings: &ExportSettings,
    import_path: &Path,
    append_path: &Path,
) -> Result<(MemoryCollection<ImportRecord>, MemoryCollection<AppendRecord>)> {
    let imports = MemoryCollection::<ImportRecord>::from_json_file(
        IMPORT_LABEL,
        import_path,
        settings.import_page_size as usize,
    )?;
    let appends = MemoryCollection::<AppendRecord>::from_json_file(
        APPEND_LABEL,
        append_path,
        settings.append_page_size as usize,
    )?;
    Ok((imports, appends))
}

fn sharepoint_client(config: &SharePointConfig) -> Result<SharePointClient> {
    let site = config
        .site_url
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| eyre!("no SharePoint site configured; pass --site"))?;
    let token = resolve_token(&config.token_env);
    if token.is_none() {
        warn!(env = %config.token_env, "no SharePoint token set, sending anonymous requests");
    }
    Ok(SharePointClient::new(site, token)?)
}

fn remote_lists<'a>(
    sp: &'a SharePointClient,
    config: &SharePointConfig,
) -> Result<(
    codejson_lists::ListCollection<'a, ImportRecord>,
    codejson_lists::ListCollection<'a, AppendRecord>,
)> {
    validate_sharepoint(config)?;
    let import_list = config.import_list.clone().unwrap_or_default();
    let append_list = config.append_list.clone().unwrap_or_default();

    Ok((
        sp.list(IMPORT_LABEL, import_list, IMPORT_FIELDS, config.import_page_size),
        sp.list(APPEND_LABEL, append_list, APPEND_FIELDS, config.append_page_size),
    ))
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter: a spinner while loading, a bar while enriching.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { bar }
    }

    fn finish(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, phase: ExportPhase) {
        self.bar.set_message(phase.label().to_string());
    }

    fn collection_progress(&self, collection: &str, pages: usize, items: usize) {
        self.bar
            .set_message(format!("Loading {collection}: {items} items ({pages} pages)"));
    }

    fn set_max(&self, max: usize) {
        self.bar.set_length(max as u64);
        self.bar.set_position(0);
        self.bar.set_style(
            ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
    }

    fn advance(&self, current: usize, _max: usize, detail: &str) {
        self.bar.set_position(current as u64);
        self.bar.set_message(detail.to_string());
    }

    fn done(&self, _summary: &ExportSummary) {
        if let Some(len) = self.bar.length() {
            self.bar.set_position(len);
        }
        self.bar.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    for var in [&config.sharepoint.token_env, &config.github.token_env] {
        let state = if resolve_token(var).is_some() { "set" } else { "unset" };
        println!("# {var}: {state}");
    }
    Ok(())
}
