use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use tabled::{Table, Tabled, settings::Style};
use tracing::info;
use tracing_subscriber::EnvFilter;

use bqwizard::{refresh_recursive, BqClient, DependentsFinder, RefreshOptions, RefreshOutcome, RefreshReport, Warehouse};
use bqwizard::config::{self, Settings};
use bqwizard::error::{BqWizardError, BigQueryError};
use bqwizard::lineage::DEFAULT_MAX_DEPTH;
use bqwizard::reference::{DatasetReference, ReferenceContext, TableReference};

#[derive(Parser)]
#[command(name = "bqwizard")]
#[command(about = "Manage BigQuery datasets, tables and views")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// GCP project ID (falls back to the configured project)
    #[arg(short, long, env = "GOOGLE_CLOUD_PROJECT", global = true)]
    project: Option<String>,

    /// Default dataset for 1-part references (falls back to the configured dataset)
    #[arg(short, long, global = true)]
    dataset: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild a view and every view it reads from, dependencies first
    RefreshRecursive {
        /// Table or view reference (project.dataset.table, dataset.table or table)
        reference: String,

        /// Show the refresh plan without running any statement
        #[arg(long)]
        dry_run: bool,

        /// How many levels of dependencies to follow
        #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
        max_depth: usize,

        /// Output format: table, yaml, json
        #[arg(short, long, default_value = "table")]
        output: OutputFormat,
    },

    /// List views that read directly from a table or view
    Dependents {
        /// Table or view reference
        reference: String,

        /// Dataset to search (repeatable, defaults to the reference's dataset)
        #[arg(long = "in", value_name = "DATASET")]
        search: Vec<String>,
    },

    /// List tables and views in a dataset
    Tables {
        /// Dataset (dataset or project.dataset)
        dataset: String,
    },

    /// Manage saved settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Save the default GCP project
    SetProject {
        project: String,
    },
    /// Save the default dataset
    SetDataset {
        dataset: String,
    },
    /// Print the saved settings
    Show,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Yaml,
    Json,
}

#[derive(Tabled)]
struct TableRow {
    #[tabled(rename = "Project")]
    project: String,
    #[tabled(rename = "Dataset")]
    dataset: String,
    #[tabled(rename = "Table")]
    table: String,
}

impl From<&TableReference> for TableRow {
    fn from(reference: &TableReference) -> Self {
        Self {
            project: reference.project.clone(),
            dataset: reference.dataset.clone(),
            table: reference.table.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("bqwizard=debug,info")
    } else {
        EnvFilter::new("bqwizard=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(e);
            ExitCode::FAILURE
        }
    }
}

fn print_error(err: Box<dyn std::error::Error>) {
    if let Some(BqWizardError::BigQuery(bq)) = err.downcast_ref::<BqWizardError>() {
        print_bq_error(bq);
        return;
    }

    eprintln!("{} {}", "✗ Error:".red(), err);
}

fn print_bq_error(err: &BigQueryError) {
    eprintln!("\n{}", format!("✗ BigQuery Error [{}]", err.error_code()).as_str().red());
    eprintln!("  {}", err);
    eprintln!("\n{}", "Suggestion:".yellow());
    for line in err.suggestion().lines() {
        eprintln!("  {}", line);
    }
    eprintln!();
}

/// Saved settings plus the CLI overrides that apply to them.
struct Session {
    path: PathBuf,
    settings: Settings,
    project_flag: Option<String>,
    dataset_flag: Option<String>,
}

impl Session {
    fn load(project_flag: Option<String>, dataset_flag: Option<String>) -> Result<Self, Box<dyn std::error::Error>> {
        let path = config::config_path()?;
        let settings = Settings::load_or_init(&path)?;
        Ok(Self {
            path,
            settings,
            project_flag,
            dataset_flag,
        })
    }

    fn project(&self) -> Result<String, Box<dyn std::error::Error>> {
        Ok(config::resolve_project(self.project_flag.as_deref(), &self.settings)?)
    }

    fn reference_context(&self) -> Result<ReferenceContext, Box<dyn std::error::Error>> {
        let context = ReferenceContext::new(self.project()?);
        let dataset = self.dataset_flag
            .as_deref()
            .filter(|d| !d.is_empty())
            .or_else(|| self.settings.dataset());

        Ok(match dataset {
            Some(d) => context.with_dataset(d),
            None => context,
        })
    }

    async fn client(&self) -> Result<BqClient, Box<dyn std::error::Error>> {
        Ok(BqClient::new(self.project()?).await?)
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = Session::load(cli.project, cli.dataset)?;

    match cli.command {
        Commands::RefreshRecursive { reference, dry_run, max_depth, output } => {
            let start = TableReference::parse(&reference, &session.reference_context()?)?;
            let client = session.client().await?;
            cmd_refresh_recursive(&client, &start, dry_run, max_depth, output).await?;
        }

        Commands::Dependents { reference, search } => {
            let target = TableReference::parse(&reference, &session.reference_context()?)?;
            let project = session.project()?;
            let datasets = search
                .iter()
                .map(|d| DatasetReference::parse(d, &project))
                .collect::<Result<Vec<_>, _>>()?;
            let client = session.client().await?;
            cmd_dependents(&client, &target, &datasets).await?;
        }

        Commands::Tables { dataset } => {
            let dataset = DatasetReference::parse(&dataset, &session.project()?)?;
            let client = session.client().await?;
            cmd_tables(&client, &dataset).await?;
        }

        Commands::Config { action } => {
            cmd_config(&mut session, action)?;
        }
    }

    Ok(())
}

async fn cmd_refresh_recursive(
    warehouse: &dyn Warehouse,
    start: &TableReference,
    dry_run: bool,
    max_depth: usize,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Resolving dependencies of {} (max depth {})", start, max_depth);

    let options = RefreshOptions { max_depth, dry_run };
    let report = refresh_recursive(warehouse, start, options).await?;

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&report)?),
        OutputFormat::Table => print_refresh_report(&report),
    }

    Ok(())
}

fn print_refresh_report(report: &RefreshReport) {
    println!("\nRefresh order for {}:\n", report.starting_reference);

    for (idx, node) in report.outcomes.iter().enumerate() {
        let (icon, note) = match &node.outcome {
            RefreshOutcome::Refreshed => ("✓".green(), String::new()),
            RefreshOutcome::Pending => ("○".normal(), String::new()),
            RefreshOutcome::Skipped(reason) => ("-".dimmed(), format!(" ({})", reason).as_str().dimmed().to_string()),
            RefreshOutcome::Failed(_) => ("✗".red(), String::new()),
        };
        println!("  {:>3}. {} {}{}", idx + 1, icon, node.reference, note);
    }

    if !report.cyclic.is_empty() {
        println!("\n{} circular dependency among:", "⚠".yellow());
        for node in &report.cyclic {
            println!("    {}", node);
        }
    }

    if !report.unresolved.is_empty() {
        println!("\n{} could not be inspected:", "⚠".yellow());
        for (node, reason) in &report.unresolved {
            println!("    {}: {}", node, reason);
        }
    }

    println!();

    if report.dry_run {
        println!(
            "Dry run: {} views would be refreshed, {} skipped. No statements were executed.",
            report.pending().len(),
            report.skipped().len()
        );
        return;
    }

    let failed = report.failed();
    println!(
        "{} refreshed, {} skipped, {} failed",
        report.refreshed().len().to_string().as_str().green(),
        report.skipped().len(),
        if failed.is_empty() { "0".normal() } else { failed.len().to_string().as_str().red() }
    );

    for (node, message) in failed {
        eprintln!("{} {}: {}", "✗".red(), node, message);
    }
}

async fn cmd_dependents(
    warehouse: &dyn Warehouse,
    target: &TableReference,
    datasets: &[DatasetReference],
) -> Result<(), Box<dyn std::error::Error>> {
    let dependents = DependentsFinder::new(warehouse).find(target, datasets).await?;

    if dependents.is_empty() {
        println!("No views read from {}", target);
    } else {
        println!("Views reading from {}:\n", target);
        for view in &dependents {
            println!("  {}", view);
        }
    }

    Ok(())
}

async fn cmd_tables(
    warehouse: &dyn Warehouse,
    dataset: &DatasetReference,
) -> Result<(), Box<dyn std::error::Error>> {
    let tables = warehouse.list_tables(dataset).await?;

    if tables.is_empty() {
        println!("No tables found in {}", dataset);
        return Ok(());
    }

    let rows: Vec<TableRow> = tables.iter().map(TableRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::markdown());
    println!("{}", table);
    println!("\n{} tables in {}", tables.len(), dataset);

    Ok(())
}

fn cmd_config(session: &mut Session, action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    let settings = &mut session.settings;

    match action {
        ConfigAction::SetProject { project } => {
            println!("Setting GCP project to {}...", project);
            settings.project = project;
            settings.save(&session.path)?;
            println!("{} Done.", "✓".green());
        }
        ConfigAction::SetDataset { dataset } => {
            println!("Setting default dataset to {}...", dataset);
            settings.default_dataset = Some(dataset);
            settings.save(&session.path)?;
            println!("{} Done.", "✓".green());
        }
        ConfigAction::Show => {
            println!("\nCurrent configuration ({}):", session.path.display());
            println!("{}", "-".repeat(30));
            println!("project: {}", settings.project().unwrap_or(""));
            println!("default_dataset: {}", settings.dataset().unwrap_or(""));
            println!("{}", "-".repeat(30));
        }
    }

    Ok(())
}
