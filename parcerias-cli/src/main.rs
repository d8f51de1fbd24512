//! Parcerias CLI
//!
//! Runs one report over the partnership control sheet against a Chrome
//! window the operator has already logged in with.
//!
//! Usage:
//!   parcerias --config robot.yaml notificacoes
//!   parcerias --input controle.xlsx --output anexos.xlsx anexos
//!   parcerias --config robot.yaml dirigente --url <members page> --role Presidente
//!   parcerias locators > locators.yaml

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use parcerias::driver::cdp::browser_launch_instructions;
use parcerias::runner::open_member_actions;
use parcerias::{attach, run_report, PersistencePolicy, ReportKind, RobotConfig, RobotError};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "parcerias")]
#[command(about = "Report robot for the partnership-management portal")]
#[command(
    long_about = "Attaches to a Chrome started with --remote-debugging-port, walks the active instruments of the control spreadsheet and writes one report row per instrument."
)]
struct Cli {
    /// YAML configuration file
    #[arg(long, short = 'c', env = "PARCERIAS_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// DevTools endpoint of the running browser (host:port)
    #[arg(long, env = "PARCERIAS_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// Control spreadsheet listing the instruments
    #[arg(long, short = 'i', env = "PARCERIAS_INPUT", global = true)]
    input: Option<PathBuf>,

    /// Sheet of the control spreadsheet to read
    #[arg(long, env = "PARCERIAS_SHEET", global = true)]
    sheet: Option<String>,

    /// Report spreadsheet to create or append to
    #[arg(long, short = 'o', env = "PARCERIAS_OUTPUT", global = true)]
    output: Option<PathBuf>,

    /// When rows are saved: incremental or batched
    #[arg(long, env = "PARCERIAS_PERSISTENCE", global = true)]
    persistence: Option<PersistencePolicy>,

    /// Close the browser at the end instead of leaving it open
    #[arg(long, global = true)]
    quit_browser: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Work-plan adjustments under analysis
    Ajustes,
    /// Notice dates ahead of the end of validity
    Notificacoes,
    /// End of validity per modality
    Vigencia,
    /// Latest attachment upload per instrument
    Anexos,
    /// Open the action menu of the entity's head in the members table
    Dirigente {
        /// Page holding the members table
        #[arg(long)]
        url: Option<String>,
        /// Role to look for; repeat to try several in order
        #[arg(long = "role")]
        roles: Vec<String>,
    },
    /// Print the effective locator table as YAML
    Locators {
        /// Include the overrides of this report (ajustes, notificacoes, vigencia, anexos)
        #[arg(long)]
        report: Option<ReportKind>,
    },
}

impl Commands {
    fn report(&self) -> Option<ReportKind> {
        match self {
            Commands::Ajustes => Some(ReportKind::Adjustments),
            Commands::Notificacoes => Some(ReportKind::Notifications),
            Commands::Vigencia => Some(ReportKind::Validity),
            Commands::Anexos => Some(ReportKind::Attachments),
            Commands::Dirigente { .. } | Commands::Locators { .. } => None,
        }
    }
}

fn init_logging(verbose: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = match verbose {
        0 => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info".into()),
        1 => "info,parcerias=debug".into(),
        _ => "debug,parcerias=trace".into(),
    };
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// File, then environment and flags on top.
fn load_config(cli: &Cli) -> Result<RobotConfig> {
    let mut config = match &cli.config {
        Some(path) => RobotConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => RobotConfig::default(),
    };

    if let Some(endpoint) = &cli.endpoint {
        config.browser.endpoint = endpoint.clone();
    }
    if let Some(input) = &cli.input {
        config.input.path = Some(input.clone());
    }
    if let Some(sheet) = &cli.sheet {
        config.input.sheet = sheet.clone();
    }
    if let Some(output) = &cli.output {
        config.output.path = Some(output.clone());
    }
    if let Some(persistence) = cli.persistence {
        config.output.persistence = Some(persistence);
    }
    if cli.quit_browser {
        config.browser.quit_on_finish = true;
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    if let Commands::Locators { report } = &cli.command {
        let report = report.map(ReportKind::build);
        let table = config.locator_table(report.as_deref());
        print!("{}", table.to_yaml()?);
        return Ok(());
    }

    if let Some(kind) = cli.command.report() {
        let report = kind.build();
        // Resolve every path before touching the browser.
        let job = config.batch_job(report.as_ref())?;
        let session = connect(&config).await?;

        let summary = run_report(session, report.as_ref(), &job)
            .await
            .with_context(|| format!("{kind} report stopped"))?;
        info!(
            report = %kind,
            total = summary.total,
            written = summary.written,
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            output = %job.output.display(),
            "Done"
        );
        if !summary.failed.is_empty() {
            warn!(instruments = ?summary.failed, "Some instruments failed, see the errors above");
        }
        return Ok(());
    }

    if let Commands::Dirigente { url, roles } = &cli.command {
        let url = url
            .clone()
            .or_else(|| config.members.url.clone())
            .context("no members page given (--url or members.url)")?;
        let roles = if roles.is_empty() {
            config.members.roles.clone()
        } else {
            roles.clone()
        };
        let session = connect(&config).await?;
        let locators = config.locator_table(None);
        match open_member_actions(session, &locators, &url, &roles, config.release_mode()).await? {
            Some(role) => info!(%role, "Done"),
            None => warn!(?roles, "Done, nobody holds those roles"),
        }
    }
    Ok(())
}

async fn connect(config: &RobotConfig) -> Result<parcerias::Session> {
    let options = config.attach_options()?;
    match attach(&options, config.timeouts()).await {
        Ok(session) => Ok(session),
        Err(e @ RobotError::Connection(_)) => {
            warn!("{}", browser_launch_instructions());
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
