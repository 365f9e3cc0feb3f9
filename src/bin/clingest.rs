use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use clingest::app::{read_manifest, read_submission, App};
use clingest::clinical::ClinicalHttpClient;
use clingest::config::{ConfigLoader, ResolvedConfig};
use clingest::drs::DrsHttpClient;
use clingest::error::IngestError;
use clingest::output::JsonOutput;

#[derive(Parser)]
#[command(name = "clingest")]
#[command(about = "Ingest clinical submissions and genomic manifests into CanDIG-style stores")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Flatten, validate and ingest a clinical submission")]
    Clinical(ClinicalArgs),
    #[command(about = "Link a genomic manifest into the DRS object graph")]
    Genomic(FileArgs),
    #[command(about = "Delete programs and all their dependent records")]
    Clean(CleanArgs),
    #[command(about = "Check that the configuration is usable")]
    Check,
}

#[derive(Args)]
struct ClinicalArgs {
    file: Utf8PathBuf,

    #[arg(long)]
    batch_size: Option<usize>,
}

#[derive(Args)]
struct FileArgs {
    file: Utf8PathBuf,
}

#[derive(Args)]
struct CleanArgs {
    #[arg(required = true)]
    program_ids: Vec<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(ingest) = report.downcast_ref::<IngestError>() {
            return ExitCode::from(map_exit_code(ingest));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &IngestError) -> u8 {
    match error {
        IngestError::MissingConfig
        | IngestError::ConfigRead(_)
        | IngestError::ConfigParse(_)
        | IngestError::SubmissionRead(_)
        | IngestError::SubmissionParse(_)
        | IngestError::SchemaParse(_)
        | IngestError::MissingToken => 2,
        IngestError::ClinicalHttp(_)
        | IngestError::ClinicalStatus { .. }
        | IngestError::EndpointNotFound { .. }
        | IngestError::DrsHttp(_)
        | IngestError::DrsStatus { .. }
        | IngestError::SchemaSource { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ConfigLoader::resolve(cli.config.as_deref()).into_diagnostic()?;
    if let Some(token) = cli.token {
        config.token = Some(token);
    }

    match cli.command {
        Commands::Clinical(args) => {
            if let Some(batch_size) = args.batch_size {
                config.batch_size = batch_size;
            }
            let app = build_app(&config).into_diagnostic()?;
            let submission = read_submission(&args.file).into_diagnostic()?;
            let report = app.ingest_clinical(&submission).into_diagnostic()?;
            JsonOutput::print_clinical(&report).into_diagnostic()?;
            if report.response_code >= 400 {
                return Err(miette::Report::msg(format!(
                    "clinical ingest finished with response code {}",
                    report.response_code
                )));
            }
            Ok(())
        }
        Commands::Genomic(args) => {
            let app = build_app(&config).into_diagnostic()?;
            let manifest = read_manifest(&args.file).into_diagnostic()?;
            let report = app.ingest_genomic(&manifest);
            JsonOutput::print_genomic(&report).into_diagnostic()?;
            if report.summary.status_code >= 400 {
                return Err(miette::Report::msg(format!(
                    "genomic ingest finished with status code {}",
                    report.summary.status_code
                )));
            }
            Ok(())
        }
        Commands::Clean(args) => {
            let app = build_app(&config).into_diagnostic()?;
            let report = app.clean(&args.program_ids).into_diagnostic()?;
            JsonOutput::print_clean(&report).into_diagnostic()?;
            Ok(())
        }
        Commands::Check => run_check(&config),
    }
}

fn build_app(
    config: &ResolvedConfig,
) -> Result<App<ClinicalHttpClient, DrsHttpClient>, IngestError> {
    let token = config.token.as_deref().ok_or(IngestError::MissingToken)?;
    let clinical = ClinicalHttpClient::new(&config.clinical_url, token)?;
    let drs = DrsHttpClient::new(&config.genomic_url, token)?;
    Ok(App::new(config.clone(), clinical, drs))
}

fn run_check(config: &ResolvedConfig) -> miette::Result<()> {
    println!("PASS: config file is readable.");
    println!("PASS: clinical endpoint is {}", config.clinical_url);
    println!("PASS: genomic endpoint is {}", config.genomic_url);
    println!("PASS: DRS host is {}", config.drs_host_url);
    match &config.token {
        Some(_) => println!("PASS: bearer token is set."),
        None => println!("WARN: no bearer token; pass --token or set it in the config."),
    }
    println!(
        "PASS: batch size is {} records per request.",
        config.batch_size
    );
    Ok(())
}
