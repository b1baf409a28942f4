use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_geo2hca::app::App;
use kira_geo2hca::config::ConfigLoader;
use kira_geo2hca::domain::GeoSeriesAccession;
use kira_geo2hca::error::KiraError;
use kira_geo2hca::filter::{HUMAN_ORGANISM, SampleFilter};
use kira_geo2hca::geo::{GeoClient, GeoHttpClient};
use kira_geo2hca::output::{ConsoleOutput, JsonOutput, OutputMode};
use kira_geo2hca::workspace::Workspace;

#[derive(Parser)]
#[command(name = "kira-geo2hca")]
#[command(about = "Extract GEO series sample metadata and project it into HCA spreadsheets")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true, help = "Path to a kira-geo2hca.json config file")]
    config: Option<String>,

    #[arg(
        long,
        global = true,
        help = "Directory for per-accession files and the default config (default: .)"
    )]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download the MINiML document and write <accession>.tsv")]
    Extract(ExtractArgs),
    #[command(about = "Fill <accession>.xlsx from <accession>.tsv and the MINiML document")]
    Project(ProjectArgs),
    #[command(about = "Extract, then project")]
    Run(ExtractArgs),
}

#[derive(Args, Clone)]
struct ExtractArgs {
    accession: String,

    #[arg(long, conflicts_with = "human")]
    organism: Option<String>,

    #[arg(long, help = "Shorthand for --organism \"Homo sapiens\"")]
    human: bool,

    #[arg(long)]
    platform: Option<String>,
}

impl ExtractArgs {
    fn filter(&self) -> SampleFilter {
        let organism = if self.human {
            Some(HUMAN_ORGANISM.to_string())
        } else {
            self.organism.clone()
        };
        SampleFilter {
            organism,
            platform: self.platform.clone(),
        }
    }
}

#[derive(Args, Clone)]
struct ProjectArgs {
    accession: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        KiraError::InvalidSeriesAccession(_)
        | KiraError::TableNotFound(_)
        | KiraError::DocumentNotFound(_)
        | KiraError::WorkbookNotFound(_)
        | KiraError::ConfigRead(_) => 2,
        KiraError::GeoHttp(_)
        | KiraError::GeoStatus { .. }
        | KiraError::Archive(_)
        | KiraError::ArchiveEntryMissing(_) => 3,
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
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let workspace = match &cli.dir {
        Some(dir) => Workspace::from_std_path(dir)?,
        None => Workspace::new()?,
    };
    let config = ConfigLoader::resolve(cli.config.as_deref(), workspace.root().as_std_path())?;
    let geo = GeoHttpClient::new(config.timeout_secs)?;

    let app = App::new(workspace, config, geo);

    match cli.command {
        Commands::Extract(args) => run_extract(args, app, output_mode),
        Commands::Project(args) => run_project(args, app, output_mode),
        Commands::Run(args) => run_all(args, app, output_mode),
    }
}

fn run_extract<G: GeoClient>(
    args: ExtractArgs,
    app: App<G>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let accession: GeoSeriesAccession = args.accession.parse()?;
    let filter = args.filter();

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.extract(&accession, &filter, &JsonOutput)?;
            JsonOutput::print_extract(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            app.extract(&accession, &filter, &ConsoleOutput)?;
        }
    }
    Ok(())
}

fn run_project<G: GeoClient>(
    args: ProjectArgs,
    app: App<G>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let accession: GeoSeriesAccession = args.accession.parse()?;

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.project(&accession, &JsonOutput)?;
            JsonOutput::print_project(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            app.project(&accession, &ConsoleOutput)?;
        }
    }
    Ok(())
}

fn run_all<G: GeoClient>(
    args: ExtractArgs,
    app: App<G>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let accession: GeoSeriesAccession = args.accession.parse()?;
    let filter = args.filter();

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.run(&accession, &filter, &JsonOutput)?;
            JsonOutput::print_run(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            app.run(&accession, &filter, &ConsoleOutput)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract_args(argv: &[&str]) -> ExtractArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Commands::Extract(args) | Commands::Run(args) => args,
            Commands::Project(_) => panic!("expected extract arguments"),
        }
    }

    #[test]
    fn human_flag_selects_homo_sapiens() {
        let args = extract_args(&["kira-geo2hca", "extract", "GSE1", "--human", "--platform", "GPL1"]);
        assert_eq!(
            args.filter(),
            SampleFilter {
                organism: Some(HUMAN_ORGANISM.to_string()),
                platform: Some("GPL1".to_string()),
            }
        );
    }

    #[test]
    fn organism_flag_is_passed_through() {
        let args = extract_args(&["kira-geo2hca", "run", "GSE1", "--organism", "Mus musculus"]);
        assert_eq!(args.filter().organism.as_deref(), Some("Mus musculus"));
        assert!(args.filter().platform.is_none());

        let args = extract_args(&["kira-geo2hca", "extract", "GSE1"]);
        assert!(args.filter().is_empty());
    }

    #[test]
    fn human_conflicts_with_organism() {
        let parsed = Cli::try_parse_from([
            "kira-geo2hca",
            "extract",
            "GSE1",
            "--human",
            "--organism",
            "Mus musculus",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn exit_codes_follow_error_class() {
        assert_eq!(
            map_exit_code(&KiraError::InvalidSeriesAccession("GSM1".to_string())),
            2
        );
        assert_eq!(
            map_exit_code(&KiraError::TableNotFound(PathBuf::from("GSE1.tsv"))),
            2
        );
        assert_eq!(
            map_exit_code(&KiraError::ConfigRead(PathBuf::from("missing.json"))),
            2
        );
        assert_eq!(map_exit_code(&KiraError::GeoHttp("timeout".to_string())), 3);
        assert_eq!(
            map_exit_code(&KiraError::GeoStatus {
                status: 404,
                message: "not found".to_string(),
            }),
            3
        );
        assert_eq!(
            map_exit_code(&KiraError::ArchiveEntryMissing("GSE1_family.xml".to_string())),
            3
        );
        assert_eq!(map_exit_code(&KiraError::Workbook("bad".to_string())), 1);
        assert_eq!(
            map_exit_code(&KiraError::DocumentParse {
                position: 0,
                message: "bad".to_string(),
            }),
            1
        );
    }
}
