use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use tcga_skcm::app::{
    App, DownloadOptions, DownloadResult, DupesResult, GenesResult, ProgressSinkKind, SortResult,
};
use tcga_skcm::config::{CONFIG_FILE, ConfigLoader, ResolvedConfig};
use tcga_skcm::error::SkcmError;
use tcga_skcm::gdc::{GdcClient, GdcHttpClient};
use tcga_skcm::output::{JsonOutput, OutputMode};
use tcga_skcm::store::Store;
use tcga_skcm::survival::SurvivalResult;
use tcga_skcm::tui::Tui;

#[derive(Parser)]
#[command(name = "skcm")]
#[command(about = "Download, sort and analyze TCGA melanoma (SKCM) files from the GDC")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Path to skcm.json (defaults to ./skcm.json)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Write a default skcm.json")]
    Init(InitArgs),
    #[command(about = "Fetch the manifest files from the GDC")]
    Download(DownloadArgs),
    #[command(about = "Rename downloaded files and sort them by stage and case")]
    Sort,
    #[command(about = "Copy leftover duplicates next to their sorted files")]
    Dupes,
    #[command(about = "Gene search with per-stage statistics and histograms")]
    Genes(GenesArgs),
    #[command(about = "Fit a Cox model for one gene")]
    Survival(SurvivalArgs),
}

#[derive(Args)]
struct InitArgs {
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct DownloadArgs {
    #[arg(long)]
    force: bool,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct GenesArgs {
    /// Target gene; repeat for several (overrides the config list)
    #[arg(long = "gene")]
    genes: Vec<String>,
}

#[derive(Args)]
struct SurvivalArgs {
    #[arg(long)]
    gene: Option<String>,

    /// Expression quantile used as the high/low cutoff
    #[arg(long)]
    quantile: Option<f64>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<SkcmError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SkcmError) -> u8 {
    match error {
        SkcmError::MissingConfig | SkcmError::MissingInput(_) | SkcmError::EmptyMetadata(_) => 2,
        SkcmError::GdcHttp(_) | SkcmError::GdcStatus { .. } => 3,
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

    if let Commands::Init(args) = &cli.command {
        let path = Utf8PathBuf::from(cli.config.as_deref().unwrap_or(CONFIG_FILE));
        let result = App::<NopGdc>::init_config(&path, args.force, &JsonOutput)?;
        match output_mode {
            OutputMode::NonInteractive => JsonOutput::print_init(&result).into_diagnostic()?,
            OutputMode::Interactive => print_init_summary(&result),
        }
        return Ok(());
    }

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let store = Store::from_config(&config);

    match cli.command {
        Commands::Init(_) => Ok(()),
        Commands::Download(args) => {
            let gdc = GdcHttpClient::new()?;
            run_download(App::new(store, gdc), config, args, output_mode)
        }
        Commands::Sort => run_sort(App::new(store, NopGdc), config, output_mode),
        Commands::Dupes => run_dupes(App::new(store, NopGdc), config, output_mode),
        Commands::Genes(args) => run_genes(App::new(store, NopGdc), config, args, output_mode),
        Commands::Survival(args) => {
            run_survival(App::new(store, NopGdc), config, args, output_mode)
        }
    }
}

#[derive(Clone, Copy)]
struct NopGdc;

impl GdcClient for NopGdc {
    fn download_file(
        &self,
        _file_id: &str,
        _destination: &std::path::Path,
    ) -> Result<u64, SkcmError> {
        Err(SkcmError::GdcHttp("GDC client not configured".to_string()))
    }
}

fn run_download<G: GdcClient + 'static>(
    app: App<G>,
    config: ResolvedConfig,
    args: DownloadArgs,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let options = DownloadOptions {
        force: args.force,
        dry_run: args.dry_run,
    };
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.download(&config, options, &JsonOutput)?;
            JsonOutput::print_download(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(ProgressSinkKind::Download, app.store());
            let result = tui.run(move |sink| app.download(&config, options, sink))?;
            print_download_summary(&result);
            Ok(())
        }
    }
}

fn run_sort<G: GdcClient + 'static>(
    app: App<G>,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.sort(&config, &JsonOutput)?;
            JsonOutput::print_sort(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(ProgressSinkKind::Sort, app.store());
            let result = tui.run(move |sink| app.sort(&config, sink))?;
            print_sort_summary(&result);
            Ok(())
        }
    }
}

fn run_dupes<G: GdcClient + 'static>(
    app: App<G>,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.dupes(&config, &JsonOutput)?;
            JsonOutput::print_dupes(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(ProgressSinkKind::Dupes, app.store());
            let result = tui.run(move |sink| app.dupes(&config, sink))?;
            print_dupes_summary(&result);
            Ok(())
        }
    }
}

fn run_genes<G: GdcClient + 'static>(
    app: App<G>,
    config: ResolvedConfig,
    args: GenesArgs,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.genes(&config, &args.genes, &JsonOutput)?;
            JsonOutput::print_genes(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(ProgressSinkKind::Genes, app.store());
            let result = tui.run(move |sink| app.genes(&config, &args.genes, sink))?;
            print_genes_summary(&result);
            Ok(())
        }
    }
}

fn run_survival<G: GdcClient + 'static>(
    app: App<G>,
    config: ResolvedConfig,
    args: SurvivalArgs,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.survival(&config, args.gene, args.quantile, &JsonOutput)?;
            JsonOutput::print_survival(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(ProgressSinkKind::Survival, app.store());
            let result =
                tui.run(move |sink| app.survival(&config, args.gene, args.quantile, sink))?;
            print_survival_summary(&result);
            Ok(())
        }
    }
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

fn print_init_summary(result: &tcga_skcm::app::InitResult) {
    let verb = if result.overwritten { "Overwrote" } else { "Wrote" };
    println!("{GREEN}✅ {verb} {}{RESET}", result.path);
}

fn print_download_summary(result: &DownloadResult) {
    println!("{CYAN}📦 SKCM download summary{RESET}");
    println!("{GREEN}⬇️ Downloaded: {}{RESET}", result.count("downloaded"));
    println!("{GREEN}♻️ Already present: {}{RESET}", result.count("skipped"));
    let planned = result.count("planned");
    if planned > 0 {
        println!("{YELLOW}• Planned (dry run): {planned}{RESET}");
    }
}

fn print_sort_summary(result: &SortResult) {
    println!("{CYAN}📦 SKCM sort summary{RESET}");
    println!("{GREEN}✅ Sorted: {}{RESET}", result.sorted);
    println!("{YELLOW}⚠️ Duplicates left in temp folder: {}{RESET}", result.duplicates);
    println!("{YELLOW}⚠️ Unmatched: {}{RESET}", result.unmatched);
    if result.invalid_names > 0 {
        println!("{YELLOW}⚠️ Not renamed: {}{RESET}", result.invalid_names);
    }
    println!("{CYAN}📁 report: {}{RESET}", result.report_path);
}

fn print_dupes_summary(result: &DupesResult) {
    let copied = result
        .pairs
        .iter()
        .filter(|pair| pair.status == "copied")
        .count();
    println!("{CYAN}📦 SKCM duplicate check{RESET}");
    println!("{GREEN}✅ Pairs copied: {copied}{RESET}");
    println!(
        "{YELLOW}⚠️ Skipped: {}{RESET}",
        result.pairs.len() - copied
    );
    println!("{CYAN}📁 {}{RESET}", result.check_dir);
}

fn print_genes_summary(result: &GenesResult) {
    println!("{CYAN}📦 SKCM gene search{RESET}");
    println!(
        "{GREEN}✅ Count files: {} ({} duplicates removed){RESET}",
        result.files,
        result.removed.len()
    );
    for gene in &result.genes {
        let color = if gene.rows == 0 { YELLOW } else { GREEN };
        println!(
            "{color}• {}: {} cases in {} stages{RESET}",
            gene.gene, gene.rows, gene.stages
        );
        println!("{color}   📁 {}{RESET}", gene.folder);
    }
}

fn print_survival_summary(result: &SurvivalResult) {
    println!("{CYAN}📦 SKCM survival: {}{RESET}", result.gene);
    println!(
        "{GREEN}✅ {} patients, {} events, cutoff {:.4} (q={}){RESET}",
        result.observations, result.summary.n_events, result.cutoff, result.quantile
    );
    for covariate in &result.summary.covariates {
        println!(
            "{GREEN}• {}: exp(coef) {:.3}, p {:.4}{RESET}",
            covariate.covariate, covariate.exp_coef, covariate.p
        );
    }
    println!("{CYAN}📁 {}{RESET}", result.summary_path);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exit_code_of(result: Result<(), SkcmError>) -> u8 {
        let run = || -> miette::Result<()> {
            result?;
            Ok(())
        };
        let report = run().unwrap_err();
        report
            .downcast_ref::<SkcmError>()
            .map(map_exit_code)
            .unwrap_or(1)
    }

    #[test]
    fn library_errors_keep_their_exit_codes() {
        assert_eq!(exit_code_of(Err(SkcmError::MissingConfig)), 2);
        assert_eq!(
            exit_code_of(Err(SkcmError::MissingInput("data/cases.json".into()))),
            2
        );
        assert_eq!(exit_code_of(Err(SkcmError::GdcHttp("timeout".to_string()))), 3);
        assert_eq!(
            exit_code_of(Err(SkcmError::InvalidConfig("quantile".to_string()))),
            1
        );
    }

    #[test]
    fn foreign_errors_exit_with_one() {
        let run = || -> miette::Result<()> {
            Err::<(), _>(std::io::Error::other("stdout closed")).into_diagnostic()?;
            Ok(())
        };
        let report = run().unwrap_err();
        assert!(report.downcast_ref::<SkcmError>().is_none());
    }
}
