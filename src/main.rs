use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, Parser};

use dita_bitext::engine::{generate, import, init_default_config, verify_roundtrip, EngineConfig, MergeOptions};
use dita_bitext::errors::{BatchFailed, Issue};
use dita_bitext::progress::{level_from_args, ConsoleLogger};
use dita_bitext::project::ProjectStore;
use dita_bitext::xliff::pseudo::{pseudo_translate, PseudoMode};
use dita_bitext::xliff::read::read_xliff_path;
use dita_bitext::xliff::write::write_xliff_path;

#[derive(Parser, Debug)]
#[command(name = "dita-bitext")]
#[command(about = "Extract DITA maps to XLIFF and merge translations back", long_about = None)]
struct Args {
    /// Generate a default dita-bitext.toml, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write the config file (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite an existing config file when used with --init-config
    #[arg(long)]
    force: bool,

    /// Root map to extract
    #[arg(value_name = "MAP")]
    map: Option<PathBuf>,

    /// Target language (repeatable; default: [languages].targets)
    #[arg(short = 'l', long = "lang", value_name = "LANG")]
    langs: Vec<String>,

    /// Output folder (containers for generate, documents for import)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// DITAVAL profile applied while extracting
    #[arg(long, value_name = "FILE")]
    ditaval: Option<PathBuf>,

    /// Merge a translated container into -o
    #[arg(long, value_name = "XLF")]
    import: Option<PathBuf>,

    /// Keep topics that already exist in the output folder
    #[arg(long)]
    no_overwrite: bool,

    /// Do not copy images and other non-text assets
    #[arg(long)]
    no_copy_assets: bool,

    /// Reject documents with missing or broken targets
    #[arg(long)]
    strict: bool,

    /// Fill missing targets of a container from the source, write to -o
    #[arg(long, value_name = "XLF")]
    pseudo_translate: Option<PathBuf>,

    /// Pseudo-translation mode: prefix or copy (default: [output].pseudo_mode)
    #[arg(long, value_name = "MODE")]
    pseudo_mode: Option<String>,

    /// Record MAP as a project in DIR; its languages apply when -l is not given
    #[arg(long, value_name = "DIR")]
    project_dir: Option<PathBuf>,

    /// Extract, copy-translate and merge MAP in a scratch folder and compare
    #[arg(long)]
    verify_roundtrip: bool,

    /// Config file path (default: DITA_BITEXT_CONFIG, or search for dita-bitext.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level: error, warn, info, debug, trace
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn report_issues(issues: &[Issue]) -> anyhow::Result<()> {
    for i in issues {
        if i.fatal {
            log::error!("{i}");
        } else {
            log::warn!("{i}");
        }
    }
    if let Some(failed) = BatchFailed::from_issues(issues) {
        return Err(failed.into());
    }
    if !issues.is_empty() {
        anyhow::bail!("{} warning(s)", issues.len());
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    ConsoleLogger::init(level_from_args(args.log_level.as_deref(), args.verbose))
        .context("install logger")?;

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    let workdir = args
        .map
        .as_ref()
        .or(args.import.as_ref())
        .or(args.pseudo_translate.as_ref())
        .and_then(|p| p.parent())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    let cfg = EngineConfig::load(args.config.clone(), &workdir).context("load config")?;

    if let Some(xlf) = args.import.as_ref() {
        let output = args.output.clone().context("missing -o/--output for import")?;
        let opts = MergeOptions {
            overwrite: cfg.merge.overwrite && !args.no_overwrite,
            copy_assets: cfg.merge.copy_assets && !args.no_copy_assets,
            strict: cfg.merge.strict || args.strict,
        };
        let report = import(xlf, &output, opts, &cfg)?;
        log::info!(
            "topics written: {}, maps: {}, assets copied: {}, skipped: {}, untranslated units: {}",
            report.written_topics.len(),
            report.written_maps.len(),
            report.copied_assets.len(),
            report.skipped.len(),
            report.untranslated_units
        );
        return report_issues(&report.issues);
    }

    if let Some(xlf) = args.pseudo_translate.as_ref() {
        let output = args.output.clone().context("missing -o/--output for pseudo-translate")?;
        let mode = match args.pseudo_mode.as_deref() {
            Some(m) => PseudoMode::parse(m).with_context(|| format!("unknown pseudo mode {m:?}"))?,
            None => cfg.pseudo_mode,
        };
        let mut bitext = read_xliff_path(xlf)?;
        let filled = pseudo_translate(&mut bitext, mode);
        write_xliff_path(&output, &bitext)?;
        log::info!("filled {filled} unit(s), wrote {}", output.display());
        return Ok(());
    }

    let map = match args.map {
        Some(p) => p,
        None => {
            let mut cmd = Args::command();
            cmd.print_help().context("print help")?;
            eprintln!(
                "\n\nUSAGE:\n  dita-bitext <map.ditamap> -l de-DE -o xliff/\n  dita-bitext --import xliff/guide_de-DE.ditamap.xlf -o out/de-DE/\n"
            );
            return Ok(());
        }
    };

    if args.verify_roundtrip {
        let report = verify_roundtrip(&map, &cfg)?;
        for m in &report.mismatches {
            log::error!("round-trip mismatch: {m}");
        }
        report_issues(&report.issues)?;
        if !report.mismatches.is_empty() {
            anyhow::bail!("{} document(s) did not round-trip", report.mismatches.len());
        }
        return Ok(());
    }

    let output = match args.output {
        Some(p) => p,
        None => {
            let base = map.parent().map(|p| p.to_path_buf()).unwrap_or_default();
            base.join(cfg.xliff_dir.clone().unwrap_or_else(|| PathBuf::from("xliff")))
        }
    };
    let mut langs = args.langs.clone();
    if let Some(dir) = args.project_dir.as_ref() {
        let mut store = ProjectStore::open(dir)?;
        let wanted = if langs.is_empty() { cfg.target_langs.clone() } else { langs.clone() };
        let project = store.get_or_create(&map, &cfg.source_lang, &wanted)?;
        log::info!("project {} ({})", project.id, project.name);
        if langs.is_empty() {
            langs = project.target_langs;
        }
    }
    let report = generate(&map, &langs, args.ditaval.as_deref(), &output, &cfg)?;
    log::info!(
        "{} container(s), {} document(s), {} unit(s), {} asset(s)",
        report.containers.len(),
        report.documents,
        report.units,
        report.assets
    );
    report_issues(&report.issues)
}
