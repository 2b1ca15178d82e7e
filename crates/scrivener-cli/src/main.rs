use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use scrivener_core::config_file;
use scrivener_core::{
    CancellationToken, Config, EngineSet, HttpFetcher, Item, TargetType, TranslationService,
    WebOutcome,
};
use tracing_subscriber::EnvFilter;

mod output;

use output::ColorMode;

/// Scrivener - extract bibliographic records from web pages, identifiers and files
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Extra directory of translator manifests
    #[arg(long, global = true)]
    translators: Option<PathBuf>,

    /// Per-translator time limit in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Translate a web page
    Web {
        url: String,

        /// Items to keep from a multi-result page: `all` or 1-based indices like `1,3`
        #[arg(long)]
        select: Option<String>,

        /// Write the items in this format instead of a summary
        #[arg(long)]
        to: Option<String>,
    },

    /// Resolve a DOI, ISBN, PMID or arXiv identifier
    Search {
        identifier: String,

        /// Write the items in this format instead of a summary
        #[arg(long)]
        to: Option<String>,
    },

    /// Convert a bibliography file between formats
    Convert {
        file: PathBuf,

        /// Input format, used when it cannot be detected from the content
        #[arg(long)]
        from: Option<String>,

        /// Output format
        #[arg(long, default_value = "json")]
        to: String,

        /// Drop duplicate records
        #[arg(long)]
        dedupe: bool,

        /// Path to write the output to (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List registered translators
    Translators {
        /// Only translators for this target (web, search, import, export)
        #[arg(long)]
        target: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let color = ColorMode(!cli.no_color && std::io::stdout().is_terminal());

    let (translators, timeout) = (cli.translators, cli.timeout);
    let service = || build_service(translators.clone(), timeout, color);

    match cli.command {
        Command::Convert {
            file,
            from,
            to,
            dedupe,
            output,
        } => convert(&file, from.as_deref(), &to, dedupe, output.as_deref()),
        Command::Web { url, select, to } => {
            web(&service()?, &url, select.as_deref(), to.as_deref(), color).await
        }
        Command::Search { identifier, to } => {
            search(&service()?, &identifier, to.as_deref(), color).await
        }
        Command::Translators { target } => list(&service()?, target.as_deref(), color),
    }
}

/// Resolve configuration: CLI flags > env vars > config file > defaults.
fn build_service(
    translators: Option<PathBuf>,
    timeout: Option<u64>,
    color: ColorMode,
) -> anyhow::Result<TranslationService> {
    let mut config = Config::default();
    config_file::load_config().apply_to(&mut config);
    if let Ok(dir) = std::env::var("SCRIVENER_TRANSLATORS_DIR") {
        config.translator_dirs.push(PathBuf::from(dir));
    }
    if let Some(dir) = translators {
        config.translator_dirs.push(dir);
    }
    if let Some(secs) = timeout {
        config.limits.timeout = Duration::from_secs(secs);
    }

    let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
    let service = TranslationService::new(
        &config,
        EngineSet::builtin(),
        fetcher,
        Some(scrivener_codecs::format_ids()),
    );
    let report = service.load();
    output::print_load_errors(&mut std::io::stderr(), &report, color)?;
    Ok(service)
}

/// Cancel in-flight work on Ctrl-C.
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });
    cancel
}

fn emit(items: &[Item], to: Option<&str>, color: ColorMode) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    match to {
        Some(format) => {
            let exported = scrivener_codecs::export_items(items, format)?;
            stdout.write_all(&exported.bytes)?;
        }
        None => output::print_items(&mut stdout, items, color)?,
    }
    Ok(())
}

/// Reject an unknown `--to` before any work that can't be repeated.
fn check_output_format(to: Option<&str>) -> anyhow::Result<()> {
    if let Some(format) = to {
        scrivener_codecs::export_items(&[], format)?;
    }
    Ok(())
}

async fn web(
    service: &TranslationService,
    url: &str,
    select: Option<&str>,
    to: Option<&str>,
    color: ColorMode,
) -> anyhow::Result<()> {
    check_output_format(to)?;
    let cancel = cancel_on_interrupt();
    let items = match service.translate_web(url, &cancel).await? {
        WebOutcome::Items(items) => items,
        WebOutcome::Selection { url, token, items } => {
            let choice = match select {
                Some(choice) => choice.to_string(),
                None => {
                    let mut stderr = std::io::stderr();
                    output::print_selection(&mut stderr, &url, &items, color)?;
                    prompt_selection()?
                }
            };
            let chosen = parse_selection(&choice, &items)?;
            service.select(&token, &chosen, &cancel).await?
        }
    };
    emit(&items, to, color)
}

fn prompt_selection() -> anyhow::Result<String> {
    if !std::io::stdin().is_terminal() {
        anyhow::bail!("the page lists several items; pass --select all or --select 1,3");
    }
    eprint!("Select items (e.g. 1,3 or all): ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

/// Map `all` or a comma-separated list of 1-based indices (ranges like
/// `2-4` allowed) onto candidate ids.
fn parse_selection(choice: &str, items: &IndexMap<String, String>) -> anyhow::Result<Vec<String>> {
    let choice = choice.trim();
    if choice.eq_ignore_ascii_case("all") {
        return Ok(items.keys().cloned().collect());
    }

    let mut chosen = Vec::new();
    for part in choice.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (start, end) = match part.split_once('-') {
            Some((a, b)) => (a.trim().parse::<usize>()?, b.trim().parse::<usize>()?),
            None => {
                let n = part
                    .parse::<usize>()
                    .with_context(|| format!("'{}' is not an item number", part))?;
                (n, n)
            }
        };
        for n in start..=end {
            let (id, _) = items
                .get_index(n.wrapping_sub(1))
                .with_context(|| format!("no item number {} (1-{})", n, items.len()))?;
            if !chosen.contains(id) {
                chosen.push(id.clone());
            }
        }
    }
    if chosen.is_empty() {
        anyhow::bail!("nothing selected");
    }
    Ok(chosen)
}

async fn search(
    service: &TranslationService,
    identifier: &str,
    to: Option<&str>,
    color: ColorMode,
) -> anyhow::Result<()> {
    let cancel = cancel_on_interrupt();
    let items = service.translate_search(identifier, &cancel).await?;
    emit(&items, to, color)
}

fn convert(
    file: &Path,
    from: Option<&str>,
    to: &str,
    dedupe: bool,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    if !file.exists() {
        anyhow::bail!("File not found: {}", file.display());
    }
    let bytes = std::fs::read(file)?;
    // The file extension is a fallback hint after content sniffing.
    let hint = from.map(String::from).or_else(|| {
        file.extension()
            .and_then(|e| e.to_str())
            .and_then(scrivener_codecs::Format::parse)
            .map(|f| f.id().to_string())
    });
    let mut items = scrivener_codecs::import_payload(&bytes, hint.as_deref())
        .with_context(|| format!("failed to import {}", file.display()))?;
    if dedupe {
        items = scrivener_core::matching::dedupe(items);
    }
    let exported = scrivener_codecs::export_items(&items, to)?;
    match output {
        Some(path) => std::fs::write(path, &exported.bytes)?,
        None => std::io::stdout().write_all(&exported.bytes)?,
    }
    Ok(())
}

fn list(
    service: &TranslationService,
    target: Option<&str>,
    color: ColorMode,
) -> anyhow::Result<()> {
    let target = target
        .map(|t| {
            TargetType::parse(t).with_context(|| {
                format!("unknown target '{}' (expected web, search, import or export)", t)
            })
        })
        .transpose()?;
    let translators = service.translators(target);
    output::print_translators(&mut std::io::stdout(), &translators, color)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_is_checked_up_front() {
        assert!(check_output_format(None).is_ok());
        assert!(check_output_format(Some("ris")).is_ok());
        assert!(check_output_format(Some("BIB")).is_ok());
        let err = check_output_format(Some("rsi")).unwrap_err();
        assert!(err.to_string().contains("rsi"));
    }

    fn candidates() -> IndexMap<String, String> {
        (1..=4)
            .map(|i| (format!("https://a.test/{}", i), format!("Item {}", i)))
            .collect()
    }

    #[test]
    fn select_all() {
        assert_eq!(parse_selection("all", &candidates()).unwrap().len(), 4);
    }

    #[test]
    fn select_indices_and_ranges() {
        let chosen = parse_selection("1, 3-4,3", &candidates()).unwrap();
        assert_eq!(
            chosen,
            vec!["https://a.test/1", "https://a.test/3", "https://a.test/4"]
        );
    }

    #[test]
    fn out_of_range_is_an_error() {
        assert!(parse_selection("5", &candidates()).is_err());
        assert!(parse_selection("0", &candidates()).is_err());
        assert!(parse_selection("", &candidates()).is_err());
    }

    #[test]
    fn cli_parses() {
        let cli = Cli::try_parse_from(["scrivener", "web", "https://a.test/", "--select", "1,3"])
            .unwrap();
        assert!(matches!(cli.command, Command::Web { select: Some(ref s), .. } if s == "1,3"));
        let args = ["scrivener", "convert", "refs.bib", "--to", "ris", "--dedupe"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(matches!(cli.command, Command::Convert { dedupe: true, .. }));
    }
}
