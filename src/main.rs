use anyhow::{Context, Result};
use bloodless_digest::config::{default_config_path, find_config_file, load_config, Config};
use bloodless_digest::mcp::McpServer;
use bloodless_digest::models::Article;
use bloodless_digest::service::{DigestService, SearchOutcome, Trigger};
use bloodless_digest::ui::{self, Spinner, Status};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Bloodless Digest - weekly literature digest for bloodless medicine and Patient Blood Management
#[derive(Parser, Debug)]
#[command(name = "bloodless-digest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Aggregate bloodless medicine and PBM literature from multiple biomedical sources", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, short, value_enum, global = true, default_value_t = OutputFormat::Auto)]
    output: OutputFormat,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the article store (overrides store.data_dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Show supported environment variables and exit
    #[arg(long)]
    env: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Output format for results
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Automatic based on terminal (table if TTY, JSON otherwise)
    Auto,
    /// Table format (human-readable)
    Table,
    /// JSON format (machine-readable)
    Json,
    /// Plain text format
    Plain,
}

impl OutputFormat {
    fn resolve(self) -> Self {
        match self {
            OutputFormat::Auto if ui::is_terminal() => OutputFormat::Table,
            OutputFormat::Auto => OutputFormat::Json,
            other => other,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a search now and merge the results into the digest
    #[command(alias = "s")]
    Search {
        /// Query to run (repeatable; defaults to the configured query set)
        #[arg(long = "query", short = 'Q')]
        queries: Vec<String>,
    },

    /// Run the scheduled search if it is due, then email the digest
    Scheduled {
        /// Run even when the next search is not due yet
        #[arg(long, short)]
        force: bool,

        /// Do not email the digest afterwards
        #[arg(long)]
        no_email: bool,
    },

    /// Show the last search and the stored digest without searching
    #[command(alias = "st")]
    Status,

    /// Email the stored digest
    Send {
        /// Recipient address (repeatable; defaults to email.recipients)
        #[arg(long = "to", short = 't')]
        recipients: Vec<String>,
    },

    /// List enabled sources in priority order
    #[command(alias = "ls")]
    Sources {
        /// Show capabilities of each source
        #[arg(long, short)]
        detailed: bool,
    },

    /// Run the MCP server (stdio by default)
    Serve {
        /// Serve streamable HTTP on this address instead of stdio
        #[arg(long, value_name = "ADDR")]
        http: Option<String>,

        /// Also run the background weekly scheduler
        #[arg(long)]
        schedule: bool,
    },

    /// Write a configuration file with default settings
    InitConfig {
        /// Destination (defaults to the platform config directory)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Print all supported environment variables
fn print_env_vars() {
    println!("Bloodless Digest - Environment Variables");
    println!();
    println!("API Keys:");
    println!("  NCBI_API_KEY                 NCBI E-utilities key (higher PubMed rate limits)");
    println!("  SEMANTIC_SCHOLAR_API_KEY     Semantic Scholar key (higher rate limits)");
    println!("  OPENALEX_EMAIL               Contact email for the OpenAlex polite pool");
    println!("  RESEND_API_KEY               Email provider key; without it a mailto link is produced");
    println!();
    println!("Overrides (sections and keys separated by __):");
    println!("  BLOODLESS_DIGEST__STORE__MAX_ARTICLES        Digest size cap (default: 15)");
    println!("  BLOODLESS_DIGEST__STORE__DATA_DIR            Store directory");
    println!("  BLOODLESS_DIGEST__SEARCH__SOURCES            Comma-separated source ids");
    println!("  BLOODLESS_DIGEST__SEARCH__QUERIES            Comma-separated queries");
    println!("  BLOODLESS_DIGEST__FILTER__TRUST_MODE         allow | deny");
    println!("  BLOODLESS_DIGEST__EMAIL__RECIPIENTS          Comma-separated addresses");
    println!();
    println!("Other Settings:");
    println!("  RUST_LOG                     Log filter (e.g., bloodless_digest=debug)");
}

fn init_tracing(cli: &Cli, config: &Config) {
    let level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => config.logging.level.as_str(),
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("bloodless_digest={}", level)));

    // stdout carries results and the stdio MCP transport, so logs go to stderr
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.is_json() {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load(cli: &Cli) -> Result<Config> {
    let path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => find_config_file(),
    };
    let mut config = load_config(path.as_deref())
        .with_context(|| match &path {
            Some(p) => format!("Failed to load configuration from {}", p.display()),
            None => "Failed to load configuration".to_string(),
        })?;
    if let Some(dir) = &cli.data_dir {
        config.store.data_dir = Some(dir.clone());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.env {
        print_env_vars();
        return Ok(());
    }

    let config = load(&cli)?;
    init_tracing(&cli, &config);

    let format = cli.output.resolve();

    match cli.command {
        None => {
            Cli::command().print_help()?;
            Ok(())
        }

        Some(Commands::Search { ref queries }) => {
            let service = DigestService::from_config(&config)?;
            let spinner = (format == OutputFormat::Table && !cli.quiet).then(|| {
                Spinner::new(&format!(
                    "Searching {} sources",
                    service.aggregator().registry().len()
                ))
            });

            let outcome = service.search_with(queries, Trigger::Manual).await;

            if let Some(spinner) = spinner {
                if outcome.success {
                    spinner.finish_with_success(&outcome.message);
                } else {
                    spinner.finish_with_error(&outcome.message);
                }
            }
            print_outcome(&outcome, format, cli.quiet)?;
            Ok(())
        }

        Some(Commands::Scheduled { force, no_email }) => {
            let service = DigestService::from_config(&config)?;
            let outcome = service.scheduled_search(force, !no_email).await;
            print_outcome(&outcome, format, cli.quiet)?;
            Ok(())
        }

        Some(Commands::Status) => {
            let service = DigestService::from_config(&config)?;
            let status = service.status();
            match format {
                OutputFormat::Json => print_json(&status)?,
                _ => {
                    println!("{}", ui::describe_last_search(status.last_search.as_ref()));
                    println!(
                        "New search due: {}",
                        if status.needs_new_search { "yes" } else { "no" }
                    );
                    println!("Store: {}", status.location);
                    if status.degraded {
                        ui::print_status(
                            Status::Warning,
                            "Storage is unavailable; serving the in-memory digest",
                        );
                    }
                    print_articles(&status.articles, format);
                }
            }
            Ok(())
        }

        Some(Commands::Send { ref recipients }) => {
            let service = DigestService::from_config(&config)?;
            let recipients = (!recipients.is_empty()).then_some(recipients.as_slice());
            let report = service.send_report(recipients).await;
            match format {
                OutputFormat::Json => print_json(&report)?,
                _ => ui::print_dispatch(&report),
            }
            Ok(())
        }

        Some(Commands::Sources { detailed }) => {
            let service = DigestService::from_config(&config)?;
            for (i, src) in service.aggregator().registry().all().enumerate() {
                if detailed {
                    println!("{}. {} {} ({})", i + 1, ui::source_icon(src.id()), src.name(), src.id());
                    println!("   Capabilities: {}", src.capabilities().labels().join(", "));
                } else {
                    println!("{} - {}", src.id(), src.name());
                }
            }
            Ok(())
        }

        Some(Commands::Serve { ref http, schedule }) => {
            let service = Arc::new(DigestService::from_config(&config)?);
            let scheduler = schedule.then(|| {
                let every = Duration::from_secs(config.search.schedule_check_minutes.max(1) * 60);
                tracing::info!("Scheduler checks every {:?}", every);
                service.spawn_scheduler(every)
            });

            let server = McpServer::new(Arc::clone(&service))?;

            match http {
                Some(addr) => {
                    let (bound_addr, handle) = server.run_http(addr).await?;
                    tracing::info!("MCP server listening on {}", bound_addr);
                    tokio::select! {
                        result = handle => {
                            result.map_err(|e| anyhow::anyhow!("Server task failed: {}", e))?;
                        }
                        _ = tokio::signal::ctrl_c() => {
                            tracing::info!("Shutting down");
                        }
                    }
                }
                None => server.run().await?,
            }

            if let Some(scheduler) = scheduler {
                scheduler.abort();
            }
            Ok(())
        }

        Some(Commands::InitConfig { ref path, force }) => {
            let path = path
                .clone()
                .or_else(default_config_path)
                .context("No config directory available; pass a path")?;
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            Config::default().without_secrets().save(&path)?;
            if !cli.quiet {
                ui::print_status(
                    Status::Success,
                    &format!("Wrote configuration to {}", path.display()),
                );
            }
            Ok(())
        }

        Some(Commands::Completions { shell }) => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "bloodless-digest", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_outcome(outcome: &SearchOutcome, format: OutputFormat, quiet: bool) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(outcome);
    }

    if !quiet {
        let status = if !outcome.success {
            Status::Error
        } else if outcome.skipped {
            Status::Info
        } else {
            Status::Success
        };
        ui::print_status(status, &outcome.message);
    }
    print_articles(&outcome.articles, format);
    if let Some(report) = &outcome.dispatch {
        ui::print_dispatch(report);
    }
    Ok(())
}

fn print_articles(articles: &[Article], format: OutputFormat) {
    if articles.is_empty() {
        return;
    }
    match format {
        OutputFormat::Plain => print!("{}", ui::articles_plain(articles)),
        _ => {
            ui::print_section("Digest");
            println!("{}", ui::articles_table(articles, ui::terminal_width()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::parse_from(["bloodless-digest"]);
        assert_eq!(cli.verbose, 0);
        assert!(!cli.quiet);
        assert_eq!(cli.output, OutputFormat::Auto);
        assert!(cli.data_dir.is_none());
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_verbose_flag() {
        let cli = Cli::parse_from(["bloodless-digest", "-vv", "status"]);
        assert_eq!(cli.verbose, 2);

        let cli = Cli::parse_from(["bloodless-digest", "status", "--verbose"]);
        assert_eq!(cli.verbose, 1);
    }

    #[test]
    fn test_cli_output_format() {
        let cli = Cli::parse_from(["bloodless-digest", "-o", "json", "status"]);
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.output.resolve(), OutputFormat::Json);
    }

    #[test]
    fn test_cli_search_queries() {
        let cli = Cli::parse_from([
            "bloodless-digest",
            "search",
            "--query",
            "bloodless surgery",
            "-Q",
            "cirurgia sem sangue",
        ]);
        match cli.command {
            Some(Commands::Search { queries }) => {
                assert_eq!(queries, vec!["bloodless surgery", "cirurgia sem sangue"]);
            }
            _ => panic!("Expected Search command"),
        }
    }

    #[test]
    fn test_cli_scheduled_flags() {
        let cli = Cli::parse_from(["bloodless-digest", "scheduled", "--force", "--no-email"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Scheduled {
                force: true,
                no_email: true
            })
        ));
    }

    #[test]
    fn test_cli_send_recipients() {
        let cli = Cli::parse_from(["bloodless-digest", "send", "--to", "a@example.org", "-t", "b@example.org"]);
        match cli.command {
            Some(Commands::Send { recipients }) => assert_eq!(recipients.len(), 2),
            _ => panic!("Expected Send command"),
        }
    }

    #[test]
    fn test_cli_serve_command() {
        let cli = Cli::parse_from(["bloodless-digest", "serve"]);
        match cli.command {
            Some(Commands::Serve { http, schedule }) => {
                assert!(http.is_none());
                assert!(!schedule);
            }
            _ => panic!("Expected Serve command"),
        }

        let cli = Cli::parse_from(["bloodless-digest", "serve", "--http", "127.0.0.1:3000", "--schedule"]);
        match cli.command {
            Some(Commands::Serve { http, schedule }) => {
                assert_eq!(http.as_deref(), Some("127.0.0.1:3000"));
                assert!(schedule);
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_cli_data_dir_is_global() {
        let cli = Cli::parse_from(["bloodless-digest", "status", "--data-dir", "/tmp/digest"]);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/digest")));
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }
}
