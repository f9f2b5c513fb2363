//! CLI binary for pdf-remediate.
//!
//! A thin shim over the library crate that maps CLI flags to a
//! `ClientConfig`, wires the storage/quota clients together and renders
//! progress and results in the terminal.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdf_remediate::config::ENV_PREFIX;
use pdf_remediate::processing::format_elapsed;
use pdf_remediate::report::ReportComparison;
use pdf_remediate::upload::file_name_from_object;
use pdf_remediate::{
    read_local, ClientConfig, Downloader, HttpQuotaClient, IdToken, IdentityPoolClient,
    ObjectStore, OnboardingClient, OnboardingProfile, OutputFormat, ProcessedResult,
    ProcessingOutcome, ProcessingProgressCallback, ProcessingSession, ProgressCallback, QuotaApi,
    ReportFetcher, S3Store, StorageCredentials, UploadController, UsageSnapshot,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// Terminal progress callback: one spinner showing the elapsed clock, the
/// current cosmetic step and the check counter.
struct CliProgressCallback {
    bar: ProgressBar,
    step: Mutex<String>,
    attempt: AtomicU32,
    max_attempts: AtomicU32,
}

impl CliProgressCallback {
    fn new(first_step: &str) -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix(format_elapsed(0));
        bar.set_message(first_step.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            step: Mutex::new(first_step.to_string()),
            attempt: AtomicU32::new(0),
            max_attempts: AtomicU32::new(0),
        })
    }

    fn refresh(&self) {
        let step = self.step.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let attempt = self.attempt.load(Ordering::SeqCst);
        if attempt == 0 {
            self.bar.set_message(step);
        } else {
            let max = self.max_attempts.load(Ordering::SeqCst);
            self.bar
                .set_message(format!("{step}  {}", dim(&format!("check {attempt}/{max}"))));
        }
    }
}

impl ProcessingProgressCallback for CliProgressCallback {
    fn on_elapsed(&self, elapsed_secs: u64) {
        self.bar.set_prefix(format_elapsed(elapsed_secs));
    }

    fn on_step(&self, _index: usize, title: &str) {
        *self.step.lock().unwrap_or_else(|e| e.into_inner()) = title.to_string();
        self.refresh();
    }

    fn on_attempt(&self, attempt: u32, max_attempts: u32) {
        self.attempt.store(attempt, Ordering::SeqCst);
        self.max_attempts.store(max_attempts, Ordering::SeqCst);
        self.refresh();
    }

    fn on_attempt_failed(&self, attempt: u32, error: &str) {
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} check {:>3}  {}", yellow("!"), attempt, dim(&msg)));
    }

    fn on_ready(&self, result: &ProcessedResult) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} Remediation complete  {}",
            green("✔"),
            dim(&result.processing_time_label())
        );
    }

    fn on_timed_out(&self, attempts: u32) {
        // Leave the spinner frozen on the last step.
        self.bar.abandon();
        eprintln!(
            "{} No output after {} checks",
            red("✘"),
            bold(&attempts.to_string())
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Check which formats this deployment serves
  remediate status

  # Show your usage and limits
  remediate --token "$ID_TOKEN" usage

  # Upload, wait for the accessible PDF and save it next to you
  remediate --token "$ID_TOKEN" upload report.pdf -o .

  # Convert to HTML instead (delivered as a ZIP)
  remediate --token "$ID_TOKEN" upload --format html report.pdf -o out/

  # Upload and show the before/after accessibility reports
  remediate --token "$ID_TOKEN" upload --reports report.pdf

  # Re-fetch the reports of an earlier upload
  remediate --token "$ID_TOKEN" report jane_example_com_20240309070501042_report.pdf

  # Complete the first sign-in profile
  remediate --token "$ID_TOKEN" register --organization "Acme University" --country US

ENVIRONMENT VARIABLES:
  PDF_REMEDIATE_ID_TOKEN           ID token from the hosted sign-in
  PDF_REMEDIATE_REGION             Region of buckets and identity pool (default us-east-1)
  PDF_REMEDIATE_PDF_BUCKET         Bucket for PDF → PDF ("Null" or empty = unavailable)
  PDF_REMEDIATE_HTML_BUCKET        Bucket for PDF → HTML ("Null" or empty = unavailable)
  PDF_REMEDIATE_QUOTA_API          Quota endpoint
  PDF_REMEDIATE_FIRST_SIGN_IN_API  First sign-in profile endpoint
  PDF_REMEDIATE_IDENTITY_POOL_ID   Identity pool for storage credentials
  PDF_REMEDIATE_AUTHORITY          Token issuer URL
  PDF_REMEDIATE_S3_ENDPOINT        Path-style storage endpoint override
  PDF_REMEDIATE_MAINTENANCE_MODE   "true" refuses every action
  AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY / AWS_SESSION_TOKEN
                                   Static storage credentials when no identity pool is set
"#;

/// Upload PDFs to the accessibility remediation service and fetch the results.
#[derive(Parser, Debug)]
#[command(
    name = "remediate",
    version,
    about = "Upload PDFs for accessibility remediation and download the results",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    conn: ConnectionArgs,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true, env = "PDF_REMEDIATE_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, global = true, env = "PDF_REMEDIATE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF_REMEDIATE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, global = true, env = "PDF_REMEDIATE_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ConnectionArgs {
    /// ID token issued by the hosted sign-in.
    #[arg(long, global = true, env = "PDF_REMEDIATE_ID_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[arg(long, global = true, env = "PDF_REMEDIATE_REGION")]
    region: Option<String>,

    #[arg(long, global = true, env = "PDF_REMEDIATE_PDF_BUCKET")]
    pdf_bucket: Option<String>,

    #[arg(long, global = true, env = "PDF_REMEDIATE_HTML_BUCKET")]
    html_bucket: Option<String>,

    #[arg(long, global = true, env = "PDF_REMEDIATE_QUOTA_API")]
    quota_api: Option<String>,

    #[arg(long, global = true, env = "PDF_REMEDIATE_FIRST_SIGN_IN_API")]
    first_sign_in_api: Option<String>,

    #[arg(long, global = true, env = "PDF_REMEDIATE_IDENTITY_POOL_ID")]
    identity_pool_id: Option<String>,

    #[arg(long, global = true, env = "PDF_REMEDIATE_AUTHORITY")]
    authority: Option<String>,

    #[arg(long, global = true, env = "PDF_REMEDIATE_S3_ENDPOINT")]
    s3_endpoint: Option<String>,

    /// "true" puts the client in maintenance mode.
    #[arg(long, global = true, env = "PDF_REMEDIATE_MAINTENANCE_MODE")]
    maintenance_mode: Option<String>,

    /// HTTP timeout in seconds.
    #[arg(long, global = true, env = "PDF_REMEDIATE_HTTP_TIMEOUT", default_value_t = 30)]
    http_timeout: u64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate, upload and wait for the remediated output.
    Upload {
        /// PDF to upload.
        file: PathBuf,

        /// Output format: pdf or html.
        #[arg(long, default_value = "pdf")]
        format: OutputFormat,

        /// Save the result to this file or directory.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stop after the upload instead of waiting for the output.
        #[arg(long)]
        no_wait: bool,

        /// Show the before/after accessibility reports (PDF format only).
        #[arg(long)]
        reports: bool,
    },
    /// Show usage counters and limits.
    Usage,
    /// Show which formats are available and whether maintenance is on.
    Status,
    /// Fetch and compare the accessibility reports of an upload.
    Report {
        /// Generated object name of the upload, e.g. jane_example_com_20240309070501042_report.pdf.
        object_name: String,

        /// File name shown for downloads. Defaults to the part after the timestamp.
        #[arg(long)]
        original_name: Option<String>,
    },
    /// Submit the first sign-in profile.
    Register {
        #[arg(long)]
        organization: String,
        /// ISO country code.
        #[arg(long)]
        country: Option<String>,
        /// ISO state/subdivision code.
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        city: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the spinner is active; the
    // spinner provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli.conn)?;

    if let Command::Status = cli.command {
        return print_status(&config, cli.json);
    }
    if config.maintenance_mode {
        bail!(pdf_remediate::RemediateError::Maintenance);
    }

    let token = parse_token(&cli.conn)?;

    match cli.command {
        Command::Usage => {
            let quota = HttpQuotaClient::new(&config).context("Quota service unavailable")?;
            let usage = quota
                .check(&token, OutputFormat::Pdf)
                .await
                .context("Failed to fetch usage")?;
            print_usage(&usage, cli.json)?;
        }
        Command::Register {
            organization,
            country,
            state,
            city,
        } => {
            let client = OnboardingClient::new(&config).context("Sign-in API unavailable")?;
            let profile = OnboardingProfile {
                organization,
                country,
                state,
                city,
            };
            client
                .submit(&token, &profile)
                .await
                .context("Failed to submit profile")?;
            if !cli.quiet {
                eprintln!(
                    "{} Welcome aboard! You can now start exploring the app and all its features.",
                    green("✔")
                );
            }
        }
        Command::Report {
            object_name,
            original_name,
        } => {
            let store = storage(&config, &token)
                .await
                .context("Storage credentials not available")?;
            let original = original_name
                .unwrap_or_else(|| file_name_from_object(&object_name).to_string());
            show_reports(&config, store, &object_name, &original, cli.json).await?;
        }
        Command::Upload {
            file,
            format,
            output,
            no_wait,
            reports,
        } => {
            let store = storage(&config, &token)
                .await
                .context("Storage credentials not available")?;
            let quota: Arc<dyn QuotaApi> =
                Arc::new(HttpQuotaClient::new(&config).context("Quota service unavailable")?);
            let usage = quota
                .check(&token, format)
                .await
                .context("Failed to fetch usage")?;

            let selected = read_local(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let controller = UploadController::new(config.clone(), store.clone(), quota);
            let receipt = controller
                .upload(&token, selected, format, &usage)
                .await
                .context("Upload failed")?;

            if cli.json && no_wait {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&receipt).context("Failed to serialise receipt")?
                );
                return Ok(());
            }
            if !cli.quiet {
                eprintln!(
                    "{} Uploaded {} ({} MB, {} pages)  {}",
                    cyan("◆"),
                    bold(receipt.original_name()),
                    receipt.task.display_size_mb(),
                    receipt.task.page_count,
                    dim(&receipt.object_key)
                );
                if let Some(ref u) = receipt.usage {
                    eprintln!(
                        "   {}",
                        dim(&format!(
                            "{}/{} uploads used",
                            u.current_usage, u.max_files_allowed
                        ))
                    );
                }
            }
            if no_wait {
                println!("{}", receipt.object_name);
                return Ok(());
            }

            // ── Wait for the output ──────────────────────────────────────
            let mut session = ProcessingSession::new(&config, store.clone(), &receipt)?;
            if show_progress {
                let cb = CliProgressCallback::new(pdf_remediate::PROCESSING_STEPS[0]);
                session = session.with_callback(cb as ProgressCallback);
            }
            let result = match session.spawn().wait().await {
                ProcessingOutcome::Ready(result) => result,
                ProcessingOutcome::TimedOut { attempts } => {
                    warn!("Output for {} never appeared", receipt.object_name);
                    bail!(
                        "Timed out after {} checks. Re-run `remediate report {}` later, or contact support.",
                        attempts,
                        receipt.object_name
                    );
                }
                ProcessingOutcome::Cancelled => bail!("Processing was cancelled"),
            };

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&result).context("Failed to serialise result")?
                );
            } else {
                println!("{}", result.download_url);
                if !cli.quiet && !show_progress {
                    eprintln!("Processing time: {}", result.processing_time_label());
                }
            }

            if let Some(dest) = output {
                let downloader = Downloader::new(&config)?;
                let (path, bytes) = downloader
                    .save(&result, &dest)
                    .await
                    .context("Download failed")?;
                if !cli.quiet {
                    eprintln!(
                        "{} {} bytes  →  {}",
                        green("✔"),
                        bytes,
                        bold(&path.display().to_string())
                    );
                }
            }

            if reports {
                if format == OutputFormat::Pdf {
                    show_reports(
                        &config,
                        store,
                        &receipt.object_name,
                        receipt.sanitized_name(),
                        cli.json,
                    )
                    .await?;
                } else if !cli.quiet {
                    eprintln!("{}", dim("Accessibility reports are only produced for PDF output."));
                }
            }
        }
        Command::Status => unreachable!("handled above"),
    }

    Ok(())
}

/// Map CLI args to `ClientConfig` through the same rules as `from_env`.
fn build_config(args: &ConnectionArgs) -> Result<ClientConfig> {
    let values: HashMap<String, String> = [
        ("REGION", &args.region),
        ("PDF_BUCKET", &args.pdf_bucket),
        ("HTML_BUCKET", &args.html_bucket),
        ("QUOTA_API", &args.quota_api),
        ("FIRST_SIGN_IN_API", &args.first_sign_in_api),
        ("IDENTITY_POOL_ID", &args.identity_pool_id),
        ("AUTHORITY", &args.authority),
        ("S3_ENDPOINT", &args.s3_endpoint),
        ("MAINTENANCE_MODE", &args.maintenance_mode),
    ]
    .into_iter()
    .filter_map(|(k, v)| v.as_ref().map(|v| (format!("{ENV_PREFIX}{k}"), v.clone())))
    .collect();

    let mut config =
        ClientConfig::from_lookup(|key| values.get(key).cloned()).context("Invalid configuration")?;
    config.http_timeout_secs = args.http_timeout.max(1);
    Ok(config)
}

fn parse_token(args: &ConnectionArgs) -> Result<IdToken> {
    let raw = args
        .token
        .as_deref()
        .context("An ID token is required (--token or PDF_REMEDIATE_ID_TOKEN). Are you logged in?")?;
    let token = IdToken::parse(raw).context("Failed to read ID token")?;
    if token.is_expired_at(chrono::Utc::now()) {
        warn!("ID token has expired; requests will likely be rejected");
    }
    if token.is_first_sign_in() {
        eprintln!(
            "{} Complete your profile first: remediate register --organization <name>",
            yellow("!")
        );
    }
    Ok(token)
}

/// Storage client with credentials from the identity pool or `AWS_*`.
///
/// A failed exchange is only logged; commands that need storage then stop.
async fn storage(config: &ClientConfig, token: &IdToken) -> Option<Arc<dyn ObjectStore>> {
    let creds = if config.identity_pool_id.is_some() {
        let exchanged = match IdentityPoolClient::new(config).await {
            Ok(client) => client.credentials_for(token).await,
            Err(e) => Err(e),
        };
        match exchanged {
            Ok(c) => Some(c),
            Err(e) => {
                warn!("Error fetching storage credentials: {}", e);
                None
            }
        }
    } else {
        StorageCredentials::from_env()
    };
    let creds = creds?;

    match S3Store::new(config, creds) {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!("Storage client unavailable: {}", e);
            None
        }
    }
}

fn print_status(config: &ClientConfig, json: bool) -> Result<()> {
    let avail = config.availability();
    if json {
        let value = serde_json::json!({
            "maintenanceMode": config.maintenance_mode,
            "pdf": avail.pdf,
            "html": avail.html,
            "needsFullDeployment": avail.needs_full_deployment(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if config.maintenance_mode {
        println!("{} The service is under maintenance.", yellow("!"));
    }
    for format in [OutputFormat::Pdf, OutputFormat::Html] {
        let mark = if avail.is_available(format) {
            green("available")
        } else {
            red("not configured")
        };
        println!("{:<12} {}", format.flow_label(), mark);
    }
    if avail.needs_full_deployment() {
        println!(
            "{}",
            dim("Backend infrastructure not deployed. Please deploy the backend first.")
        );
    }
    Ok(())
}

fn print_usage(usage: &UsageSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(usage)?);
        return Ok(());
    }
    println!(
        "Uploads:     {}/{}  ({} remaining)",
        usage.current_usage,
        usage.max_files_allowed,
        usage.remaining()
    );
    println!("  PDF → PDF:  {}", usage.pdf2pdf_count);
    println!("  PDF → HTML: {}", usage.pdf2html_count);
    println!("Max pages:   {}", usage.max_pages_allowed);
    println!("Max size:    {} MB", usage.max_size_allowed_mb);
    Ok(())
}

async fn show_reports(
    config: &ClientConfig,
    store: Arc<dyn ObjectStore>,
    object_name: &str,
    original_name: &str,
    json: bool,
) -> Result<()> {
    let fetcher = ReportFetcher::new(config, store).context("Reports unavailable")?;
    let pair = fetcher.fetch_both(object_name, original_name).await;
    let comparison = pair.comparison();

    if json {
        let value = serde_json::json!({
            "beforeUrl": pair.before.as_ref().ok().map(|r| &r.download_url),
            "afterUrl": pair.after.as_ref().ok().map(|r| &r.download_url),
            "comparison": comparison,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    for (label, fetched) in [("Before", &pair.before), ("After", &pair.after)] {
        match fetched {
            Ok(r) => println!(
                "{} report  {}\n  {}",
                bold(label),
                dim(&r.download_filename),
                r.download_url
            ),
            Err(e) => println!("{} report  {}", bold(label), red(&e.to_string())),
        }
    }
    if comparison.is_empty() {
        bail!("Neither accessibility report is available yet");
    }
    print!("{}", render_comparison(&comparison));
    Ok(())
}

/// Colour by status, padding first so escape codes don't skew the columns.
fn colour_status(status: &str) -> String {
    let padded = format!("{status:<8}");
    match status {
        "Passed" => green(&padded),
        "Failed" => red(&padded),
        _ => yellow(&padded),
    }
}

fn render_comparison(cmp: &ReportComparison) -> String {
    let mut out = String::new();

    out.push('\n');
    for (label, summary) in [("Before", &cmp.before_summary), ("After", &cmp.after_summary)] {
        if let Some(s) = summary {
            out.push_str(&format!(
                "{} Summary  {}  passed {}  failed {}  manual {}\n",
                bold(label),
                dim(&s.description),
                green(&s.passed.to_string()),
                red(&s.failed.to_string()),
                yellow(&s.needs_manual_check.to_string()),
            ));
        }
    }

    for category in &cmp.categories {
        out.push_str(&format!("\n{}\n", cyan(&category.name)));
        let width = category
            .rows
            .iter()
            .map(|r| r.rule.chars().count())
            .max()
            .unwrap_or(4)
            .max(4);
        out.push_str(&dim(&format!(
            "  {:<width$}  {:<8}  {:<8}  Description\n",
            "Rule", "Before", "After"
        )));
        for row in &category.rows {
            out.push_str(&format!(
                "  {:<width$}  {}  {}  {}\n",
                row.rule,
                colour_status(row.before_label()),
                colour_status(row.after_label()),
                dim(row.description.as_deref().unwrap_or("")),
            ));
        }
    }
    out
}
