//! Hygiene - facility cleanliness audit CLI
//!
//! The `hygiene` command runs one image through a vision provider chain and
//! the cleanliness rules, printing the resulting audit as JSON.
//!
//! ## Commands
//!
//! - `analyze`: Analyze an image file or storage locator
//! - `rules show`: Print the effective rule set as TOML
//! - `rules check`: Validate a rule file

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};

use hygiene_core::vision::fakes::StaticVisionProvider;
use hygiene_core::{
    AnalysisRequest, AnalyzeCommand, AuditResult, AuditService, CleanlinessRules,
    DetectLabelsProvider, FallbackVisionProvider, GeminiConfig, GeminiProvider, HttpImageFetcher,
    ImageFetcher, ImageMetadata, StorageLocator, VisionProvider,
};

#[derive(Parser)]
#[command(name = "hygiene")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Facility hygiene audits backed by vision providers", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one image and print the audit result as JSON
    Analyze(AnalyzeArgs),

    /// Inspect cleanliness rule files
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },
}

#[derive(Subcommand)]
enum RulesAction {
    /// Print the effective rules (defaults when no file is given)
    Show {
        #[arg(long, env = "HYGIENE_RULES")]
        rules: Option<PathBuf>,
    },

    /// Validate a rule file
    Check { path: PathBuf },
}

/// Vision backends that can appear in a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProviderKind {
    /// DetectLabels-compatible label detection service
    DetectLabels,
    /// Gemini generative classification
    Gemini,
    /// Offline provider that detects nothing
    DryRun,
}

/// Human verdict supplied with the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Verdict {
    Clean,
    NotClean,
}

impl Verdict {
    fn is_clean(self) -> bool {
        matches!(self, Self::Clean)
    }
}

#[derive(clap::Args, Debug)]
struct AnalyzeArgs {
    /// Image file to analyze
    #[arg(conflicts_with = "locator", required_unless_present = "locator")]
    image: Option<PathBuf>,

    /// Analyze by reference instead (s3://bucket/key or http(s) URL)
    #[arg(long)]
    locator: Option<String>,

    /// Ordered provider chain; the first entry is the primary
    #[arg(
        long,
        env = "HYGIENE_PROVIDERS",
        value_enum,
        value_delimiter = ',',
        default_value = "detect-labels,gemini"
    )]
    providers: Vec<ProviderKind>,

    /// Endpoint of the DetectLabels service
    #[arg(long, env = "HYGIENE_DETECT_LABELS_URL")]
    detect_labels_url: Option<String>,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,

    #[arg(long, env = "GEMINI_MODEL")]
    gemini_model: Option<String>,

    /// Rule file (TOML); built-in defaults when omitted
    #[arg(long, env = "HYGIENE_RULES")]
    rules: Option<PathBuf>,

    /// Per-request HTTP timeout for each provider
    #[arg(long, env = "HYGIENE_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    /// Deadline for the whole chain, across all providers
    #[arg(long)]
    deadline_secs: Option<u64>,

    #[arg(long, default_value_t = hygiene_core::vision::DEFAULT_MAX_LABELS)]
    max_labels: usize,

    #[arg(long, default_value_t = hygiene_core::vision::DEFAULT_MIN_CONFIDENCE)]
    min_confidence: f64,

    /// Reviewer verdict that bypasses label analysis
    #[arg(long = "override", value_enum)]
    manual_override: Option<Verdict>,

    #[arg(long, default_value = "unknown-dealer")]
    dealer: String,

    #[arg(long, default_value = "unknown-checkpoint")]
    checkpoint: String,

    #[arg(long, default_value = "cli")]
    uploader: String,

    /// Image width in pixels, if known
    #[arg(long, requires = "height")]
    width: Option<u32>,

    /// Image height in pixels, if known
    #[arg(long, requires = "width")]
    height: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    hygiene_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Analyze(args) => {
            let audit = cmd_analyze(&args).await?;
            println!("{}", serde_json::to_string_pretty(&audit)?);
            Ok(())
        }
        Commands::Rules { action } => match action {
            RulesAction::Show { rules } => {
                print!("{}", cmd_rules_show(rules.as_deref())?);
                Ok(())
            }
            RulesAction::Check { path } => cmd_rules_check(&path),
        },
    }
}

/// Load a rule file, or the defaults.
fn load_rules(path: Option<&Path>) -> Result<CleanlinessRules> {
    match path {
        Some(path) => CleanlinessRules::load(path)
            .with_context(|| format!("Failed to load rules from {}", path.display())),
        None => Ok(CleanlinessRules::default()),
    }
}

/// Build the provider chain once, in the configured order.
fn build_chain(args: &AnalyzeArgs) -> Result<FallbackVisionProvider> {
    if args.providers.is_empty() {
        bail!("at least one provider is required");
    }

    let timeout = Duration::from_secs(args.timeout_secs);
    let fetcher: Arc<dyn ImageFetcher> =
        Arc::new(HttpImageFetcher::new(timeout).context("Failed to create image fetcher")?);

    let mut providers: Vec<Arc<dyn VisionProvider>> = Vec::with_capacity(args.providers.len());
    for kind in &args.providers {
        let provider: Arc<dyn VisionProvider> = match kind {
            ProviderKind::DetectLabels => {
                let url = args
                    .detect_labels_url
                    .as_deref()
                    .context("detect-labels provider needs --detect-labels-url or HYGIENE_DETECT_LABELS_URL")?;
                Arc::new(
                    DetectLabelsProvider::new(url, timeout)
                        .context("Failed to create detect-labels provider")?
                        .with_fetcher(fetcher.clone()),
                )
            }
            ProviderKind::Gemini => {
                let key = args
                    .gemini_api_key
                    .as_deref()
                    .context("gemini provider needs --gemini-api-key or GEMINI_API_KEY")?;
                let mut config = GeminiConfig::new(key).with_request_timeout(timeout);
                if let Some(model) = &args.gemini_model {
                    config = config.with_model(model.clone());
                }
                Arc::new(
                    GeminiProvider::new(config)
                        .context("Failed to create gemini provider")?
                        .with_fetcher(fetcher.clone()),
                )
            }
            ProviderKind::DryRun => Arc::new(StaticVisionProvider::empty("dry-run")),
        };
        providers.push(provider);
    }

    let chain = FallbackVisionProvider::new(providers).context("Failed to build provider chain")?;
    Ok(match args.deadline_secs {
        Some(secs) => chain.with_deadline(Duration::from_secs(secs)),
        None => chain,
    })
}

impl ProviderKind {
    /// Whether this backend can analyze an object-store locator as configured here.
    fn reads_object_locators(self) -> bool {
        match self {
            Self::DetectLabels | Self::DryRun => true,
            // only an HTTP fetcher is wired in
            Self::Gemini => false,
        }
    }
}

/// Refuse object locators no provider in the chain can read, and warn about
/// providers that would only fail on them.
fn check_locator_support(args: &AnalyzeArgs) -> Result<()> {
    let Some(locator) = &args.locator else {
        return Ok(());
    };
    if !matches!(locator.parse::<StorageLocator>(), Ok(StorageLocator::Object { .. })) {
        return Ok(());
    }

    if !args.providers.iter().any(|kind| kind.reads_object_locators()) {
        bail!(
            "no provider in the chain can read object locator '{locator}'; \
             add detect-labels or pass an http(s) URL"
        );
    }
    for kind in args.providers.iter().filter(|k| !k.reads_object_locators()) {
        warn!(provider = ?kind, locator = %locator, "provider cannot read object locators and will fail for this one");
    }
    Ok(())
}

fn guess_content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

/// Turn arguments into a validated-shape command (the service validates values).
fn build_command(args: &AnalyzeArgs) -> Result<AnalyzeCommand> {
    let now = Utc::now();
    let mut command = match (&args.image, &args.locator) {
        (Some(path), _) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read image {}", path.display()))?;
            let metadata = ImageMetadata::new(
                &args.dealer,
                &args.checkpoint,
                &args.uploader,
                path.display().to_string(),
                0,
                now,
            )
            .with_content_type(guess_content_type(path))
            .with_content_digest_of(&bytes);
            AnalyzeCommand::from_bytes(with_dimensions(metadata, args), bytes)
        }
        (None, Some(locator)) => {
            let parsed: StorageLocator = locator
                .parse()
                .with_context(|| format!("Invalid locator '{locator}'"))?;
            let metadata =
                ImageMetadata::new(&args.dealer, &args.checkpoint, &args.uploader, locator, 0, now);
            AnalyzeCommand::from_reference(with_dimensions(metadata, args), parsed)
        }
        (None, None) => bail!("either an image path or --locator is required"),
    };

    command = command.with_request(AnalysisRequest::new(args.max_labels, args.min_confidence));
    if let Some(verdict) = args.manual_override {
        command = command.with_manual_override(verdict.is_clean());
    }
    Ok(command)
}

fn with_dimensions(metadata: ImageMetadata, args: &AnalyzeArgs) -> ImageMetadata {
    match (args.width, args.height) {
        (Some(w), Some(h)) => metadata.with_dimensions(w, h),
        _ => metadata,
    }
}

/// Analyze one image through the configured chain.
async fn cmd_analyze(args: &AnalyzeArgs) -> Result<AuditResult> {
    let rules = load_rules(args.rules.as_deref())?;
    check_locator_support(args)?;
    let chain = Arc::new(build_chain(args)?);
    let service = AuditService::new(chain.clone(), rules);

    info!(version = hygiene_core::VERSION, chain = %chain.provider_name(), "hygiene analyze");
    let command = build_command(args)?;
    let outcome = service.execute(command).await;
    chain.stats().flush(&chain.provider_name());

    let audit = outcome.context("Cleanliness analysis failed")?;
    info!(
        audit_id = %audit.audit_id(),
        status = %audit.status(),
        confidence = %audit.overall_confidence(),
        "audit complete"
    );
    Ok(audit)
}

/// Render the effective rules as TOML.
fn cmd_rules_show(path: Option<&Path>) -> Result<String> {
    let rules = load_rules(path)?;
    rules.to_toml_string().context("Failed to render rules")
}

/// Validate a rule file and print a one-line summary.
fn cmd_rules_check(path: &Path) -> Result<()> {
    let rules = load_rules(Some(path))?;
    println!(
        "✓ {}: threshold {}, {} negative terms, max negatives {}, review on low confidence: {}",
        path.display(),
        rules.confidence_threshold(),
        rules.negative_vocabulary().len(),
        rules.max_negative_labels(),
        rules.review_on_low_confidence()
    );
    Ok(())
}
