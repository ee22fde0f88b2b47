use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use graygate::config::settings::EngineSettings;
use graygate::gray::expression::Sandbox;
use graygate::gray::hash::{bucket, stable_hash};
use graygate::gray::schema::GrayConfig;
use graygate::gray::RequestAttributes;
use graygate::observability::logging::init_logging;
use graygate::GrayRegistry;

#[derive(Parser)]
#[command(name = "graygate")]
#[command(about = "Inspect and evaluate gray release configuration", long_about = None)]
struct Cli {
    /// Engine settings file (TOML). Defaults plus environment overrides when absent.
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    /// Override the file source root.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the cohort and gate for one caller
    Eval(Target),
    /// Print every rule verdict for one caller
    Explain(Target),
    /// List enabled features of a business
    Features {
        #[arg(long)]
        business: String,
    },
    /// Parse and validate a gray document
    Validate { file: PathBuf },
    /// Print the hash and bucket of an identity
    Hash { identity: String },
    /// Load the configuration and log updates until Ctrl-C
    Watch,
}

#[derive(Args)]
struct Target {
    #[arg(long)]
    business: String,
    #[arg(long)]
    feature: String,
    #[arg(long)]
    identity: String,
    #[arg(long, default_value = "")]
    device: String,
    #[arg(long, default_value = "")]
    platform: String,
    #[arg(long, default_value = "")]
    app_type: String,
    #[arg(long, default_value = "")]
    version: String,
}

impl Target {
    fn attributes(&self) -> RequestAttributes {
        RequestAttributes::new(self.identity.as_str())
            .with_device(&self.device)
            .with_platform(&self.platform)
            .with_app_type(&self.app_type)
            .with_version(self.version.as_str())
            .with_business(self.business.as_str())
    }
}

fn load_settings(cli: &Cli) -> Result<EngineSettings, Box<dyn std::error::Error>> {
    let settings = match &cli.settings {
        Some(path) => EngineSettings::load(path)?,
        None => EngineSettings::default(),
    };
    let mut settings = settings.with_env_overrides();
    if let Some(root) = &cli.root {
        settings.source.root = root.clone();
    }
    settings.validate()?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    if let Err(e) = init_logging(&settings.logging) {
        eprintln!("Warning: logging already initialized: {e}");
    }

    match &cli.command {
        Commands::Eval(target) => {
            let decision = GrayRegistry::from_settings(&settings)?.decision();
            let attrs = target.attributes();
            let cohort = decision.cohort(&target.business, &target.feature, &attrs);
            let gate = decision.gate(&target.business, &target.feature, &attrs);
            println!("cohort={cohort} gate={gate}");
        }
        Commands::Explain(target) => {
            let decision = GrayRegistry::from_settings(&settings)?.decision();
            let attrs = target.attributes();
            match decision.explain(&target.business, &target.feature, &attrs) {
                None => println!(
                    "{}.{} is not configured (gate open, cohort a)",
                    target.business, target.feature
                ),
                Some(traces) if traces.is_empty() => {
                    println!("{}.{} is disabled (cohort a)", target.business, target.feature)
                }
                Some(traces) => {
                    for trace in traces {
                        println!(
                            "rule[{}] -> {}: {}{}",
                            trace.index,
                            trace.target_group,
                            trace.verdict,
                            if trace.matched { " (selected)" } else { "" }
                        );
                    }
                }
            }
        }
        Commands::Features { business } => {
            let decision = GrayRegistry::from_settings(&settings)?.decision();
            for feature in decision.list_enabled_features(business) {
                println!("{feature}");
            }
        }
        Commands::Validate { file } => {
            let raw = std::fs::read(file)?;
            let mut config = GrayConfig::from_slice(&raw)?;
            if let Err(errors) = config.prepare(&Sandbox::new()) {
                for error in &errors {
                    eprintln!("{error}");
                }
                return Err(format!("{} validation error(s) in {}", errors.len(), file.display()).into());
            }
            println!("{} is valid", file.display());
        }
        Commands::Hash { identity } => {
            println!(
                "hash={:#018x} bucket={}",
                stable_hash(identity),
                bucket(identity)
            );
        }
        Commands::Watch => {
            let registry = GrayRegistry::from_settings(&settings)?;
            registry
                .store()
                .register_listener(None, "graygate-watch", |config: &GrayConfig| {
                    tracing::info!(
                        businesses = config.businesses.len(),
                        "Stable gray config updated"
                    );
                })?;
            tracing::info!(groups = ?registry.store().groups(), "Watching for changes, press Ctrl-C to stop");

            tokio::signal::ctrl_c().await?;
            tracing::info!("Shutdown complete");
        }
    }

    Ok(())
}
