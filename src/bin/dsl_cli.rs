//! DSL Command Line Interface
//!
//! Parse DSL text, validate it against a domain, or show the execution plan
//! the orchestrator would build for a request.
//!
//! # Usage
//!
//! ```bash
//! # Parse DSL and list verbs / attribute ids
//! echo '(case.create (cbu.id "CBU-1"))' | dsl_cli parse
//!
//! # Validate against a domain (grammar, verbs, transitions)
//! dsl_cli validate --domain onboarding --file case.dsl
//!
//! # Plan a multi-domain workflow
//! dsl_cli plan --entity-type TRUST --jurisdiction LU --product CUSTODY
//! ```

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use ob_poc_dsl::domains::standard_registry;
use ob_poc_dsl::orchestration::{Orchestrator, OrchestrationRequest};
use ob_poc_dsl::{parse, OrchestratorConfig};

#[derive(Parser)]
#[command(name = "dsl_cli")]
#[command(author = "ob-poc")]
#[command(version = "0.1.0")]
#[command(about = "Parse, validate and plan onboarding DSL documents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, short = 'o', global = true, default_value = "text", value_enum)]
    format: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse DSL source (no validation)
    Parse {
        /// Input file (reads stdin if not provided)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Validate DSL source against a domain
    Validate {
        #[arg(short, long)]
        file: Option<PathBuf>,

        #[arg(short, long, default_value = "onboarding")]
        domain: String,

        /// State the document continues from
        #[arg(long)]
        from_state: Option<String>,

        /// Also check verb arguments
        #[arg(long)]
        strict: bool,
    },

    /// Show the execution plan for a request
    Plan {
        #[arg(long)]
        entity_type: Option<String>,

        #[arg(long)]
        jurisdiction: Option<String>,

        #[arg(long = "product")]
        products: Vec<String>,

        #[arg(long)]
        workflow_type: Option<String>,

        /// YAML orchestrator config; `OB_DSL_*` variables apply otherwise
        #[arg(long, env = "OB_DSL_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ob_poc_dsl=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Parse { file } => cmd_parse(file, cli.format),
        Commands::Validate {
            file,
            domain,
            from_state,
            strict,
        } => cmd_validate(file, &domain, from_state, strict, cli.format),
        Commands::Plan {
            entity_type,
            jurisdiction,
            products,
            workflow_type,
            config,
        } => {
            let request = OrchestrationRequest {
                entity_type,
                jurisdiction,
                products,
                workflow_type,
                ..Default::default()
            };
            cmd_plan(request, config, cli.format)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn read_input(file: Option<PathBuf>) -> Result<String> {
    match file {
        Some(path) => {
            std::fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))
        }
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read stdin")?;
            Ok(buffer)
        }
    }
}

fn cmd_parse(file: Option<PathBuf>, format: OutputFormat) -> Result<()> {
    let source = read_input(file)?;
    let tree = parse(&source)?;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "success": true,
                "expressions": tree.expressions().len(),
                "verbs": tree.verbs(),
                "attribute_ids": tree.attribute_ids(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            println!("OK Parsed {} expression(s)", tree.expressions().len());
            for verb in tree.verbs() {
                println!("  verb  {}", verb);
            }
            for id in tree.attribute_ids() {
                println!("  attr  {}", id);
            }
        }
    }
    Ok(())
}

fn cmd_validate(
    file: Option<PathBuf>,
    domain: &str,
    from_state: Option<String>,
    strict: bool,
    format: OutputFormat,
) -> Result<()> {
    let source = read_input(file)?;
    let registry = standard_registry()?;
    let definition = registry.get(domain)?;

    let tree = parse(&source)?;
    if let Err(errors) = registry.grammar_engine()?.validate(&source, Some(domain)) {
        for e in &errors {
            eprintln!("grammar: {}", e);
        }
        anyhow::bail!("grammar validation failed with {} error(s)", errors.len());
    }
    let vocabulary = definition.vocabulary();
    vocabulary.validate_verbs(&tree)?;
    if strict {
        vocabulary.validate_arguments(&tree)?;
    }
    let state = vocabulary.plan_transitions(from_state.as_deref(), &tree)?;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "domain": domain,
                "from_state": from_state,
                "state": state,
                "verbs": tree.verbs(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            println!(
                "OK Valid {} document: {} -> {}",
                domain,
                from_state.as_deref().unwrap_or("(start)"),
                state.as_deref().unwrap_or("(none)")
            );
        }
    }
    Ok(())
}

fn cmd_plan(
    request: OrchestrationRequest,
    config: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let config = match config {
        Some(path) => OrchestratorConfig::from_yaml_file(path)?,
        None => OrchestratorConfig::from_env(),
    };
    let orchestrator = Orchestrator::new(standard_registry()?, config);
    let analysis = orchestrator.analyze(&request);
    let plan = orchestrator.plan(&analysis)?;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({ "analysis": analysis, "plan": plan });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            println!(
                "Primary domain: {} ({:?} complexity, tier {})",
                analysis.primary_domain, analysis.estimated_complexity, analysis.compliance_tier
            );
            for stage in &plan.stages {
                println!(
                    "  {}: {} [{}s]{}",
                    stage.name,
                    stage.domains.join(", "),
                    stage.estimated_time.as_secs(),
                    if stage.prerequisites.is_empty() {
                        String::new()
                    } else {
                        format!(" after {}", stage.prerequisites.join(", "))
                    }
                );
            }
            println!("Estimated duration: {}s", plan.estimated_duration.as_secs());
            println!("Critical path: {}", plan.critical_path().join(" -> "));
        }
    }
    Ok(())
}
