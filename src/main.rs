//! Scene Links CLI - replay link scenarios

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fs;

use scene_links::scenario::{Scenario, ScenarioReport};
use scene_links::{FixSuggestion, LinkError, RendererEventKind};

#[derive(Parser)]
#[command(name = "scene-links")]
#[command(about = "Scene Links - cross-scene link registry scenarios")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario file and print events and links
    Run {
        /// Path to scenario .yaml file
        file: String,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a scenario file (parse only)
    Validate {
        /// Path to scenario .yaml file
        file: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { file, json } => run_scenario(&file, json),
        Commands::Validate { file } => validate_scenario(&file),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

fn load(file: &str) -> Result<Scenario, LinkError> {
    let yaml = fs::read_to_string(file)?;
    Scenario::from_yaml(&yaml)
}

fn run_scenario(file: &str, json: bool) -> Result<(), LinkError> {
    let scenario = load(file)?;
    let report = scenario.run();

    if json {
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| LinkError::Scenario(format!("cannot serialize report: {e}")))?;
        println!("{out}");
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &ScenarioReport) {
    println!("{}", "Steps:".cyan().bold());
    for step in &report.steps {
        match &step.error {
            None => println!("  {} {:>3}. {}", "✓".green(), step.step, step.command),
            Some(error) => {
                println!("  {} {:>3}. {}", "✗".red(), step.step, step.command);
                println!("         {}", error.red());
            }
        }
    }

    println!("{}", "Events:".cyan().bold());
    for event in &report.events {
        let name = if event.kind.is_failure() {
            event.kind.name().red()
        } else {
            event.kind.name().normal()
        };
        match &event.kind {
            RendererEventKind::SceneDataLinked { provider, consumer } => {
                println!("  #{} {} {} -> {}", event.id, name, provider, consumer)
            }
            RendererEventKind::SceneDataSlotProviderDestroyed { provider } => {
                println!("  #{} {} {}", event.id, name, provider)
            }
            other => match other.consumer() {
                Some(consumer) => println!("  #{} {} {}", event.id, name, consumer),
                None => println!("  #{} {}", event.id, name),
            },
        }
    }

    println!("{}", "Links:".cyan().bold());
    if report.links.is_empty() {
        println!("  (none)");
    }
    for link in &report.links {
        println!("  [{}] {} -> {}", link.payload, link.provider, link.consumer);
    }

    println!("{}", "Values:".cyan().bold());
    for value in &report.data {
        println!("  {}/{} = {}", value.scene, value.data, value.value);
    }

    let failed = report.failed_steps();
    if failed == 0 {
        println!("{} {} steps", "✓".green(), report.steps.len());
    } else {
        println!(
            "{} {} steps, {} rejected",
            "!".yellow(),
            report.steps.len(),
            failed
        );
    }
}

fn validate_scenario(file: &str) -> Result<(), LinkError> {
    let scenario = load(file)?;

    println!("{} Scenario '{}' is valid", "✓".green(), file);
    if let Some(description) = &scenario.description {
        println!("  Description: {}", description);
    }
    println!("  Scenes: {}", scenario.scenes.len());
    println!("  Commands: {}", scenario.commands.len());

    Ok(())
}
