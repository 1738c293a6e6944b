use anyhow::Result;
use clap::Parser;
use class_shade::assemble::write_shaded_jar;
use class_shade::cli::{Cli, Commands, OutputFormat};
use class_shade::config::resolve_config;
use class_shade::input::load_inputs;
use class_shade::logging::init_logging;
use class_shade::shade::{ShadePlan, ShadeSession, classify_names};
use serde::Serialize;
use std::time::Instant;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = resolve_config(&cli)?;

    match cli.command.clone() {
        Commands::Classify { class_names } => {
            let result = classify_names(&config, &class_names);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Plan { inputs, format } => {
            let entries = load_inputs(&inputs)?;
            let session = ShadeSession::scan(&config, entries);
            print!("{}", render_plan(&session.plan(), format)?);
        }
        Commands::Build { inputs, output } => {
            let start = Instant::now();
            let entries = load_inputs(&inputs)?;
            let session = ShadeSession::scan(&config, entries);
            let plan = session.plan();
            let summary = write_shaded_jar(&plan, &output)?;
            let result = BuildResult {
                summary,
                entry_points: plan.summary.entry_points,
                duration_ms: start.elapsed().as_millis() as u64,
            };
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct BuildResult {
    #[serde(flatten)]
    summary: class_shade::assemble::AssembleSummary,
    entry_points: usize,
    duration_ms: u64,
}

fn render_plan(plan: &ShadePlan, format: OutputFormat) -> Result<String> {
    let content = match format {
        OutputFormat::Json => {
            let mut out = serde_json::to_string_pretty(plan)?;
            out.push('\n');
            out
        }
        OutputFormat::Text => {
            let s = &plan.summary;
            let mut out = String::new();
            out.push_str(&format!("shadow_prefix: {}\n", plan.shadow_package_prefix));
            out.push_str(&format!("classes_known: {}\n", s.classes_known));
            out.push_str(&format!("classes_scanned: {}\n", s.classes_scanned));
            out.push_str(&format!("entry_points: {}\n", s.entry_points));
            out.push_str(&format!("retained: {}\n", s.retained));
            out.push_str(&format!("dropped: {}\n", s.dropped));
            out.push_str(&format!("resources: {}\n", s.resources));
            for class in &plan.retained {
                out.push_str(&format!("+ {} -> {}\n", class.class_name, class.output_path));
            }
            for name in &plan.dropped {
                out.push_str(&format!("- {name}\n"));
            }
            out
        }
    };
    Ok(content)
}
