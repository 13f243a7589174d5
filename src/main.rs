// ABOUTME: Entry point for the strata CLI application.
// ABOUTME: Parses arguments, loads the project and dispatches to the offline operations.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use std::process::ExitCode;
use strata::build_info::BuildInfo;
use strata::config::{ClusterSpec, CompiledCluster, compile};
use strata::error::{Error, Result};
use strata::output::{Output, OutputMode};
use strata::plugin::{DirPluginSource, PluginSource};
use strata::provision::{Rendered, Run};
use strata::render::{SkeletonRenderer, TemplateDirRenderer, TemplateRenderer, stack_names};
use strata::types::{OperationTargets, StackName};
use tracing_subscriber::EnvFilter;

/// Exit status when `diff` finds changes.
const EXIT_CHANGED: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };
    let mut output = Output::new(mode);
    output.start_timer();

    match run(cli, &output).await {
        Ok(code) => code,
        Err(e) => {
            if !e.is_user_error() {
                tracing::debug!(error = ?e, "command failed");
            }
            output.error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, output: &Output) -> Result<ExitCode> {
    let compiled = load_project(&cli.dir)?;
    output.progress(&format!(
        "rendering {} stacks for cluster {}",
        stack_names(&compiled).len(),
        compiled.config.cluster_name
    ));
    let rendered = render(&cli.dir, compiled)?;

    match cli.command {
        Commands::Validate { targets } => {
            let targets = OperationTargets::parse(&targets)?;
            let report = rendered.validate(None, &targets).await?;
            output.warnings(rendered.diagnostics());
            output.result(&report.to_string());
            output.success("configuration and templates are valid");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Export { out } => {
            let exported = rendered.export(&out)?;
            output.warnings(exported.diagnostics());
            output.success(&format!(
                "exported {} assets to {}",
                exported.files().len(),
                exported.dir().display()
            ));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Diff {
            deployed,
            context,
            targets,
        } => {
            let targets = OperationTargets::parse(&targets)?;
            let report = rendered.diff_exported(&deployed, &targets, context)?;
            output.warnings(rendered.diagnostics());
            output.diff(&report);
            if report.has_changes() {
                Ok(ExitCode::from(EXIT_CHANGED))
            } else {
                output.success("no changes");
                Ok(ExitCode::SUCCESS)
            }
        }
        Commands::Render { stack } => {
            let name = StackName::new(&stack)?;
            let targets = OperationTargets::parse(&[name.as_str()])?;
            rendered.resolve_targets(&targets)?;
            let template = rendered
                .rendered()
                .stack(&name)
                .map(|s| s.template.clone())
                .unwrap_or_default();
            output.result(&template);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_project(dir: &Path) -> Result<CompiledCluster> {
    let spec = ClusterSpec::discover(dir)?;
    let plugins = DirPluginSource::for_project(dir).load()?;
    Ok(compile(&spec, plugins)?)
}

fn render(dir: &Path, compiled: CompiledCluster) -> Result<Run<Rendered>> {
    let renderer: Box<dyn TemplateRenderer> = if dir.join("templates").is_dir() {
        Box::new(TemplateDirRenderer::new(dir))
    } else {
        tracing::info!(dir = %dir.display(), "no templates directory; rendering skeleton stacks");
        Box::new(SkeletonRenderer)
    };
    Run::new(compiled)
        .render(renderer.as_ref(), &BuildInfo::current())
        .map_err(Error::from)
}
