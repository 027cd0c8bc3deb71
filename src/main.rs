use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::json;
use sift_rs::runtime::{ReplayBackend, Tensor};
use sift_rs::sift::pipeline::builder::Builder;
use sift_rs::sift::pipeline::loader::PipelineLoader;
use sift_rs::sift::pipeline::registry::ExtractorRegistry;
use sift_rs::sift::pipeline::router::{Pipeline, RunInput, RunOutput, DEFAULT_MAX_STEPS};
use sift_rs::sift::pipeline::types::{Action, PipelineDefinition, Position};

use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a pipeline file and print its stages
    Check {
        /// Path to the pipeline file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Route input tensors through a pipeline using recorded model outputs
    Run {
        /// Path to the pipeline file
        #[arg(short, long)]
        config: PathBuf,

        /// JSON file with the recorded outputs of every model
        #[arg(short, long)]
        replay: PathBuf,

        /// Identifier substituted for %c in templates
        #[arg(long, default_value = "local")]
        client: String,

        /// Overrides directories.save_dir of the pipeline file
        #[arg(long)]
        save_dir: Option<PathBuf>,

        /// Input tensors as JSON files ({"shape": [...], "data": [...]})
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Check { config } => {
            let def = PipelineLoader::new().load(&config)?;
            def.validate()?;
            print_summary(&def);
        }
        Commands::Run {
            config,
            replay,
            client,
            save_dir,
            inputs,
        } => {
            let backend = ReplayBackend::from_file(&replay)
                .with_context(|| format!("reading replay fixtures {}", replay.display()))?;

            let mut builder =
                Builder::new(Arc::new(backend), ExtractorRegistry::new()).with_client_id(client);
            if let Some(dir) = save_dir {
                builder = builder.with_save_dir(dir);
            }
            let pipeline = Arc::new(builder.build_pipeline(&config)?);
            log::info!(
                "Routing {} inputs through pipeline '{}'",
                inputs.len(),
                pipeline.name()
            );

            let handles: Vec<_> = inputs
                .into_iter()
                .map(|path| {
                    let pipeline = Arc::clone(&pipeline);
                    tokio::task::spawn_blocking(move || {
                        let output = run_file(&pipeline, &path);
                        (path, output)
                    })
                })
                .collect();

            let total = handles.len();
            let mut failed = 0;
            for handle in handles {
                let (path, output) = handle.await?;
                match output {
                    Ok(output) => {
                        let line = json!({ "input": path, "output": output });
                        println!("{}", serde_json::to_string(&line)?);
                    }
                    Err(e) => {
                        log::error!("Run for {} failed: {:#}", path.display(), e);
                        failed += 1;
                    }
                }
            }

            if failed > 0 {
                anyhow::bail!("{} of {} runs failed", failed, total);
            }
        }
    }

    Ok(())
}

fn run_file(pipeline: &Pipeline, path: &Path) -> anyhow::Result<RunOutput> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading input {}", path.display()))?;
    let tensor: Tensor = serde_json::from_str(&content)
        .with_context(|| format!("parsing input {}", path.display()))?;
    let output = pipeline.run(&RunInput::new(path, tensor.validated()?))?;
    Ok(output)
}

fn print_summary(def: &PipelineDefinition) {
    println!(
        "Pipeline '{}' is valid ({} stages, max {} steps)",
        def.name.as_deref().unwrap_or("unnamed"),
        def.processes.len(),
        def.max_steps.unwrap_or(DEFAULT_MAX_STEPS)
    );

    for stage in &def.processes {
        let marker = match stage.position {
            Position::Input => " [input]",
            Position::Middle => "",
        };
        println!(
            "  {}{} ({:?}, model {})",
            stage.name,
            marker,
            stage.kind,
            stage.model.display()
        );

        let rules = [
            ("on", stage.actions.on_result.as_deref().unwrap_or_default()),
            (
                "not",
                stage.actions.on_not_result.as_deref().unwrap_or_default(),
            ),
        ];
        for (label, rules) in rules {
            for rule in rules {
                println!("    {} '{}' -> {}", label, rule.condition, describe(&rule.action));
            }
        }
        for action in stage.actions.always.iter().flatten() {
            println!("    always -> {}", describe(action));
        }
    }
}

fn describe(action: &Action) -> String {
    match action {
        Action::Next { target, input } => format!("next {} ({:?})", target, input),
        other => other.kind().to_string(),
    }
}
