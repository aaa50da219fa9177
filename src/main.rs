use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tessel_core::config::AppConfig;
use tessel_core::traits::{LlmClient, PromptSource};
use tessel_engine::{
    register_builtin, FilePrompts, RoleModels, SqliteCheckpointer, StaticPrompts, TaskInputs,
    TaskRegistry, TaskRunner,
};

#[derive(Parser)]
#[command(name = "tessel", version, about = "Supervisor-routed multi-agent workflow engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "tessel.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single workflow and print the result
    Run {
        /// Task type (see `tessel tasks`)
        task: String,
        /// Primary input (requirement, question, or instruction)
        #[arg(trailing_var_arg = true)]
        input: Vec<String>,
        /// Test type for testcase workflows (API, Web, App)
        #[arg(long)]
        test_type: Option<String>,
        /// SQL dialect for sql workflows
        #[arg(long)]
        dialect: Option<String>,
        /// Override the revision budget
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Print every step as it happens
        #[arg(long)]
        stream: bool,
        /// Persist run state to this SQLite database
        #[arg(long)]
        checkpoint_db: Option<PathBuf>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one workflow over many inputs, one per line of a file
    Batch {
        /// Task type (see `tessel tasks`)
        task: String,
        /// File with one primary input per line
        file: PathBuf,
        /// Maximum concurrent runs
        #[arg(long, default_value_t = 5)]
        max_concurrent: usize,
    },
    /// List registered task types
    Tasks,
    /// Show the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tessel=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = if cli.config.exists() {
        AppConfig::load(&cli.config)?
    } else {
        info!(path = %cli.config.display(), "No config file, using defaults");
        AppConfig::default()
    };

    let registry = build_registry(&config);

    match cli.command {
        Commands::Run {
            task,
            input,
            test_type,
            dialect,
            max_iterations,
            stream,
            checkpoint_db,
            json,
        } => {
            let mut runner = TaskRunner::new(Arc::clone(&registry));
            if let Some(path) = checkpoint_db {
                runner = runner.with_checkpointer(Arc::new(SqliteCheckpointer::open(&path)?));
            }
            let inputs = build_inputs(&task, &input.join(" "), test_type, dialect, max_iterations);

            if stream {
                let mut steps = runner.stream(&task, inputs, CancellationToken::new())?;
                let mut last = None;
                while let Some(event) = steps.next().await {
                    if let Some(message) = event.state.messages.last() {
                        println!("[{}] {}", event.node, truncate(&message.content, 200));
                    }
                    last = Some(event.state);
                }
                if let Some(state) = last {
                    println!(
                        "\ncompleted: {}, iterations: {}, quality: {:.1}",
                        state.completed, state.iteration, state.quality_score
                    );
                }
            } else {
                let result = runner.arun(&task, inputs).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                } else {
                    match (&result.output, &result.error) {
                        (Some(output), _) => println!("{}", output),
                        (None, Some(error)) => eprintln!("run failed: {}", error),
                        (None, None) => eprintln!("run produced no output"),
                    }
                    eprintln!(
                        "success: {}, iterations: {}, quality: {:.1}",
                        result.success, result.state.iteration, result.state.quality_score
                    );
                }
            }
        }
        Commands::Batch {
            task,
            file,
            max_concurrent,
        } => {
            let runner = TaskRunner::new(Arc::clone(&registry));
            let lines: Vec<String> = std::fs::read_to_string(&file)?
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .collect();
            let inputs_list: Vec<TaskInputs> = lines
                .iter()
                .map(|line| build_inputs(&task, line, None, None, None))
                .collect();

            let results = runner.run_batch(&task, inputs_list, max_concurrent).await;
            for (line, result) in lines.iter().zip(&results) {
                match result {
                    Ok(r) if r.success => {
                        println!("ok   {} (quality {:.1})", truncate(line, 60), r.state.quality_score)
                    }
                    Ok(r) => println!(
                        "fail {} ({})",
                        truncate(line, 60),
                        r.error.as_deref().unwrap_or("no output")
                    ),
                    Err(e) => println!("fail {} ({})", truncate(line, 60), e),
                }
            }
            let stats = TaskRunner::batch_statistics(&results);
            println!(
                "\n{}/{} succeeded ({:.1}%), average quality {:.1}",
                stats.succeeded, stats.total, stats.success_rate, stats.average_score
            );
        }
        Commands::Tasks => {
            for task in registry.list_tasks() {
                println!("{}", task);
            }
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn build_registry(config: &AppConfig) -> Arc<TaskRegistry> {
    let llm: Arc<dyn LlmClient> =
        tessel_llm::create_resilient_client(&config.model, &config.fallback_models).into();

    let mut models = RoleModels::uniform(config.model.clone());
    for (role, model) in &config.role_models {
        models = models.with_override(role.clone(), model.clone());
    }

    let prompts: Arc<dyn PromptSource> = match &config.prompt_dir {
        Some(dir) => Arc::new(FilePrompts::new(dir.clone())),
        None => Arc::new(StaticPrompts),
    };

    let registry = Arc::new(TaskRegistry::new());
    register_builtin(&registry, llm, prompts, models, config.engine.clone());
    registry
}

fn build_inputs(
    task: &str,
    primary: &str,
    test_type: Option<String>,
    dialect: Option<String>,
    max_iterations: Option<u32>,
) -> TaskInputs {
    let mut inputs = TaskInputs::new();
    let key = match task {
        "sql" => "question",
        "api_request" => "instruction",
        _ => "requirement",
    };
    inputs.insert(key.to_string(), serde_json::json!(primary));
    if let Some(test_type) = test_type {
        inputs.insert("test_type".to_string(), serde_json::json!(test_type));
    }
    if let Some(dialect) = dialect {
        inputs.insert("dialect".to_string(), serde_json::json!(dialect));
    }
    if let Some(max_iterations) = max_iterations {
        inputs.insert("max_iterations".to_string(), serde_json::json!(max_iterations));
    }
    inputs
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{}…", truncated)
}
