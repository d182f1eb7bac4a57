use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde_yaml::{Mapping, Value};

use logweave::{compile_pipelines, weave_pipelines_into_config, Pipeline, Strategy};

#[derive(Parser)]
#[command(name = "logweave")]
#[command(about = "Compile log pipelines into collector processor configs")]
#[command(version)]
struct Args {
    /// Log filter, e.g. "logweave=debug" (overrides RUST_LOG)
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile pipelines and print the processor definitions
    Compile {
        /// Pipeline definitions (YAML or JSON, by file extension)
        #[arg(short = 'p', long = "pipelines")]
        pipelines: PathBuf,

        /// How pipelines are packaged into processors
        #[arg(long, value_enum, default_value_t = StrategyArg::Unified)]
        strategy: StrategyArg,
    },

    /// Weave compiled pipelines into an existing collector config
    Weave {
        /// Pipeline definitions (YAML or JSON, by file extension)
        #[arg(short = 'p', long = "pipelines")]
        pipelines: PathBuf,

        /// Collector config to update
        #[arg(short = 'c', long = "config")]
        config: PathBuf,

        /// How pipelines are packaged into processors
        #[arg(long, value_enum, default_value_t = StrategyArg::PerPipeline)]
        strategy: StrategyArg,

        /// Write the woven config here instead of stdout
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    Unified,
    PerPipeline,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Strategy {
        match arg {
            StrategyArg::Unified => Strategy::Unified,
            StrategyArg::PerPipeline => Strategy::PerPipeline,
        }
    }
}

fn main() {
    let args = Args::parse();

    let filter = args
        .log
        .clone()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    match args.command {
        Command::Compile {
            pipelines,
            strategy,
        } => {
            let pipelines = load_pipelines(&pipelines)?;
            let compiled = compile_pipelines(&pipelines, strategy.into())?;

            let mut processors = Mapping::new();
            for (name, definition) in &compiled.processors {
                processors.insert(Value::String(name.clone()), definition.clone());
            }
            let mut out = Mapping::new();
            out.insert(
                Value::String("processors".to_string()),
                Value::Mapping(processors),
            );
            out.insert(
                Value::String("order".to_string()),
                Value::Sequence(compiled.names.iter().cloned().map(Value::String).collect()),
            );
            print!("{}", serde_yaml::to_string(&Value::Mapping(out))?);
        }

        Command::Weave {
            pipelines,
            config,
            strategy,
            output,
        } => {
            let pipelines = load_pipelines(&pipelines)?;
            let compiled = compile_pipelines(&pipelines, strategy.into())?;

            let text = fs::read_to_string(&config)
                .with_context(|| format!("failed to read config '{}'", config.display()))?;
            let mut doc: Value = serde_yaml::from_str(&text)
                .with_context(|| format!("failed to parse config '{}'", config.display()))?;

            weave_pipelines_into_config(&mut doc, &compiled)?;

            let rendered = serde_yaml::to_string(&doc)?;
            match output {
                Some(path) => fs::write(&path, rendered)
                    .with_context(|| format!("failed to write '{}'", path.display()))?,
                None => print!("{rendered}"),
            }
        }
    }

    Ok(())
}

fn load_pipelines(path: &Path) -> anyhow::Result<Vec<Pipeline>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read pipelines '{}'", path.display()))?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let pipelines = if is_json {
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse pipelines '{}'", path.display()))?
    } else {
        serde_yaml::from_str(&text)
            .with_context(|| format!("failed to parse pipelines '{}'", path.display()))?
    };
    Ok(pipelines)
}
