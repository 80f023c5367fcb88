use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adept::metrics::InMemoryMetrics;
use adept::{AgentConfig, AgentId, AgentStatus, Config, DispatchMode, Runtime, SkillConfig, Task};

#[derive(Parser)]
#[command(name = "adept")]
#[command(about = "In-process agent runtime", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(long, global = true, help = "TOML config file; ADEPT_* variables override it")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one task on a fresh agent and print the outcome
    Run {
        #[arg(long)]
        ability: String,
        #[arg(long, help = "Task payload as JSON")]
        payload: Option<String>,
        #[arg(long, value_enum, default_value_t = Mode::Direct)]
        mode: Mode,
        #[arg(long, default_value_t = 0)]
        priority: i32,
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
    /// Run a heartbeat agent under the health monitor
    Watch {
        #[arg(long, default_value_t = 10)]
        seconds: u64,
        #[arg(long, default_value_t = 2.0, help = "Sweep interval in seconds")]
        interval: f64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Direct,
    Queue,
}

impl From<Mode> for DispatchMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Direct => DispatchMode::Direct,
            Mode::Queue => DispatchMode::Queue,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adept=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            ability,
            payload,
            mode,
            priority,
            timeout_secs,
        } => {
            let payload = match payload {
                Some(raw) => serde_json::from_str(&raw).context("Invalid --payload JSON")?,
                None => Value::Null,
            };
            let task = Task::new(ability, mode.into())
                .with_payload(payload)
                .with_priority(priority);
            run_task(config, task, Duration::from_secs(timeout_secs)).await?
        }
        Commands::Watch { seconds, interval } => {
            let mut config = config;
            config.monitor.interval_secs = interval;
            watch(config, Duration::from_secs(seconds)).await?
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file_with_env(path)?,
        None => Config::from_env()?,
    };
    Ok(config)
}

async fn run_task(config: Config, task: Task, timeout: Duration) -> Result<()> {
    let metrics = Arc::new(InMemoryMetrics::new());
    let runtime = Runtime::builder()
        .config(config)
        .metrics(metrics.clone())
        .build();
    runtime.launch().await?;

    let agent_id = runtime.create_agent(AgentConfig::new("cli").with_type("cli"))?;
    runtime.start_agent(agent_id)?;
    wait_for_status(&runtime, agent_id, AgentStatus::Running, timeout).await?;

    let queued = task.mode == DispatchMode::Queue;
    let response = runtime.execute_task(agent_id, task).await;

    let mut result = Value::Null;
    if let Some(task_id) = response.task_id {
        if queued {
            let deadline = Instant::now() + timeout;
            while !runtime.get_task_status(agent_id, task_id)?.is_terminal() {
                if Instant::now() >= deadline {
                    return Err(anyhow!("Task {} did not finish within {:?}", task_id, timeout));
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }
        result = serde_json::to_value(runtime.get_task_result(agent_id, task_id)?)?;
    }

    let report = json!({
        "response": response,
        "task": result,
        "agent": runtime.get_agent_status(agent_id)?,
        "metrics": metrics.summary(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    runtime.shutdown().await?;
    Ok(())
}

async fn watch(config: Config, duration: Duration) -> Result<()> {
    let metrics = Arc::new(InMemoryMetrics::new());
    let interval = config
        .monitor
        .interval()
        .unwrap_or(Duration::from_secs(1));
    let runtime = Runtime::builder()
        .config(config)
        .metrics(metrics.clone())
        .build();
    runtime.launch().await?;

    let agent_id = runtime.create_agent(
        AgentConfig::new("heartbeat")
            .with_type("watcher")
            .with_skill(SkillConfig::periodic("ping", 1.0)),
    )?;
    runtime.start_agent(agent_id)?;
    runtime.start_monitor();

    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        tokio::time::sleep(interval).await;
        if let Some(snapshot) = runtime.health_snapshot() {
            println!("{}", serde_json::to_string(&snapshot)?);
        }
    }

    println!("{}", serde_json::to_string_pretty(&metrics.summary())?);
    runtime.shutdown().await?;
    Ok(())
}

async fn wait_for_status(
    runtime: &Runtime,
    agent_id: AgentId,
    status: AgentStatus,
    timeout: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let current = runtime.get_agent_status(agent_id)?.status;
        if current == status {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(anyhow!(
                "Agent {} still {} after {:?}",
                agent_id,
                current,
                timeout
            ));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
