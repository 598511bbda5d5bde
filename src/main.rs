//! Scout 命令行入口
//!
//! learn / resume 运行探索；report / sessions 查看已保存的会话。日志走 stderr，报告走 stdout。

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use scout::core::{build_orchestrator, summary_report, LearningResult};
use scout::learning::ConfidenceModel;
use scout::session::SessionStore;
use scout::{load_config, observability, AppConfig};

#[derive(Parser)]
#[command(name = "scout", version, about = "Confidence-driven website exploration agent")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file layered over config/default.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Explore a website until confident
    Learn {
        url: String,
        /// Run the browser without a window
        #[arg(long)]
        headless: bool,
        #[arg(short = 'n', long)]
        max_iterations: Option<usize>,
        /// Confidence threshold in [0, 1]
        #[arg(short, long)]
        confidence: Option<f64>,
        /// Send the completion report to this address
        #[arg(short, long)]
        email: Option<String>,
    },
    /// Start a new run against a saved session's target
    Resume { session_id: String },
    /// Print the report of a saved session
    Report {
        session_id: String,
        #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List recent sessions
    Sessions {
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    observability::init(cli.verbose);

    let mut cfg = load_config(cli.config.clone()).context("Failed to load config")?;

    match cli.command {
        Command::Learn {
            url,
            headless,
            max_iterations,
            confidence,
            email,
        } => {
            if headless {
                cfg.browser.headless = true;
            }
            if let Some(n) = max_iterations {
                cfg.learning.max_iterations = n;
            }
            if let Some(c) = confidence {
                cfg.learning.confidence_threshold = c;
            }
            if let Some(addr) = email {
                cfg.notify.recipient = Some(addr);
                if cfg.notify.provider == "log" {
                    cfg.notify.provider = "resend".to_string();
                }
            }
            let mut orchestrator = build_orchestrator(cfg).context("Failed to build orchestrator")?;
            let result = orchestrator.learn(&url).await;
            finish(result);
        }
        Command::Resume { session_id } => {
            let mut orchestrator = build_orchestrator(cfg).context("Failed to build orchestrator")?;
            let result = orchestrator
                .resume(&session_id)
                .await
                .with_context(|| format!("Failed to resume session {}", session_id))?;
            finish(result);
        }
        Command::Report {
            session_id,
            format,
            output,
        } => {
            let text = render_report(&cfg, &session_id, format)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &text)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Report written to {}", path.display());
                }
                None => println!("{}", text),
            }
        }
        Command::Sessions { limit } => {
            let store = SessionStore::open(cfg.sessions_dir()).context("Failed to open session store")?;
            let sessions = store.list(limit).context("Failed to list sessions")?;
            if sessions.is_empty() {
                println!("No sessions found in {}", store.dir().display());
            }
            for s in sessions {
                println!(
                    "{}  {:<9}  {:>4} actions  {:>3.0}%  {}  {}",
                    s.id(),
                    s.status(),
                    s.actions().len(),
                    s.confidence_score() * 100.0,
                    s.created_at().format("%Y-%m-%d %H:%M"),
                    s.target_url()
                );
            }
        }
    }
    Ok(())
}

fn render_report(cfg: &AppConfig, session_id: &str, format: ReportFormat) -> anyhow::Result<String> {
    let store = SessionStore::open(cfg.sessions_dir()).context("Failed to open session store")?;
    let session = store
        .load(session_id)
        .with_context(|| format!("Failed to load session {}", session_id))?;
    Ok(match format {
        ReportFormat::Text => {
            let metrics = ConfidenceModel::new(cfg.learning.confidence_threshold).evaluate(&session);
            summary_report(&session, &metrics)
        }
        ReportFormat::Json => serde_json::to_string_pretty(&session)?,
    })
}

/// 打印结果，失败时以非零码退出
fn finish(result: LearningResult) {
    println!("{}", result.message());
    println!("Session: {}", result.session.id());
    if let Some(report) = &result.report {
        println!("\n{}", report);
    }
    if !result.success() {
        std::process::exit(1);
    }
}
