//! Calling-tree drill runner.
//!
//! Rehearses a tree definition against an in-memory deployment: triggers a
//! notification, replays scripted acknowledgments, streams lifecycle events,
//! and prints the final status summary as JSON. Lets a tree author verify
//! level ordering and window tuning without touching real delivery channels.
//!
//! # Usage
//!
//! ```bash
//! # Every member of level 1 acknowledges in time
//! calltree-drill tree.toml --ack alice=5 --ack bob=20
//!
//! # Nobody responds: watch the escalation walk every level
//! calltree-drill tree.toml --window-secs 30
//! ```
//!
//! Tree file format:
//!
//! ```toml
//! name = "plant-b-emergency"
//! timeout_seconds = 300
//!
//! [[levels]]
//! members = ["alice", "bob"]
//!
//! [[levels]]
//! members = ["carol"]
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

use calltree_engine::notifier::TracingNotifier;
use calltree_engine::store::InMemoryStore;
use calltree_engine::tree::{InMemoryTreeDirectory, TreeSnapshot, TreeStatus};
use calltree_engine::{EngineConfig, EscalationEngine, Priority, TriggerRequest};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Tree definition file (TOML)
    tree_file: PathBuf,

    /// Notification title
    #[arg(long, default_value = "Drill")]
    title: String,

    /// Notification message
    #[arg(long, default_value = "This is a drill. Please acknowledge.")]
    message: String,

    /// Priority: low, medium, high, or critical
    #[arg(long, default_value = "high")]
    priority: String,

    /// Override the tree's response window, in seconds
    #[arg(long)]
    window_secs: Option<u64>,

    /// Scripted acknowledgment, `member=seconds_after_trigger`; repeatable
    #[arg(long = "ack", value_parser = parse_ack)]
    acks: Vec<ScriptedAck>,
}

/// One scripted acknowledgment.
#[derive(Debug, Clone)]
struct ScriptedAck {
    member: String,
    delay: Duration,
}

fn parse_ack(raw: &str) -> Result<ScriptedAck, String> {
    let (member, secs) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected member=seconds, got '{}'", raw))?;
    let secs: u64 = secs
        .parse()
        .map_err(|_| format!("invalid delay in '{}'", raw))?;
    Ok(ScriptedAck {
        member: member.to_string(),
        delay: Duration::from_secs(secs),
    })
}

/// On-disk tree definition.
#[derive(Debug, Deserialize)]
struct TreeFile {
    name: String,
    timeout_seconds: Option<u64>,
    levels: Vec<LevelDef>,
}

#[derive(Debug, Deserialize)]
struct LevelDef {
    members: Vec<String>,
}

impl TreeFile {
    fn into_snapshot(self, window_override: Option<u64>) -> TreeSnapshot {
        let window = window_override
            .or(self.timeout_seconds)
            .map(Duration::from_secs);
        let mut tree = TreeSnapshot::new(&self.name, TreeStatus::Active, window);
        for level in &self.levels {
            let members: Vec<&str> = level.members.iter().map(String::as_str).collect();
            tree.push_level(&members);
        }
        tree
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("calltree_engine=info".parse().unwrap())
                .add_directive("calltree_drill=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let priority: Priority = args
        .priority
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let raw = std::fs::read_to_string(&args.tree_file)
        .with_context(|| format!("reading {}", args.tree_file.display()))?;
    let tree_file: TreeFile = toml::from_str(&raw)
        .with_context(|| format!("parsing {}", args.tree_file.display()))?;
    let tree = tree_file.into_snapshot(args.window_secs);

    let directory = InMemoryTreeDirectory::new();
    let tree_id = directory.insert(tree);

    let engine = EscalationEngine::new(
        Arc::new(directory),
        InMemoryStore::new().shared(),
        Arc::new(TracingNotifier),
        EngineConfig::from_env(),
    );

    let mut events = engine.events().subscribe();

    let notification_id = engine
        .trigger(
            TriggerRequest::new(&tree_id, &args.title, &args.message)
                .with_priority(priority)
                .with_initiator("drill-runner"),
        )
        .await?;

    // Replay the scripted acknowledgments.
    for ack in &args.acks {
        let engine = Arc::clone(&engine);
        let notification_id = notification_id.clone();
        let ack = ack.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ack.delay).await;
            match engine
                .acknowledge(&notification_id, &ack.member, Some("drill ack".to_string()))
                .await
            {
                Ok(applied) => {
                    tracing::info!(member = %ack.member, applied, "scripted acknowledgment")
                }
                Err(err) => tracing::warn!(%err, member = %ack.member, "scripted ack rejected"),
            }
        });
    }

    // Stream events until the notification reaches a terminal state.
    loop {
        match events.recv().await {
            Ok(event) => {
                println!("{}", serde_json::to_string(&event)?);
                if event.is_terminal() {
                    break;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "event stream lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }

    let summary = engine.status(&notification_id).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
