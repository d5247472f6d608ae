//! Demo driver: replays a directory of captured UI snapshots through a
//! `Model` and prints the `Operation` chosen for each one. Stands in for
//! the instrumentation harness that would otherwise feed the engine live
//! screen dumps, so the workspace is exercisable end to end without one.

use std::path::PathBuf;

use clap::Parser;

use fastbot_agent::AgentKind;
use fastbot_cli::{load_snapshots, DirConfigSource};
use fastbot_model::Model;
use fastbot_pref::config::MapConfigSource;
use fastbot_pref::Preference;

#[derive(Parser, Debug)]
#[command(about = "Replay a directory of UI snapshots through the Fastbot exploration engine")]
struct Args {
    /// Directory of `NNN__activity.xml`/`.bin` snapshot files, in replay order.
    snapshots: PathBuf,

    /// Directory of `max.*` config files; omit to run with an empty configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Identifies the simulated device across the replay.
    #[arg(long, default_value = "cli-device")]
    device_id: String,

    #[arg(long, value_enum, default_value = "double-sarsa")]
    agent_kind: CliAgentKind,

    /// Reuse-model file to load before the first step, if it exists.
    #[arg(long)]
    reuse_model: Option<PathBuf>,

    /// Where to save the reuse model once the replay finishes; omit to skip saving.
    #[arg(long)]
    save_reuse_model: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum CliAgentKind {
    Reuse,
    DoubleSarsa,
}

impl From<CliAgentKind> for AgentKind {
    fn from(kind: CliAgentKind) -> Self {
        match kind {
            CliAgentKind::Reuse => AgentKind::Reuse,
            CliAgentKind::DoubleSarsa => AgentKind::DoubleSarsa,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let preference = match &args.config {
        Some(dir) => Preference::load(&DirConfigSource::new(dir)),
        None => Preference::load(&MapConfigSource::new()),
    };

    let mut model = Model::new(preference).with_default_agent_kind(args.agent_kind.into());

    if let Some(path) = &args.reuse_model {
        if path.exists() {
            model.load_reuse_model(&args.device_id, args.agent_kind.into(), path)?;
        }
    }

    let snapshots = load_snapshots(&args.snapshots)?;
    if snapshots.is_empty() {
        tracing::warn!(dir = %args.snapshots.display(), "no parseable snapshots found");
    }

    let mut rng = rand::thread_rng();
    for snapshot in snapshots {
        let mut tree = snapshot.tree;
        let op = model.step(&args.device_id, &mut tree, &snapshot.activity, &mut rng);
        let json = op.to_json()?;
        println!("{}\t{}", snapshot.path.display(), json);
    }

    if let Some(path) = &args.save_reuse_model {
        model.save_reuse_model(&args.device_id, path)?;
    }

    Ok(())
}
