use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use hz_core::time::{now_unix, unix_to_iso8601};
use hz_core::{Candidate, LinkOptions, RecordStore, RecordType};
use hz_store::{Maintenance, Memory, Workspace};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "hz", about = "Horizon resonance memory engine CLI")]
struct Cli {
    /// Data directory (defaults to $HZ_DATA_DIR, then ~/.horizon-memory)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config.toml into the data directory
    Init,

    /// Store a record
    Store {
        /// Record text
        content: String,

        /// Comma-separated vector, one value per configured dimension
        #[arg(long, value_delimiter = ',', required = true, allow_hyphen_values = true)]
        vector: Vec<f64>,

        #[arg(long = "type", value_enum, default_value_t = TypeArg::Dialog)]
        record_type: TypeArg,

        /// Importance in [0, 1]; decides the abstraction depth
        #[arg(long, default_value_t = 0.5)]
        weight: f64,

        /// Skip lateral links to similar records
        #[arg(long)]
        no_link: bool,

        /// Skip the parent link one level up
        #[arg(long)]
        no_parent: bool,
    },

    /// Recall records for a query
    Recall {
        /// Query text (seeds the query oscillator's phases)
        query: String,

        #[arg(long, value_delimiter = ',', required = true, allow_hyphen_values = true)]
        vector: Vec<f64>,

        #[arg(long, value_enum, default_value_t = Mode::Combined)]
        mode: Mode,

        #[arg(long)]
        top_k: Option<usize>,

        /// Tunneling reach; larger searches deeper behind the horizon
        #[arg(long)]
        reach: Option<f64>,

        /// Cosine threshold
        #[arg(long)]
        threshold: Option<f64>,

        /// Re-rank the results against the current bridge state
        #[arg(long)]
        rerank: bool,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Forget a record
    Forget { id: String },

    /// Make a record easier to reach
    Reinforce {
        id: String,

        #[arg(long, default_value_t = 0.8)]
        factor: f64,
    },

    /// Push a shallow, low-weight record further behind the horizon
    Decay {
        id: String,

        #[arg(long, default_value_t = 1.5)]
        factor: f64,
    },

    /// Run one maintenance pass (decay sweep and save)
    Maintain,

    /// Run maintenance on an interval until interrupted
    Watch {
        /// Seconds between passes (defaults to decay.interval_secs)
        #[arg(long)]
        interval: Option<u64>,

        /// Stop after this many passes
        #[arg(long)]
        iterations: Option<u64>,
    },

    /// Show store, horizon and bridge statistics
    Stats,

    /// Inspect or drive the state bridge
    Bridge {
        #[command(subcommand)]
        command: BridgeCommand,
    },
}

#[derive(Subcommand)]
enum BridgeCommand {
    /// Drive the named dimensions from an external vector
    Sync {
        #[arg(long, value_delimiter = ',', required = true, allow_hyphen_values = true)]
        values: Vec<f64>,
    },

    /// Run interference steps and refresh the predicted trajectory
    Step {
        #[arg(long, default_value_t = 0.1)]
        dt: f64,

        #[arg(long, default_value_t = 1)]
        steps: u32,
    },

    /// Print the bridge state
    Show {
        /// Print the persisted form as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TypeArg {
    Dialog,
    Read,
    Memory,
    Meta,
}

impl From<TypeArg> for RecordType {
    fn from(arg: TypeArg) -> Self {
        match arg {
            TypeArg::Dialog => RecordType::Dialog,
            TypeArg::Read => RecordType::Read,
            TypeArg::Memory => RecordType::Memory,
            TypeArg::Meta => RecordType::Meta,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Combined,
    Horizon,
    Proustian,
}

#[derive(Serialize)]
struct RecallLine {
    id: String,
    score: f64,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    resonance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    similarity: Option<f64>,
}

fn open_workspace(cli: &Cli) -> Result<Workspace> {
    Workspace::open(cli.data_dir.as_deref()).context("failed to open data directory")
}

fn load(ws: &Workspace) -> Result<Memory> {
    ws.load(now_unix()).context("failed to load memory")
}

fn save(ws: &Workspace, memory: &Memory) -> Result<()> {
    ws.save(memory, now_unix()).context("failed to save memory")
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Init => cmd_init(&cli),
        Commands::Store {
            content,
            vector,
            record_type,
            weight,
            no_link,
            no_parent,
        } => {
            let links = LinkOptions {
                auto_link: !no_link,
                auto_parent: !no_parent,
            };
            cmd_store(&cli, content, vector, (*record_type).into(), *weight, links)
        }
        Commands::Recall {
            query,
            vector,
            mode,
            top_k,
            reach,
            threshold,
            rerank,
            json,
        } => {
            let ws = open_workspace(&cli)?;
            let defaults = &ws.config().recall;
            let params = RecallParams {
                top_k: top_k.unwrap_or(defaults.top_k),
                reach: reach.unwrap_or(defaults.reach),
                threshold: threshold.unwrap_or(defaults.threshold),
            };
            cmd_recall(&ws, query, vector, *mode, params, *rerank, *json)
        }
        Commands::Forget { id } => cmd_forget(&cli, id),
        Commands::Reinforce { id, factor } => cmd_reinforce(&cli, id, *factor),
        Commands::Decay { id, factor } => cmd_decay(&cli, id, *factor),
        Commands::Maintain => cmd_maintain(&cli),
        Commands::Watch {
            interval,
            iterations,
        } => cmd_watch(&cli, *interval, *iterations).await,
        Commands::Stats => cmd_stats(&cli),
        Commands::Bridge { command } => match command {
            BridgeCommand::Sync { values } => cmd_bridge_sync(&cli, values),
            BridgeCommand::Step { dt, steps } => cmd_bridge_step(&cli, *dt, *steps),
            BridgeCommand::Show { json } => cmd_bridge_show(&cli, *json),
        },
    }
}

fn cmd_init(cli: &Cli) -> Result<()> {
    let ws = open_workspace(cli)?;
    if ws.write_default_config().context("failed to write config")? {
        println!("wrote {}", ws.config_path().display());
    } else {
        println!("config already exists at {}", ws.config_path().display());
    }
    Ok(())
}

fn cmd_store(
    cli: &Cli,
    content: &str,
    vector: &[f64],
    record_type: RecordType,
    weight: f64,
    links: LinkOptions,
) -> Result<()> {
    let ws = open_workspace(cli)?;
    let mut memory = load(&ws)?;
    let now = now_unix();

    let id = memory
        .records
        .store(content, vector.to_vec(), record_type, weight, links, now)
        .context("failed to store record")?;
    if let Some(event) = memory.records.resync(&mut memory.horizon, now)? {
        ws.record_emergence(&event)
            .context("failed to write emergence marker")?;
    }
    save(&ws, &memory)?;

    println!("{id}");
    if cli.verbose {
        let store = memory.records.read()?;
        if let Some(record) = store.get(&id) {
            eprintln!(
                "--- depth={}, parent={}, lateral={} ---",
                record.depth().level(),
                record.fractal.parent_id.as_deref().unwrap_or("-"),
                record.resonance.linked_ids.len()
            );
        }
    }
    Ok(())
}

struct RecallParams {
    top_k: usize,
    reach: f64,
    threshold: f64,
}

fn cmd_recall(
    ws: &Workspace,
    query: &str,
    vector: &[f64],
    mode: Mode,
    params: RecallParams,
    rerank: bool,
    json: bool,
) -> Result<()> {
    let mut memory = load(ws)?;
    let now = now_unix();
    let dims = ws.config().dimensions;
    if vector.len() != dims {
        bail!("query vector has {} values, expected {dims}", vector.len());
    }

    let mut lines: Vec<RecallLine> = {
        let store = memory.records.read()?;
        let line = |id: String, score: f64, resonance: Option<f64>, similarity: Option<f64>| {
            let content = store
                .get(&id)
                .map(|r| r.content.clone())
                .unwrap_or_default();
            RecallLine {
                id,
                score,
                content,
                resonance,
                similarity,
            }
        };
        match mode {
            Mode::Combined => memory
                .horizon
                .recall_combined_at(
                    &store,
                    query,
                    vector,
                    params.top_k,
                    params.reach,
                    params.threshold,
                    now,
                )
                .into_iter()
                .map(|h| line(h.id, h.score, h.resonance, h.similarity))
                .collect(),
            Mode::Horizon => memory
                .horizon
                .recall_at(query, vector, params.top_k, params.reach, now)
                .into_iter()
                .map(|h| line(h.id, h.score, Some(h.resonance), None))
                .collect(),
            Mode::Proustian => store
                .proustian_recall(vector, params.threshold)
                .into_iter()
                .map(|h| line(h.id, h.similarity, None, Some(h.similarity)))
                .collect(),
        }
    };

    if rerank {
        let store = memory.records.read()?;
        lines = rerank_lines(&memory, &store, lines);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&lines)?);
    } else if lines.is_empty() {
        println!("(no memories found)");
    } else {
        for l in &lines {
            println!("{:.4}  {}  {}", l.score, l.id, l.content);
        }
    }
    Ok(())
}

/// Reorder recall results against the current bridge state.
fn rerank_lines(memory: &Memory, store: &RecordStore, lines: Vec<RecallLine>) -> Vec<RecallLine> {
    let candidates: Vec<Candidate> = lines
        .iter()
        .filter_map(|l| store.get(&l.id).map(|record| (record, l)))
        .map(|(record, l)| Candidate {
            id: record.id.clone(),
            content: record.content.clone(),
            classical: l.score,
            weight: record.weight,
            vector: record.vector().to_vec(),
        })
        .collect();
    let top_n = candidates.len();
    let mut by_id: std::collections::HashMap<String, RecallLine> =
        lines.into_iter().map(|l| (l.id.clone(), l)).collect();

    memory
        .bridge
        .rank_candidates(&candidates, top_n)
        .into_iter()
        .filter_map(|ranked| {
            by_id.remove(&ranked.id).map(|mut l| {
                l.score = ranked.score;
                l
            })
        })
        .collect()
}

fn cmd_forget(cli: &Cli, id: &str) -> Result<()> {
    let ws = open_workspace(cli)?;
    let mut memory = load(&ws)?;
    if memory.records.forget(id)?.is_none() {
        bail!("no record with id {id}");
    }
    memory.records.resync(&mut memory.horizon, now_unix())?;
    save(&ws, &memory)?;
    println!("forgot {id}");
    Ok(())
}

fn cmd_reinforce(cli: &Cli, id: &str, factor: f64) -> Result<()> {
    let ws = open_workspace(cli)?;
    let mut memory = load(&ws)?;
    let now = now_unix();
    let curvature = memory
        .horizon
        .reinforce(id, factor)
        .with_context(|| format!("failed to reinforce {id}"))?;
    let activations = memory.records.record_activation(id, now)?;
    save(&ws, &memory)?;
    println!("curvature {curvature:.4} (activations {activations})");
    Ok(())
}

fn cmd_decay(cli: &Cli, id: &str, factor: f64) -> Result<()> {
    let ws = open_workspace(cli)?;
    let mut memory = load(&ws)?;
    let applied = memory
        .horizon
        .decay(id, factor)
        .with_context(|| format!("failed to decay {id}"))?;
    if applied {
        save(&ws, &memory)?;
        let curvature = memory.horizon.curvature(id).unwrap_or_default();
        println!("curvature {curvature:.4}");
    } else {
        println!("{id} is not eligible for decay");
    }
    Ok(())
}

fn cmd_maintain(cli: &Cli) -> Result<()> {
    let ws = open_workspace(cli)?;
    let mut memory = load(&ws)?;
    let report = Maintenance::new(&ws)
        .run(&mut memory, now_unix())
        .context("maintenance pass failed")?;
    println!("decayed {}", report.decayed.len());
    Ok(())
}

async fn cmd_watch(cli: &Cli, interval: Option<u64>, iterations: Option<u64>) -> Result<()> {
    let ws = open_workspace(cli)?;
    let mut memory = load(&ws)?;
    let secs = interval.unwrap_or(ws.config().decay.interval_secs).max(1);
    let maintenance = Maintenance::new(&ws);
    let mut ticker = tokio::time::interval(Duration::from_secs(secs));
    let mut passes = 0u64;
    tracing::info!("watching {} every {secs}s", ws.root().display());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = maintenance
                    .run(&mut memory, now_unix())
                    .context("maintenance pass failed")?;
                passes += 1;
                println!("pass {passes}: decayed {}", report.decayed.len());
                if iterations.is_some_and(|n| passes >= n) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, saving before exit");
                save(&ws, &memory)?;
                break;
            }
        }
    }
    Ok(())
}

fn cmd_stats(cli: &Cli) -> Result<()> {
    let ws = open_workspace(cli)?;
    let memory = load(&ws)?;
    let stats = memory.records.read()?.stats();
    let depth = |level: u8| stats.by_depth.get(&level).copied().unwrap_or(0);

    println!("data_dir:   {}", ws.root().display());
    println!("dimensions: {}", ws.config().dimensions);
    println!("records:    {}", stats.total);
    println!("depths:     1={}, 2={}, 3={}", depth(1), depth(2), depth(3));
    let types: Vec<String> = stats
        .by_type
        .iter()
        .map(|(t, n)| format!("{t}={n}"))
        .collect();
    println!("types:      {}", types.join(", "));
    println!(
        "links:      parent={}, lateral={}",
        stats.parent_links, stats.lateral_links
    );
    println!("quanta:     {}", memory.horizon.len());
    println!(
        "emergence:  {}",
        if memory.horizon.emergence_detected() {
            "yes"
        } else {
            "no"
        }
    );
    println!("vacuum:     {:.4}", memory.bridge.vacuum_probability());
    Ok(())
}

fn cmd_bridge_sync(cli: &Cli, values: &[f64]) -> Result<()> {
    let ws = open_workspace(cli)?;
    let mut memory = load(&ws)?;
    memory
        .bridge
        .sync_from_external(values)
        .context("failed to sync bridge")?;
    save(&ws, &memory)?;
    print_bridge(&memory);
    Ok(())
}

fn cmd_bridge_step(cli: &Cli, dt: f64, steps: u32) -> Result<()> {
    let ws = open_workspace(cli)?;
    let mut memory = load(&ws)?;
    let mut external = memory.bridge.external_vector();
    let mut order = 0.0;
    for _ in 0..steps {
        order = memory.bridge.process_interference(dt, &mut external);
    }
    memory.bridge.predict_trajectory();
    save(&ws, &memory)?;
    println!("order:      {order:.4}");
    print_bridge(&memory);
    Ok(())
}

fn cmd_bridge_show(cli: &Cli, json: bool) -> Result<()> {
    let ws = open_workspace(cli)?;
    let memory = load(&ws)?;
    let now = now_unix();
    if json {
        let snapshot = memory.bridge.to_persisted(now);
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        if let Some(evolution) = &memory.offline {
            println!("offline:    {:.1}h", evolution.elapsed_hours);
        }
        println!("as of:      {}", unix_to_iso8601(now));
        print_bridge(&memory);
    }
    Ok(())
}

fn print_bridge(memory: &Memory) {
    let probabilities = memory.bridge.probabilities();
    for (name, p) in memory.bridge.dimension_names().zip(&probabilities) {
        println!("{name:<11} {p:.4}");
    }
    println!("{:<11} {:.4}", "vacuum", memory.bridge.vacuum_probability());
    println!("{:<11} {:.4}", "entropy", memory.bridge.entropy());
}
