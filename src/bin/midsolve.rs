use std::cell::RefCell;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context};
use clap::Parser;
use dashmap::DashMap;
use log::{info, LevelFilter};
use rand::rngs::StdRng;
use rand::SeedableRng;

use pentago_mid::board::random_position;
use pentago_mid::halfsuper::Halfsupers;
use pentago_mid::io::{parse_file_to_positions, write_values};
use pentago_mid::mid::MIN_SLICE;
use pentago_mid::{
    midsolve, midsolve_workspace, midsolve_workspace_memory_usage, PoolKind, Position, Scheduler,
};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "midsolve",
    version,
    about = "Solve Pentago positions with at least 18 stones, all rotations at once"
)]
struct Cfg {
    /// Positions: 36 cells of X (black), O (white), - (empty), trailing * for a middle position
    positions: Vec<String>,

    /// File with one position per line
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Also solve this many random positions
    #[arg(long, default_value_t = 0)]
    random: usize,

    /// Stones on each random position
    #[arg(long, default_value_t = 30)]
    stones: usize,

    /// Seed for random positions
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// CPU threads (0 = one per core)
    #[arg(short = 'j', long, default_value_t = 0)]
    jobs: usize,

    /// IO threads writing results to --out
    #[arg(long, default_value_t = 1)]
    io_threads: usize,

    /// Write every solved position to this file as it finishes
    #[arg(short, long, value_name = "FILE")]
    out: Option<PathBuf>,

    /// Print the values of every position one move below each root
    #[arg(long)]
    children: bool,

    /// Draw each root as a 6x6 grid above its value
    #[arg(long)]
    show: bool,

    /// Print where the threads spent their time
    #[arg(long)]
    times: bool,

    /// Log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

thread_local! {
    static WORKSPACE: RefCell<Vec<Halfsupers>> = const { RefCell::new(Vec::new()) };
}

fn collect_roots(cfg: &Cfg) -> anyhow::Result<Vec<Position>> {
    let mut roots = Vec::new();
    for text in &cfg.positions {
        let position: Position = text.parse().with_context(|| format!("position {text:?}"))?;
        roots.push(position);
    }
    if let Some(path) = &cfg.input {
        roots.extend(parse_file_to_positions(path).with_context(|| format!("reading {}", path.display()))?);
    }
    if cfg.random > 0 {
        if !(MIN_SLICE..=34).contains(&cfg.stones) {
            bail!("--stones must be in {MIN_SLICE}..=34, got {}", cfg.stones);
        }
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        for _ in 0..cfg.random {
            roots.push(random_position(&mut rng, cfg.stones, false));
        }
    }
    if roots.is_empty() {
        bail!("no positions given");
    }
    Ok(roots)
}

fn run(cfg: Cfg) -> anyhow::Result<()> {
    let roots = collect_roots(&cfg)?;
    let min_slice = roots.iter().map(|p| p.count() as usize).min().unwrap_or(36);
    info!(
        "solving {} positions, workspace {} bytes per thread",
        roots.len(),
        midsolve_workspace_memory_usage(min_slice)?
    );

    let scheduler = Scheduler::new(cfg.jobs, if cfg.out.is_some() { cfg.io_threads } else { 0 })?;
    let spawner = scheduler.spawner();
    let out = match &cfg.out {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            Some(Arc::new(Mutex::new(BufWriter::new(file))))
        }
        None => None,
    };
    let values: Arc<DashMap<Position, Vec<(Position, i32)>>> = Arc::new(DashMap::new());

    for &root in &roots {
        let values = Arc::clone(&values);
        let spawner = spawner.clone();
        let out = out.clone();
        scheduler.schedule(
            PoolKind::Cpu,
            move || {
                let solved = WORKSPACE.with(|workspace| -> anyhow::Result<_> {
                    let mut workspace = workspace.borrow_mut();
                    if workspace.is_empty() {
                        *workspace = midsolve_workspace(min_slice)?;
                    }
                    Ok(midsolve(&root, &mut workspace)?)
                })?;
                if let Some(out) = out {
                    let solved = solved.clone();
                    spawner.schedule(
                        PoolKind::Io,
                        move || {
                            let mut out = out.lock().map_err(|_| anyhow::anyhow!("output lock poisoned"))?;
                            write_values(&mut *out, &solved)?;
                            Ok(())
                        },
                        false,
                    )?;
                }
                values.insert(root, solved);
                Ok(())
            },
            false,
        )?;
    }
    scheduler.wait_all()?;

    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    for root in &roots {
        let Some(solved) = values.get(root) else {
            bail!("no result for {root}");
        };
        if cfg.show {
            write!(stdout, "{}", root.show())?;
        }
        if let Some((_, value)) = solved.iter().find(|(p, _)| p == root) {
            writeln!(stdout, "{root} {value}")?;
        }
        if cfg.children {
            let mut below: Vec<_> = solved.iter().filter(|(p, _)| p != root).copied().collect();
            below.sort();
            for (position, value) in below {
                writeln!(stdout, "  {position} {value}")?;
            }
        }
    }
    if let Some(out) = &out {
        let mut out = out.lock().map_err(|_| anyhow::anyhow!("output lock poisoned"))?;
        out.flush()?;
    }
    if cfg.times {
        eprint!("{}", scheduler.total_thread_times()?);
    }
    Ok(())
}

fn main() {
    let cfg = Cfg::parse();
    let level = match cfg.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
    if let Err(e) = run(cfg) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
