// CLI entry point for running the tapebots simulation without a renderer.
//
// Builds a world from a JSON config (or the defaults), optionally seeds the
// population with a saved genome, runs ticks and logs a population report
// every few hundred ticks. At the end it can save the genome of the bot
// heading the largest living lineage, to seed a later run.
//
// Usage:
//   tapebots [OPTIONS]
//     --config <PATH>         GameConfig JSON (partial files fill in defaults)
//     --genome <PATH>         Seed genome CSV copied into every initial bot
//     --seed <N>              PRNG seed (default: 1)
//     --ticks <N>             Ticks to run (default: 10000)
//     --report-every <N>      Ticks between reports (default: 500)
//     --save-genome <PATH>    Write the largest lineage's genome on exit
//     --realtime              Pace ticks by the config's tick_duration_ms
//
// Logging goes through `tracing`; set `RUST_LOG=tapebots_sim=debug` to see
// colony events.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tapebots_sim::genome;
use tapebots_sim::{GameConfig, SimEventKind, SimState};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

struct Options {
    config: Option<PathBuf>,
    genome: Option<PathBuf>,
    seed: u64,
    ticks: u64,
    report_every: u64,
    save_genome: Option<PathBuf>,
    realtime: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            config: None,
            genome: None,
            seed: 1,
            ticks: 10_000,
            report_every: 500,
            save_genome: None,
            realtime: false,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let options = parse_args();
    let config = load_config(&options);
    let mut sim = SimState::new(config, options.seed);

    if let Some(path) = &options.genome {
        let expected = sim.config.genome.length;
        match genome::load(path, expected) {
            Ok(seed_genome) => sim = sim.with_initial_genome(seed_genome),
            Err(e) => {
                eprintln!("Failed to load genome {}: {e}", path.display());
                std::process::exit(1);
            }
        }
    }

    sim.generate_world();
    info!(
        rows = sim.config.world.rows,
        cols = sim.config.world.cols,
        bots = sim.live_bot_count(),
        seed = options.seed,
        "world generated"
    );

    run(&mut sim, &options);

    if let Some(path) = &options.save_genome {
        save_largest_lineage(&sim, path);
    }
}

fn run(sim: &mut SimState, options: &Options) {
    let tick_duration = Duration::from_millis(u64::from(sim.config.tick_duration_ms));
    let report_every = options.report_every.max(1);
    let (mut births, mut deaths) = (0usize, 0usize);
    let started = Instant::now();

    for _ in 0..options.ticks {
        let tick_start = Instant::now();
        let result = sim.tick();
        births += result.births;
        deaths += result.deaths;

        for event in &result.events {
            match &event.kind {
                SimEventKind::PopulationReseeded { survivors, spawned } => {
                    warn!(tick = event.tick, survivors, spawned, "population collapsed, reseeded");
                }
                SimEventKind::ColonyFounded { members, .. } => {
                    info!(tick = event.tick, members, "colony founded");
                }
                _ => {}
            }
        }

        if sim.tick % report_every == 0 {
            let busy: usize = sim.colonies.values().map(|c| c.busy_task_count()).sum();
            info!(
                tick = sim.tick,
                bots = sim.live_bot_count(),
                colonies = sim.colonies.len(),
                busy_tasks = busy,
                births,
                deaths,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "report"
            );
            births = 0;
            deaths = 0;
        }

        // Drain the renderer patch so it does not grow without a consumer.
        sim.board_mut().pull_patch();

        if options.realtime {
            std::thread::sleep(tick_duration.saturating_sub(tick_start.elapsed()));
        }
    }
}

fn load_config(options: &Options) -> GameConfig {
    let Some(path) = &options.config else {
        return GameConfig::default();
    };
    let text = std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Failed to read config {}: {e}", path.display());
        std::process::exit(1);
    });
    GameConfig::from_json(&text).unwrap_or_else(|e| {
        eprintln!("Invalid config {}: {e}", path.display());
        std::process::exit(1);
    })
}

fn save_largest_lineage(sim: &SimState, path: &Path) {
    let Some(root) = sim.largest_lineage() else {
        warn!("no bots alive, nothing to save");
        return;
    };
    let Some(bot) = sim.bot(root) else {
        return;
    };
    if let Err(e) = genome::save(&bot.genome, path) {
        eprintln!("Failed to save genome {}: {e}", path.display());
        std::process::exit(1);
    }
    info!(
        lineage = sim.lineage_size(root),
        path = %path.display(),
        "saved genome of the largest lineage"
    );
}

/// Parse command-line arguments. Uses simple `std::env::args()` matching,
/// no clap dependency.
fn parse_args() -> Options {
    let mut options = Options::default();
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                options.config = Some(path_arg(&args, i, "--config"));
            }
            "--genome" => {
                i += 1;
                options.genome = Some(path_arg(&args, i, "--genome"));
            }
            "--save-genome" => {
                i += 1;
                options.save_genome = Some(path_arg(&args, i, "--save-genome"));
            }
            "--seed" => {
                i += 1;
                options.seed = number_arg(&args, i, "--seed");
            }
            "--ticks" => {
                i += 1;
                options.ticks = number_arg(&args, i, "--ticks");
            }
            "--report-every" => {
                i += 1;
                options.report_every = number_arg(&args, i, "--report-every");
            }
            "--realtime" => options.realtime = true,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    options
}

fn path_arg(args: &[String], i: usize, flag: &str) -> PathBuf {
    args.get(i).map(PathBuf::from).unwrap_or_else(|| {
        eprintln!("{flag} requires a path");
        std::process::exit(1);
    })
}

fn number_arg(args: &[String], i: usize, flag: &str) -> u64 {
    args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
        eprintln!("{flag} requires a valid number");
        std::process::exit(1);
    })
}

fn print_usage() {
    println!("Usage: tapebots [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --config <PATH>         GameConfig JSON (partial files fill in defaults)");
    println!("  --genome <PATH>         Seed genome CSV copied into every initial bot");
    println!("  --seed <N>              PRNG seed (default: 1)");
    println!("  --ticks <N>             Ticks to run (default: 10000)");
    println!("  --report-every <N>      Ticks between reports (default: 500)");
    println!("  --save-genome <PATH>    Write the largest lineage's genome on exit");
    println!("  --realtime              Pace ticks by the config's tick_duration_ms");
    println!("  --help, -h              Show this help");
}
