use galactic_nbody::{bench_forces, ParametersFile, Simulation};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
struct Args {
    /// Scenario file, relative to the crate's scenarios/ directory
    #[arg(short, long, default_value = "orphan_test_hessian.yaml")]
    file: String,

    /// Write the final snapshot here (text, one body per line)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Time direct vs. tree forces instead of running a scenario
    #[arg(long)]
    bench: bool,
}

// load here to keep main clean
fn load_scenario_from_yaml(file_name: &str) -> Result<ParametersFile> {
    let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios").join(file_name);
    let cfg = ParametersFile::from_path(&config_path)
        .with_context(|| format!("failed to load scenario {}", config_path.display()))?;
    Ok(cfg)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.bench {
        bench_forces(&[200, 400, 800, 1600, 3200, 6400, 12800])?;
        return Ok(());
    }

    let cfg = load_scenario_from_yaml(&args.file)?;
    if let Some(headline) = &cfg.context().headline {
        info!("scenario: {headline}");
    }

    let mut sim = Simulation::from_config(&cfg)?;
    let e0 = sim.energy().total();

    let snapshot = sim.run()?;

    let e1 = sim.energy().total();
    info!(
        "energy: {:.9e} -> {:.9e} (relative change {:.3e})",
        e0,
        e1,
        ((e1 - e0) / e0).abs()
    );
    info!("final state fingerprint {:016x}", snapshot.fingerprint());

    match args.output {
        Some(path) => {
            let mut w = BufWriter::new(File::create(&path)?);
            snapshot.write_text(&mut w)?;
            w.flush()?;
            info!("wrote {} bodies to {}", snapshot.len(), path.display());
        }
        None => {
            let stdout = std::io::stdout();
            snapshot.write_text(stdout.lock())?;
        }
    }

    Ok(())
}
