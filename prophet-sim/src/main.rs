// Prophet simulator: runs a contact schedule through one router per node.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use prophet_sim::{config, logging, Simulation};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<()> {
    let mut config_path: Option<PathBuf> = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("prophet-sim {}", VERSION);
                return Ok(());
            }
            "--config" | "-c" => {
                let Some(p) = args.next() else {
                    bail!("--config needs a path");
                };
                config_path = Some(PathBuf::from(p));
            }
            other => bail!("unknown argument {other:?}"),
        }
    }

    logging::init();
    let cfg = match config_path {
        Some(p) => {
            let mut c = config::load_file(&p)?;
            config::apply_env(&mut c, |k| std::env::var(k).ok());
            c
        }
        None => config::load()?,
    };
    let mut sim = Simulation::new(&cfg).context("building simulation")?;

    let stop = Arc::new(AtomicBool::new(false));
    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(async {
        let stop_run = stop.clone();
        let mut run = tokio::task::spawn_blocking(move || sim.run_until(&stop_run));
        tokio::select! {
            r = &mut run => r.context("simulation task"),
            s = shutdown_signal() => {
                s?;
                stop.store(true, Ordering::Relaxed);
                run.await.context("simulation task")
            }
        }
    })?;
    println!("{report}");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
