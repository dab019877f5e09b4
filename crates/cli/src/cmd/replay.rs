//! Replay an event script through the dispatcher

use cli_lib::script::{self, Step};
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::io::Write;
use std::path::Path;
use tokio::sync::mpsc;
use watcher::{DispatchConfig, DispatchStats, Dispatcher, PackedEvent};

pub async fn run(input: &str, config_path: Option<&Path>, streamed: bool) -> Result<()> {
    let config = match config_path {
        Some(path) => DispatchConfig::load(path)?,
        None => DispatchConfig::default(),
    };
    let steps = script::load(input)?;

    let stats = if streamed {
        run_streamed(steps, config).await?
    } else {
        run_stepped(steps, config)?
    };

    eprintln!(
        "{} {} submitted, {} folded, {} packed",
        "Replay complete:".green().bold(),
        stats.submitted,
        stats.morphed.to_string().yellow(),
        stats.packed
    );
    Ok(())
}

/// Submit events in script order, packing at each `flush` step and at the end
fn run_stepped(steps: Vec<Step>, config: DispatchConfig) -> Result<DispatchStats> {
    let mut dispatcher = Dispatcher::new(config)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    for step in steps {
        match step {
            Step::Event(evt) => {
                dispatcher.submit(evt)?;
            }
            Step::Flush => drain(&mut dispatcher, &mut out)?,
        }
    }
    drain(&mut dispatcher, &mut out)?;

    Ok(dispatcher.stats())
}

fn drain(dispatcher: &mut Dispatcher, out: &mut impl Write) -> Result<()> {
    while dispatcher.queued() > 0 {
        write_batch(&dispatcher.flush()?, out)?;
    }
    Ok(())
}

/// Feed events through the dispatch loop; `flush` steps are ignored and
/// packing follows the configured interval
async fn run_streamed(steps: Vec<Step>, config: DispatchConfig) -> Result<DispatchStats> {
    let (event_tx, event_rx) = mpsc::channel(config.channel_capacity);
    let (packed_tx, mut packed_rx) = mpsc::channel::<Vec<PackedEvent>>(16);

    let dispatcher = Dispatcher::new(config)?;
    let dispatcher = tokio::spawn(dispatcher.run(event_rx, packed_tx));
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(batch) = packed_rx.recv().await {
            write_batch(&batch, &mut stdout)?;
        }
        Ok::<(), anyhow::Error>(())
    });

    for step in steps {
        if let Step::Event(evt) = step {
            event_tx
                .send(evt)
                .await
                .context("Dispatcher stopped before the script finished")?;
        }
    }
    drop(event_tx);

    let stats = dispatcher.await.context("Dispatcher task failed")??;
    printer.await.context("Printer task failed")??;
    Ok(stats)
}

fn write_batch(batch: &[PackedEvent], out: &mut impl Write) -> Result<()> {
    for packed in batch {
        writeln!(out, "{}", packed.to_json()?)?;
    }
    out.flush()?;
    Ok(())
}
