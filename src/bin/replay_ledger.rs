use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use crease_live::console::render_scorecard;
use crease_live::persist;
use crease_live::processor::CommandProcessor;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: replay_ledger <export.ledger.json>")?;

    let export = persist::load_export(&path)?;
    let processor = CommandProcessor::replay(&export)
        .with_context(|| format!("replaying {}", path.display()))?;

    // The exported ledgers carry timestamps from the original run, so compare what they mean.
    for innings in processor.state().all_innings() {
        let Some(saved) = export.ledgers.iter().find(|l| l.slot == innings.slot()) else {
            bail!("export has no ledger for {}", innings.slot());
        };
        let same = saved.ledger.len() == innings.ledger().len()
            && saved
                .ledger
                .events()
                .iter()
                .zip(innings.ledger().events())
                .all(|(a, b)| a.sequence == b.sequence && a.payload == b.payload && a.runs == b.runs);
        if !same {
            bail!("{} ledger differs from the replayed one", innings.slot());
        }
    }
    if processor.snapshot() != export.snapshot {
        bail!("replayed snapshot differs from the exported one");
    }

    println!("{}", render_scorecard(&export.snapshot));
    println!(
        "\nreplayed {} commands from {} (exported {})",
        export.journal.len(),
        path.display(),
        export.exported_at.to_rfc3339()
    );
    Ok(())
}
