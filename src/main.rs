use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use treesnap::diff::diff_snapshots;
use treesnap::error::Error;
use treesnap::loader;
use treesnap::snapshot::project_tree;

#[derive(Parser)]
#[command(name = "treesnap", version, about = "Deterministic snapshots of package dependency trees")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Project a graph manifest into a snapshot tree
    Show {
        /// Graph manifest (JSON) to load
        manifest: PathBuf,

        /// Location of the node to start from (defaults to the top of the tree)
        #[arg(long)]
        root: Option<String>,

        /// Output machine-readable JSON
        #[arg(long)]
        json: bool,

        /// Save the snapshot to a file for later comparison
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Compare two saved snapshots
    Diff {
        /// First snapshot file (the "before" or "baseline")
        a: PathBuf,

        /// Second snapshot file (the "after" or "current")
        b: PathBuf,

        /// Output machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}

/// Exit status for `diff` when the snapshots differ.
const DIFFERENT: u8 = 1;
/// Exit status for any error.
const FAILURE: u8 = 2;

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Show {
            manifest,
            root,
            json,
            save,
        } => run_show(&manifest, root.as_deref(), json, save.as_deref()),
        Commands::Diff { a, b, json } => run_diff(&a, &b, json),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            if let Some(hint) = e.hint() {
                eprintln!("hint: {hint}");
            }
            ExitCode::from(FAILURE)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_show(manifest: &Path, root: Option<&str>, json: bool, save: Option<&Path>) -> Result<ExitCode, Error> {
    let start = Instant::now();
    let loaded = loader::load_graph(manifest)?;
    let root_id = match root {
        Some(location) => loaded
            .graph
            .find(loaded.root, location)
            .ok_or_else(|| Error::RootNotFound(location.to_string()))?,
        None => loaded.root,
    };

    let snapshot = project_tree(&loaded.graph, root_id);
    tracing::info!(
        nodes = snapshot.node_count(),
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "projected snapshot"
    );

    if let Some(save_path) = save {
        loader::save_snapshot(&snapshot, save_path)?;
        eprintln!("Snapshot saved to {}", save_path.display());
    }

    let out = if json {
        snapshot.to_json().map_err(Error::SnapshotEncode)?
    } else {
        snapshot.to_string()
    };
    print_out(&out)?;
    Ok(ExitCode::SUCCESS)
}

fn run_diff(a: &Path, b: &Path, json: bool) -> Result<ExitCode, Error> {
    let before = loader::load_snapshot(a)?;
    let after = loader::load_snapshot(b)?;
    let diff = diff_snapshots(&before, &after);

    let out = if json {
        serde_json::to_string_pretty(&diff).map_err(Error::SnapshotEncode)?
    } else {
        diff.to_string()
    };
    print_out(&out)?;
    Ok(if diff.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(DIFFERENT)
    })
}

fn print_out(text: &str) -> Result<(), Error> {
    write_out(&mut std::io::stdout().lock(), text)
}

// Closed pipes (`treesnap show ... | head`) are not an error.
fn write_out(out: &mut impl Write, text: &str) -> Result<(), Error> {
    let result = out.write_all(text.as_bytes()).and_then(|()| {
        if text.ends_with('\n') {
            Ok(())
        } else {
            out.write_all(b"\n")
        }
    });
    match result {
        Err(e) if e.kind() != ErrorKind::BrokenPipe => Err(Error::OutputWrite(e)),
        _ => Ok(()),
    }
}
