use anyhow::{bail, Context};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use jarpatch::manifest::{self, ArtifactState};
use jarpatch::pipeline::{self, PipelineConfig};
use jarpatch::{apply, create, workspace};

#[derive(Parser)]
#[command(name = "jarpatch", version, about = "Source patch generator and applier for jar archives")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides this.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Diff a working tree against a baseline jar and write one .patch per changed file
    Generate {
        /// Baseline sources jar
        #[arg(long)]
        baseline: PathBuf,
        /// Working tree mirroring the jar's entry paths
        #[arg(long)]
        tree: PathBuf,
        /// Patch directory (deleted and recreated)
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Apply a patch directory to a baseline jar, writing a new jar
    Apply {
        /// Baseline sources jar
        #[arg(long)]
        baseline: PathBuf,
        /// Patch directory; without it the baseline is copied unchanged
        #[arg(long, short)]
        patches: Option<PathBuf>,
        /// Output jar
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Extract a jar into <output>/src/main/java, replacing any previous workspace
    Workspace {
        /// Jar to extract
        #[arg(long)]
        archive: PathBuf,
        /// Workspace directory (deleted and recreated)
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Print the metadata URL for a version listed in a version manifest
    ResolveVersion {
        /// Version manifest JSON
        #[arg(long)]
        manifest: PathBuf,
        /// Version id, e.g. 1.16.4
        #[arg(long)]
        version: String,
    },
    /// Check downloaded client/server jars against the version info SHA-1 digests
    Verify {
        /// Per-version info JSON
        #[arg(long)]
        version_info: PathBuf,
        #[arg(long)]
        client: PathBuf,
        #[arg(long)]
        server: PathBuf,
    },
    /// Apply patches and build workspaces for the targets in a pipeline config
    Setup {
        /// Pipeline config (TOML)
        #[arg(long, short)]
        config: PathBuf,
        /// Only run these targets
        #[arg(long = "target", short)]
        targets: Vec<String>,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "jarpatch=info",
        1 => "jarpatch=debug",
        _ => "jarpatch=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Generate {
            baseline,
            tree,
            output,
        } => {
            println!("Generating patches...");
            println!("  Baseline: {}", baseline.display());
            println!("  Tree: {}", tree.display());
            println!("  Output: {}", output.display());

            let start = Instant::now();
            let summary = {
                let output = output.clone();
                tokio::task::spawn_blocking(move || create::generate_patches(&baseline, &tree, &output))
                    .await?
            }
            .with_context(|| format!("Failed to generate patches into {}", output.display()))?;
            let elapsed = start.elapsed();

            println!("\nPatches generated successfully!");
            println!("  Files scanned: {}", summary.files_scanned);
            println!("  Patches written: {}", summary.patches_written);
            println!("  Unchanged: {}", summary.unchanged);
            println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());
        }
        Commands::Apply {
            baseline,
            patches,
            output,
        } => {
            println!("Applying patches...");
            println!("  Baseline: {}", baseline.display());
            match &patches {
                Some(p) => println!("  Patches: {}", p.display()),
                None => println!("  Patches: (none)"),
            }
            println!("  Output: {}", output.display());

            let start = Instant::now();
            let summary = {
                let output = output.clone();
                tokio::task::spawn_blocking(move || {
                    apply::apply_patches(&baseline, patches.as_deref(), &output)
                })
                .await?
            }
            .with_context(|| format!("Failed to write patched archive {}", output.display()))?;
            let elapsed = start.elapsed();

            println!("\nPatches applied successfully!");
            println!("  Entries: {}", summary.entries);
            println!("  Patched: {}", summary.patched);
            println!("  Copied: {}", summary.copied);
            println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());
        }
        Commands::Workspace { archive, output } => {
            let start = Instant::now();
            let files = {
                let output = output.clone();
                tokio::task::spawn_blocking(move || workspace::create_workspace(&archive, &output))
                    .await?
            }
            .with_context(|| format!("Failed to create workspace {}", output.display()))?;

            println!("Workspace created: {}", output.display());
            println!("  Files extracted: {}", files);
            println!("  Time elapsed: {:.3}s", start.elapsed().as_secs_f64());
        }
        Commands::ResolveVersion { manifest, version } => {
            let url = manifest::resolve_version_url(&manifest, &version)
                .with_context(|| format!("Failed to resolve version {version}"))?;
            println!("{url}");
        }
        Commands::Verify {
            version_info,
            client,
            server,
        } => {
            let checks = manifest::verify_downloads(&version_info, &client, &server)
                .context("Failed to check downloads")?;

            let mut failed = 0;
            for check in &checks {
                match &check.state {
                    ArtifactState::UpToDate => {
                        println!("  {}: ok ({})", check.kind, check.path.display())
                    }
                    ArtifactState::Missing => {
                        failed += 1;
                        println!("  {}: missing ({}), download from {}", check.kind, check.path.display(), check.url)
                    }
                    ArtifactState::Mismatch { expected, actual } => {
                        failed += 1;
                        println!(
                            "  {}: checksum mismatch ({}), expected {expected}, got {actual}",
                            check.kind,
                            check.path.display()
                        )
                    }
                }
            }
            if let Some(err) = checks.iter().find_map(|c| c.ensure().err()) {
                return Err(anyhow::Error::new(err)
                    .context(format!("{failed} of {} downloads are missing or corrupt", checks.len())));
            }
            println!("All downloads verified.");
        }
        Commands::Setup { config, targets } => {
            let pipeline_config = PipelineConfig::load(&config)
                .with_context(|| format!("Failed to load pipeline config {}", config.display()))?;
            let plans = pipeline_config.plans(&config, &targets)?;
            if plans.is_empty() {
                bail!("No targets configured in {}", config.display());
            }

            let start = Instant::now();
            // Targets share nothing, so each runs on its own blocking task.
            let handles: Vec<_> = plans
                .into_iter()
                .map(|plan| {
                    tokio::task::spawn_blocking(move || {
                        let result = pipeline::run_target(&plan);
                        (plan.name, result)
                    })
                })
                .collect();

            let mut errors = Vec::new();
            for handle in handles {
                let (name, result) = handle.await?;
                match result {
                    Ok(report) => {
                        println!("Target {name}:");
                        match report.applied {
                            Some(s) => println!("  Patched: {} of {} entries", s.patched, s.entries),
                            None => println!("  Patched jar up to date"),
                        }
                        println!("  Files extracted: {}", report.files_extracted);
                    }
                    Err(e) => {
                        tracing::error!(target_name = %name, error = %e, "target failed");
                        errors.push(anyhow::Error::new(e).context(format!("Target {name} failed")));
                    }
                }
            }
            println!("  Time elapsed: {:.3}s", start.elapsed().as_secs_f64());

            if let Some(first) = errors.into_iter().next() {
                return Err(first);
            }
        }
    }

    Ok(())
}
