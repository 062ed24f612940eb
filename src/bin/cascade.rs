use cascade::{
    discover_project_root, graph_to_dot, BuildOptions, ChangeEvent, ChangeListener,
    CouplingOptions, FileWatcher, GraphUpdateListener, IncrementalUpdateResult, ProjectSession,
    WatchOptions,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

#[derive(Debug, Parser)]
#[command(name = "cascade", version, about = "File-level dependency graph and change-impact analysis")]
struct Args {
    /// Project root; discovered by walking upward from the cwd if omitted
    #[arg(long = "root", global = true)]
    root: Option<PathBuf>,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum, default_value_t = OutputFormat::Json, global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build the dependency graph and print a summary
    Build {
        /// Stop discovery after this many files
        #[arg(long = "max-files")]
        max_files: Option<usize>,
    },
    /// Impact of changing one file
    Impact {
        /// File to analyse (absolute, or relative to the project root)
        file: String,
        /// Attach hidden change couplings from git history
        #[arg(long)]
        coupling: bool,
    },
    /// Most-depended-on files
    Hubs {
        #[arg(short = 'n', long = "top", default_value_t = 10)]
        top: usize,
    },
    /// File pairs that change together in git history
    Couplings {
        #[arg(long, default_value_t = 500)]
        commits: usize,
        #[arg(long = "min-support", default_value_t = 3)]
        min_support: u32,
        #[arg(long = "min-confidence", default_value_t = 0.3)]
        min_confidence: f64,
    },
    /// Watch the source roots and keep the graph live
    Watch {
        /// Debounce window in milliseconds
        #[arg(long = "debounce-ms", default_value_t = 1500)]
        debounce_ms: u64,
    },
    /// Export the graph in GraphViz dot form
    Dot,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let root = match args.root {
        Some(r) => r,
        None => {
            let cwd = std::env::current_dir()?;
            discover_project_root(&cwd)
                .ok_or_else(|| anyhow::anyhow!("no project root found above {}", cwd.display()))?
        }
    };

    match args.command {
        Command::Build { max_files } => {
            let session = ProjectSession::build(&root, &BuildOptions { max_files });
            print_value(&session.graph().summary(), args.format)?;
        }
        Command::Impact { file, coupling } => {
            let mut session = ProjectSession::build(&root, &BuildOptions::default());
            match session.analyse_impact(&file, coupling) {
                Ok(report) => print_value(&report, args.format)?,
                Err(e) => {
                    eprintln!("{e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Hubs { top } => {
            let session = ProjectSession::build(&root, &BuildOptions::default());
            print_value(&session.hub_files(top), args.format)?;
        }
        Command::Couplings {
            commits,
            min_support,
            min_confidence,
        } => {
            let mut session = ProjectSession::build(&root, &BuildOptions::default());
            let result = session.couplings(&CouplingOptions {
                max_commits: commits,
                min_support,
                min_confidence,
                ..CouplingOptions::default()
            });
            print_value(&result, args.format)?;
        }
        Command::Watch { debounce_ms } => {
            let mut session = ProjectSession::build(&root, &BuildOptions::default());
            session.subscribe_changes(Box::new(PrintChanges));
            session.subscribe_graph_updates(Box::new(PrintUpdates));
            let mut watcher = FileWatcher::new(
                session.graph(),
                WatchOptions {
                    debounce: Duration::from_millis(debounce_ms),
                },
            );
            watcher.run(&mut session)?;
        }
        Command::Dot => {
            let session = ProjectSession::build(&root, &BuildOptions::default());
            print!("{}", graph_to_dot(session.graph(), session.scc()));
        }
    }
    Ok(())
}

struct PrintChanges;

impl ChangeListener for PrintChanges {
    fn on_change(&self, event: &ChangeEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{line}");
        }
    }
}

struct PrintUpdates;

impl GraphUpdateListener for PrintUpdates {
    fn on_graph_updated(&self, result: &IncrementalUpdateResult) {
        if let Ok(line) = serde_json::to_string(result) {
            println!("{line}");
        }
    }
}

fn print_value<T: serde::Serialize>(value: &T, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}
