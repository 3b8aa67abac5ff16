use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use git_select::{EventSource, GitSelect, GitSelectError, RecordOptions, record};
use std::io::{self, Read};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "git-select")]
#[command(about = "Interactive line-level git change selection")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pick changes interactively and stage them
    Stage {
        /// Repository to operate on
        #[arg(short = 'C', long = "repo", default_value = ".")]
        repo: String,

        /// Context lines shown around each change
        #[arg(short = 'U', long, default_value_t = 3)]
        unified: u32,

        /// Read the diff from a file ("-" for stdin) instead of running git diff
        #[arg(long, value_name = "FILE")]
        input: Option<String>,

        /// Print the staged patch instead of applying it to the index
        #[arg(long)]
        print: bool,

        /// Also write the unselected changes to this file
        #[arg(long, value_name = "FILE")]
        remainder: Option<PathBuf>,

        /// Refuse an empty confirm instead of asking whether to leave
        #[arg(long)]
        no_confirm: bool,

        /// Limit the diff to these paths
        paths: Vec<String>,
    },
    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
    /// Print the man page
    Man,
}

/// Log to the file named by `GIT_SELECT_LOG`; the terminal belongs to the UI.
fn init_tracing() {
    let Some(path) = std::env::var_os("GIT_SELECT_LOG") else {
        return;
    };
    let file = match std::fs::File::create(&path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("Cannot open log file {}: {err}", path.to_string_lossy());
            return;
        }
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .try_init();
}

fn read_input(input: &str) -> io::Result<String> {
    if input == "-" {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        std::fs::read_to_string(input)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Stage {
            repo,
            unified,
            input,
            print,
            remainder,
            no_confirm,
            paths,
        } => {
            let git = GitSelect::new(&repo);
            let diff = match &input {
                Some(input) => read_input(input)?,
                None => git.diff(&paths, unified)?,
            };
            let options = RecordOptions {
                confirm_empty: !no_confirm,
            };

            let recorded = match record(&diff, options, EventSource::Crossterm) {
                Ok(Some(recorded)) => recorded,
                Ok(None) => {
                    eprintln!("Aborted, nothing staged");
                    return Ok(());
                }
                Err(GitSelectError::NoChanges) => {
                    eprintln!("No changes");
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            };

            if let Some(path) = remainder {
                std::fs::write(path, recorded.remainder.to_string())?;
            }
            if print {
                print!("{}", recorded.staged);
            } else {
                git.apply_cached(&recorded.staged)?;
                info!(files = recorded.staged.files.len(), "staged selection");
            }
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "git-select", &mut io::stdout());
        }
        Commands::Man => {
            clap_mangen::Man::new(Cli::command()).render(&mut io::stdout())?;
        }
    }

    Ok(())
}
