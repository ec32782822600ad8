use clap::{Parser, Subcommand};
use serde_json::Value;

use configd::rpc::client::{ClientError, RpcClient};
use configd::rpc::Request;
use configd::Scope;

#[derive(Parser)]
#[command(name = "configd-cli")]
#[command(about = "Command-line client for the configuration daemon", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:7171")]
    url: String,

    /// Session identifier used by session-scoped commands.
    #[arg(short, long, default_value = "cli")]
    session: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ScopeArg {
    Running,
    Candidate,
    Auto,
}

impl From<ScopeArg> for Scope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Running => Scope::Running,
            ScopeArg::Candidate => Scope::Candidate,
            ScopeArg::Auto => Scope::Auto,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Daemon version, uptime, and open sessions
    Status,
    /// Create the session
    Setup,
    /// Destroy the session and its candidate
    Teardown,
    /// Add a path to the candidate
    Set { path: Vec<String> },
    /// Remove a path from the candidate
    Delete { path: Vec<String> },
    /// Attach a comment to a candidate node; an empty text removes it
    Comment {
        #[arg(short, long, default_value = "")]
        text: String,
        path: Vec<String>,
    },
    /// Check the candidate without committing
    Validate,
    /// Drop all uncommitted edits
    Discard,
    /// Apply the candidate to running
    Commit {
        #[arg(short, long, default_value = "")]
        comment: String,
    },
    /// Apply the candidate, reverting unless a commit confirms it in time
    ConfirmedCommit {
        #[arg(short, long, default_value = "")]
        comment: String,
        /// Minutes to wait for confirmation
        #[arg(short, long, default_value_t = 10)]
        minutes: u64,
    },
    /// Revert a pending confirmed commit now
    CancelCommit,
    /// Write running to the boot configuration file
    Save,
    /// Replace the candidate with a file's contents
    Load { file: String },
    /// Apply a file's contents on top of the candidate
    Merge { file: String },
    /// Print configuration in boot-file format
    Show {
        #[arg(long, value_enum, default_value = "auto")]
        scope: ScopeArg,
        path: Vec<String>,
    },
    /// Print configuration as JSON
    Tree {
        #[arg(long, value_enum, default_value = "auto")]
        scope: ScopeArg,
        path: Vec<String>,
    },
    /// Report whether the candidate differs from running
    Changed,
    /// Help text for what may follow a path
    Help {
        #[arg(long)]
        pattern: bool,
        path: Vec<String>,
    },
}

impl Commands {
    fn into_request(self, session: String) -> Option<Request> {
        let request = match self {
            Commands::Status => return None,
            Commands::Setup => Request::SessionSetup { session },
            Commands::Teardown => Request::SessionTeardown { session },
            Commands::Set { path } => Request::Set { session, path },
            Commands::Delete { path } => Request::Delete { session, path },
            Commands::Comment { text, path } => Request::Comment {
                session,
                path,
                comment: text,
            },
            Commands::Validate => Request::Validate { session },
            Commands::Discard => Request::Discard { session },
            Commands::Commit { comment } => Request::Commit { session, comment },
            Commands::ConfirmedCommit { comment, minutes } => Request::ConfirmedCommit {
                session,
                comment,
                timeout_secs: minutes.saturating_mul(60),
            },
            Commands::CancelCommit => Request::CancelCommit { session },
            Commands::Save => Request::Save,
            Commands::Load { file } => Request::Load { session, file },
            Commands::Merge { file } => Request::Merge { session, file },
            Commands::Show { scope, path } => Request::Show {
                session,
                scope: scope.into(),
                path,
            },
            Commands::Tree { scope, path } => Request::TreeGet {
                session,
                scope: scope.into(),
                path,
            },
            Commands::Changed => Request::SessionChanged { session },
            Commands::Help { pattern, path } => Request::GetHelp {
                session,
                path,
                with_pattern: pattern,
            },
        };
        Some(request)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = RpcClient::new(cli.url);

    let result = match cli.command.into_request(cli.session) {
        None => client.status().await,
        Some(
            request @ (Request::Commit { .. }
            | Request::ConfirmedCommit { .. }
            | Request::CancelCommit { .. }),
        ) => client.call_with_retry(&request).await,
        Some(request) => client.call(&request).await,
    };

    match result {
        Ok(value) => print_value(&value)?,
        Err(ClientError::Rpc { kind, message }) => {
            eprintln!("Error ({:?}): {}", kind, message);
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn print_value(value: &Value) -> Result<(), Box<dyn std::error::Error>> {
    match value {
        Value::Null => {}
        Value::String(text) => print!("{}", text),
        other => println!("{}", serde_json::to_string_pretty(other)?),
    }
    Ok(())
}
