use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use phoebe::config::Overrides;

#[derive(Parser)]
#[command(name = "phoebe")]
#[command(about = "A wiki served over Gemini and Titan", long_about = None)]
struct Cli {
    /// Hostname to serve (repeatable; the first one is the default)
    #[arg(long = "host")]
    host: Vec<String>,

    /// Port to listen on (repeatable)
    #[arg(long = "port")]
    port: Vec<u16>,

    /// Certificate file, paired positionally with --host (repeatable)
    #[arg(long = "cert_file")]
    cert_file: Vec<PathBuf>,

    /// Key file, paired positionally with --host (repeatable)
    #[arg(long = "key_file")]
    key_file: Vec<PathBuf>,

    /// Wiki data directory
    #[arg(long = "wiki_dir", env = "PHOEBE_DATA_DIR")]
    wiki_dir: Option<PathBuf>,

    /// Wiki space, optionally as host/space (repeatable)
    #[arg(long = "wiki_space")]
    wiki_space: Vec<String>,

    /// Token accepted for writes (repeatable)
    #[arg(long = "wiki_token")]
    wiki_token: Vec<String>,

    /// Extra page linked from the main menu (repeatable)
    #[arg(long = "wiki_page")]
    wiki_page: Vec<String>,

    /// Page transcluded at the top of the main menu
    #[arg(long = "wiki_main_page")]
    wiki_main_page: Option<String>,

    /// MIME type allowed for file uploads; a bare type like "image"
    /// matches all its subtypes (repeatable)
    #[arg(long = "wiki_mime_type")]
    wiki_mime_type: Vec<String>,

    /// Maximum page upload size in bytes
    #[arg(long = "wiki_page_size_limit")]
    wiki_page_size_limit: Option<usize>,

    /// Client certificate SHA-256 fingerprint allowed to write (repeatable)
    #[arg(long = "wiki_fingerprint")]
    wiki_fingerprint: Vec<String>,

    /// Log verbosity: 0 off, 1 errors, 2 info, 3 requests, 4 traces
    #[arg(long = "log_level", default_value_t = 2)]
    log_level: u8,

    /// Log to this file instead of standard error
    #[arg(long = "log_file")]
    log_file: Option<PathBuf>,

    /// Write the process id to this file
    #[arg(long = "pid_file")]
    pid_file: Option<PathBuf>,

    /// Start a new session
    #[arg(long)]
    setsid: bool,

    /// Run as this user
    #[arg(long)]
    user: Option<String>,

    /// Run as this group
    #[arg(long)]
    group: Option<String>,
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let level = match cli.log_level {
        0 => "off",
        1 => "error",
        2 => "info",
        3 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::from_default_env().add_directive(format!("phoebe={level}").parse()?);
    match &cli.log_file {
        Some(path) => {
            let file = File::create(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    #[cfg(unix)]
    {
        if cli.setsid {
            phoebe::daemon::setsid()?;
        }
        if let Some(pid_file) = &cli.pid_file {
            phoebe::daemon::write_pid_file(pid_file)?;
        }
        phoebe::daemon::drop_privileges(cli.user.as_deref(), cli.group.as_deref())?;
    }

    let overrides = Overrides {
        hosts: cli.host,
        ports: cli.port,
        cert_files: cli.cert_file,
        key_files: cli.key_file,
        wiki_dir: cli.wiki_dir,
        spaces: cli.wiki_space,
        tokens: cli.wiki_token,
        pages: cli.wiki_page,
        main_page: cli.wiki_main_page,
        mime_types: cli.wiki_mime_type,
        page_size_limit: cli.wiki_page_size_limit,
        fingerprints: cli.wiki_fingerprint,
        extensions: Vec::new(),
    };

    phoebe::server::run(overrides).await
}
