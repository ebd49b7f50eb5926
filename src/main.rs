//! sockbridge - bridge TCP and Unix domain socket endpoints

use std::path::PathBuf;

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sockbridge::app::{Runtime, RuntimeConfig};
use sockbridge::config::Config;
use sockbridge::error::Result;

fn main() -> Result<()> {
    let args = Args::parse();

    if args.version {
        print_version();
        return Ok(());
    }

    if args.gen_config {
        let json = serde_json::to_string_pretty(&Config::example())
            .map_err(|e| sockbridge::Error::Config(e.to_string()))?;
        println!("{}", json);
        return Ok(());
    }

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::from_args(String::new(), String::new()),
    };
    if let (Some(listen), Some(forward)) = (&args.listen, &args.forward) {
        config.listen = listen.clone();
        config.forward = forward.clone();
    }
    if let Some(secs) = args.idle_timeout {
        config.timeouts.idle_secs = secs;
    }

    if config.listen.is_empty() || config.forward.is_empty() {
        print_usage();
        std::process::exit(1);
    }

    // Initialize logging
    let log_level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .or_else(|| config.log.level.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let runtime_config = RuntimeConfig::try_from(&config)?;

    info!("sockbridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let runtime = Runtime::from_config(runtime_config)?;
        runtime.run().await
    })?;

    info!("Goodbye!");
    Ok(())
}

/// Command line arguments
struct Args {
    config: Option<PathBuf>,
    listen: Option<String>,
    forward: Option<String>,
    idle_timeout: Option<u64>,
    gen_config: bool,
    version: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().skip(1).collect();
        match Self::parse_from(&args) {
            Ok(Some(args)) => args,
            Ok(None) => {
                print_help();
                std::process::exit(0);
            }
            Err(msg) => {
                if !msg.is_empty() {
                    eprintln!("{}", msg);
                }
                print_usage();
                std::process::exit(1);
            }
        }
    }

    /// Parse arguments without the program name; `Ok(None)` means help was requested
    fn parse_from(args: &[String]) -> std::result::Result<Option<Self>, String> {
        let mut config = None;
        let mut idle_timeout = None;
        let mut gen_config = false;
        let mut version = false;
        let mut positional = Vec::new();

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-c" | "--config" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| format!("Missing value for {}", arg))?;
                    config = Some(PathBuf::from(value));
                }
                "--idle-timeout" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| format!("Missing value for {}", arg))?;
                    let secs = value
                        .parse()
                        .map_err(|_| format!("Invalid idle timeout: {}", value))?;
                    idle_timeout = Some(secs);
                }
                "--gen-config" => gen_config = true,
                "-v" | "--version" => version = true,
                "-h" | "--help" => return Ok(None),
                other if !other.starts_with('-') => {
                    positional.push(other.to_string());
                }
                other => return Err(format!("Unknown option: {}", other)),
            }
        }

        if !positional.is_empty() && positional.len() != 2 {
            return Err(String::new());
        }
        let mut positional = positional.into_iter();

        Ok(Some(Self {
            config,
            listen: positional.next(),
            forward: positional.next(),
            idle_timeout,
            gen_config,
            version,
        }))
    }
}

fn print_usage() {
    let program = std::env::args().next().unwrap_or_else(|| "sockbridge".to_string());
    eprintln!(
        r#"Usage: {program} [OPTIONS] <LISTEN> <FORWARD>

Eg:
    {program} 127.0.0.1:9222 unix:/tmp/chrome-run/.devtools.sock
    {program} unix:/tmp/chrome-run/.devtools.sock 127.0.0.1:9222"#
    );
}

fn print_help() {
    println!(r#"sockbridge - bridge TCP and Unix domain socket endpoints

USAGE:
    sockbridge [OPTIONS] <LISTEN> <FORWARD>

ADDRESSES:
    host:port               TCP address (e.g. 127.0.0.1:9222, [::1]:80, :8080)
    unix:<path>             Unix domain socket path

OPTIONS:
    -c, --config <FILE>     Path to JSON configuration file
    --idle-timeout <SECS>   Idle timeout per read/write (default 300)
    --gen-config            Print an example configuration
    -v, --version           Print version information
    -h, --help              Print help information

EXAMPLES:
    sockbridge 127.0.0.1:9222 unix:/tmp/chrome-run/.devtools.sock
    sockbridge unix:/tmp/chrome-run/.devtools.sock 127.0.0.1:9222
    sockbridge -c bridge.json
    sockbridge --gen-config > bridge.json
"#);
}

fn print_version() {
    println!("sockbridge v{}", env!("CARGO_PKG_VERSION"));
}
