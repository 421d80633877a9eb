mod cli;

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use tp_av::{ToolRegistry, YTDLP};
use tp_core::config::Config;
use tp_core::ErrorKind;
use tp_db::queries::{download_logs, error_logs};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise pick defaults from the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "tunepipe=trace,tp_server=trace,tp_av=trace,tp_db=debug,tp_core=debug,tower_http=debug"
                .to_string()
        } else {
            "tunepipe=info,tp_server=info,tp_av=info,tp_db=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Probe { url, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_url(&url, json, cli.config.as_deref()))
        }
        Commands::Logs {
            errors,
            kind,
            limit,
            offset,
        } => show_logs(cli.config.as_deref(), errors || kind.is_some(), kind, limit, offset),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("tunepipe {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn start_server(host: Option<String>, port: Option<u16>, config_path: Option<&Path>) -> Result<()> {
    let mut config = Config::load_or_default(config_path);

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting tunepipe");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    tp_server::start(config).await?;
    Ok(())
}

async fn probe_url(url: &str, json: bool, config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let tools = ToolRegistry::discover(&config.tools);
    let ytdlp = tools.require(YTDLP)?;

    let info = tp_av::ytdlp::probe(ytdlp, url, config.tools.probe_timeout()).await?;
    let duration = info.duration.map(|d| d.as_secs());

    if json {
        let value = serde_json::json!({ "title": info.title, "duration_secs": duration });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("Title: {}", info.title);
        match duration {
            Some(secs) => println!(
                "Duration: {:02}:{:02}:{:02}",
                secs / 3600,
                (secs / 60) % 60,
                secs % 60
            ),
            None => println!("Duration: unknown"),
        }
    }

    Ok(())
}

fn show_logs(
    config_path: Option<&Path>,
    errors: bool,
    kind: Option<ErrorKind>,
    limit: i64,
    offset: i64,
) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let db = tp_db::pool::open_pool(&config.server.db_path)?;
    let conn = tp_db::pool::get_conn(&db)?;

    let place = |row: &Option<String>, ip: &Option<String>| {
        format!(
            "{} ({})",
            ip.as_deref().unwrap_or("-"),
            row.as_deref().unwrap_or(tp_core::UNKNOWN)
        )
    };

    if errors {
        let total = error_logs::count_error_logs(&conn)?;
        let rows = error_logs::list_error_logs(&conn, kind, offset, limit)?;
        println!("Failed downloads: showing {} of {total}\n", rows.len());
        for row in rows {
            println!(
                "{} [{}] {} {}",
                row.error_occurred_at,
                row.error_type,
                row.url,
                place(&row.country, &row.ip_address)
            );
            println!("    {}", row.error_message);
            if let Some(line) = row.detail.lines().find(|l| !l.trim().is_empty()) {
                println!("    {}", line.trim());
            }
        }
    } else {
        let total = download_logs::count_download_logs(&conn)?;
        let rows = download_logs::list_download_logs(&conn, offset, limit)?;
        println!("Downloads: showing {} of {total}\n", rows.len());
        for row in rows {
            println!(
                "{} {} {} {}",
                row.downloaded_at,
                row.file_name,
                row.url,
                place(&row.country, &row.ip_address)
            );
        }
    }

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = Config::load_or_default(config_path);
    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut ytdlp_ok = false;

    for tool in &tools {
        let status = if tool.available { "✓" } else { "✗" };
        if tool.available && tool.name == YTDLP {
            ytdlp_ok = true;
        }

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if ytdlp_ok {
        println!("yt-dlp is available; downloads can run.");
    } else {
        println!("yt-dlp is missing. Install it or set tools.ytdlp_path.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let config = Config::load(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Database: {}", config.server.db_path.display());
    println!("  Max concurrent downloads: {}", config.download.capacity());
    println!("  Timeout: {} minutes", config.download.timeout_minutes);
    match config.download.max_duration_minutes {
        Some(limit) => println!("  Max duration: {limit} minutes"),
        None => println!("  Max duration: unlimited"),
    }
    println!("  Rate limit: {} requests/minute", config.server.rate_limit_per_minute);
    println!("  Geo lookup enabled: {}", config.geo.enabled);

    for warning in config.validate() {
        println!("  warning: {warning}");
    }

    Ok(())
}
