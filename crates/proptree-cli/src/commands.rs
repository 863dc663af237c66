use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use proptree_core::{PropService, Record, RequestContext};
use proptree_server::{PropServer, ServerConfig, SharedSecretGate};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Serve(args) => cmd_serve(args).await,
        Command::Token(args) => cmd_token(args, format),
        Command::Get(args) => cmd_get(args, format).await,
        Command::Put(args) => cmd_put(args, format).await,
        Command::Rm(args) => cmd_rm(args, format).await,
        Command::Mv(args) => cmd_mv(args, format).await,
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ServerConfig> {
    let config = match path {
        Some(path) => ServerConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig::from_env()?,
    };
    Ok(config)
}

async fn open_service(args: &StoreArgs) -> anyhow::Result<PropService> {
    let dsn = match &args.dsn {
        Some(dsn) => dsn.clone(),
        None => ServerConfig::from_env()?.dsn,
    };
    let store = proptree_store::open(&dsn)
        .await
        .with_context(|| format!("opening store {dsn}"))?;
    Ok(PropService::with_system_clock(store))
}

fn print_record(record: &Record, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(record)?),
        OutputFormat::Text => {
            println!("{}", record.path.bold());
            println!("  id:       {}", record.id.to_string().cyan());
            println!("  etag:     {}", record.etag.to_string().yellow());
            println!("  mtime:    {}", record.mtime);
            println!("  checksum: {}", record.checksum);
        }
    }
    Ok(())
}

async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    PropServer::new(config).serve().await?;
    Ok(())
}

fn cmd_token(args: TokenArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    config.validate()?;
    let ttl = args.ttl.unwrap_or(config.token_ttl_secs);
    let token = SharedSecretGate::new(&config.shared_secret, ttl).issue(&args.user)?;
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "user": args.user, "ttl_secs": ttl, "token": token })
        ),
        OutputFormat::Text => println!("{token}"),
    }
    Ok(())
}

async fn cmd_get(args: GetArgs, format: OutputFormat) -> anyhow::Result<()> {
    let svc = open_service(&args.store).await?;
    let record = svc
        .get(&RequestContext::default(), &args.path, args.force)
        .await?;
    print_record(&record, format)
}

async fn cmd_put(args: PutArgs, format: OutputFormat) -> anyhow::Result<()> {
    let svc = open_service(&args.store).await?;
    let record = svc
        .put(&RequestContext::default(), &args.path, &args.checksum)
        .await?;
    if matches!(format, OutputFormat::Text) {
        println!("{} Wrote {}", "✓".green().bold(), record.path.bold());
    }
    print_record(&record, format)
}

async fn cmd_rm(args: RmArgs, format: OutputFormat) -> anyhow::Result<()> {
    let svc = open_service(&args.store).await?;
    let removed = svc.rm(&RequestContext::default(), &args.path).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "removed": removed })),
        OutputFormat::Text => println!(
            "{} Removed {} record(s) under {}",
            "✓".green().bold(),
            removed.to_string().bold(),
            args.path
        ),
    }
    Ok(())
}

async fn cmd_mv(args: MvArgs, format: OutputFormat) -> anyhow::Result<()> {
    let svc = open_service(&args.store).await?;
    let moved = svc
        .mv(&RequestContext::default(), &args.src, &args.dst)
        .await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "moved": moved })),
        OutputFormat::Text => println!(
            "{} Moved {} record(s): {} -> {}",
            "✓".green().bold(),
            moved.to_string().bold(),
            args.src.yellow(),
            args.dst.yellow()
        ),
    }
    Ok(())
}
