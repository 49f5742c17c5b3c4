use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use chrono::FixedOffset;
use clap::{Parser, Subcommand};
use memo_core::{CategoryCatalog, MemoStore, Session, WizardController};
use server_api::ApiContext;
use shared::{
    domain::{Memo, MemoId},
    error::ApiException,
};
use storage::Storage;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

mod compose;

use compose::Console;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/memos.db")]
    database_url: String,
    /// TOML file replacing the built-in category catalog.
    #[arg(long)]
    catalog: Option<PathBuf>,
    /// Created on first use.
    #[arg(long, default_value = "me")]
    username: String,
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    tz_offset_minutes: i32,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a new memo step by step.
    Compose,
    /// Revise one of your saved memos.
    Edit { memo_id: i64 },
    List {
        #[arg(long)]
        keyword: Option<String>,
        #[arg(long)]
        tag: Option<String>,
    },
    /// Everyone's public memos.
    Public,
    Stats,
    ExportCsv {
        memo_id: i64,
        /// Defaults to a file named after the memo in the current directory.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Delete { memo_id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;
    let catalog = match &cli.catalog {
        Some(path) => CategoryCatalog::load(path)?,
        None => CategoryCatalog::builtin(),
    };
    let offset = cli
        .tz_offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .with_context(|| format!("utc offset of {} minutes is out of range", cli.tz_offset_minutes))?;
    let ctx = ApiContext::new(storage, Arc::new(catalog)).with_default_offset(offset);

    let login = server_api::login(&ctx, &cli.username)
        .await
        .map_err(ApiException::from)?;
    let session = Session::new(login.user_id).with_display_name(login.profile.display_name);
    let user_id = login.user_id;

    match cli.command {
        Command::Compose => {
            let mut wizard = WizardController::new(session, ctx.catalog.clone());
            let mut console = Console::new(BufReader::new(tokio::io::stdin()));
            match compose::run(&mut console, &mut wizard, &ctx.storage).await? {
                Some(memo_id) => println!("saved memo_id={memo_id}"),
                None => println!("nothing saved"),
            }
        }
        Command::Edit { memo_id } => {
            let Some(memo) = ctx.storage.get_memo(MemoId(memo_id)).await? else {
                println!("memo {memo_id} not found");
                return Ok(());
            };
            let mut wizard = WizardController::edit_existing(session, ctx.catalog.clone(), &memo)?;
            let mut console = Console::new(BufReader::new(tokio::io::stdin()));
            match compose::run(&mut console, &mut wizard, &ctx.storage).await? {
                Some(memo_id) => println!("updated memo_id={memo_id}"),
                None => println!("memo left unchanged"),
            }
        }
        Command::List { keyword, tag } => {
            let memos = server_api::list_memos(&ctx, user_id, keyword.as_deref(), tag.as_deref())
                .await
                .map_err(ApiException::from)?;
            print_memos(&memos, offset);
        }
        Command::Public => {
            let memos = server_api::list_public_memos(&ctx)
                .await
                .map_err(ApiException::from)?;
            print_memos(&memos, offset);
        }
        Command::Stats => {
            let stats = server_api::stats(&ctx, user_id, None)
                .await
                .map_err(ApiException::from)?;
            println!("memos: {}", stats.total_count);
            println!("with reflections: {}", stats.reflection_count);
            println!("this month: {}", stats.current_month_count);
            for month in &stats.monthly_counts {
                println!("  {} {}", month.month, month.count);
            }
            for tag in &stats.top_tags {
                println!("  {} x{}", tag.tag, tag.count);
            }
        }
        Command::ExportCsv { memo_id, out } => {
            let export = server_api::export_csv(&ctx, user_id, MemoId(memo_id), None)
                .await
                .map_err(ApiException::from)?;
            let path = out.unwrap_or_else(|| PathBuf::from(&export.file_name));
            std::fs::write(&path, export.content)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("wrote {}", path.display());
        }
        Command::Delete { memo_id } => {
            let memo = server_api::delete_memo(&ctx, user_id, MemoId(memo_id))
                .await
                .map_err(ApiException::from)?;
            println!("deleted memo_id={} ({})", memo.id, memo.title);
        }
    }

    Ok(())
}

fn print_memos(memos: &[Memo], offset: FixedOffset) {
    if memos.is_empty() {
        println!("no memos");
        return;
    }
    for memo in memos {
        let author = memo.user_name.as_deref().unwrap_or("-");
        println!(
            "{}\t{}\t{}\t{}\t{}",
            memo.id,
            memo.created_at.with_timezone(&offset).format("%Y/%m/%d"),
            if memo.is_public { "public" } else { "private" },
            author,
            memo.title
        );
    }
}
