// src/main.rs
//
// =============================================================================
// LABLOG: COMMAND LINE FRONT-END (v 0.1 )
// =============================================================================
//
// Thin shell over the Reconciler.
//
// Modes:
// 1. INIT:          Creates the store and seeds the default equipment list.
// 2. LOGIN/LOGOUT:  Flips the local session flag.
// 3. CATALOG:       Shows or replaces the equipment list.
// 4. ADD/EDIT/DELETE/LIST/SHOW: Entry management.
//
// Runs on a single-threaded runtime; the store is the only thing awaited.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use lablog::config::Config;
use lablog::core::{equipment_summary, EntryDraft, EntryId, LogEntry, Quantities};
use lablog::reconciler::Reconciler;
use lablog::session::SessionStore;
use lablog::store::SqliteStore;
use lablog::MirrorSync;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Time given to detached mirror tasks before the runtime shuts down.
/// Their outcome is still never awaited.
const MIRROR_GRACE: Duration = Duration::from_millis(750);

// ============================================================================
// 1. CLI DEFINITION
// ============================================================================

#[derive(Parser)]
#[command(name = "lablog", version, about = "Lab equipment usage logbook")]
struct Cli {
    /// Directory holding lablog.yaml and the database files.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override the reporting mirror endpoint.
    #[arg(long, global = true)]
    mirror_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store and seed the default equipment list.
    Init,

    /// Remember this device as logged in.
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },

    /// Forget the session.
    Logout,

    /// Show or change the equipment list.
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },

    /// Record a new usage entry.
    Add {
        /// Names of the people using the equipment.
        #[arg(long)]
        names: String,

        #[arg(long)]
        affiliation: String,

        /// Equipment usage as NAME=QTY. Repeatable.
        #[arg(long = "qty", value_parser = parse_qty, num_args = 1..)]
        quantities: Vec<(String, u32)>,

        /// Usage date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        date: Option<String>,
    },

    /// Replace the fields of an existing entry.
    Edit {
        id: String,

        #[arg(long)]
        names: Option<String>,

        #[arg(long)]
        affiliation: Option<String>,

        /// NAME=QTY overrides on top of the recorded quantities.
        #[arg(long = "qty", value_parser = parse_qty, num_args = 1..)]
        quantities: Vec<(String, u32)>,

        #[arg(long)]
        date: Option<String>,
    },

    /// Delete an entry (asks for confirmation).
    Delete {
        id: String,

        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },

    /// List entries, newest first.
    List,

    /// Show one entry with its equipment view.
    Show { id: String },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// Print the current equipment list.
    Show,
    /// Replace the whole list.
    Set {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Append one item.
    Add { name: String },
    /// Remove one item.
    Remove { name: String },
}

fn parse_qty(raw: &str) -> Result<(String, u32), String> {
    let (name, qty) = raw
        .rsplit_once('=')
        .ok_or_else(|| format!("expected NAME=QTY, got {:?}", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("equipment name is empty".into());
    }
    let qty = qty
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("bad quantity for {}: {}", name, e))?;
    Ok((name.to_string(), qty))
}

// ============================================================================
// 2. ENTRY POINT
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config = Config::load(cli.data_dir.clone())?;
    if let Some(url) = cli.mirror_url.clone() {
        config.mirror.url = Some(url);
    }
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create data dir {:?}", config.data_dir))?;

    let session = SessionStore::open(config.session_path())?;

    match cli.command {
        Commands::Login { username, password } => {
            session.login(&username, &password)?;
            println!("Logged in as {}", username.trim());
            return Ok(());
        }
        Commands::Logout => {
            session.logout()?;
            println!("Logged out");
            return Ok(());
        }
        _ => {}
    }

    if !session.is_logged_in()? {
        bail!("Not logged in. Run `lablog login --username <name> --password <password>` first.");
    }

    let store = Arc::new(SqliteStore::new(config.store_path()));
    store.initialize_once().await?;

    let mirror = match &config.mirror.url {
        Some(url) => MirrorSync::http(url.clone(), config.mirror.observe_response),
        None => MirrorSync::disabled(),
    };
    let mut app = Reconciler::with_store(store, mirror);

    let mutated = run_command(&mut app, &config, cli.command).await?;

    if mutated && config.mirror.url.is_some() {
        tokio::time::sleep(MIRROR_GRACE).await;
    }
    Ok(())
}

// ============================================================================
// 3. COMMANDS
// ============================================================================

/// Returns true if the command changed an entry (and so may have a mirror
/// task in flight).
async fn run_command(app: &mut Reconciler, config: &Config, command: Commands) -> Result<bool> {
    match command {
        Commands::Init => {
            let catalog = app
                .catalog_store()
                .seed(config.default_catalog.as_slice())
                .await?;
            println!("Store ready at {:?}", config.store_path());
            println!("Equipment: {}", catalog.names.join(", "));
            Ok(false)
        }

        Commands::Catalog { action } => {
            run_catalog(app, action).await?;
            Ok(false)
        }

        Commands::Add {
            names,
            affiliation,
            quantities,
            date,
        } => {
            let catalog = app.catalog().await?;
            let mut draft = EntryDraft::new(names, affiliation);
            if let Some(date) = date {
                draft.date = date;
            }
            // One slot per catalog item, in catalog order, like the entry form.
            draft.quantities = catalog.names.iter().map(|n| (n.clone(), 0)).collect();
            for (name, qty) in quantities {
                if !catalog.contains(&name) {
                    log::warn!("{} is not in the equipment list", name);
                }
                draft.quantities.insert(name, qty);
            }

            let entry = app.submit(draft).await?;
            println!("Entry saved successfully! ({})", entry.id);
            print_entry(&entry);
            Ok(true)
        }

        Commands::Edit {
            id,
            names,
            affiliation,
            quantities,
            date,
        } => {
            let id = EntryId::new(id);
            app.load().await?;
            let view = app.edit_view(&id).await?;
            if view.is_deprecated() {
                println!(
                    "Note: this entry uses equipment no longer in the list: {}",
                    view.deprecated.join(", ")
                );
            }

            let mut draft = view.entry.to_draft();
            if !quantities.is_empty() {
                let mut selection: Quantities = view.quantities.clone();
                selection.extend(quantities);
                draft.quantities = selection;
            }
            if let Some(names) = names {
                draft.names = names;
            }
            if let Some(affiliation) = affiliation {
                draft.affiliation = affiliation;
            }
            if let Some(date) = date {
                draft.date = date;
            }

            let entry = app.edit(&id, draft).await?;
            println!("Entry updated successfully!");
            print_entry(&entry);
            Ok(true)
        }

        Commands::Delete { id, yes } => {
            app.load().await?;
            let pending = app.request_removal(EntryId::new(id));

            if !yes {
                match pending.preview() {
                    Some(entry) => print_entry(entry),
                    None => println!("Entry {} is not in the local list.", pending.id()),
                }
                let stdin = BufReader::new(tokio::io::stdin());
                if !confirm("Are you sure you want to delete this entry?", stdin).await? {
                    pending.cancel();
                    println!("Aborted.");
                    return Ok(false);
                }
            }

            pending.confirm().await?;
            println!("Entry deleted successfully!");
            Ok(true)
        }

        Commands::List => {
            app.load().await?;
            if app.entries().is_empty() {
                println!("No entries yet.");
            }
            for entry in app.entries() {
                println!(
                    "{}  {}  {}  [{}]  {}",
                    entry.id,
                    entry.record.date,
                    entry.record.names,
                    entry.record.affiliation,
                    equipment_summary(&entry.record.quantities)
                );
            }
            Ok(false)
        }

        Commands::Show { id } => {
            let id = EntryId::new(id);
            app.load().await?;
            let view = app.edit_view(&id).await?;
            print_entry(&view.entry);
            println!("Equipment view:");
            for name in &view.names {
                let qty = view.quantities.get(name).copied().unwrap_or(0);
                let tag = if view.deprecated.contains(name) {
                    "  (no longer in list)"
                } else {
                    ""
                };
                println!("  {:<20} {}{}", name, qty, tag);
            }
            Ok(false)
        }

        Commands::Login { .. } | Commands::Logout => {
            Err(anyhow!("session commands are handled before the store opens"))
        }
    }
}

async fn run_catalog(app: &Reconciler, action: CatalogAction) -> Result<()> {
    let current = app.catalog().await?;
    let names = match action {
        CatalogAction::Show => {
            if current.is_empty() {
                println!("No equipment yet. Run `lablog init` or `lablog catalog set`.");
            }
            for name in &current.names {
                println!("{}", name);
            }
            return Ok(());
        }
        CatalogAction::Set { names } => names,
        CatalogAction::Add { name } => {
            let mut names = current.names.clone();
            names.push(name);
            names
        }
        CatalogAction::Remove { name } => {
            if !current.contains(&name) {
                bail!("{} is not in the equipment list", name);
            }
            current.names.iter().filter(|n| **n != name).cloned().collect()
        }
    };

    // The CLI has no selection in progress to clear.
    let mut selection = Quantities::new();
    let catalog = app.update_catalog(names.as_slice(), &mut selection).await?;
    println!("Equipment: {}", catalog.names.join(", "));
    Ok(())
}

// ============================================================================
// 4. HELPERS
// ============================================================================

fn print_entry(entry: &LogEntry) {
    let rec = &entry.record;
    println!("  Id:          {}", entry.id);
    println!("  Date:        {}", rec.date);
    println!("  Equipment:   {}", rec.summary());
    println!("  Names:       {}", rec.names);
    println!("  Affiliation: {}", rec.affiliation);
    println!("  Logged:      {}", rec.formatted_timestamp);
}

/// `[y/N]` prompt. Reads asynchronously so detached tasks keep running
/// while the user decides.
async fn confirm<R: AsyncBufRead + Unpin>(prompt: &str, mut input: R) -> Result<bool> {
    let mut out = tokio::io::stdout();
    out.write_all(format!("{} [y/N] ", prompt).as_bytes()).await?;
    out.flush().await?;

    let mut answer = String::new();
    input.read_line(&mut answer).await?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn confirm_accepts_only_yes() {
        assert!(confirm("Delete?", &b"y\n"[..]).await.unwrap());
        assert!(confirm("Delete?", &b" Y \n"[..]).await.unwrap());
        assert!(!confirm("Delete?", &b"n\n"[..]).await.unwrap());
        assert!(!confirm("Delete?", &b"\n"[..]).await.unwrap());
        assert!(!confirm("Delete?", &b""[..]).await.unwrap());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn prompt_does_not_stall_other_tasks() {
        let (reader, mut writer) = tokio::io::duplex(64);
        let ticked = Arc::new(AtomicBool::new(false));

        // Only answers after another task has run on the same thread.
        let flag = Arc::clone(&ticked);
        tokio::spawn(async move {
            flag.store(true, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.write_all(b"y\n").await.unwrap();
        });

        let answer = tokio::time::timeout(
            Duration::from_secs(5),
            confirm("Delete?", BufReader::new(reader)),
        )
        .await
        .expect("prompt blocked the runtime");
        assert!(answer.unwrap());
        assert!(ticked.load(Ordering::SeqCst));
    }
}
