mod logging;

use std::fs;
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use dsvc_core::base::{self, Revisions, SaveSwitches};
use dsvc_core::dataset::{ComponentMask, CommitPatch, DatasetPatch, MetaPatch};
use dsvc_core::dsref::{self, ParseError};
use dsvc_core::transform::Secrets;
use dsvc_core::utils::cancel::Context as Ctx;
use dsvc_core::Repo;

#[derive(Parser)]
#[command(name = "dsvc-admin", about = "Inspect and edit a dsvc dataset repo")]
struct Cli {
    /// Repo root; created on first use.
    #[arg(long, global = true, default_value = ".dsvc")]
    repo: PathBuf,
    /// -v info, -vv debug, -vvv trace
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Save a new version of a dataset
    Save {
        /// `me/name`; inferred from --body when omitted
        reference: Option<String>,
        #[arg(long)]
        body: Option<PathBuf>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        message: Option<String>,
        #[arg(long)]
        meta_title: Option<String>,
        #[arg(long)]
        readme: Option<PathBuf>,
        /// Create a new dataset instead of adding a version
        #[arg(long = "new")]
        new_name: bool,
        #[arg(long)]
        replace: bool,
        #[arg(long)]
        convert_format_to_prev: bool,
        /// Comma-separated components to drop, e.g. "meta,readme"
        #[arg(long)]
        drop: Option<String>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        use_dscache: bool,
    },
    /// Show version history, newest first
    Log {
        reference: String,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        limit: Option<usize>,
        /// Load full snapshots when walking history
        #[arg(long)]
        full: bool,
        #[arg(long)]
        json: bool,
    },
    /// List datasets by name
    List {
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        use_dscache: bool,
        #[arg(long)]
        json: bool,
    },
    /// Remove versions from the head of a dataset
    Remove {
        reference: String,
        /// "all" or a number of versions
        #[arg(long)]
        revisions: String,
    },
    /// Dscache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheCmd,
    },
}

#[derive(Subcommand)]
enum CacheCmd {
    /// Print the cache in its debug layout
    Show,
    /// Rebuild from the logbook
    Rebuild,
    /// Prune users no entry refers to
    Compact,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;
    let repo = Repo::open(&cli.repo).with_context(|| format!("opening repo {}", cli.repo.display()))?;

    match cli.cmd {
        Cmd::Save {
            reference,
            body,
            title,
            message,
            meta_title,
            readme,
            new_name,
            replace,
            convert_format_to_prev,
            drop,
            dry_run,
            use_dscache,
        } => {
            let mut changes = DatasetPatch {
                name: reference,
                ..Default::default()
            };
            if let Some(path) = body {
                let bytes = fs::read(&path).with_context(|| format!("reading body {}", path.display()))?;
                changes = changes.with_body(path.display().to_string(), bytes);
            }
            if title.is_some() || message.is_some() {
                changes.commit = Some(CommitPatch { title, message });
            }
            if meta_title.is_some() {
                changes.meta = Some(MetaPatch {
                    title: meta_title,
                    ..Default::default()
                });
            }
            if let Some(path) = readme {
                let text = fs::read_to_string(&path).with_context(|| format!("reading readme {}", path.display()))?;
                changes.readme = Some(dsvc_core::dataset::Readme { text });
            }
            let sw = SaveSwitches {
                dry_run,
                new_name,
                replace,
                convert_format_to_prev,
                drop: drop.as_deref().map(ComponentMask::parse).transpose()?.unwrap_or_default(),
                use_dscache,
            };
            let mut stderr = io::stderr();
            let mut saved = base::save(&repo, changes, &Secrets::new(), &sw, &mut stderr)?;
            if dry_run {
                eprintln!("dry run");
            }
            println!("{}", saved.reference);
            if dry_run {
                if let Some(mut body) = saved.take_body() {
                    io::copy(&mut body, &mut io::stdout())?;
                    println!();
                }
            }
        }
        Cmd::Log {
            reference,
            offset,
            limit,
            full,
            json,
        } => {
            let r = parse_ref(&reference)?;
            let items = match base::dataset_log(&repo, &Ctx::background(), &r, offset, limit, full) {
                Ok(items) => items,
                Err(e) if !e.partial.is_empty() => {
                    if e.is_timeout() {
                        tracing::warn!(shown = e.partial.len(), "history walk timed out, showing what was found");
                    } else {
                        tracing::warn!(error = %e.error, "history incomplete");
                    }
                    e.partial
                }
                Err(e) => return Err(e.into()),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
                return Ok(());
            }
            for item in items {
                let when = item.timestamp.map(|t| t.to_rfc3339()).unwrap_or_default();
                let foreign = if item.foreign { " (foreign)" } else { "" };
                println!("{}  {}  {}{}", item.path, when, item.commit_title, foreign);
            }
        }
        Cmd::List {
            offset,
            limit,
            use_dscache,
            json,
        } => {
            let entries = base::list(&repo, offset, limit, use_dscache)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }
            for entry in entries {
                println!(
                    "{}\t{} versions\t{} rows\t{}",
                    entry.pretty_name, entry.top_index, entry.body_rows, entry.head_ref
                );
            }
        }
        Cmd::Remove { reference, revisions } => {
            let r = parse_ref(&reference)?;
            let revs: Revisions = revisions.parse()?;
            let res = base::remove(&repo, &r, revs)?;
            if res.deleted_dataset {
                println!("removed {} entirely ({} versions)", res.head.alias(), res.removed);
            } else {
                println!("removed {} versions, head is now {}", res.removed, res.head);
            }
        }
        Cmd::Cache { action } => match action {
            CacheCmd::Show => match repo.dscache()? {
                Some(cache) => print!("{}", cache.verbose_string(false)),
                None => println!("no dscache"),
            },
            CacheCmd::Rebuild => {
                let cache = repo.rebuild_dscache()?;
                println!("rebuilt dscache with {} entries", cache.refs.len());
            }
            CacheCmd::Compact => {
                let mut removed = 0;
                repo.update_dscache(false, |cache| {
                    removed = cache.compact_users();
                    Ok(())
                })?;
                println!("pruned {removed} users");
            }
        },
    }
    Ok(())
}

/// Parse a ref, letting legacy upper-case names through.
fn parse_ref(text: &str) -> Result<dsref::Ref> {
    match dsref::parse(text) {
        Ok(r) => Ok(r),
        Err(ParseError::BadCase(r)) => {
            tracing::warn!(reference = %text, "dataset name contains upper-case letters");
            Ok(r)
        }
        Err(e) => Err(e).with_context(|| format!("parsing reference \"{text}\"")),
    }
}
