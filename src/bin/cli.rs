//! Binary entry point for the tagbits administrative CLI.
#![forbid(unsafe_code)]

#[path = "cli/config.rs"]
mod config;
#[path = "cli/ui.rs"]
mod ui;

use std::error::Error;
use std::io;
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::Serialize;
use tagbits::logging::init_logging;
use tagbits::{DecodedTags, TagDefinition, TagFilter, TagStore, TagUsage, TargetId};

use config::CliConfig;
use ui::{Theme, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "tagbits",
    version,
    about = "Administrative CLI for bitmap tag indexes stored in SQLite",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(flatten)]
    open: OpenArgs,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = Theme::Auto,
        help = "Color theme for text output"
    )]
    theme: Theme,

    #[arg(
        long,
        global = true,
        env = "TAGBITS_LOG",
        default_value = "warn",
        help = "Log filter directive written to stderr (e.g. tagbits=debug)"
    )]
    log_filter: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct OpenArgs {
    #[arg(
        long,
        global = true,
        env = "TAGBITS_DB",
        value_name = "PATH",
        help = "Database file (falls back to the config default)"
    )]
    db: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "FILE",
        help = "CLI config file (defaults to <config dir>/tagbits/cli.toml)"
    )]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Override the number of allocatable cells")]
    cells: Option<u8>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a tag in the first free slot
    Register {
        #[arg(value_name = "TYPE")]
        target_type: String,
        name: String,
    },
    /// Delete a tag and clear it from every target
    Delete {
        #[arg(value_name = "TYPE")]
        target_type: String,
        name: String,
    },
    /// Rename a tag, keeping its slot
    Rename {
        #[arg(value_name = "TYPE")]
        target_type: String,
        old_name: String,
        new_name: String,
    },
    /// List the tags of a target type with usage counts
    List {
        #[arg(value_name = "TYPE")]
        target_type: String,
    },
    /// Add tags to a target
    Add {
        #[arg(value_name = "TYPE")]
        target_type: String,
        #[arg(value_name = "ID")]
        target_id: u64,
        #[arg(value_name = "TAG", required = true)]
        names: Vec<String>,
    },
    /// Remove tags from a target
    Remove {
        #[arg(value_name = "TYPE")]
        target_type: String,
        #[arg(value_name = "ID")]
        target_id: u64,
        #[arg(value_name = "TAG", required = true)]
        names: Vec<String>,
    },
    /// Replace the tag set of several targets
    Set {
        #[arg(value_name = "TYPE")]
        target_type: String,
        #[arg(
            long,
            value_name = "ID,ID",
            value_delimiter = ',',
            required = true,
            help = "Targets to overwrite"
        )]
        targets: Vec<u64>,
        #[arg(value_name = "TAG")]
        names: Vec<String>,
    },
    /// Clear every tag of several targets
    Clear {
        #[arg(value_name = "TYPE")]
        target_type: String,
        #[arg(value_name = "ID", required = true)]
        target_ids: Vec<u64>,
    },
    /// Drop the bitmap record of a target
    Purge {
        #[arg(value_name = "TYPE")]
        target_type: String,
        #[arg(value_name = "ID")]
        target_id: u64,
    },
    /// Show the tags of targets
    Show {
        #[arg(value_name = "TYPE")]
        target_type: String,
        #[arg(value_name = "ID", required = true)]
        target_ids: Vec<u64>,
    },
    /// Find targets carrying tags
    Find {
        #[arg(value_name = "TYPE")]
        target_type: String,
        #[arg(long, help = "Match targets carrying any of the tags instead of all")]
        any: bool,
        #[arg(value_name = "TAG")]
        names: Vec<String>,
    },
    /// Print a shell completion script
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct CountReport<'a> {
    target_type: &'a str,
    targets: usize,
}

#[derive(Serialize)]
struct PurgeReport<'a> {
    target_type: &'a str,
    target_id: TargetId,
    removed: bool,
}

#[derive(Serialize)]
struct ShowEntry {
    target_id: TargetId,
    tags: DecodedTags,
}

#[derive(Serialize)]
struct FindReport<'a> {
    target_type: &'a str,
    tags: &'a [String],
    any: bool,
    targets: Vec<TargetId>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if let Command::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "tagbits", &mut io::stdout());
        return Ok(());
    }

    init_logging(&cli.log_filter)?;
    let config = CliConfig::load(cli.open.config.clone())?;
    let mut store = open_store(&cli.open, &config)?;
    let ui = Ui::new(cli.theme);
    let format = cli.format;

    match cli.command {
        Command::Register { target_type, name } => {
            let def = store.register_tag(&target_type, &name)?;
            emit(format, &def, || {
                ui.success(&format!("registered '{}' at {}", def.name, def.slot));
                print_definition(&ui, &def);
            })?;
        }
        Command::Delete { target_type, name } => {
            let def = store.delete_tag(&target_type, &name)?;
            emit(format, &def, || {
                ui.success(&format!("deleted '{}', freed {}", def.name, def.slot));
            })?;
        }
        Command::Rename {
            target_type,
            old_name,
            new_name,
        } => {
            let def = store.rename_tag(&target_type, &old_name, &new_name)?;
            emit(format, &def, || {
                ui.success(&format!("renamed '{old_name}' to '{}'", def.name));
            })?;
        }
        Command::List { target_type } => {
            let tags = store.list_tags(&target_type)?;
            emit(format, &tags, || print_usage(&ui, &target_type, &tags))?;
        }
        Command::Add {
            target_type,
            target_id,
            names,
        } => {
            let target = TargetId(target_id);
            store.add_tags(&target_type, target, &names)?;
            show(&store, &ui, format, &target_type, &[target])?;
        }
        Command::Remove {
            target_type,
            target_id,
            names,
        } => {
            let target = TargetId(target_id);
            store.remove_tags(&target_type, target, &names)?;
            show(&store, &ui, format, &target_type, &[target])?;
        }
        Command::Set {
            target_type,
            targets,
            names,
        } => {
            let ids = to_targets(&targets);
            let written = store.set_tags_for_targets(&target_type, &ids, &names)?;
            let report = CountReport {
                target_type: &target_type,
                targets: written,
            };
            emit(format, &report, || {
                ui.success(&format!("overwrote {written} target(s) of '{target_type}'"));
            })?;
        }
        Command::Clear {
            target_type,
            target_ids,
        } => {
            let ids = to_targets(&target_ids);
            let cleared = store.clear_tags_for_targets(&target_type, &ids)?;
            let report = CountReport {
                target_type: &target_type,
                targets: cleared,
            };
            emit(format, &report, || {
                ui.success(&format!("cleared {cleared} target(s) of '{target_type}'"));
            })?;
        }
        Command::Purge {
            target_type,
            target_id,
        } => {
            let target = TargetId(target_id);
            let removed = store.purge_record(&target_type, target)?;
            let report = PurgeReport {
                target_type: &target_type,
                target_id: target,
                removed,
            };
            emit(format, &report, || {
                if removed {
                    ui.success(&format!("purged {target_type} {target}"));
                } else {
                    ui.success(&format!("{target_type} {target} had no record"));
                }
            })?;
        }
        Command::Show {
            target_type,
            target_ids,
        } => {
            show(&store, &ui, format, &target_type, &to_targets(&target_ids))?;
        }
        Command::Find {
            target_type,
            any,
            names,
        } => {
            let filter = if any {
                TagFilter::any(&names)
            } else {
                TagFilter::all(&names)
            };
            let targets = store.tagged_targets(&target_type, &filter)?;
            let report = FindReport {
                target_type: &target_type,
                tags: &names,
                any,
                targets,
            };
            emit(format, &report, || {
                ui.list(
                    &format!("{target_type} matching [{}]", names.join(", ")),
                    report.targets.iter().map(ToString::to_string),
                );
            })?;
        }
        Command::Completions { .. } => {}
    }
    Ok(())
}

fn open_store(open: &OpenArgs, config: &CliConfig) -> Result<TagStore, Box<dyn Error>> {
    let path = match (&open.db, config.default_db_path()) {
        (Some(path), _) => path.clone(),
        (None, Some(path)) => path.clone(),
        (None, None) => {
            let hint = config
                .path()
                .map(|p| format!(" or set [database] default in {}", p.display()))
                .unwrap_or_default();
            return Err(format!("no database given; pass --db{hint}").into());
        }
    };
    let mut opts = config.tag_options();
    if let Some(cells) = open.cells {
        opts = opts.cell_count(cells);
    }
    Ok(TagStore::open(path, opts)?)
}

fn to_targets(ids: &[u64]) -> Vec<TargetId> {
    ids.iter().copied().map(TargetId).collect()
}

fn show(
    store: &TagStore,
    ui: &Ui,
    format: OutputFormat,
    target_type: &str,
    targets: &[TargetId],
) -> Result<(), Box<dyn Error>> {
    let mut session = store.session();
    let mut entries = Vec::with_capacity(targets.len());
    for &target_id in targets {
        let tags = store.tags_of(&mut session, target_type, target_id)?;
        entries.push(ShowEntry { target_id, tags });
    }
    emit(format, &entries, || {
        for entry in &entries {
            ui.list(
                &format!("{target_type} {}", entry.target_id),
                entry.tags.names.iter().cloned(),
            );
        }
    })
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: FnOnce(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_definition(ui: &Ui, def: &TagDefinition) {
    ui.section(
        "Definition",
        [
            ("id", def.id.to_string()),
            ("target_type", def.target_type.clone()),
            ("name", def.name.clone()),
            ("cell", def.slot.cell().to_string()),
            ("bit", def.slot.bit().to_string()),
        ],
    );
}

fn print_usage(ui: &Ui, target_type: &str, tags: &[TagUsage]) {
    ui.list(
        &format!("Tags of '{target_type}'"),
        tags.iter().map(|usage| {
            format!(
                "{} ({}, id {}) used by {}",
                usage.definition.name,
                usage.definition.slot,
                usage.definition.id,
                usage.usage_count
            )
        }),
    );
}
