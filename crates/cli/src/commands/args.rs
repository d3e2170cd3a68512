//! Shared `clap` argument shapes for the `epic`/`feature`/`task` command
//! families. The three entity kinds take the same shape at the command
//! line even though the handler for each only looks at the fields that
//! apply to it (a `feature list` ignores `--agent-type`, for instance).

use std::path::PathBuf;

use clap::{Args, Subcommand};

#[derive(Subcommand)]
pub enum EntityAction {
    /// Create a new entity and persist it outside any sync transaction
    Create(CreateArgs),
    /// Look up a single entity by key (accepts the decorated `{key}-{slug}` form too)
    Get(GetArgs),
    /// List entities, optionally filtered
    List(ListArgs),
}

#[derive(Args)]
pub struct CreateArgs {
    /// Title to derive the slug and default heading from
    pub title: String,

    /// Parent epic key (required for `feature create`)
    #[arg(long)]
    pub epic: Option<String>,

    /// Parent feature key (required for `task create`)
    #[arg(long)]
    pub feature: Option<String>,

    /// Folder to write the new file under, overriding the resolver's default
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Filename to use instead of the slug-derived default
    #[arg(long)]
    pub filename: Option<String>,

    /// Overwrite the target file if it already exists
    #[arg(long)]
    pub force: bool,

    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct GetArgs {
    /// Canonical or decorated key
    pub key: String,

    #[arg(long)]
    pub json: bool,

    /// Also list the entity's related document paths
    #[arg(long)]
    pub show_docs: bool,
}

#[derive(Args)]
pub struct ListArgs {
    #[arg(long)]
    pub json: bool,

    /// Filter by status
    #[arg(long)]
    pub status: Option<String>,

    /// Filter by priority (epics and tasks only)
    #[arg(long)]
    pub priority: Option<String>,

    /// Filter by parent epic key (features only)
    #[arg(long)]
    pub epic: Option<String>,

    /// Filter by parent feature key (tasks only)
    #[arg(long)]
    pub feature: Option<String>,

    /// Filter by agent type (tasks only)
    #[arg(long)]
    pub agent_type: Option<String>,
}

#[derive(Args)]
pub struct ScanArgs {
    /// Override the configured docs root
    #[arg(long)]
    pub docs_root: Option<PathBuf>,

    /// Path to an index markdown file
    #[arg(long)]
    pub index: Option<PathBuf>,

    /// Conflict resolution strategy: index_precedence | folder_precedence | merge
    #[arg(long)]
    pub strategy: Option<String>,

    /// Present for symmetry with `sync`; scan never writes regardless
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct SyncArgs {
    /// Override the configured docs root
    #[arg(long)]
    pub folder: Option<PathBuf>,

    /// Reserved for future use; the core always creates missing rows on sync
    #[arg(long)]
    pub create_missing: bool,

    /// Discover and report without writing to disk or the database
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long)]
    pub verbose: bool,

    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum MigrateAction {
    /// Add the `slug` column to any entity table that doesn't already have one
    AddSlugColumn,
    /// Backfill `slug` for rows where it is null but derivable
    BackfillSlugs,
}
