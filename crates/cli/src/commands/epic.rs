//! `docsync epic create|get|list`.

use std::path::{Path, PathBuf};

use chrono::Utc;
use docsync_core::cancel::CancellationToken;
use docsync_core::db::{Database, EpicFilter, EpicRepository};
use docsync_core::types::{Epic, Priority};
use docsync_core::{path_resolver, DocSyncError};

use super::args::{CreateArgs, EntityAction, GetArgs, ListArgs};
use crate::templates;

pub fn run(db_path: &Path, action: &EntityAction) -> Result<(), DocSyncError> {
    match action {
        EntityAction::Create(args) => create(db_path, args),
        EntityAction::Get(args) => get(db_path, args),
        EntityAction::List(args) => list(db_path, args),
    }
}

fn next_epic_key(db: &Database) -> Result<String, DocSyncError> {
    let cancel = CancellationToken::new();
    let existing = EpicRepository::list(&db.conn, &EpicFilter::default(), &cancel)?;
    let max = existing
        .iter()
        .filter_map(|e| e.key.strip_prefix('E'))
        .filter_map(|n| n.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    Ok(format!("E{:02}", max + 1))
}

fn create(db_path: &Path, args: &CreateArgs) -> Result<(), DocSyncError> {
    let config = super::load_config()?;
    let db = Database::open(db_path)?;

    let key = next_epic_key(&db)?;
    let slug = templates::slugify(&args.title);
    let now = Utc::now();

    let custom_folder_path = args.path.as_ref().map(|p| p.display().to_string());
    let epic = Epic {
        id: None,
        key: key.clone(),
        title: args.title.clone(),
        description: None,
        status: config.workflow.start_status.clone(),
        priority: Priority::default(),
        business_value: None,
        slug: Some(slug.clone()),
        file_path: None,
        custom_folder_path: custom_folder_path.clone(),
        created_at: now,
        updated_at: now,
    };

    let folder_name = format!("{key}-{slug}");
    let filename = args
        .filename
        .clone()
        .unwrap_or_else(|| "epic.md".to_owned());
    let root = custom_folder_path
        .clone()
        .unwrap_or_else(|| config.docs_root.clone());
    let file_path = PathBuf::from(&root).join(&folder_name).join(&filename);

    templates::write_skeleton(
        &file_path,
        &args.title,
        &[
            ("key", key.clone()),
            ("slug", slug.clone()),
            ("title", args.title.clone()),
            ("status", epic.status.clone()),
        ],
        args.force,
    )?;

    let mut epic = epic;
    epic.file_path = Some(file_path.display().to_string());
    let created = EpicRepository::create(&db.conn, &epic)?;

    print_one(&created, &config.docs_root, false, args.json);
    Ok(())
}

fn get(db_path: &Path, args: &GetArgs) -> Result<(), DocSyncError> {
    let config = super::load_config()?;
    let db = Database::open(db_path)?;
    let cancel = CancellationToken::new();
    let epic = EpicRepository::get_by_key(&db.conn, &args.key, &cancel)?.ok_or_else(|| {
        DocSyncError::Validation {
            path: args.key.clone(),
            message: "no epic found for this key".to_owned(),
        }
    })?;
    print_one(&epic, &config.docs_root, args.show_docs, args.json);
    Ok(())
}

fn list(db_path: &Path, args: &ListArgs) -> Result<(), DocSyncError> {
    let db = Database::open(db_path)?;
    let cancel = CancellationToken::new();
    let filter = EpicFilter {
        status: args.status.clone(),
        priority: args.priority.as_deref().and_then(Priority::parse),
    };
    let epics = EpicRepository::list(&db.conn, &filter, &cancel)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&epics).unwrap_or_else(|_| "[]".to_owned()));
        return Ok(());
    }

    for epic in &epics {
        println!("{}  {}  [{}]  {}", epic.key, epic.title, epic.status, epic.priority);
    }
    Ok(())
}

fn print_one(epic: &Epic, docs_root: &str, show_docs: bool, json: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(epic).unwrap_or_else(|_| "{}".to_owned()));
        return;
    }

    println!("{}  {}", epic.key, epic.title);
    println!("status:   {}", epic.status);
    println!("priority: {}", epic.priority);
    if let Some(desc) = &epic.description {
        println!("description: {desc}");
    }
    if show_docs {
        if let Some(path) = &epic.file_path {
            println!("file: {path}");
        }
        if let Ok(resolved) = path_resolver::resolve_epic_path(docs_root, epic) {
            println!("resolved path: {resolved}");
        }
    }
}
