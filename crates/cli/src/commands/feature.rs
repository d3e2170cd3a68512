//! `docsync feature create|get|list`.

use std::path::{Path, PathBuf};

use chrono::Utc;
use docsync_core::cancel::CancellationToken;
use docsync_core::db::{Database, EpicRepository, FeatureFilter, FeatureRepository};
use docsync_core::types::Feature;
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

fn next_feature_key(db: &Database, epic_key: &str) -> Result<String, DocSyncError> {
    let cancel = CancellationToken::new();
    let filter = FeatureFilter::default();
    let existing = FeatureRepository::list(&db.conn, &filter, &cancel)?;
    let prefix = format!("{epic_key}-F");
    let max = existing
        .iter()
        .filter_map(|f| f.key.strip_prefix(&prefix))
        .filter_map(|n| n.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    Ok(format!("{epic_key}-F{:02}", max + 1))
}

fn create(db_path: &Path, args: &CreateArgs) -> Result<(), DocSyncError> {
    let config = super::load_config()?;
    let db = Database::open(db_path)?;
    let cancel = CancellationToken::new();

    let epic_key = args.epic.as_ref().ok_or_else(|| DocSyncError::Validation {
        path: args.title.clone(),
        message: "feature create requires --epic KEY".to_owned(),
    })?;
    let epic = EpicRepository::get_by_key(&db.conn, epic_key, &cancel)?.ok_or_else(|| {
        DocSyncError::Validation {
            path: epic_key.clone(),
            message: "no epic found for this key; create it first".to_owned(),
        }
    })?;

    let key = next_feature_key(&db, &epic.key)?;
    let slug = templates::slugify(&args.title);
    let now = Utc::now();

    let custom_folder_path = args.path.as_ref().map(|p| p.display().to_string());
    let mut feature = Feature {
        id: None,
        epic_id: epic.id.expect("persisted epic always has an id"),
        key: key.clone(),
        title: args.title.clone(),
        description: None,
        status: config.workflow.start_status.clone(),
        slug: Some(slug.clone()),
        file_path: None,
        custom_folder_path: custom_folder_path.clone(),
        execution_order: None,
        created_at: now,
        updated_at: now,
    };

    let root = custom_folder_path
        .or_else(|| epic.custom_folder_path.clone())
        .unwrap_or_else(|| config.docs_root.clone());
    let epic_folder = epic
        .slug
        .as_deref()
        .map(|s| format!("{}-{s}", epic.key))
        .unwrap_or_else(|| epic.key.clone());
    let feature_folder = format!("{key}-{slug}");
    let filename = args
        .filename
        .clone()
        .unwrap_or_else(|| "feature.md".to_owned());
    let file_path = PathBuf::from(&root)
        .join(&epic_folder)
        .join(&feature_folder)
        .join(&filename);

    templates::write_skeleton(
        &file_path,
        &args.title,
        &[
            ("key", key.clone()),
            ("slug", slug.clone()),
            ("title", args.title.clone()),
            ("status", feature.status.clone()),
        ],
        args.force,
    )?;

    feature.file_path = Some(file_path.display().to_string());
    let created = FeatureRepository::create(&db.conn, &feature)?;

    print_one(&created, args.json);
    Ok(())
}

fn get(db_path: &Path, args: &GetArgs) -> Result<(), DocSyncError> {
    let config = super::load_config()?;
    let db = Database::open(db_path)?;
    let cancel = CancellationToken::new();
    let feature = FeatureRepository::get_by_key(&db.conn, &args.key, &cancel)?.ok_or_else(|| {
        DocSyncError::Validation {
            path: args.key.clone(),
            message: "no feature found for this key".to_owned(),
        }
    })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&feature).unwrap_or_else(|_| "{}".to_owned()));
        return Ok(());
    }

    print_one(&feature, false);
    if args.show_docs {
        if let Some(path) = &feature.file_path {
            println!("file: {path}");
        }
        let epic = EpicRepository::get_by_id(&db.conn, feature.epic_id)?;
        if let Some(epic) = epic {
            if let Ok(resolved) =
                path_resolver::resolve_feature_path(&config.docs_root, &epic, &feature)
            {
                println!("resolved path: {resolved}");
            }
        }
    }
    Ok(())
}

fn list(db_path: &Path, args: &ListArgs) -> Result<(), DocSyncError> {
    let db = Database::open(db_path)?;
    let cancel = CancellationToken::new();

    let epic_id = match &args.epic {
        Some(key) => EpicRepository::get_by_key(&db.conn, key, &cancel)?.and_then(|e| e.id),
        None => None,
    };
    let filter = FeatureFilter {
        epic_id,
        status: args.status.clone(),
    };
    let features = FeatureRepository::list(&db.conn, &filter, &cancel)?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&features).unwrap_or_else(|_| "[]".to_owned())
        );
        return Ok(());
    }

    for feature in &features {
        println!("{}  {}  [{}]", feature.key, feature.title, feature.status);
    }
    Ok(())
}

fn print_one(feature: &Feature, json: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(feature).unwrap_or_else(|_| "{}".to_owned()));
        return;
    }
    println!("{}  {}", feature.key, feature.title);
    println!("status: {}", feature.status);
    if let Some(desc) = &feature.description {
        println!("description: {desc}");
    }
}
