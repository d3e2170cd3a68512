//! `docsync task create|get|list`.

use std::path::{Path, PathBuf};

use chrono::Utc;
use docsync_core::cancel::CancellationToken;
use docsync_core::db::{Database, FeatureRepository, TaskFilter, TaskRepository};
use docsync_core::types::{Priority, Task};
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

fn create(db_path: &Path, args: &CreateArgs) -> Result<(), DocSyncError> {
    let config = super::load_config()?;
    let db = Database::open(db_path)?;
    let cancel = CancellationToken::new();

    let feature_key = args.feature.as_ref().ok_or_else(|| DocSyncError::Validation {
        path: args.title.clone(),
        message: "task create requires --feature KEY".to_owned(),
    })?;
    let feature = FeatureRepository::get_by_key(&db.conn, feature_key, &cancel)?.ok_or_else(|| {
        DocSyncError::Validation {
            path: feature_key.clone(),
            message: "no feature found for this key; create it first".to_owned(),
        }
    })?;

    let next = TaskRepository::get_max_sequence_for_feature(&db.conn, &feature.key)? + 1;
    let key = format!("T-{}-{:03}", feature.key, next);
    // The task slug equals its key by convention (§3): there is no
    // separate human slug to derive from the title.
    let slug = key.clone();
    let now = Utc::now();

    let custom_folder_path = args.path.as_ref().map(|p| p.display().to_string());
    let mut task = Task {
        id: None,
        feature_id: feature.id.expect("persisted feature always has an id"),
        key: key.clone(),
        title: args.title.clone(),
        description: None,
        status: config.workflow.start_status.clone(),
        agent_type: None,
        priority: Priority::default(),
        depends_on: Vec::new(),
        file_path: None,
        slug: Some(slug.clone()),
        execution_order: None,
        created_at: now,
        updated_at: now,
        started_at: None,
        completed_at: None,
    };

    let feature_dir = custom_folder_path.unwrap_or_else(|| {
        feature
            .file_path
            .as_deref()
            .and_then(|p| Path::new(p).parent())
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| config.docs_root.clone())
    });
    let filename = args.filename.clone().unwrap_or_else(|| format!("{key}.md"));
    let file_path = PathBuf::from(&feature_dir).join("tasks").join(&filename);

    templates::write_skeleton(
        &file_path,
        &args.title,
        &[
            ("task_key", key.clone()),
            ("slug", slug.clone()),
            ("title", args.title.clone()),
            ("status", task.status.clone()),
        ],
        args.force,
    )?;

    task.file_path = Some(file_path.display().to_string());
    let created = TaskRepository::create(&db.conn, &task)?;

    print_one(&created, args.json);
    Ok(())
}

fn get(db_path: &Path, args: &GetArgs) -> Result<(), DocSyncError> {
    let config = super::load_config()?;
    let db = Database::open(db_path)?;
    let cancel = CancellationToken::new();
    let task = TaskRepository::get_by_key(&db.conn, &args.key, &cancel)?.ok_or_else(|| {
        DocSyncError::Validation {
            path: args.key.clone(),
            message: "no task found for this key".to_owned(),
        }
    })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&task).unwrap_or_else(|_| "{}".to_owned()));
        return Ok(());
    }

    print_one(&task, false);
    if args.show_docs {
        if let Some(path) = &task.file_path {
            println!("file: {path}");
        }
        if let Some(feature) = FeatureRepository::get_by_id(&db.conn, task.feature_id)? {
            if let Some(epic) = docsync_core::db::EpicRepository::get_by_id(&db.conn, feature.epic_id)? {
                if let Ok(resolved) =
                    path_resolver::resolve_task_path(&config.docs_root, &epic, &feature, &task)
                {
                    println!("resolved path: {resolved}");
                }
            }
        }
        if !task.depends_on.is_empty() {
            println!("depends on: {}", task.depends_on.join(", "));
        }
    }
    Ok(())
}

fn list(db_path: &Path, args: &ListArgs) -> Result<(), DocSyncError> {
    let db = Database::open(db_path)?;
    let cancel = CancellationToken::new();

    let feature_id = match &args.feature {
        Some(key) => FeatureRepository::get_by_key(&db.conn, key, &cancel)?.and_then(|f| f.id),
        None => None,
    };
    let filter = TaskFilter {
        feature_id,
        status: args.status.clone(),
        agent_type: args.agent_type.clone(),
    };
    let tasks = TaskRepository::list(&db.conn, &filter, &cancel)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&tasks).unwrap_or_else(|_| "[]".to_owned()));
        return Ok(());
    }

    for task in &tasks {
        println!(
            "{}  {}  [{}]  {}",
            task.key, task.title, task.status, task.priority
        );
    }
    Ok(())
}

fn print_one(task: &Task, json: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(task).unwrap_or_else(|_| "{}".to_owned()));
        return;
    }
    println!("{}  {}", task.key, task.title);
    println!("status:   {}", task.status);
    println!("priority: {}", task.priority);
    if let Some(agent) = &task.agent_type {
        println!("agent:    {agent}");
    }
    if let Some(desc) = &task.description {
        println!("description: {desc}");
    }
}
