//! `docsync migrate add-slug-column|backfill-slugs`.

use std::path::Path;

use docsync_core::db::{migrations, Database};
use docsync_core::DocSyncError;

use super::args::MigrateAction;

pub fn run(db_path: &Path, action: &MigrateAction) -> Result<(), DocSyncError> {
    let db = Database::open(db_path)?;
    match action {
        MigrateAction::AddSlugColumn => {
            let applied = migrations::add_slug_column(&db.conn)?;
            if applied.is_empty() {
                println!("already current: no columns added");
            } else {
                println!("added columns: {}", applied.join(", "));
            }
        }
        MigrateAction::BackfillSlugs => {
            let updated = migrations::backfill_slugs(&db.conn)?;
            println!("backfilled {updated} row(s)");
        }
    }
    Ok(())
}
