//! Report rendering: one struct (`docsync_core::sync::Report`, aliased as
//! `DiscoveryReport`/`SyncReport` in the core), two renderers — `--json`
//! gets `serde_json::to_string_pretty`, everything else gets an aligned
//! plain-text summary.

use docsync_core::sync::Report;

pub fn print_report(report: &Report, json: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_owned()));
        return;
    }

    println!("folders scanned:      {}", report.folders_scanned);
    println!("files analyzed:       {}", report.files_analyzed);
    println!(
        "epics discovered:     {} (index {}, folders {})",
        report.epics_discovered, report.epics_from_index, report.epics_from_folders
    );
    println!(
        "features discovered:  {} (index {}, folders {})",
        report.features_discovered, report.features_from_index, report.features_from_folders
    );
    println!("tasks imported:       {}", report.tasks_imported);
    println!("keys generated:       {}", report.keys_generated);
    println!("related docs:         {}", report.related_docs_cataloged);
    println!("dry run:              {}", report.dry_run);
    println!("duration:             {}ms", report.duration_ms);

    if !report.conflicts.is_empty() {
        println!("\nconflicts:");
        for conflict in &report.conflicts {
            println!("  [{:?}] {}: {}", conflict.kind, conflict.key, conflict.suggestion);
        }
    }

    if !report.warnings.is_empty() {
        println!("\nwarnings:");
        for warning in &report.warnings {
            println!("  {warning}");
        }
    }

    if !report.errors.is_empty() {
        println!("\nerrors:");
        for error in &report.errors {
            println!("  {error}");
        }
    }
}
