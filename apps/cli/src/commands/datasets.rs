//! Datasets command implementation.

use colored::Colorize;
use lathe_orchestrator::TrainingApi;

use super::print_json;

/// Lists the datasets from the configuration that the current user may train on.
pub fn execute(api: &TrainingApi, json_output: bool) -> anyhow::Result<()> {
    let principal = api.principal();
    let mut datasets = api.orchestrator().config().dataset_catalog().list();
    datasets.retain(|d| principal.can_access(d.owner_id));
    datasets.sort_by_key(|d| d.id);

    if json_output {
        return print_json(&datasets);
    }

    println!();
    println!("{}", format!("Datasets ({})", datasets.len()).bold().cyan());
    println!();
    if datasets.is_empty() {
        println!("  {}", "No datasets registered. Add [[datasets]] entries to lathe.toml.".dimmed());
        return Ok(());
    }
    println!("{:<6} {:<8} {}", "ID", "Owner", "File");
    println!("{}", "─".repeat(60));
    for dataset in datasets {
        println!("{:<6} {:<8} {}", dataset.id, dataset.owner_id, dataset.file_reference);
    }
    println!();
    Ok(())
}
