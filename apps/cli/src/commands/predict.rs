//! Predict command implementation.

use colored::Colorize;
use lathe_orchestrator::TrainingApi;
use lathe_training::JobId;

use super::print_json;

pub fn execute(api: &TrainingApi, text: &str, model: Option<i64>, json_output: bool) -> anyhow::Result<()> {
    let result = api.predict(text, model.map(JobId))?;
    if json_output {
        return print_json(&result);
    }

    println!("  Class:       {}", result.predicted_class.bold().green());
    println!("  Confidence:  {:.2}", result.confidence);
    println!("  Model:       {}", result.model_name.dimmed());
    if model.is_some() && result.model_job_id.is_none() {
        println!("  {}", "No completed model for that job; used the default model.".yellow());
    }
    Ok(())
}
