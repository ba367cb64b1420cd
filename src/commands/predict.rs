use anyhow::{Context, Result, bail};
use log::{debug, info};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::runtime::Runtime;
use crate::task::{ModelReference, PredictionResult, TrainingService, rows};

use super::table;

/// How predictions are written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => bail!("Unknown output format: {}. Expected table, json or csv.", s),
        }
    }
}

/// Score a CSV file with a trained model
#[tracing::instrument(skip(runtime, service))]
pub async fn predict<R: Runtime, S: TrainingService>(
    runtime: &R,
    service: &S,
    file: &Path,
    model_reference: &ModelReference,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<()> {
    let result = score(runtime, service, file, model_reference).await?;
    emit(runtime, &result, format, output)
}

pub(crate) async fn score<R: Runtime, S: TrainingService>(
    runtime: &R,
    service: &S,
    file: &Path,
    model_reference: &ModelReference,
) -> Result<PredictionResult> {
    let bytes = runtime.read(file)?;
    let input_rows = rows::read_csv(&bytes)
        .with_context(|| format!("Failed to parse {} as CSV", file.display()))?;
    if input_rows.is_empty() {
        bail!("{} has no data rows", file.display());
    }

    info!(
        "Scoring {} row(s) from {} with model {}...",
        input_rows.len(),
        file.display(),
        model_reference
    );
    service
        .predict(model_reference, &input_rows)
        .await
        .context("Prediction request failed")
}

pub(crate) fn render(result: &PredictionResult, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Table => table::render(&result.rows),
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(&result.rows)?;
            json.push('\n');
            json
        }
        OutputFormat::Csv => String::from_utf8(rows::write_csv_lenient(&result.rows)?)?,
    })
}

pub(crate) fn emit<R: Runtime>(
    runtime: &R,
    result: &PredictionResult,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<()> {
    let text = render(result, format)?;
    match output {
        Some(path) => {
            runtime.write(path, text.as_bytes())?;
            debug!("Wrote {} prediction(s) to {}", result.rows.len(), path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}
