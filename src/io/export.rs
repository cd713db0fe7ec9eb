//! Export fit results.
//!
//! - JSON: the full `FitResult`, reloadable for prediction
//! - CSV: one row per observation (inputs, fitted value, residual, percent error, weight)

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::data::DataTable;
use crate::domain::FitResult;
use crate::error::AppError;

pub fn write_fit_json(path: &Path, fit: &FitResult) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create fit JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(BufWriter::new(file), fit)
        .map_err(|e| AppError::new(2, format!("Failed to write fit JSON: {e}")))
}

pub fn read_fit_json(path: &Path) -> Result<FitResult, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open fit JSON '{}': {e}", path.display())))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::new(2, format!("Failed to parse fit JSON '{}': {e}", path.display())))
}

/// Write per-observation results next to the data they were fitted on.
pub fn write_observations_csv(path: &Path, data: &DataTable, fit: &FitResult) -> Result<(), AppError> {
    if data.n_rows() != fit.n_obs() {
        return Err(AppError::new(
            2,
            format!(
                "Data has {} rows but the fit has {} observations.",
                data.n_rows(),
                fit.n_obs()
            ),
        ));
    }

    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))?;
    let write_err = |e: csv::Error| AppError::new(2, format!("Failed to write export CSV: {e}"));

    let mut header: Vec<String> = vec!["row".to_string()];
    header.extend(data.names().iter().cloned());
    header.extend(["fitted", "residual", "percent_error", "weight"].map(String::from));
    writer.write_record(&header).map_err(write_err)?;

    let weights = fit.weights.as_slice();
    for row in 0..data.n_rows() {
        let mut record = vec![(row + 1).to_string()];
        record.extend((0..data.n_cols()).map(|col| data.column_at(col)[row].to_string()));
        record.push(format!("{:.10}", fit.fitted[row]));
        record.push(format!("{:.10}", fit.residuals[row]));
        record.push(format!("{:.10}", fit.residuals[row] / fit.fitted[row]));
        record.push(format!("{:.10e}", weights[row]));
        writer.write_record(&record).map_err(write_err)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush export CSV: {e}")))
}
