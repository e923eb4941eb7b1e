// output.rs

// --- External Crate Imports ---
use anyhow::{anyhow, Result};
use log::info;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

fn create_output_file(path: &Path) -> Result<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| anyhow!("Failed to create output file {}: {}", path.display(), e))
}

/// Writes one `name<TAB>value` line per sample with six decimal places, in
/// the order the samples were read from the source.
pub fn write_metrics(path: &Path, metrics: &[(String, f64)]) -> Result<()> {
    let mut writer = create_output_file(path)?;
    info!(
        "Writing {} metric values to {}",
        metrics.len(),
        path.display()
    );
    for (name, value) in metrics {
        writeln!(writer, "{}\t{:.6}", name, value)?;
    }
    writer.flush()?;
    Ok(())
}
