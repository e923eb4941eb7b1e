// qc.rs

// --- External Crate Imports ---
use anyhow::{anyhow, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use ndarray::Array1;

use crate::sim::{Sim, SimRecord};

fn pass_progress(sim: &Sim, label: &str) -> Result<ProgressBar> {
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} samples ({percent}%) {msg}",
        )
        .map_err(|e| anyhow!("Failed to create progress bar style: {}", e))?
        .progress_chars("=> ");
    let progress = ProgressBar::new(u64::from(sim.num_samples)).with_style(style);
    progress.set_message(label.to_string());
    Ok(progress)
}

fn check_dataset_not_degenerate(sim: &Sim) -> Result<()> {
    if sim.num_samples == 0 {
        return Err(anyhow!(
            "SIM file declares 0 samples; no metrics can be computed."
        ));
    }
    if sim.num_probes == 0 {
        return Err(anyhow!(
            "SIM file declares 0 probes; no metrics can be computed."
        ));
    }
    Ok(())
}

fn next_record_required(sim: &mut Sim, index: u32) -> Result<SimRecord> {
    let declared = sim.num_samples;
    sim.next_record()?.ok_or_else(|| {
        anyhow!(
            "Intensity stream ended after {} of {} declared samples.",
            index,
            declared
        )
    })
}

/// Per-probe Euclidean magnitude of one record's channel intensities.
///
/// Handles arbitrarily many channels, and reads every value through the
/// encoding-tagged accessor so fixed-point and floating-point records go
/// through the same summation.
fn record_magnitudes(
    record: &SimRecord,
    num_probes: usize,
    num_channels: usize,
) -> Result<Vec<f64>> {
    let expected = num_probes * num_channels;
    if record.intensities.len() != expected {
        return Err(anyhow!(
            "Record for sample '{}' holds {} intensities, expected {}.",
            record.name,
            record.intensities.len(),
            expected
        ));
    }
    let mut magnitudes = Vec::with_capacity(num_probes);
    for probe in 0..num_probes {
        let mut total = 0.0;
        for channel in 0..num_channels {
            let signal = record.intensities.value(probe * num_channels + channel);
            total += signal * signal;
        }
        magnitudes.push(total.sqrt());
    }
    Ok(magnitudes)
}

/// First magnitude pass: mean magnitude of each probe across all samples.
///
/// Probes vary systematically in raw signal strength; the second pass divides
/// by this baseline so the per-sample metric reflects sample variation, not
/// probe variation. A probe whose baseline is zero makes every sample's
/// metric NaN; this is surfaced with a warning and propagated, never skipped.
pub fn magnitude_by_probe(sim: &mut Sim) -> Result<Array1<f64>> {
    check_dataset_not_degenerate(sim)?;
    sim.reset()?;
    let num_probes = sim.num_probes as usize;
    let num_channels = sim.num_channels as usize;

    info!(
        "Finding mean magnitude by probe across {} samples...",
        sim.num_samples
    );
    let progress = pass_progress(sim, "probe baseline")?;
    let mut totals = Array1::<f64>::zeros(num_probes);
    for i in 0..sim.num_samples {
        let record = next_record_required(sim, i)?;
        let magnitudes = record_magnitudes(&record, num_probes, num_channels)?;
        for (total, magnitude) in totals.iter_mut().zip(magnitudes.iter()) {
            *total += magnitude;
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    let baseline = totals / f64::from(sim.num_samples);
    let zero_probes = baseline.iter().filter(|&&mean| mean == 0.0).count();
    if zero_probes > 0 {
        warn!(
            "{} probe(s) have zero mean magnitude; every sample's magnitude metric will be NaN.",
            zero_probes
        );
    }
    Ok(baseline)
}

/// Second magnitude pass: per sample, the mean over probes of the
/// probe-normalized magnitude, paired with the sample name in read order.
pub fn magnitude_by_sample(
    sim: &mut Sim,
    probe_baseline: &Array1<f64>,
) -> Result<Vec<(String, f64)>> {
    check_dataset_not_degenerate(sim)?;
    if probe_baseline.len() != sim.num_probes as usize {
        return Err(anyhow!(
            "Probe baseline holds {} entries, expected {}.",
            probe_baseline.len(),
            sim.num_probes
        ));
    }
    sim.reset()?;
    let num_probes = sim.num_probes as usize;
    let num_channels = sim.num_channels as usize;

    info!(
        "Finding normalized mean magnitude for {} samples...",
        sim.num_samples
    );
    let progress = pass_progress(sim, "sample magnitude")?;
    let mut results = Vec::with_capacity(sim.num_samples as usize);
    for i in 0..sim.num_samples {
        let record = next_record_required(sim, i)?;
        let magnitudes = record_magnitudes(&record, num_probes, num_channels)?;
        let mut normalized_total = 0.0;
        for (magnitude, baseline) in magnitudes.iter().zip(probe_baseline.iter()) {
            normalized_total += magnitude / baseline;
        }
        results.push((record.name, normalized_total / num_probes as f64));
        progress.inc(1);
    }
    progress.finish_and_clear();
    Ok(results)
}

/// Full two-pass normalized magnitude computation on one handle.
pub fn sample_magnitudes(sim: &mut Sim) -> Result<Vec<(String, f64)>> {
    let probe_baseline = magnitude_by_probe(sim)?;
    debug!(
        "Probe baseline computed for {} probes.",
        probe_baseline.len()
    );
    magnitude_by_sample(sim, &probe_baseline)
}

/// Single-pass xydiff: per sample, the mean over probes of the channel-1
/// minus channel-0 intensity difference. Defined only for two channels; any
/// other channel count fails before a single record is read.
pub fn sample_xydiffs(sim: &mut Sim) -> Result<Vec<(String, f64)>> {
    if sim.num_channels != 2 {
        return Err(anyhow!(
            "XY intensity difference is only defined for exactly two intensity channels, found {}.",
            sim.num_channels
        ));
    }
    check_dataset_not_degenerate(sim)?;
    sim.reset()?;
    let num_probes = sim.num_probes as usize;

    info!(
        "Computing XY intensity difference for {} samples...",
        sim.num_samples
    );
    let progress = pass_progress(sim, "xydiff")?;
    let mut results = Vec::with_capacity(sim.num_samples as usize);
    for i in 0..sim.num_samples {
        let record = next_record_required(sim, i)?;
        let mut total = 0.0;
        for probe in 0..num_probes {
            let index = probe * 2;
            total += record.intensities.value(index + 1) - record.intensities.value(index);
        }
        results.push((record.name, total / num_probes as f64));
        progress.inc(1);
    }
    progress.finish_and_clear();
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::{magnitude_by_probe, magnitude_by_sample, sample_magnitudes, sample_xydiffs};
    use crate::sim::test_support::{sim_bytes_float, sim_bytes_integer};
    use crate::sim::Sim;
    use tempfile::TempDir;

    fn open_sim(dir: &TempDir, file_name: &str, bytes: &[u8]) -> Sim {
        let path = dir.path().join(file_name);
        std::fs::write(&path, bytes).expect("SIM fixture should be written");
        Sim::open(&path).expect("SIM fixture should open")
    }

    // Two samples, two probes, two channels:
    //   S1 = [(3,4), (0,0)]  ->  raw magnitudes [5, 0]
    //   S2 = [(0,0), (6,8)]  ->  raw magnitudes [0, 10]
    fn reference_integer_bytes() -> Vec<u8> {
        sim_bytes_integer(2, 2, &[("S1", vec![3, 4, 0, 0]), ("S2", vec![0, 0, 6, 8])])
    }

    fn reference_float_bytes() -> Vec<u8> {
        sim_bytes_float(
            2,
            2,
            &[
                ("S1", vec![3.0, 4.0, 0.0, 0.0]),
                ("S2", vec![0.0, 0.0, 6.0, 8.0]),
            ],
        )
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-12,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn probe_baseline_is_the_mean_magnitude_per_probe() {
        let dir = TempDir::new().expect("tempdir should be created");
        let mut sim = open_sim(&dir, "reference.sim", &reference_integer_bytes());

        let baseline = magnitude_by_probe(&mut sim).expect("baseline should compute");
        assert_eq!(baseline.len(), 2);
        assert_close(baseline[0], 2.5);
        assert_close(baseline[1], 5.0);
    }

    #[test]
    fn repeated_baseline_passes_are_identical() {
        let dir = TempDir::new().expect("tempdir should be created");
        let mut sim = open_sim(&dir, "reference.sim", &reference_integer_bytes());

        let first = magnitude_by_probe(&mut sim).expect("first pass should compute");
        let second = magnitude_by_probe(&mut sim).expect("second pass should compute");
        assert_eq!(first, second);
    }

    #[test]
    fn normalized_magnitudes_match_the_reference_dataset() {
        let dir = TempDir::new().expect("tempdir should be created");
        let mut sim = open_sim(&dir, "reference.sim", &reference_integer_bytes());

        let magnitudes = sample_magnitudes(&mut sim).expect("magnitudes should compute");
        assert_eq!(magnitudes.len(), 2);
        assert_eq!(magnitudes[0].0, "S1");
        assert_eq!(magnitudes[1].0, "S2");
        assert_close(magnitudes[0].1, 1.0);
        assert_close(magnitudes[1].1, 1.0);
    }

    #[test]
    fn each_magnitude_pass_consumes_every_declared_record() {
        let dir = TempDir::new().expect("tempdir should be created");
        let mut sim = open_sim(&dir, "reference.sim", &reference_integer_bytes());

        sample_magnitudes(&mut sim).expect("magnitudes should compute");
        assert_eq!(sim.records_read(), sim.num_samples);
    }

    #[test]
    fn xydiff_matches_the_reference_dataset() {
        let dir = TempDir::new().expect("tempdir should be created");
        let mut sim = open_sim(&dir, "reference.sim", &reference_integer_bytes());

        let xydiffs = sample_xydiffs(&mut sim).expect("xydiff should compute");
        assert_eq!(xydiffs.len(), 2);
        assert_eq!(xydiffs[0].0, "S1");
        assert_eq!(xydiffs[1].0, "S2");
        assert_close(xydiffs[0].1, 0.5);
        assert_close(xydiffs[1].1, 1.0);
    }

    #[test]
    fn integer_and_float_encodings_produce_identical_metrics() {
        let dir = TempDir::new().expect("tempdir should be created");
        let mut integer_sim = open_sim(&dir, "integer.sim", &reference_integer_bytes());
        let mut float_sim = open_sim(&dir, "float.sim", &reference_float_bytes());

        let integer_magnitudes =
            sample_magnitudes(&mut integer_sim).expect("integer magnitudes should compute");
        let float_magnitudes =
            sample_magnitudes(&mut float_sim).expect("float magnitudes should compute");
        assert_eq!(integer_magnitudes, float_magnitudes);

        let integer_xydiffs =
            sample_xydiffs(&mut integer_sim).expect("integer xydiff should compute");
        let float_xydiffs = sample_xydiffs(&mut float_sim).expect("float xydiff should compute");
        assert_eq!(integer_xydiffs, float_xydiffs);
    }

    #[test]
    fn magnitude_is_invariant_under_uniform_rescaling() {
        let dir = TempDir::new().expect("tempdir should be created");
        let base = sim_bytes_integer(2, 2, &[("S1", vec![3, 4, 1, 2]), ("S2", vec![6, 8, 2, 4])]);
        let scaled =
            sim_bytes_integer(2, 2, &[("S1", vec![9, 12, 3, 6]), ("S2", vec![18, 24, 6, 12])]);

        let mut base_sim = open_sim(&dir, "base.sim", &base);
        let mut scaled_sim = open_sim(&dir, "scaled.sim", &scaled);

        let base_magnitudes =
            sample_magnitudes(&mut base_sim).expect("base magnitudes should compute");
        let scaled_magnitudes =
            sample_magnitudes(&mut scaled_sim).expect("scaled magnitudes should compute");

        for ((name_a, value_a), (name_b, value_b)) in
            base_magnitudes.iter().zip(scaled_magnitudes.iter())
        {
            assert_eq!(name_a, name_b);
            assert_close(*value_a, *value_b);
        }
    }

    #[test]
    fn magnitude_handles_more_than_two_channels() {
        let dir = TempDir::new().expect("tempdir should be created");
        let bytes = sim_bytes_integer(1, 3, &[("A", vec![1, 2, 2])]);
        let mut sim = open_sim(&dir, "three_channel.sim", &bytes);

        let baseline = magnitude_by_probe(&mut sim).expect("baseline should compute");
        assert_close(baseline[0], 3.0);

        let magnitudes =
            magnitude_by_sample(&mut sim, &baseline).expect("magnitudes should compute");
        assert_close(magnitudes[0].1, 1.0);
    }

    #[test]
    fn xydiff_rejects_channel_counts_other_than_two_before_reading() {
        let dir = TempDir::new().expect("tempdir should be created");
        let bytes = sim_bytes_integer(1, 3, &[("A", vec![1, 2, 3])]);
        let mut sim = open_sim(&dir, "three_channel.sim", &bytes);

        let result = sample_xydiffs(&mut sim);
        assert!(result.is_err());
        assert_eq!(sim.records_read(), 0);
    }

    #[test]
    fn zero_sample_dataset_fails_fast() {
        let dir = TempDir::new().expect("tempdir should be created");
        let bytes = sim_bytes_integer(2, 2, &[]);
        let mut sim = open_sim(&dir, "empty.sim", &bytes);

        assert!(sample_magnitudes(&mut sim).is_err());
        assert!(sample_xydiffs(&mut sim).is_err());
    }

    #[test]
    fn zero_probe_dataset_fails_fast() {
        let dir = TempDir::new().expect("tempdir should be created");
        let bytes = sim_bytes_integer(0, 2, &[("A", vec![])]);
        let mut sim = open_sim(&dir, "no_probes.sim", &bytes);

        assert!(sample_magnitudes(&mut sim).is_err());
        assert!(sample_xydiffs(&mut sim).is_err());
    }

    #[test]
    fn zero_probe_baseline_propagates_nan() {
        let dir = TempDir::new().expect("tempdir should be created");
        // Probe 1 reads zero in every sample, so its baseline is zero.
        let bytes =
            sim_bytes_integer(2, 2, &[("A", vec![3, 4, 0, 0]), ("B", vec![6, 8, 0, 0])]);
        let mut sim = open_sim(&dir, "zero_probe.sim", &bytes);

        let magnitudes = sample_magnitudes(&mut sim).expect("computation should not abort");
        assert!(magnitudes.iter().all(|(_, value)| value.is_nan()));
    }
}
