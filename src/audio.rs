//! Audio I/O for the instrument similarity corpus

use crate::error::{EvalError, Result};
use crate::similarity::LabeledSample;
use hound::WavReader;
use std::path::{Path, PathBuf};

/// Load a WAV file as mono samples in [-1, 1] plus its sample rate.
///
/// Multi-channel files are averaged down to one channel.
pub fn load_wav<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, u32)> {
    let path = path.as_ref();
    let mut reader = WavReader::open(path).map_err(|e| {
        EvalError::InvalidInput(format!("cannot open {}: {}", path.display(), e))
    })?;
    let spec = reader.spec();

    if spec.channels == 0 {
        return Err(EvalError::InvalidInput(format!(
            "{} declares zero channels",
            path.display()
        )));
    }
    if spec.bits_per_sample > 32 {
        return Err(EvalError::InvalidInput(format!(
            "Unsupported bit depth: {}",
            spec.bits_per_sample
        )));
    }

    let mut samples: Vec<f32> = Vec::with_capacity(reader.len() as usize);
    match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            for sample in reader.samples::<i32>() {
                samples.push(sample? as f32 / max_value);
            }
        }
        hound::SampleFormat::Float => {
            for sample in reader.samples::<f32>() {
                samples.push(sample?);
            }
        }
    }

    let channels = spec.channels as usize;
    let samples = if channels > 1 {
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        samples
    };

    Ok((samples, spec.sample_rate))
}

/// Directory corpus laid out as `<root>/<family>/<sample>.wav`
#[derive(Debug, Clone)]
pub struct WavCorpus {
    entries: Vec<(String, PathBuf)>,
}

impl WavCorpus {
    /// Index all WAV files under per-family subdirectories, sorted by path
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        let mut entries = Vec::new();

        for family_dir in read_sorted_dir(root)? {
            if !family_dir.is_dir() {
                continue;
            }
            let family = match family_dir.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            for file in read_sorted_dir(&family_dir)? {
                let is_wav = file
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext.eq_ignore_ascii_case("wav"))
                    .unwrap_or(false);
                if is_wav && file.is_file() {
                    entries.push((family.clone(), file));
                }
            }
        }

        log::debug!("Indexed {} WAV samples under {}", entries.len(), root.display());
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lazily decode each sample in index order
    pub fn samples(&self) -> impl Iterator<Item = Result<LabeledSample>> + '_ {
        self.entries.iter().map(|(family, path)| -> Result<LabeledSample> {
            let (waveform, sample_rate) = load_wav(path)?;
            Ok(LabeledSample {
                family: family.clone(),
                waveform,
                sample_rate,
            })
        })
    }
}

fn read_sorted_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = std::fs::read_dir(dir)
        .map_err(|e| EvalError::InvalidInput(format!("cannot read {}: {}", dir.display(), e)))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    paths.sort();
    Ok(paths)
}
