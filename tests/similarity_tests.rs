//! Instrument similarity over a WAV corpus with a caller-supplied extractor

use notescore::audio::WavCorpus;
use notescore::similarity::{build_similarity, FeatureExtractor, LabeledSample};
use notescore::EvalResult;
use std::f32::consts::PI;
use std::path::Path;

/// Sine tone as 16-bit mono WAV
fn write_tone(path: &Path, freq: f32, sr: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: sr,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..sr / 10 {
        let t = i as f32 / sr as f32;
        let s = (2.0 * PI * freq * t).sin() * 0.5;
        writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

/// Zero-crossing rate and RMS: enough to separate low from high tones
struct CrossingsAndLevel;

impl FeatureExtractor for CrossingsAndLevel {
    fn features(&self, waveform: &[f32], sample_rate: u32) -> EvalResult<Vec<f64>> {
        let crossings = waveform
            .windows(2)
            .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
            .count() as f64;
        let seconds = waveform.len() as f64 / sample_rate as f64;
        let rms = (waveform.iter().map(|&x| (x * x) as f64).sum::<f64>() / waveform.len() as f64)
            .sqrt();
        Ok(vec![crossings / seconds / 1000.0, rms])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corpus_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let layout = [
            ("bass", 55.0),
            ("bass", 65.0),
            ("flute", 1760.0),
            ("flute", 1975.0),
            ("guitar", 110.0),
        ];
        for (i, (family, freq)) in layout.iter().enumerate() {
            let family_dir = dir.path().join(family);
            std::fs::create_dir_all(&family_dir).unwrap();
            write_tone(&family_dir.join(format!("{}.wav", i)), *freq, 16000);
        }

        let corpus = WavCorpus::open(dir.path()).unwrap();
        assert_eq!(corpus.len(), 5);
        let samples: Vec<LabeledSample> = corpus.samples().collect::<EvalResult<_>>().unwrap();
        let matrix = build_similarity(samples, &CrossingsAndLevel).unwrap();

        assert_eq!(matrix.families().len(), 3);
        let bass_guitar = matrix.get("bass", "guitar").unwrap();
        let bass_flute = matrix.get("bass", "flute").unwrap();
        assert!(bass_guitar > bass_flute);
        for family in ["bass", "flute", "guitar"] {
            assert!((matrix.get(family, family).unwrap() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_extractor_errors_propagate() {
        let failing = |_: &[f32], _: u32| -> EvalResult<Vec<f64>> {
            Err(notescore::EvalError::Similarity("extractor failed".to_string()))
        };
        let corpus = vec![LabeledSample {
            family: "organ".to_string(),
            waveform: vec![0.0; 8],
            sample_rate: 16000,
        }];
        assert!(build_similarity(corpus, &failing).is_err());
    }
}
