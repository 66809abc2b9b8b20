//! Loudness estimate over a window of PCM bytes

/// Full-scale reference for 16-bit samples
const FULL_SCALE: f64 = 32768.0;

/// Compute the decibel estimate for a buffer of little-endian i16 samples.
///
/// Channels are not separated; the buffer is one flat sample stream. A trailing
/// odd byte is ignored. Silence (and an empty buffer) yields `0.0`, otherwise the
/// result is `-20 * log10(rms / 32768)`, so quieter audio maps to larger values.
pub fn decibels(pcm: &[u8]) -> f64 {
    let rms = rms(pcm);
    if rms == 0.0 {
        return 0.0;
    }
    -20.0 * (rms / FULL_SCALE).log10()
}

/// Root-mean-square of the samples in `pcm`
pub fn rms(pcm: &[u8]) -> f64 {
    let sample_count = pcm.len() / 2;
    if sample_count == 0 {
        return 0.0;
    }

    let sum_squares: f64 = pcm
        .chunks_exact(2)
        .map(|pair| {
            let sample = i16::from_le_bytes([pair[0], pair[1]]) as f64;
            sample * sample
        })
        .sum();

    (sum_squares / sample_count as f64).sqrt()
}
