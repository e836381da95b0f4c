use super::radix::to_radix_string;

/// Fixed parameters of the oscillator -> compressor -> analyser chain. The
/// compressor's non-linear response is what varies between audio stacks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioChain {
    pub oscillator_type: &'static str,
    pub frequency_hz: f32,
    pub threshold_db: f32,
    pub knee_db: f32,
    pub ratio: f32,
    pub attack_s: f32,
    pub release_s: f32,
}

pub const FINGERPRINT_CHAIN: AudioChain = AudioChain {
    oscillator_type: "triangle",
    frequency_hz: 10_000.0,
    threshold_db: -50.0,
    knee_db: 40.0,
    ratio: 12.0,
    attack_s: 0.0,
    release_s: 0.25,
};

const DIGEST_LEN: usize = 12;

/// Sum of absolute magnitudes, rendered like `Number#toString(36)` and cut to
/// twelve characters. Silent bins read as `-Infinity`, so an idle chain
/// digests to `"Infinity"`.
pub fn audio_digest(frequency_data: &[f32]) -> String {
    let sum: f64 = frequency_data
        .iter()
        .map(|magnitude| f64::from(*magnitude).abs())
        .sum();
    to_radix_string(sum, 36).chars().take(DIGEST_LEN).collect()
}
