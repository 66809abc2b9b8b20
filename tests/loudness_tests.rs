// Properties of the decibel estimate
//
// The estimate is -20 * log10(rms / 32768): quieter signals map to larger
// values, and silence is pinned to 0.

use voice_warden::audio::loudness::{decibels, rms};

fn constant(amplitude: i16, samples: usize) -> Vec<u8> {
    std::iter::repeat(amplitude.to_le_bytes())
        .take(samples)
        .flatten()
        .collect()
}

#[test]
fn test_silence_is_zero_for_any_length() {
    for len in [0usize, 1, 2, 3, 100, 3840, 38_400] {
        assert_eq!(decibels(&vec![0u8; len]), 0.0, "length {}", len);
    }
}

#[test]
fn test_louder_signal_gives_smaller_value() {
    let amplitudes = [1i16, 9, 11, 100, 1000, 20_000, 32_767];
    for pair in amplitudes.windows(2) {
        let quieter = decibels(&constant(pair[0], 64));
        let louder = decibels(&constant(pair[1], 64));
        assert!(
            louder < quieter,
            "amplitude {} gave {} which is not below {} for amplitude {}",
            pair[1],
            louder,
            quieter,
            pair[0]
        );
    }
}

#[test]
fn test_equal_amplitudes_give_equal_values() {
    assert_eq!(decibels(&constant(500, 10)), decibels(&constant(500, 999)));
    // Sign does not matter, only magnitude
    assert_eq!(decibels(&constant(-500, 10)), decibels(&constant(500, 10)));
}

#[test]
fn test_trailing_odd_byte_is_ignored() {
    let mut buffer = constant(1234, 50);
    let even = decibels(&buffer);
    buffer.push(0x7f);
    assert_eq!(decibels(&buffer), even);

    let mut mixed: Vec<u8> = [100i16, -3000, 27, 0, 15_000]
        .iter()
        .flat_map(|s| s.to_le_bytes())
        .collect();
    let trimmed = decibels(&mixed);
    mixed.push(0xff);
    assert_eq!(decibels(&mixed), trimmed);
}

#[test]
fn test_channels_are_treated_as_one_stream() {
    // Interleaved L=3, R=4 has rms sqrt((9 + 16) / 2)
    let stereo: Vec<u8> = [3i16, 4, 3, 4].iter().flat_map(|s| s.to_le_bytes()).collect();
    assert!((rms(&stereo) - 12.5f64.sqrt()).abs() < 1e-12);
}

#[test]
fn test_quiet_window_lands_above_default_threshold() {
    let db = decibels(&constant(9, 9600));
    assert!(db > 71.0 && db < 72.0, "got {}", db);

    let db = decibels(&constant(11, 9600));
    assert!(db < 70.0, "got {}", db);
}
