const A4_HZ: f64 = 440.0;

pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Label for silence or an unvoiced segment.
pub const REST: &str = "Rest";

/// C0, 57 semitones below A4.
fn c0_hz() -> f64 {
    A4_HZ * 2f64.powf(-4.75)
}

/// Nearest equal-tempered note name with octave, e.g. `"A4"`, `"C#-1"`.
///
/// Zero, negative and non-finite frequencies map to [`REST`].
pub fn note_name(freq_hz: f32) -> String {
    if !(freq_hz.is_finite() && freq_hz > 0.0) {
        return REST.to_string();
    }
    let semitones = (12.0 * (freq_hz as f64 / c0_hz()).log2()).round() as i32;
    let octave = semitones.div_euclid(12);
    let class = semitones.rem_euclid(12) as usize;
    format!("{}{}", NOTE_NAMES[class], octave)
}
