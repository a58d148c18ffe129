//! Per-pixel channel transforms. Each takes and returns one RGB triple;
//! alpha is handled by the caller and never touched here.

/// Inverted grayscale: every channel becomes 255 minus the channel
/// average, so bright areas turn into dark pencil strokes.
pub fn sketch(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let avg = (r as u16 + g as u16 + b as u16) / 3;
    // avg <= 255, so the subtraction cannot underflow
    let v = (255 - avg) as u8;
    (v, v, v)
}

/// Posterize each channel into 8 bands of width 32.
pub fn cartoon(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    (r / 32 * 32, g / 32 * 32, b / 32 * 32)
}

/// Warm color cast: lift red by 20 and green by 10, saturating at 255.
pub fn oil(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    (r.saturating_add(20), g.saturating_add(10), b)
}

/// Relief effect from cyclic channel differences. All three outputs are
/// computed from the original input triple.
pub fn emboss(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    (relief(r, g), relief(g, b), relief(b, r))
}

fn relief(c: u8, next: u8) -> u8 {
    (128 + c as i16 - next as i16).clamp(0, 255) as u8
}

/// Classic sepia tone matrix, rounded to nearest and clamped per channel.
pub fn sepia(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    (
        tone(0.393 * r + 0.769 * g + 0.189 * b),
        tone(0.349 * r + 0.686 * g + 0.168 * b),
        tone(0.272 * r + 0.534 * g + 0.131 * b),
    )
}

fn tone(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}
