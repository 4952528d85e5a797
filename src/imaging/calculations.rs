//! Pure calculation functions for rendition dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Uniform scale factor for a source image and a requested box.
///
/// A zero target axis is unconstrained. With both axes set the larger of the
/// two ratios wins, so the result covers the box rather than fitting inside
/// it. Returns `None` when neither axis is constrained.
///
/// # Examples
/// ```
/// # use colorkeep::imaging::scale_factor;
/// // width-only: 4000x3000 → 200 wide
/// assert_eq!(scale_factor((4000, 3000), (200, 0)), Some(0.05));
/// ```
pub fn scale_factor(source: (u32, u32), target: (u32, u32)) -> Option<f64> {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let x = (tgt_w > 0).then(|| tgt_w as f64 / src_w.max(1) as f64);
    let y = (tgt_h > 0).then(|| tgt_h as f64 / src_h.max(1) as f64);

    match (x, y) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (Some(s), None) | (None, Some(s)) => Some(s),
        (None, None) => None,
    }
}

/// Output dimensions for independent horizontal and vertical scale factors.
///
/// Rounds to the nearest pixel and never returns a zero-sized axis.
pub fn scaled_dimensions(source: (u32, u32), x_scale: f64, y_scale: f64) -> (u32, u32) {
    let (src_w, src_h) = source;
    let w = (src_w as f64 * x_scale).round().max(1.0) as u32;
    let h = (src_h as f64 * y_scale).round().max(1.0) as u32;
    (w, h)
}
