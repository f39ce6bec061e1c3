use crate::config::KoiConfig;

/// Pixels per simulation unit for a viewport.
///
/// Prefers `preferred_scale`, shrinks it on small viewports so the shorter
/// side still spans `size_min` units, and never lets the shorter side span
/// more than `size_max` units.
pub fn compute_scale(width: u32, height: u32, config: &KoiConfig) -> f32 {
    let min_size = width.min(height) as f32;

    (config.preferred_scale.min(min_size / config.size_min)).max(min_size / config.size_max)
}
