use glam::Vec2;

/// Height samples per simulation unit
pub const RESOLUTION: f32 = 4.0;

/// Height field covering the pond, advanced by [`crate::model::Waves`].
///
/// Keeps the previous step around, which is both the second state the wave
/// equation needs and the state renderers interpolate from.
pub struct WaterPlane {
    width: f32,
    height: f32,
    columns: usize,
    rows: usize,
    previous: Vec<f32>,
    current: Vec<f32>,
}

impl WaterPlane {
    /// Create a flat plane of `width` by `height` simulation units
    pub fn new(width: f32, height: f32) -> Self {
        let columns = (width.max(0.0) * RESOLUTION).ceil() as usize + 1;
        let rows = (height.max(0.0) * RESOLUTION).ceil() as usize + 1;

        Self {
            width,
            height,
            columns,
            rows,
            previous: vec![0.0; columns * rows],
            current: vec![0.0; columns * rows],
        }
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    fn cell(&self, position: Vec2) -> Option<(usize, usize)> {
        let x = (position.x * RESOLUTION).round();
        let y = (position.y * RESOLUTION).round();
        if x < 0.0 || y < 0.0 || x >= self.columns as f32 || y >= self.rows as f32 {
            return None;
        }
        Some((x as usize, y as usize))
    }

    /// Height at the sample nearest to `position`, zero outside the plane
    pub fn height_at(&self, position: Vec2) -> f32 {
        self.cell(position)
            .map(|(x, y)| self.current[x + y * self.columns])
            .unwrap_or(0.0)
    }

    /// Displace the surface around `center`, fading out linearly towards `radius`
    pub fn add_flare(&mut self, center: Vec2, radius: f32, displacement: f32) {
        let reach = (radius * RESOLUTION).ceil() as isize;
        let cx = (center.x * RESOLUTION).round() as isize;
        let cy = (center.y * RESOLUTION).round() as isize;

        for y in (cy - reach).max(0)..=(cy + reach).min(self.rows as isize - 1) {
            for x in (cx - reach).max(0)..=(cx + reach).min(self.columns as isize - 1) {
                let offset = Vec2::new(x as f32, y as f32) / RESOLUTION - center;
                let distance = offset.length();
                if distance < radius {
                    self.current[x as usize + y as usize * self.columns] +=
                        displacement * (1.0 - distance / radius);
                }
            }
        }
    }

    /// Advance the surface by one step of the damped wave equation.
    /// Edges are fixed at rest.
    pub fn step(&mut self, damping: f32) {
        let (columns, rows) = (self.columns, self.rows);

        // `previous` becomes the next state in place
        for y in 1..rows.saturating_sub(1) {
            for x in 1..columns.saturating_sub(1) {
                let i = x + y * columns;
                let neighbours = self.current[i - 1]
                    + self.current[i + 1]
                    + self.current[i - columns]
                    + self.current[i + columns];
                self.previous[i] = (neighbours * 0.5 - self.previous[i]) * damping;
            }
        }
        std::mem::swap(&mut self.previous, &mut self.current);
    }

    /// Heights blended between the last two steps, row-major
    pub fn interpolated(&self, time_factor: f32) -> Vec<f32> {
        self.previous
            .iter()
            .zip(&self.current)
            .map(|(a, b)| a + (b - a) * time_factor)
            .collect()
    }

    /// Sum of absolute heights, a cheap measure of how agitated the pond is
    pub fn energy(&self) -> f32 {
        self.current.iter().map(|h| h.abs()).sum()
    }
}
