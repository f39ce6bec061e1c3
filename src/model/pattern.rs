use image::{Rgba, RgbaImage};
use rand::Rng;

/// Base colors a koi can be born with
const BASE_COLORS: [[u8; 3]; 4] = [
    [238, 236, 228], // shiro
    [232, 118, 36],  // orange
    [214, 176, 64],  // yamabuki
    [40, 38, 44],    // sumi
];

/// Spot colors laid over the base
const SPOT_COLORS: [[u8; 3]; 3] = [
    [196, 34, 28], // hi
    [22, 20, 24],  // sumi
    [250, 250, 246],
];

const SPOTS_MAX: u32 = 6;

/// The skin of a single fish, rasterised into an atlas slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub base: [u8; 3],
    pub spots: [u8; 3],
    pub spot_count: u32,
    pub seed: u32,
}

impl Pattern {
    pub fn random(rng: &mut impl Rng) -> Self {
        let base = BASE_COLORS[rng.random_range(0..BASE_COLORS.len())];
        let mut spots = SPOT_COLORS[rng.random_range(0..SPOT_COLORS.len())];
        if spots == base {
            spots = SPOT_COLORS[0];
        }

        Self {
            base,
            spots,
            spot_count: rng.random_range(0..=SPOTS_MAX),
            seed: rng.random(),
        }
    }

    /// Rasterise the pattern, head pointing towards +x.
    /// Pixels outside the body are fully transparent.
    pub fn rasterize(&self, width: u32, height: u32) -> RgbaImage {
        let mut image = RgbaImage::new(width, height);
        let spots: Vec<(f32, f32, f32)> = (0..self.spot_count)
            .map(|i| {
                let h = hash(self.seed, i);
                (
                    0.25 + 0.6 * unit(h),
                    0.3 + 0.4 * unit(h >> 8),
                    0.08 + 0.1 * unit(h >> 16),
                )
            })
            .collect();

        for (px, py, pixel) in image.enumerate_pixels_mut() {
            let u = (px as f32 + 0.5) / width as f32;
            let v = (py as f32 + 0.5) / height as f32;

            // Body tapers towards the tail at u = 0
            let half_width = 0.5 * (0.35 + 0.65 * (1.0 - (1.0 - u).powi(2)).max(0.0).sqrt());
            let dy = (v - 0.5) / half_width;
            let dx = u * 2.0 - 1.0;
            if dx * dx * 0.8 + dy * dy > 1.0 {
                continue;
            }

            let spotted = spots.iter().any(|&(sx, sy, r)| {
                let (ex, ey) = (u - sx, (v - sy) * 0.5);
                ex * ex + ey * ey < r * r
            });
            let [r, g, b] = if spotted { self.spots } else { self.base };
            *pixel = Rgba([r, g, b, 255]);
        }

        image
    }
}

fn hash(seed: u32, index: u32) -> u32 {
    let mut h = seed ^ index.wrapping_mul(0x9e37_79b9);
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^ (h >> 16)
}

fn unit(h: u32) -> f32 {
    (h & 0xff) as f32 / 255.0
}
