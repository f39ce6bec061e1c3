// MODEL: Pond state and simulation
pub mod constellation;
pub mod fish;
pub mod pattern;
pub mod scale;
pub mod spawner;
pub mod water;
pub mod waves;

pub use constellation::Constellation;
pub use fish::{BodyInstance, Fish};
pub use pattern::Pattern;
pub use scale::compute_scale;
pub use spawner::Spawner;
pub use water::WaterPlane;
pub use waves::Waves;
