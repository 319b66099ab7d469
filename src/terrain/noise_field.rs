//! Deterministic fractal noise normalized to [0, 1]

use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

/// Noise parameters attached to a terrain modification
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseParams {
    pub enabled: bool,
    pub seed: u32,
    pub scale: f32,        // Frequency in normalized map units (larger = busier)
    pub octaves: u32,      // FBM octaves (detail levels)
    pub persistence: f32,  // Amplitude falloff per octave (0.5 typical)
    pub lacunarity: f32,   // Frequency growth per octave (2.0 typical)
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            enabled: false,
            seed: 12345,
            scale: 4.0,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
        }
    }
}

/// Fractal Brownian motion over Perlin noise for one seed and octave setup.
///
/// The octave sources are built once; sampling is a pure function of the
/// coordinate.
#[derive(Clone, Debug)]
pub struct NoiseField {
    seed: u32,
    octaves: usize,
    noise: Fbm<Perlin>,
}

impl NoiseField {
    /// Octave count is clamped to 1..=`Fbm::MAX_OCTAVES`
    pub fn new(seed: u32, octaves: u32, persistence: f32, lacunarity: f32) -> Self {
        let octaves = (octaves as usize).clamp(1, Fbm::<Perlin>::MAX_OCTAVES);
        let noise = Fbm::<Perlin>::new(seed)
            .set_octaves(octaves)
            .set_persistence(persistence as f64)
            .set_lacunarity(lacunarity as f64);
        Self { seed, octaves, noise }
    }

    pub fn from_params(params: &NoiseParams) -> Self {
        Self::new(params.seed, params.octaves, params.persistence, params.lacunarity)
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn octaves(&self) -> usize {
        self.octaves
    }

    /// Sample at (x, y). Result is always in [0, 1].
    pub fn get(&self, x: f32, y: f32) -> f32 {
        let v = self.noise.get([x as f64, y as f64]);
        // Degenerate persistence makes the FBM scale factor non-finite
        if !v.is_finite() {
            return 0.5;
        }
        ((v + 1.0) * 0.5).clamp(0.0, 1.0) as f32
    }

    /// Sample with coordinates scaled by `scale`
    pub fn get_scaled(&self, x: f32, y: f32, scale: f32) -> f32 {
        self.get(x * scale, y * scale)
    }
}

/// One-shot fractal noise sample.
///
/// Builds the octave sources on every call; hold a [`NoiseField`] when
/// sampling many points with the same setup.
pub fn sample(x: f32, y: f32, seed: u32, octaves: u32, persistence: f32, lacunarity: f32) -> f32 {
    NoiseField::new(seed, octaves, persistence, lacunarity).get(x, y)
}
