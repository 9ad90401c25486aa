use crate::config::NoiseOctaves;
use noise::{NoiseFn, Perlin};

/// Octave-summed Perlin used for the dry-brush edge wobble. Output is normalized by
/// total amplitude, so it stays roughly in [-1, 1] whatever the octave count.
#[derive(Clone)]
pub struct LayeredNoise {
    perlin: Perlin,
    octaves: u32,
    lacunarity: f64,
    persistence: f64,
}

impl LayeredNoise {
    pub fn new(params: &NoiseOctaves) -> Self {
        Self {
            perlin: Perlin::new(params.seed),
            octaves: params.octaves.max(1),
            lacunarity: params.lacunarity as f64,
            persistence: params.persistence as f64,
        }
    }

    pub fn sample(&self, x: f32, y: f32, frequency: f32) -> f32 {
        let mut freq = frequency as f64;
        let mut amp = 1.0f64;
        let mut sum = 0.0f64;
        let mut total = 0.0f64;

        for _ in 0..self.octaves {
            sum += self.perlin.get([x as f64 * freq, y as f64 * freq]) * amp;
            total += amp;
            freq *= self.lacunarity;
            amp *= self.persistence;
        }

        if total <= 0.0 {
            return 0.0;
        }
        ((sum / total) as f32).clamp(-1.0, 1.0)
    }
}

/// Single octave 2D noise remapped to [0, 1], sampled at world XZ.
#[derive(Clone)]
pub struct StylizeNoise {
    perlin: Perlin,
    scale: f64,
}

impl StylizeNoise {
    pub fn new(seed: u64, scale: f32) -> Self {
        Self {
            perlin: Perlin::new(seed as u32),
            scale: scale as f64,
        }
    }

    #[inline]
    pub fn sample(&self, x: f32, z: f32) -> f32 {
        // offset keeps integer lattice points (where Perlin is 0) off the road grid
        let v = self
            .perlin
            .get([x as f64 * self.scale + 0.37, z as f64 * self.scale + 0.61]);
        ((v + 1.0) * 0.5).clamp(0.0, 1.0) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layered_noise_is_bounded_and_deterministic() {
        let params = NoiseOctaves {
            octaves: 5,
            ..Default::default()
        };
        let a = LayeredNoise::new(&params);
        let b = LayeredNoise::new(&params);
        for i in 0..200 {
            let x = i as f32 * 0.731;
            let v = a.sample(x, 3.3, 0.4);
            assert!((-1.0..=1.0).contains(&v));
            assert_eq!(v, b.sample(x, 3.3, 0.4));
        }
    }

    #[test]
    fn stylize_noise_is_unit_range() {
        let n = StylizeNoise::new(3, 0.5);
        for i in 0..100 {
            let v = n.sample(i as f32 * 1.3, i as f32 * -0.7);
            assert!((0.0..=1.0).contains(&v));
        }
    }
}
