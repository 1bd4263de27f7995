//! Procedural texture generation for terrain and hull materials.

use engine_core::ImageData;
use noise::{NoiseFn, Perlin};

/// RGBA pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pixel {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Pixel {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_rgb(r: f32, g: f32, b: f32) -> Self {
        Self {
            r: (r.clamp(0.0, 1.0) * 255.0) as u8,
            g: (g.clamp(0.0, 1.0) * 255.0) as u8,
            b: (b.clamp(0.0, 1.0) * 255.0) as u8,
            a: 255,
        }
    }

    /// Grey pixel, used for height (bump) maps.
    pub fn grey(value: f32) -> Self {
        Self::from_rgb(value, value, value)
    }

    pub fn to_bytes(&self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Generated texture data
#[derive(Debug, Clone)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Pixel>,
}

impl TextureData {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![Pixel::new(0, 0, 0, 255); (width * height) as usize],
        }
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, pixel: Pixel) {
        if x < self.width && y < self.height {
            self.pixels[(y * self.width + x) as usize] = pixel;
        }
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> Pixel {
        if x < self.width && y < self.height {
            self.pixels[(y * self.width + x) as usize]
        } else {
            Pixel::new(0, 0, 0, 255)
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.pixels.len() * 4);
        for pixel in &self.pixels {
            bytes.extend_from_slice(&pixel.to_bytes());
        }
        bytes
    }

    pub fn into_image(self) -> ImageData {
        let rgba = self.to_bytes();
        ImageData::new(self.width, self.height, rgba)
    }
}

/// Procedural texture generator
pub struct TextureGenerator {
    perlin: Perlin,
}

impl TextureGenerator {
    pub fn new(seed: u32) -> Self {
        Self {
            perlin: Perlin::new(seed),
        }
    }

    /// Tileable-enough fractal noise in 0..1 for texel (x, y).
    fn fbm(&self, x: f64, y: f64, octaves: u32) -> f64 {
        let mut value = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = 1.0;
        let mut max_value = 0.0;
        for _ in 0..octaves {
            value += self.perlin.get([x * frequency, y * frequency]) * amplitude;
            max_value += amplitude;
            amplitude *= 0.5;
            frequency *= 2.0;
        }
        (value / max_value + 1.0) * 0.5
    }

    /// Mottled grass albedo.
    pub fn grass(&self, size: u32) -> TextureData {
        let mut tex = TextureData::new(size, size);
        let scale = 8.0 / size as f64;
        for y in 0..size {
            for x in 0..size {
                let n = self.fbm(x as f64 * scale, y as f64 * scale, 4) as f32;
                tex.set_pixel(x, y, Pixel::from_rgb(0.2 + 0.15 * n, 0.45 + 0.3 * n, 0.15 + 0.1 * n));
            }
        }
        tex
    }

    /// Rock height field, stored as grey for bump mapping.
    pub fn rock_bump(&self, size: u32) -> TextureData {
        let mut tex = TextureData::new(size, size);
        let scale = 16.0 / size as f64;
        for y in 0..size {
            for x in 0..size {
                let n = self.fbm(x as f64 * scale + 100.0, y as f64 * scale + 100.0, 5) as f32;
                tex.set_pixel(x, y, Pixel::grey(n));
            }
        }
        tex
    }

    /// Riveted panel pattern for the hull.
    pub fn hull_panels(&self, size: u32, panels: u32) -> TextureData {
        let mut tex = TextureData::new(size, size);
        let cell = (size / panels.max(1)).max(1);
        for y in 0..size {
            for x in 0..size {
                let seam = x % cell == 0 || y % cell == 0;
                let grime = self.fbm(x as f64 * 0.05, y as f64 * 0.05, 3) as f32;
                let base = if seam { 0.25 } else { 0.55 + 0.2 * grime };
                tex.set_pixel(x, y, Pixel::from_rgb(base, base, base * 1.05));
            }
        }
        tex
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_images_are_well_formed() {
        let gen = TextureGenerator::new(7);
        for tex in [gen.grass(32), gen.rock_bump(16), gen.hull_panels(32, 4)] {
            let image = tex.into_image();
            assert!(image.is_well_formed());
        }
    }

    #[test]
    fn same_seed_same_pixels() {
        let a = TextureGenerator::new(3).grass(16);
        let b = TextureGenerator::new(3).grass(16);
        assert_eq!(a.pixels, b.pixels);
    }

    #[test]
    fn hull_seams_are_darker() {
        let tex = TextureGenerator::new(1).hull_panels(32, 4);
        assert!(tex.get_pixel(0, 5).r < tex.get_pixel(3, 5).r);
    }
}
