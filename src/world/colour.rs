//! Colour conversions for the 16-bit packed HSL space used by terrain and models.
//!
//! Packed layout is `hue:6 | saturation:3 | lightness:7`. The [`Palette`] maps
//! every packed value to a brightness adjusted RGB colour.

use serde::Serialize;

pub const PALETTE_SIZE: usize = 65536;
pub const DEFAULT_BRIGHTNESS: f64 = 0.6;


/// HSL components of a floor colour, all 8-bit fixed point.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Hsl {
    pub hue: i32,
    pub saturation: i32,
    pub lightness: i32,
    pub hue_multiplier: i32,
    pub weighted_hue: i32,
    pub packed: u16,
}

impl Hsl {
    pub fn from_rgb(rgb: u32) -> Self {
        let r = ((rgb >> 16) & 0xff) as f64 / 256.0;
        let g = ((rgb >> 8) & 0xff) as f64 / 256.0;
        let b = (rgb & 0xff) as f64 / 256.0;

        let min = r.min(g).min(b);
        let max = r.max(g).max(b);
        let lightness = (max + min) / 2.0;

        let mut hue = 0.0;
        let mut saturation = 0.0;
        if min != max {
            saturation = if lightness < 0.5 {
                (max - min) / (max + min)
            } else {
                (max - min) / (2.0 - max - min)
            };

            hue = if r == max {
                (g - b) / (max - min)
            } else if g == max {
                2.0 + (b - r) / (max - min)
            } else {
                4.0 + (r - g) / (max - min)
            };
        }

        hue /= 6.0;
        if hue < 0.0 {
            hue += 1.0;
        }

        let hue_multiplier = if lightness > 0.5 {
            ((1.0 - lightness) * saturation * 512.0) as i32
        } else {
            (saturation * lightness * 512.0) as i32
        }.max(1);

        let hue_8 = ((hue * 256.0) as i32).clamp(0, 255);
        let saturation_8 = ((saturation * 256.0) as i32).clamp(0, 255);
        let lightness_8 = ((lightness * 256.0) as i32).clamp(0, 255);

        Self {
            hue: hue_8,
            saturation: saturation_8,
            lightness: lightness_8,
            hue_multiplier,
            weighted_hue: (hue_multiplier as f64 * hue) as i32,
            packed: pack_hsl(hue_8, saturation_8, lightness_8),
        }
    }
}


/// Packs 8-bit hue/saturation/lightness, bright colours lose saturation precision.
pub fn pack_hsl(hue: i32, saturation: i32, lightness: i32) -> u16 {
    let hue = hue.clamp(0, 255);
    let lightness = lightness.clamp(0, 255);
    let mut saturation = saturation.clamp(0, 255);

    for threshold in [179, 192, 217, 243] {
        if lightness > threshold {
            saturation /= 2;
        }
    }

    (((hue / 4) << 10) + ((saturation / 32) << 7) + lightness / 2) as u16
}

#[inline]
pub fn packed_saturation(packed: u16) -> u16 {
    (packed >> 7) & 7
}


/// Scales the lightness of a packed colour, `None` stays `None`.
pub fn light(hsl: Option<u16>, light: i32) -> Option<u16> {
    let hsl = hsl?;
    let lightness = (light * (hsl & 0x7f) as i32 / 128).clamp(2, 126);
    Some((hsl & 0xff80) + lightness as u16)
}


/// Gamma adjusts each channel of a 24-bit colour.
pub fn adjust_rgb(rgb: u32, exponent: f64) -> u32 {
    let channel = |shift: u32| {
        let c = ((rgb >> shift) & 0xff) as f64 / 256.0;
        ((c.powf(exponent) * 256.0) as u32).min(255)
    };
    (channel(16) << 16) | (channel(8) << 8) | channel(0)
}


fn hue_channel(m1: f64, m2: f64, mut t: f64) -> f64 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }

    if 6.0 * t < 1.0 {
        m2 + (m1 - m2) * 6.0 * t
    } else if 2.0 * t < 1.0 {
        m1
    } else if 3.0 * t < 2.0 {
        m2 + (m1 - m2) * (2.0 / 3.0 - t) * 6.0
    } else {
        m2
    }
}

/// HSL in `[0, 1]` to a 24-bit colour.
pub fn hsl_to_rgb(hue: f64, saturation: f64, lightness: f64) -> u32 {
    let (r, g, b) = if saturation == 0.0 {
        (lightness, lightness, lightness)
    } else {
        let m1 = if lightness < 0.5 {
            lightness * (1.0 + saturation)
        } else {
            lightness + saturation - lightness * saturation
        };
        let m2 = 2.0 * lightness - m1;
        (
            hue_channel(m1, m2, hue + 1.0 / 3.0),
            hue_channel(m1, m2, hue),
            hue_channel(m1, m2, hue - 1.0 / 3.0),
        )
    };

    let to_byte = |c: f64| ((c * 256.0) as i32).clamp(0, 255) as u32;
    (to_byte(r) << 16) | (to_byte(g) << 8) | to_byte(b)
}


/// Packed HSL to RGB lookup table.
#[derive(Clone)]
pub struct Palette {
    colours: Vec<u32>,
}

impl Palette {
    pub fn new(brightness: f64) -> Self {
        let mut colours = Vec::with_capacity(PALETTE_SIZE);

        for k in 0..512 {
            let hue = (k / 8) as f64 / 64.0 + 1.0 / 128.0;
            let saturation = (k & 7) as f64 / 8.0 + 1.0 / 16.0;

            for l in 0..128 {
                let lightness = l as f64 / 128.0;
                let rgb = adjust_rgb(hsl_to_rgb(hue, saturation, lightness), brightness);
                // 0 is reserved for hidden faces
                colours.push(if rgb == 0 { 1 } else { rgb });
            }
        }

        Self { colours }
    }

    #[inline]
    pub fn rgb(&self, hsl: u16) -> u32 {
        self.colours[hsl as usize]
    }

    pub fn len(&self) -> usize {
        self.colours.len()
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::new(DEFAULT_BRIGHTNESS)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn channels(rgb: u32) -> [i32; 3] {
        [(rgb >> 16) as i32 & 0xff, (rgb >> 8) as i32 & 0xff, rgb as i32 & 0xff]
    }

    #[test]
    fn grey_has_no_saturation() {
        let hsl = Hsl::from_rgb(0x808080);
        assert_eq!(hsl.saturation, 0);
        assert_eq!(hsl.hue, 0);
        assert_eq!(hsl.lightness, 128);
        assert_eq!(hsl.hue_multiplier, 1);
        assert_eq!(hsl.packed, 64);
    }

    #[test]
    fn pure_red() {
        let hsl = Hsl::from_rgb(0xFF0000);
        assert_eq!(hsl.hue, 0);
        assert_eq!(hsl.saturation, 255);
        assert_eq!(hsl.lightness, 127);
        assert_eq!(hsl.weighted_hue, 0);
    }

    #[test]
    fn hue_is_never_negative() {
        // red is max and g < b, raw hue would be negative
        let hsl = Hsl::from_rgb(0xFF0080);
        assert!(hsl.hue > 200, "{hsl:?}");
        assert!(hsl.weighted_hue >= 0);
    }

    #[test]
    fn light_scales_and_clamps() {
        assert_eq!(light(None, 96), None);
        assert_eq!(light(Some(0x1234 & 0xff80 | 100), 128), Some((0x1234 & 0xff80) + 100));
        assert_eq!(light(Some(0xff80 | 127), 1000), Some(0xff80 + 126));
        assert_eq!(light(Some(0x0400), 96), Some(0x0402));
    }

    #[test]
    fn palette_has_no_black() {
        let palette = Palette::default();
        assert_eq!(palette.len(), PALETTE_SIZE);
        assert_eq!(palette.rgb(0), 1);
        assert!((0..=u16::MAX).all(|i| palette.rgb(i) != 0));
        // top lightness of a grey ramp is near white
        assert!(channels(palette.rgb(127)).iter().all(|&c| c > 240));
    }

    #[test]
    fn adjust_is_identity_for_unit_exponent() {
        assert_eq!(adjust_rgb(0x10_80_F0, 1.0), 0x10_80_F0);
        assert!(channels(adjust_rgb(0x404040, 0.6))[0] > 0x40);
    }

    proptest! {
        #[test]
        fn rgb_hsl_round_trip(rgb in 0u32..0x100_0000) {
            let hsl = Hsl::from_rgb(rgb);
            let back = hsl_to_rgb(
                hsl.hue as f64 / 256.0,
                hsl.saturation as f64 / 256.0,
                hsl.lightness as f64 / 256.0,
            );
            for (a, b) in channels(rgb).iter().zip(channels(back).iter()) {
                prop_assert!((a - b).abs() <= 8, "{:06x} -> {:?} -> {:06x}", rgb, hsl, back);
            }
        }

        #[test]
        fn saturation_drops_across_thresholds(hue in 0i32..256, saturation in 0i32..256, lightness in 0i32..255) {
            let lower = packed_saturation(pack_hsl(hue, saturation, lightness));
            let upper = packed_saturation(pack_hsl(hue, saturation, lightness + 1));
            prop_assert!(upper <= lower);
            if [179, 192, 217, 243].contains(&lightness) && lower > 0 {
                prop_assert!(upper < lower);
            }
        }
    }
}
