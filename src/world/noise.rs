//! Deterministic value noise used for tiles without a stored height.

use lazy_static::lazy_static;

const COSINE_STEPS: usize = 2048;

lazy_static! {
    static ref COSINE: [i32; COSINE_STEPS] = {
        let mut table = [0; COSINE_STEPS];
        for (i, v) in table.iter_mut().enumerate() {
            *v = (65536.0 * (i as f64 * 0.0030679615).cos()) as i32;
        }
        table
    };
}


fn noise(x: i32, y: i32) -> i32 {
    let mut n = x.wrapping_add(y.wrapping_mul(57));
    n = (n << 13) ^ n;
    let n = n.wrapping_mul(n.wrapping_mul(n).wrapping_mul(15731).wrapping_add(789221)).wrapping_add(1376312589) & 0x7fffffff;
    (n >> 19) & 0xff
}

fn smooth_noise(x: i32, y: i32) -> i32 {
    let corners = noise(x - 1, y - 1) + noise(x + 1, y - 1) + noise(x - 1, y + 1) + noise(x + 1, y + 1);
    let sides = noise(x - 1, y) + noise(x + 1, y) + noise(x, y - 1) + noise(x, y + 1);
    let center = noise(x, y);
    corners / 16 + sides / 8 + center / 4
}

fn interpolate(a: i32, b: i32, angle: i32, frequency: i32) -> i32 {
    let cosine = (65536 - COSINE[(angle * 1024 / frequency) as usize]) >> 1;
    ((a * (65536 - cosine)) >> 16) + ((b * cosine) >> 16)
}

fn interpolated_noise(x: i32, y: i32, frequency: i32) -> i32 {
    let cell_x = x / frequency;
    let fraction_x = x & (frequency - 1);
    let cell_y = y / frequency;
    let fraction_y = y & (frequency - 1);

    let south_west = smooth_noise(cell_x, cell_y);
    let south_east = smooth_noise(cell_x + 1, cell_y);
    let north_west = smooth_noise(cell_x, cell_y + 1);
    let north_east = smooth_noise(cell_x + 1, cell_y + 1);

    let south = interpolate(south_west, south_east, fraction_x, frequency);
    let north = interpolate(north_west, north_east, fraction_x, frequency);
    interpolate(south, north, fraction_y, frequency)
}

/// Tile height in height units (before the x8 scale) for world tile coordinates.
pub fn calculate_height(x: i32, y: i32) -> i32 {
    let mut height = interpolated_noise(x + 45365, y + 91923, 4) - 128
        + ((interpolated_noise(x + 10294, y + 37821, 2) - 128) >> 1)
        + ((interpolated_noise(x, y, 1) - 128) >> 2);
    height = (height as f64 * 0.3) as i32 + 35;
    height.clamp(10, 60)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_table_endpoints() {
        assert_eq!(COSINE[0], 65536);
        // a quarter turn
        assert!(COSINE[512].abs() < 16);
        // half a turn, just short of pi so the cast truncates to -65535
        assert!((-65536..=-65535).contains(&COSINE[1024]));
        assert!(COSINE[2047] > 65500);
    }

    #[test]
    fn noise_is_byte_sized() {
        for x in -20..20 {
            for y in -20..20 {
                assert!((0..256).contains(&noise(x, y)));
            }
        }
    }

    #[test]
    fn height_is_clamped_and_deterministic() {
        for x in 0..64 {
            for y in 0..64 {
                let h = calculate_height(3200 + x + 932731, 3200 + y + 556238);
                assert!((10..=60).contains(&h));
                assert_eq!(h, calculate_height(3200 + x + 932731, 3200 + y + 556238));
            }
        }
    }

    #[test]
    fn interpolation_endpoints() {
        assert_eq!(interpolate(100, 200, 0, 4), 100);
        // halfway is the mean
        assert!((interpolate(100, 200, 2, 4) - 150).abs() <= 1);
    }
}
