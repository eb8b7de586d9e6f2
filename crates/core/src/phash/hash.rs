use std::f64::consts::PI;

use image::imageops::FilterType;
use image::DynamicImage;

use super::PhashError;

const SAMPLE_SIZE: usize = 32;
const BLOCK_SIZE: usize = 8;

/// Decode `bytes` and hash the image. `Ok(None)` for a zero-sized image.
pub fn compute_phash(bytes: &[u8]) -> Result<Option<u64>, PhashError> {
    let img = image::load_from_memory(bytes).map_err(|e| PhashError::Decode(e.to_string()))?;
    Ok(phash_image(&img))
}

/// 64-bit DCT perceptual hash.
///
/// Grayscale, 32x32 resample, 2-D DCT-II, keep the top-left 8x8 block and
/// set each bit where the coefficient exceeds the block median (DC term
/// excluded from the median). Bit 63 is coefficient (0,0), row-major after.
pub fn phash_image(img: &DynamicImage) -> Option<u64> {
    if img.width() == 0 || img.height() == 0 {
        return None;
    }
    let gray = img
        .grayscale()
        .resize_exact(SAMPLE_SIZE as u32, SAMPLE_SIZE as u32, FilterType::Triangle)
        .to_luma8();

    let mut pixels = [[0f64; SAMPLE_SIZE]; SAMPLE_SIZE];
    for (x, y, p) in gray.enumerate_pixels() {
        pixels[y as usize][x as usize] = p.0[0] as f64;
    }

    let mut cos = [[0f64; SAMPLE_SIZE]; BLOCK_SIZE];
    for (u, row) in cos.iter_mut().enumerate() {
        for (x, c) in row.iter_mut().enumerate() {
            *c = ((2 * x + 1) as f64 * u as f64 * PI / (2 * SAMPLE_SIZE) as f64).cos();
        }
    }

    let mut coeffs = [0f64; BLOCK_SIZE * BLOCK_SIZE];
    for u in 0..BLOCK_SIZE {
        for v in 0..BLOCK_SIZE {
            let mut sum = 0.0;
            for (y, row) in pixels.iter().enumerate() {
                for (x, p) in row.iter().enumerate() {
                    sum += p * cos[u][y] * cos[v][x];
                }
            }
            coeffs[u * BLOCK_SIZE + v] = sum;
        }
    }

    let mut ac: Vec<f64> = coeffs[1..].to_vec();
    ac.sort_by(|a, b| a.total_cmp(b));
    let median = ac[ac.len() / 2];

    let mut hash = 0u64;
    for (i, c) in coeffs.iter().enumerate() {
        if *c > median {
            hash |= 1 << (63 - i);
        }
    }
    Some(hash)
}

pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// 16-digit lowercase hex, the stored form.
pub fn hash_to_hex(hash: u64) -> String {
    format!("{:016x}", hash)
}

pub fn hash_from_hex(s: &str) -> Result<u64, PhashError> {
    let trimmed = s.trim();
    if trimmed.len() != 16 {
        return Err(PhashError::InvalidHash(s.to_string()));
    }
    u64::from_str_radix(trimmed, 16).map_err(|_| PhashError::InvalidHash(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use std::io::Cursor;

    fn texture(offset: u8) -> DynamicImage {
        let img = GrayImage::from_fn(32, 32, |x, y| {
            Luma([(((x * 7 + y * 13) ^ (x * y)) % 200) as u8 + offset])
        });
        DynamicImage::ImageLuma8(img)
    }

    fn checker() -> DynamicImage {
        let img = GrayImage::from_fn(32, 32, |x, y| {
            if (x / 16 + y / 16) % 2 == 0 {
                Luma([230])
            } else {
                Luma([20])
            }
        });
        DynamicImage::ImageLuma8(img)
    }

    fn png_bytes(img: &DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_identical_images_hash_equal() {
        let a = phash_image(&texture(0)).unwrap();
        let b = phash_image(&texture(0)).unwrap();
        assert_eq!(hamming_distance(a, b), 0);
    }

    #[test]
    fn test_dc_bit_is_set() {
        let hash = phash_image(&texture(10)).unwrap();
        assert_eq!(hash >> 63, 1);
    }

    #[test]
    fn test_brightness_shift_is_close() {
        let a = phash_image(&texture(0)).unwrap();
        let b = phash_image(&texture(30)).unwrap();
        assert!(hamming_distance(a, b) <= 4);
    }

    #[test]
    fn test_different_images_are_far() {
        let a = phash_image(&texture(0)).unwrap();
        let b = phash_image(&checker()).unwrap();
        assert!(hamming_distance(a, b) > 10);
    }

    #[test]
    fn test_empty_image_yields_none() {
        assert!(phash_image(&DynamicImage::new_luma8(0, 0)).is_none());
    }

    #[test]
    fn test_compute_from_png_bytes() {
        let img = texture(5);
        let from_bytes = compute_phash(&png_bytes(&img)).unwrap().unwrap();
        assert_eq!(from_bytes, phash_image(&img).unwrap());
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        assert!(matches!(
            compute_phash(b"not an image"),
            Err(PhashError::Decode(_))
        ));
    }

    #[test]
    fn test_hamming_is_symmetric() {
        let a = 0xdead_beef_0000_ffffu64;
        let b = 0x0000_beef_ffff_0000u64;
        assert_eq!(hamming_distance(a, b), hamming_distance(b, a));
        assert_eq!(hamming_distance(a, a), 0);
    }

    #[test]
    fn test_hex_round_trip_and_rejects_garbage() {
        let hash = 0x00ab_cdef_0123_4567u64;
        assert_eq!(hash_to_hex(hash), "00abcdef01234567");
        assert_eq!(hash_from_hex("00abcdef01234567").unwrap(), hash);
        assert!(hash_from_hex("xyz").is_err());
        assert!(hash_from_hex("zzzzzzzzzzzzzzzz").is_err());
    }
}
