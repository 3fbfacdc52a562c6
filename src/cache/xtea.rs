use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::{info, trace};
use serde::{Deserialize, Serialize};

use crate::cache::error::{DecodeError, DecodeResult};

const GOLDEN_RATIO: u32 = 0x9E37_79B9;
const ROUNDS: u32 = 32;
const BLOCK: usize = 8;


/// Four word XTEA key. An all zero key marks an unencrypted payload.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct XteaKey(pub [i32; 4]);

impl XteaKey {
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&k| k == 0)
    }

    #[inline]
    fn word(&self, sum: u32) -> u32 {
        self.0[(sum & 3) as usize] as u32
    }
}


fn check_region(data: &[u8], start: usize, end: usize) -> DecodeResult<()> {
    if start > end || end > data.len() {
        return Err(DecodeError::OutOfBounds { offset: start, wanted: end.saturating_sub(start), len: data.len() });
    }
    if (end - start) % BLOCK != 0 {
        return Err(DecodeError::UnalignedBlock { len: end - start });
    }
    Ok(())
}

#[inline]
fn read_block(block: &[u8]) -> (u32, u32) {
    (
        u32::from_be_bytes([block[0], block[1], block[2], block[3]]),
        u32::from_be_bytes([block[4], block[5], block[6], block[7]]),
    )
}

#[inline]
fn write_block(block: &mut [u8], v0: u32, v1: u32) {
    block[..4].copy_from_slice(&v0.to_be_bytes());
    block[4..].copy_from_slice(&v1.to_be_bytes());
}

#[inline]
fn mix(v: u32) -> u32 {
    ((v << 4) ^ (v >> 5)).wrapping_add(v)
}


/// Decrypts the blocks of `data[start..end]` in place.
pub fn decrypt_region(data: &mut [u8], key: &XteaKey, start: usize, end: usize) -> DecodeResult<()> {
    check_region(data, start, end)?;

    for block in data[start..end].chunks_exact_mut(BLOCK) {
        let (mut v0, mut v1) = read_block(block);
        let mut sum = GOLDEN_RATIO.wrapping_mul(ROUNDS);
        for _ in 0..ROUNDS {
            v1 = v1.wrapping_sub(mix(v0) ^ sum.wrapping_add(key.word(sum >> 11)));
            sum = sum.wrapping_sub(GOLDEN_RATIO);
            v0 = v0.wrapping_sub(mix(v1) ^ sum.wrapping_add(key.word(sum)));
        }
        write_block(block, v0, v1);
    }

    Ok(())
}

/// Encrypts the blocks of `data[start..end]` in place, inverse of [`decrypt_region`].
pub fn encrypt_region(data: &mut [u8], key: &XteaKey, start: usize, end: usize) -> DecodeResult<()> {
    check_region(data, start, end)?;

    for block in data[start..end].chunks_exact_mut(BLOCK) {
        let (mut v0, mut v1) = read_block(block);
        let mut sum = 0u32;
        for _ in 0..ROUNDS {
            v0 = v0.wrapping_add(mix(v1) ^ sum.wrapping_add(key.word(sum)));
            sum = sum.wrapping_add(GOLDEN_RATIO);
            v1 = v1.wrapping_add(mix(v0) ^ sum.wrapping_add(key.word(sum >> 11)));
        }
        write_block(block, v0, v1);
    }

    Ok(())
}

/// Decrypted copy of a whole payload.
pub fn decrypt(data: &[u8], key: &XteaKey) -> DecodeResult<Vec<u8>> {
    let mut result = data.to_vec();
    let len = result.len();
    decrypt_region(&mut result, key, 0, len)?;
    Ok(result)
}


#[derive(Debug, Deserialize)]
struct KeyRecord {
    mapsquare: u16,
    key: [i32; 4],
}


/// Region keys, looked up by region id `(x << 8) | y`.
#[derive(Debug, Default)]
pub struct KeyTable {
    keys: HashMap<u16, XteaKey>,
}

impl KeyTable {
    pub fn from_json(json: &str) -> DecodeResult<Self> {
        let records: Vec<KeyRecord> = serde_json::from_str(json)?;
        Ok(Self::from_records(records))
    }

    /// Tries to read the key file
    pub fn read(path: &Path) -> DecodeResult<Self> {
        trace!("KeyTable::read");
        let records: Vec<KeyRecord> = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        let table = Self::from_records(records);
        info!("loaded {} region keys from {}", table.len(), path.display());
        Ok(table)
    }

    fn from_records(records: Vec<KeyRecord>) -> Self {
        Self {
            keys: records.into_iter().map(|r| (r.mapsquare, XteaKey(r.key))).collect(),
        }
    }

    pub fn insert(&mut self, region_id: u16, key: XteaKey) {
        self.keys.insert(region_id, key);
    }

    pub fn get(&self, region_id: u16) -> Option<&XteaKey> {
        self.keys.get(&region_id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn unaligned_region_fails() {
        let mut data = vec![0u8; 12];
        let key = XteaKey([1, 2, 3, 4]);
        assert!(matches!(decrypt_region(&mut data, &key, 0, 12), Err(DecodeError::UnalignedBlock { len: 12 })));
        assert!(matches!(decrypt(&[0u8; 7], &key), Err(DecodeError::UnalignedBlock { len: 7 })));
        assert!(decrypt_region(&mut data, &key, 4, 12).is_ok());
        assert!(decrypt_region(&mut data, &key, 8, 24).is_err());
    }

    #[test]
    fn encryption_changes_bytes() {
        let mut data: Vec<u8> = (0..16).collect();
        encrypt_region(&mut data, &XteaKey([7, -1, 99, 12345]), 0, 16).unwrap();
        assert_ne!(data, (0..16).collect::<Vec<u8>>());
    }

    #[test]
    fn key_table_from_json() {
        let table = KeyTable::from_json(r#"[{"mapsquare": 12850, "key": [1, -2, 3, 4]}, {"mapsquare": 1, "key": [0, 0, 0, 0]}]"#).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(12850), Some(&XteaKey([1, -2, 3, 4])));
        assert!(table.get(1).unwrap().is_zero());
        assert!(table.get(2).is_none());
        assert!(KeyTable::from_json("{").is_err());
    }

    proptest! {
        #[test]
        fn decrypt_inverts_encrypt(blocks in (0usize..8).prop_flat_map(|n| proptest::collection::vec(any::<u8>(), n * 8)),
                                   key in any::<[i32; 4]>()) {
            let key = XteaKey(key);
            let mut data = blocks.clone();
            let len = data.len();
            encrypt_region(&mut data, &key, 0, len).unwrap();
            decrypt_region(&mut data, &key, 0, len).unwrap();
            prop_assert_eq!(data, blocks);
        }
    }
}
