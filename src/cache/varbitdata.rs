use std::collections::HashMap;

use log::{info, trace, warn};

use crate::cache::error::{DecodeError, DecodeResult};
use crate::cache::reader::ByteCursor;
use crate::cache::store::{config, decode_archive, AssetStore};


/// A bit range inside a player variable.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Varbit {
    pub varp: u16,
    pub lsb: u8,
    pub msb: u8,
}

impl Varbit {
    pub fn decode(id: u32, data: &[u8]) -> DecodeResult<Self> {
        let mut varbit = Varbit::default();
        let mut cursor = ByteCursor::new(data);
        loop {
            match cursor.read_u8()? {
                0 => break,
                1 => {
                    varbit.varp = cursor.read_u16()?;
                    varbit.lsb = cursor.read_u8()?;
                    varbit.msb = cursor.read_u8()?;
                }
                opcode => {
                    warn!("varbit {id}: {}", DecodeError::UnknownOpcode { kind: "varbit", opcode });
                    break;
                }
            }
        }
        Ok(varbit)
    }

    /// the bits `lsb..=msb` of a varp value
    pub fn extract(&self, varp_value: i32) -> i32 {
        let width = self.msb.saturating_sub(self.lsb) as u32 + 1;
        let mask = if width >= 32 { -1 } else { (1i32 << width) - 1 };
        (varp_value >> self.lsb.min(31)) & mask
    }
}


/// Current values of player variables, used to pick object morphs.
#[derive(Debug, Clone, Default)]
pub struct VarpState {
    values: HashMap<u16, i32>,
    pub varbits: HashMap<u32, Varbit>,
}

impl VarpState {
    pub fn new(varbits: HashMap<u32, Varbit>) -> Self {
        Self { values: HashMap::new(), varbits }
    }

    pub fn load<S: AssetStore + ?Sized>(store: &S) -> Self {
        trace!("VarpState::load");
        let varbits = decode_archive(store, config::VARBIT, "varbit", Varbit::decode);
        info!("loaded {} varbits", varbits.len());
        Self::new(varbits)
    }

    pub fn set(&mut self, varp: u16, value: i32) {
        self.values.insert(varp, value);
    }

    pub fn varp(&self, varp: u16) -> i32 {
        self.values.get(&varp).copied().unwrap_or(0)
    }

    /// `None` when the varbit is not defined
    pub fn varbit(&self, id: u32) -> Option<i32> {
        self.varbits.get(&id).map(|vb| vb.extract(self.varp(vb.varp)))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::{index, MemoryStore};
    use proptest::prelude::*;

    #[test]
    fn decode_fields() {
        let varbit = Varbit::decode(0, &[1, 0x01, 0x2c, 4, 7, 0]).unwrap();
        assert_eq!(varbit, Varbit { varp: 300, lsb: 4, msb: 7 });
    }

    #[test]
    fn unknown_opcode_keeps_fields() {
        let varbit = Varbit::decode(0, &[1, 0, 9, 1, 2, 3, 0xff]).unwrap();
        assert_eq!(varbit, Varbit { varp: 9, lsb: 1, msb: 2 });
        assert!(Varbit::decode(0, &[1, 0]).is_err());
    }

    #[test]
    fn extract_bits() {
        let varbit = Varbit { varp: 0, lsb: 4, msb: 7 };
        assert_eq!(varbit.extract(0xabcd), 0xc);
        let full = Varbit { varp: 0, lsb: 0, msb: 31 };
        assert_eq!(full.extract(-2), -2);
    }

    #[test]
    fn state_reads_through_varbits() {
        let mut store = MemoryStore::new();
        store.insert_file(index::CONFIGS, config::VARBIT, 12, vec![1, 0, 3, 2, 3, 0]);
        let mut state = VarpState::load(&store);
        assert_eq!(state.varbit(12), Some(0));
        state.set(3, 0b1100);
        assert_eq!(state.varbit(12), Some(3));
        assert_eq!(state.varbit(13), None);
    }

    proptest! {
        #[test]
        fn extract_stays_in_range(value: i32, lsb in 0u8..31, width in 0u8..8) {
            let varbit = Varbit { varp: 0, lsb, msb: (lsb + width).min(31) };
            let bits = varbit.extract(value);
            prop_assert!(bits >= 0);
            prop_assert!(bits < 1 << (width + 1));
        }
    }
}
