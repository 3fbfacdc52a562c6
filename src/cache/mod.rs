pub mod error;
pub mod reader;
#[cfg(test)]
pub mod writer;
pub mod xtea;
pub mod store;

pub mod floordata;
pub mod modeldata;
pub mod spritedata;
pub mod texturedata;
pub mod objectdata;
pub mod areadata;
pub mod varbitdata;

pub use error::{DecodeError, DecodeResult};
pub use reader::ByteCursor;
pub use store::{AssetStore, DirectoryStore, MemoryStore};
