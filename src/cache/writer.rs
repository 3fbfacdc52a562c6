//! Byte builder used by tests to assemble cache payloads.

#[derive(Debug, Default)]
pub struct ByteWriter {
    data: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    pub fn put_u8(&mut self, v: u8) -> &mut Self {
        self.data.push(v);
        self
    }

    pub fn put_bytes(&mut self, v: &[u8]) -> &mut Self {
        self.data.extend_from_slice(v);
        self
    }

    pub fn put_u16(&mut self, v: u16) -> &mut Self {
        self.data.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn put_i16(&mut self, v: i16) -> &mut Self {
        self.data.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn put_u24(&mut self, v: u32) -> &mut Self {
        self.data.extend_from_slice(&v.to_be_bytes()[1..]);
        self
    }

    pub fn put_u32(&mut self, v: u32) -> &mut Self {
        self.data.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn put_i32(&mut self, v: i32) -> &mut Self {
        self.data.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn put_smart(&mut self, v: i32) -> &mut Self {
        if (-64..64).contains(&v) {
            self.put_u8((v + 64) as u8)
        } else {
            self.put_u16((v + 49152) as u16)
        }
    }

    pub fn put_usmart(&mut self, v: u32) -> &mut Self {
        if v < 128 {
            self.put_u8(v as u8)
        } else {
            self.put_u16((v + 32768) as u16)
        }
    }

    pub fn put_string(&mut self, v: &str) -> &mut Self {
        self.data.extend(v.chars().map(|c| c as u8));
        self.put_u8(0)
    }
}
