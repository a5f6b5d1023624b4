//! Word-level SPIR-V primitives: the five-word module header, an
//! instruction builder that assembles `(word_count<<16 | opcode,
//! operands...)` words, and a read-side `Instr`/`Operands` pair used by
//! `sbc-dis` to walk a module back out for debugging.
use std::convert::TryInto;
use std::ffi::CString;

use spirv::Op;

use crate::error::internal::{anyhow, Result};

/// The 5-word preamble every SPIR-V module begins with.
#[derive(Debug, Clone, Copy)]
pub struct SpirvHeader {
    pub magic: u32,
    pub version: u32,
    pub generator: u32,
    pub bound: u32,
    pub schema: u32,
}
impl Default for SpirvHeader {
    fn default() -> Self {
        SpirvHeader {
            magic: 0x0723_0203,
            version: 0x0001_0400, // SPIR-V 1.4
            generator: 0,
            bound: 0,
            schema: 0,
        }
    }
}
impl SpirvHeader {
    pub fn new(version: u32, generator: u32) -> Self {
        SpirvHeader {
            version,
            generator,
            ..Default::default()
        }
    }
    pub fn words(&self, bound: u32) -> [u32; 5] {
        [self.magic, self.version, self.generator, bound, self.schema]
    }
}

/// A single SPIR-V instruction under construction.
pub struct InstructionBuilder {
    inner: Vec<u32>,
}
impl InstructionBuilder {
    pub fn new(op: Op) -> Self {
        InstructionBuilder {
            inner: vec![(op as u32) & 0xFFFF],
        }
    }
    pub fn push(mut self, x: u32) -> Self {
        self.inner.push(x);
        self
    }
    pub fn push_list(mut self, x: &[u32]) -> Self {
        self.inner.extend_from_slice(x);
        self
    }
    pub fn push_str(mut self, x: &str) -> Self {
        let cstr = CString::new(x).unwrap_or_default();
        let bytes = cstr.as_bytes_with_nul();
        for chunk in bytes.chunks(4) {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            self.inner.push(u32::from_le_bytes(word));
        }
        self
    }
    pub fn build(mut self) -> Vec<u32> {
        self.inner[0] |= (self.inner.len() as u32) << 16;
        self.inner
    }
}

/// A decoded instruction borrowed from a module's word stream.
pub struct Instr<'a> {
    inner: &'a [u32],
}
impl<'a> Instr<'a> {
    pub fn new(x: &'a [u32]) -> Result<Self> {
        if x.is_empty() {
            return Err(anyhow!("instruction is too short"));
        }
        Ok(Instr { inner: x })
    }
    pub fn opcode(&self) -> u32 {
        self.inner[0] & 0xFFFF
    }
    pub fn word_count(&self) -> usize {
        self.inner.len()
    }
    pub fn operands(&self) -> Operands<'a> {
        Operands(&self.inner[1..])
    }
}

/// Sequentially walks an instruction's operand words.
pub struct Operands<'a>(&'a [u32]);
impl<'a> Operands<'a> {
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn read_u32(&mut self) -> Result<u32> {
        if let Some(x) = self.0.first() {
            self.0 = &self.0[1..];
            Ok(*x)
        } else {
            Err(anyhow!("operand is too short"))
        }
    }
    pub fn read_f32(&mut self) -> Result<f32> {
        self.read_u32().map(f32::from_bits)
    }
    pub fn read_str(&mut self) -> Result<String> {
        let bytes: Vec<u8> = self.0.iter().flat_map(|w| w.to_le_bytes()).collect();
        if let Some(nul) = bytes.iter().position(|b| *b == 0) {
            let nword = nul / 4 + 1;
            self.0 = &self.0[nword..];
            Ok(String::from_utf8_lossy(&bytes[..nul]).into_owned())
        } else {
            Err(anyhow!("string operand is not null-terminated"))
        }
    }
    pub fn read_list(&mut self) -> Result<&'a [u32]> {
        let rv = self.0;
        self.0 = &[];
        Ok(rv)
    }
}

/// An in-progress or finished SPIR-V module's raw word stream, with
/// little-endian byte (de)serialization.
#[derive(Debug, Default, Clone)]
pub struct SpirvBinary(Vec<u32>);
impl From<Vec<u32>> for SpirvBinary {
    fn from(x: Vec<u32>) -> Self {
        SpirvBinary(x)
    }
}
impl SpirvBinary {
    pub fn words(&self) -> &[u32] {
        &self.0
    }
    pub fn into_words(self) -> Vec<u32> {
        self.0
    }
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|w| w.to_le_bytes()).collect()
    }
    pub fn from_bytes(bytes: &[u8]) -> SpirvBinary {
        SpirvBinary(
            bytes
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
                .collect(),
        )
    }
    pub fn header(&self) -> Option<SpirvHeader> {
        if self.0.len() < 5 {
            return None;
        }
        Some(SpirvHeader {
            magic: self.0[0],
            version: self.0[1],
            generator: self.0[2],
            bound: self.0[3],
            schema: self.0[4],
        })
    }
}
