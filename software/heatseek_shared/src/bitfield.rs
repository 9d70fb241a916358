//! Named bit fields packed into big-endian 16-bit words.
//!
//! A layout is a static, ordered list of [`FieldDescriptor`]s. A [`BitfieldRegister`]
//! pairs a layout with a raw byte buffer and reads or writes fields by name,
//! applying two's-complement conversion to signed fields.
//!
//! Overlapping fields are not rejected; the layout author is responsible
//! for describing the device faithfully.

use byte_struct::ByteStructUnspecifiedByteOrder;
use thiserror::Error;

/// Size in bytes of one register word
pub const WORD_SIZE: usize = 2;

/// Failures while resolving or accessing a register field
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegisterError {
    /// The field name is not part of the layout
    #[error("unknown register field `{0}`")]
    Configuration(String),

    /// Attempted to write through a read-only map
    #[error("register field `{0}` is read-only")]
    ReadOnly(String),

    /// The backing buffer does not contain the word a field lives in
    #[error("buffer of {len} bytes is too short, {needed} bytes needed")]
    BufferTooShort { needed: usize, len: usize },

    /// The read pattern register holds a value with no known pattern
    #[error("unknown read pattern id {0}")]
    UnknownPattern(u16),
}

/// Whether a register map may be written
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    #[default]
    ReadWrite,
}

/// Placement of a named field inside a buffer of 16-bit words
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Name used to look up the field
    pub name: &'static str,

    /// Number of bits, 1 to 16
    pub width: u8,

    /// Bit position of the least significant bit within the word
    pub offset: u8,

    /// Index of the 16-bit word within the buffer
    pub word: usize,

    /// Whether the raw bits hold a two's-complement value
    pub signed: bool,
}

impl FieldDescriptor {
    /// An unsigned field of `width` bits starting at bit `offset` of the first word
    pub const fn unsigned(name: &'static str, width: u8, offset: u8) -> Self {
        assert!(width >= 1 && width <= 16, "field width must be 1..=16 bits");
        assert!(width + offset <= 16, "field must fit in a 16-bit word");
        Self {
            name,
            width,
            offset,
            word: 0,
            signed: false,
        }
    }

    /// A signed field of `width` bits starting at bit `offset` of the first word
    pub const fn signed(name: &'static str, width: u8, offset: u8) -> Self {
        let mut field = Self::unsigned(name, width, offset);
        field.signed = true;
        field
    }

    /// A field spanning a whole word
    pub const fn word(name: &'static str, signed: bool) -> Self {
        let mut field = Self::unsigned(name, 16, 0);
        field.signed = signed;
        field
    }

    /// Move the field to another word of the buffer
    pub const fn at_word(mut self, word: usize) -> Self {
        self.word = word;
        self
    }

    /// Bit mask of the field, not yet shifted into position
    pub const fn mask(&self) -> u16 {
        if self.width >= 16 {
            u16::MAX
        } else {
            (1_u16 << self.width) - 1
        }
    }

    /// Extract the field from a register word
    pub fn decode(&self, raw_word: u16) -> i32 {
        let raw = ((raw_word >> self.offset) & self.mask()) as i32;
        if self.signed {
            let modulus = 1_i32 << self.width;
            if raw >= modulus / 2 {
                return raw - modulus;
            }
        }
        raw
    }

    /// Replace the field's bits in a register word, leaving the other bits intact
    pub fn encode(&self, raw_word: u16, value: i32) -> u16 {
        let modulus = 1_i64 << self.width;
        let stored = if self.signed && value < 0 {
            value as i64 + modulus
        } else {
            value as i64
        };
        let bits = (stored.rem_euclid(modulus) as u16) & self.mask();
        let shifted_mask = self.mask() << self.offset;
        (raw_word & !shifted_mask) | (bits << self.offset)
    }

    /// Byte range of the word holding this field
    fn byte_range(&self) -> core::ops::Range<usize> {
        let start = self.word * WORD_SIZE;
        start..start + WORD_SIZE
    }
}

/// Convert between raw bits and a signed value of a given bit size.
///
/// Negative inputs are mapped to their unsigned encoding and unsigned inputs at or
/// above the sign bit are mapped to their negative value; anything else passes through.
pub fn twos_complement(bits: u8, value: i32) -> i32 {
    let modulus = 1_i64 << bits;
    let value = value as i64;
    if value < 0 {
        return (value + modulus) as i32;
    }
    if value >= modulus / 2 {
        return (value - modulus) as i32;
    }
    value as i32
}

/// Find a field by name. The first declaration wins if a name is repeated.
pub fn find_field<'a>(
    layout: &'a [FieldDescriptor],
    name: &str,
) -> Result<&'a FieldDescriptor, RegisterError> {
    layout
        .iter()
        .find(|f| f.name == name)
        .ok_or_else(|| RegisterError::Configuration(name.to_owned()))
}

/// Named view of a raw big-endian buffer
#[derive(Debug)]
pub struct BitfieldRegister<'a, B> {
    buf: B,
    layout: &'a [FieldDescriptor],
    access: Access,
}

impl<'a, B: AsRef<[u8]>> BitfieldRegister<'a, B> {
    pub fn new(buf: B, layout: &'a [FieldDescriptor], access: Access) -> Self {
        Self {
            buf,
            layout,
            access,
        }
    }

    /// Layout describing this register
    pub fn layout(&self) -> &'a [FieldDescriptor] {
        self.layout
    }

    pub fn access(&self) -> Access {
        self.access
    }

    /// Read a field by name
    pub fn read(&self, name: &str) -> Result<i32, RegisterError> {
        let field = find_field(self.layout, name)?;
        let word = self.word(field)?;
        Ok(field.decode(word))
    }

    /// Raw 16-bit word holding a field
    fn word(&self, field: &FieldDescriptor) -> Result<u16, RegisterError> {
        let bytes = self.buf.as_ref();
        let range = field.byte_range();
        if bytes.len() < range.end {
            return Err(RegisterError::BufferTooShort {
                needed: range.end,
                len: bytes.len(),
            });
        }
        Ok(u16::read_bytes_default_be(&bytes[range]))
    }

    /// Release the backing buffer
    pub fn into_inner(self) -> B {
        self.buf
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> BitfieldRegister<'_, B> {
    /// Write a field by name, leaving the neighbouring bits untouched
    pub fn write(&mut self, name: &str, value: i32) -> Result<(), RegisterError> {
        let field = *find_field(self.layout, name)?;
        if self.access == Access::ReadOnly {
            return Err(RegisterError::ReadOnly(name.to_owned()));
        }
        let word = self.word(&field)?;
        let updated = field.encode(word, value);
        updated.write_bytes_default_be(&mut self.buf.as_mut()[field.byte_range()]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &[FieldDescriptor] = &[
        FieldDescriptor::unsigned("last_subpage", 3, 0),
        FieldDescriptor::unsigned("data_available", 1, 3),
        FieldDescriptor::unsigned("overwrite_enable", 1, 4),
        FieldDescriptor::signed("offset", 6, 10),
        FieldDescriptor::word("second", true).at_word(1),
    ];

    #[test]
    fn reads_fields_at_exact_bit_positions() {
        // 0b0000_0000_0000_1001: subpage 1, data available
        let reg = BitfieldRegister::new([0x00_u8, 0x09, 0x00, 0x00], STATUS, Access::ReadOnly);
        assert_eq!(reg.read("last_subpage").unwrap(), 1);
        assert_eq!(reg.read("data_available").unwrap(), 1);
        assert_eq!(reg.read("overwrite_enable").unwrap(), 0);
    }

    #[test]
    fn signed_fields_apply_twos_complement() {
        // Top 6 bits all set => -1
        let mut reg = BitfieldRegister::new([0xFC_u8, 0x00, 0xFF, 0xFE], STATUS, Access::ReadWrite);
        assert_eq!(reg.read("offset").unwrap(), -1);
        assert_eq!(reg.read("second").unwrap(), -2);

        reg.write("offset", -32).unwrap();
        assert_eq!(reg.read("offset").unwrap(), -32);
        reg.write("offset", 31).unwrap();
        assert_eq!(reg.read("offset").unwrap(), 31);
    }

    #[test]
    fn write_leaves_neighbouring_bits_intact() {
        let mut reg = BitfieldRegister::new([0xFF_u8, 0xFF, 0, 0], STATUS, Access::ReadWrite);
        reg.write("data_available", 0).unwrap();
        assert_eq!(reg.into_inner(), [0xFF, 0xF7, 0, 0]);
    }

    #[test]
    fn signed_roundtrip_for_every_width() {
        for width in 1..=16_u8 {
            let field = FieldDescriptor::signed("f", width, 16 - width);
            let lo = -(1_i32 << (width - 1));
            let hi = (1_i32 << (width - 1)) - 1;
            for v in lo..=hi {
                let word = field.encode(0, v);
                assert_eq!(field.decode(word), v, "width {width} value {v}");
            }
        }
    }

    #[test]
    fn unsigned_fields_return_raw_bits() {
        let field = FieldDescriptor::unsigned("f", 4, 4);
        assert_eq!(field.decode(0x00F0), 15);
        // Out-of-range writes wrap modulo 2^width
        assert_eq!(field.decode(field.encode(0, 17)), 1);
    }

    #[test]
    fn unknown_field_is_a_configuration_error() {
        let reg = BitfieldRegister::new([0_u8; 4], STATUS, Access::ReadWrite);
        assert_eq!(
            reg.read("nope"),
            Err(RegisterError::Configuration("nope".to_owned()))
        );
    }

    #[test]
    fn read_only_rejects_writes() {
        let mut reg = BitfieldRegister::new([0_u8; 4], STATUS, Access::ReadOnly);
        assert_eq!(
            reg.write("data_available", 1),
            Err(RegisterError::ReadOnly("data_available".to_owned()))
        );
    }

    #[test]
    fn short_buffer_is_reported() {
        let reg = BitfieldRegister::new([0_u8; 2], STATUS, Access::ReadOnly);
        assert_eq!(
            reg.read("second"),
            Err(RegisterError::BufferTooShort { needed: 4, len: 2 })
        );
    }

    #[test]
    fn twos_complement_matches_both_directions() {
        assert_eq!(twos_complement(16, 0xFFFF), -1);
        assert_eq!(twos_complement(16, -1), 0xFFFF);
        assert_eq!(twos_complement(6, 31), 31);
        assert_eq!(twos_complement(6, 32), -32);
    }
}
