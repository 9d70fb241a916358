//! Register and EEPROM maps of the MLX90640.
//!
//! Every named field lives in exactly one 16-bit register word. The RAM block
//! starting at [`PIX_DATA_ADDRESS`] holds one signed word per pixel and is
//! addressed directly by pixel index rather than through named fields.

use crate::bitfield::{FieldDescriptor, RegisterError};
use crate::enum_with_unknown;

/// Size in bytes of one register
pub const REG_SIZE: usize = 2;

/// Status register: last measured subpage and new-data flag
pub const STATUS_REGISTER: u16 = 0x8000;

/// Control register 1: subpage mode, refresh rate, ADC resolution, read pattern
pub const CONTROL_REGISTER_1: u16 = 0x800D;

/// I2C configuration register
pub const I2C_CONFIG_REGISTER: u16 = 0x800F;

/// First word of the pixel RAM; pixel `i` lives at `PIX_DATA_ADDRESS + i`
pub const PIX_DATA_ADDRESS: u16 = 0x0400;

/// First word of the calibration EEPROM
pub const EEPROM_ADDRESS: u16 = 0x2400;

/// Number of 16-bit words in the EEPROM
pub const EEPROM_SIZE: usize = 832;

/// A named field together with the address of the register word holding it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisterDef {
    pub address: u16,
    pub field: FieldDescriptor,
}

impl RegisterDef {
    pub const fn new(address: u16, field: FieldDescriptor) -> Self {
        Self { address, field }
    }

    pub fn name(&self) -> &'static str {
        self.field.name
    }
}

/// Read/write control and status fields
pub const REGISTER_MAP: &[RegisterDef] = &[
    // Status register
    RegisterDef::new(STATUS_REGISTER, FieldDescriptor::unsigned("last_subpage", 3, 0)),
    RegisterDef::new(STATUS_REGISTER, FieldDescriptor::unsigned("data_available", 1, 3)),
    RegisterDef::new(STATUS_REGISTER, FieldDescriptor::unsigned("overwrite_enable", 1, 4)),
    // Control register 1
    RegisterDef::new(CONTROL_REGISTER_1, FieldDescriptor::unsigned("subpage_mode", 1, 0)),
    RegisterDef::new(CONTROL_REGISTER_1, FieldDescriptor::unsigned("data_hold", 1, 2)),
    RegisterDef::new(CONTROL_REGISTER_1, FieldDescriptor::unsigned("subpage_repeat", 1, 3)),
    RegisterDef::new(CONTROL_REGISTER_1, FieldDescriptor::unsigned("subpage_select", 3, 4)),
    RegisterDef::new(CONTROL_REGISTER_1, FieldDescriptor::unsigned("refresh_rate", 3, 7)),
    RegisterDef::new(CONTROL_REGISTER_1, FieldDescriptor::unsigned("adc_resolution", 2, 10)),
    RegisterDef::new(CONTROL_REGISTER_1, FieldDescriptor::unsigned("read_pattern", 1, 12)),
    // I2C configuration
    RegisterDef::new(I2C_CONFIG_REGISTER, FieldDescriptor::unsigned("fm_plus_disable", 1, 0)),
    RegisterDef::new(I2C_CONFIG_REGISTER, FieldDescriptor::unsigned("i2c_threshold", 1, 1)),
    RegisterDef::new(I2C_CONFIG_REGISTER, FieldDescriptor::unsigned("sda_current_limit", 1, 2)),
    // Auxiliary RAM words
    RegisterDef::new(0x0700, FieldDescriptor::word("ta_vbe", true)),
    RegisterDef::new(0x0708, FieldDescriptor::word("cp_sp_0", true)),
    RegisterDef::new(0x070A, FieldDescriptor::word("gain", true)),
    RegisterDef::new(0x0720, FieldDescriptor::word("ta_ptat", true)),
    RegisterDef::new(0x0728, FieldDescriptor::word("cp_sp_1", true)),
    RegisterDef::new(0x072A, FieldDescriptor::word("vdd_pix", true)),
];

/// Read-only calibration fields. Opaque to the raw-data pipeline.
pub const EEPROM_MAP: &[RegisterDef] = &[
    RegisterDef::new(0x2400, FieldDescriptor::word("osc_trim", false)),
    RegisterDef::new(0x2401, FieldDescriptor::word("ana_trim", false)),
    RegisterDef::new(0x2403, FieldDescriptor::word("config", false)),
    RegisterDef::new(0x2407, FieldDescriptor::word("device_id_1", false)),
    RegisterDef::new(0x2408, FieldDescriptor::word("device_id_2", false)),
    RegisterDef::new(0x2409, FieldDescriptor::word("device_id_3", false)),
    RegisterDef::new(0x240A, FieldDescriptor::unsigned("ee_version", 8, 0)),
    RegisterDef::new(0x2430, FieldDescriptor::word("ee_gain", true)),
];

enum_with_unknown! {
    /// Raw value of the `adc_resolution` field
    pub enum AdcResolution(u16) {
        Bits16 = 0,
        Bits17 = 1,
        Bits18 = 2,
        Bits19 = 3,
    }
}

/// Find a register definition by field name
pub fn lookup<'a>(map: &'a [RegisterDef], name: &str) -> Result<&'a RegisterDef, RegisterError> {
    map.iter()
        .find(|r| r.field.name == name)
        .ok_or_else(|| RegisterError::Configuration(name.to_owned()))
}

/// Address of the pixel RAM word for a flat pixel index
pub fn pixel_address(idx: usize) -> u16 {
    PIX_DATA_ADDRESS + idx as u16
}
