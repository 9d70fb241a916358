//! Named access to the camera's register words over a [`CameraInterface`].

use core::slice;

use heatseek_shared::regmap::{EEPROM_MAP, REG_SIZE, REGISTER_MAP, RegisterDef, lookup};
use heatseek_shared::{Access, BitfieldRegister, RegisterError};

use super::CameraError;
use crate::peripheral::CameraInterface;

/// A register map bound to the device's address space.
///
/// Every access moves exactly one 16-bit word: reads fetch the word holding the
/// field, writes fetch it, replace the field's bits and store it back.
#[derive(Clone, Copy, Debug)]
pub struct SensorRegisterMap {
    map: &'static [RegisterDef],
    access: Access,
}

impl SensorRegisterMap {
    /// Status, control and auxiliary RAM fields
    pub const fn device() -> Self {
        Self {
            map: REGISTER_MAP,
            access: Access::ReadWrite,
        }
    }

    /// Calibration fields in EEPROM; writes are rejected
    pub const fn eeprom() -> Self {
        Self {
            map: EEPROM_MAP,
            access: Access::ReadOnly,
        }
    }

    pub fn access(&self) -> Access {
        self.access
    }

    /// Names of every field in declaration order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.map.iter().map(RegisterDef::name)
    }

    /// Resolve a field name to its definition
    pub fn lookup(&self, name: &str) -> Result<&'static RegisterDef, RegisterError> {
        lookup(self.map, name)
    }

    /// Read one field from the device
    pub fn read<I: CameraInterface>(&self, bus: &mut I, name: &str) -> Result<i32, CameraError> {
        let def = self.lookup(name)?;
        let reg = self.fetch(bus, def)?;
        Ok(reg.read(name)?)
    }

    /// Read-modify-write one field on the device
    pub fn write<I: CameraInterface>(
        &self,
        bus: &mut I,
        name: &str,
        value: i32,
    ) -> Result<(), CameraError> {
        let def = self.lookup(name)?;
        if self.access == Access::ReadOnly {
            return Err(RegisterError::ReadOnly(name.to_owned()).into());
        }
        let mut reg = self.fetch(bus, def)?;
        reg.write(name, value)?;
        bus.write_from(def.address, &reg.into_inner())?;
        Ok(())
    }

    fn fetch<I: CameraInterface>(
        &self,
        bus: &mut I,
        def: &'static RegisterDef,
    ) -> Result<BitfieldRegister<'static, [u8; REG_SIZE]>, CameraError> {
        let mut word = [0_u8; REG_SIZE];
        bus.read_into(def.address, &mut word)?;
        Ok(BitfieldRegister::new(
            word,
            slice::from_ref(&def.field),
            self.access,
        ))
    }
}
