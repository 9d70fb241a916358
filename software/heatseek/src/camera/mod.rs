//! MLX90640 driver: register access, subpage reads and frame acquisition.
//!
//! The driver only deals in raw pixel words. Temperature calibration from the
//! EEPROM parameters is out of scope; the EEPROM block is exposed as opaque
//! words for diagnostics.

use thiserror::Error;
use tracing::{debug, info};

use heatseek_shared::image::{decode_pixel, decode_word};
use heatseek_shared::regmap::{AdcResolution, EEPROM_ADDRESS, EEPROM_SIZE, REG_SIZE, pixel_address};
use heatseek_shared::{Pattern, RefreshRate, RegisterError, Subpage};

use crate::config::CameraCfg;
use crate::peripheral::{CameraInterface, I2cBus, TransportError};

pub mod acquire;
pub mod frame;
pub mod registers;

pub use acquire::{AcquireStatus, FrameAcquirer};
pub use frame::RawFrame;
pub use registers::SensorRegisterMap;

/// Camera faults
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    /// Discovery did not find exactly one device
    #[error("expected exactly one camera on the bus, found {0:?}")]
    DeviceDetect(Vec<u8>),

    /// The only device on the bus is not where the configuration expects it
    #[error("camera found at {found:#04x}, expected {expected:#04x}")]
    UnexpectedAddress { expected: u8, found: u8 },

    /// A frame read was attempted before the data-available flag was set
    #[error("no new subpage is available")]
    DataNotAvailable,

    /// The status register reported a subpage id other than 0 or 1
    #[error("invalid subpage id {0}")]
    InvalidSubpage(u8),

    #[error(transparent)]
    Register(#[from] RegisterError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Find the single device on the bus and open it as a camera.
/// The device must answer at `expected`.
pub fn detect_camera<B: I2cBus>(
    mut bus: B,
    expected: u8,
) -> Result<Mlx90640<B::Device>, CameraError> {
    let found = bus.scan()?;
    match found.as_slice() {
        [address] if *address == expected => {
            info!("Found camera at I2C address {address:#04x}");
            Ok(Mlx90640::new(bus.into_device(*address)))
        }
        [address] => Err(CameraError::UnexpectedAddress {
            expected,
            found: *address,
        }),
        _ => Err(CameraError::DeviceDetect(found)),
    }
}

/// MLX90640 thermal array behind a register transport
#[derive(Debug)]
pub struct Mlx90640<I> {
    bus: I,
    regs: SensorRegisterMap,
    eeprom: SensorRegisterMap,
}

impl<I: CameraInterface> Mlx90640<I> {
    pub fn new(bus: I) -> Self {
        Self {
            bus,
            regs: SensorRegisterMap::device(),
            eeprom: SensorRegisterMap::eeprom(),
        }
    }

    /// Select the readout pattern before the first acquisition
    pub fn setup(&mut self, pattern: Pattern) -> Result<(), CameraError> {
        self.set_pattern(pattern)?;
        info!("Camera configured for {pattern:?} readout");
        Ok(())
    }

    /// Apply the readout pattern and, if set, the refresh rate from `cfg`
    pub fn configure(&mut self, cfg: &CameraCfg) -> Result<(), CameraError> {
        self.setup(cfg.pattern)?;
        if let Some(freq) = cfg.refresh_hz {
            let rate = self.set_refresh_rate(freq)?;
            info!("Camera refresh rate {} Hz (requested {freq} Hz)", rate.freq());
        }
        Ok(())
    }

    /// Readout pattern currently selected on the device
    pub fn pattern(&mut self) -> Result<Pattern, CameraError> {
        let id = self.register("read_pattern")?;
        Ok(Pattern::from_id(id as u16)?)
    }

    pub fn set_pattern(&mut self, pattern: Pattern) -> Result<(), CameraError> {
        let id: u16 = pattern.pattern_id().into();
        self.set_register("read_pattern", id as i32)
    }

    pub fn refresh_rate(&mut self) -> Result<RefreshRate, CameraError> {
        let v = self.register("refresh_rate")?;
        Ok(RefreshRate::from_register(v as u8))
    }

    /// Set the subpage rate closest to `freq` Hz and return what was selected
    pub fn set_refresh_rate(&mut self, freq: f64) -> Result<RefreshRate, CameraError> {
        let rate = RefreshRate::from_freq(freq);
        self.set_register("refresh_rate", rate.register_value() as i32)?;
        debug!("Refresh rate set to {} Hz", rate.freq());
        Ok(rate)
    }

    pub fn adc_resolution(&mut self) -> Result<AdcResolution, CameraError> {
        Ok(AdcResolution::from(self.register("adc_resolution")? as u16))
    }

    pub fn set_adc_resolution(&mut self, resolution: AdcResolution) -> Result<(), CameraError> {
        let value: u16 = resolution.into();
        self.set_register("adc_resolution", value as i32)
    }

    /// Raw gain word from RAM
    pub fn read_gain(&mut self) -> Result<i16, CameraError> {
        Ok(self.register("gain")? as i16)
    }

    /// Raw supply voltage word from RAM
    pub fn read_vdd(&mut self) -> Result<i16, CameraError> {
        Ok(self.register("vdd_pix")? as i16)
    }

    /// Whether a new subpage is waiting to be read
    pub fn has_data(&mut self) -> Result<bool, CameraError> {
        Ok(self.register("data_available")? != 0)
    }

    /// Id of the most recently completed subpage
    pub fn last_subpage(&mut self) -> Result<u8, CameraError> {
        Ok(self.register("last_subpage")? as u8)
    }

    /// Read the completed subpage into `frame` and acknowledge it.
    ///
    /// Only the pixels belonging to that subpage under the current readout
    /// pattern are written. Returns the subpage id.
    pub fn read_image(&mut self, frame: &mut RawFrame) -> Result<u8, CameraError> {
        self.read_subpage(frame, None)
    }

    /// Like [`Mlx90640::read_image`], but `subpage` overrides the id reported
    /// by the status register when given.
    pub fn read_subpage(
        &mut self,
        frame: &mut RawFrame,
        subpage: Option<u8>,
    ) -> Result<u8, CameraError> {
        if !self.has_data()? {
            return Err(CameraError::DataNotAvailable);
        }

        let id = match subpage {
            Some(id) => id,
            None => self.last_subpage()?,
        };
        if id > 1 {
            return Err(CameraError::InvalidSubpage(id));
        }
        let pattern = self.pattern()?;

        let pixels = frame.pixels_mut();
        let mut word = [0_u8; REG_SIZE];
        for idx in Subpage::new(pattern, id).indices() {
            self.bus.read_into(pixel_address(idx), &mut word)?;
            pixels[idx] = decode_pixel(&word);
        }

        self.set_register("data_available", 0)?;
        Ok(id)
    }

    /// Dump the whole EEPROM as raw words
    pub fn read_eeprom_block(&mut self) -> Result<Vec<u16>, CameraError> {
        let mut bytes = vec![0_u8; EEPROM_SIZE * REG_SIZE];
        self.bus.read_into(EEPROM_ADDRESS, &mut bytes)?;
        Ok(bytes.chunks_exact(REG_SIZE).map(decode_word).collect())
    }

    /// Read a named EEPROM field
    pub fn eeprom_field(&mut self, name: &str) -> Result<i32, CameraError> {
        self.eeprom.read(&mut self.bus, name)
    }

    /// Read a named device register field
    pub fn register(&mut self, name: &str) -> Result<i32, CameraError> {
        self.regs.read(&mut self.bus, name)
    }

    /// Write a named device register field, keeping the rest of its word
    pub fn set_register(&mut self, name: &str, value: i32) -> Result<(), CameraError> {
        self.regs.write(&mut self.bus, name, value)
    }

    /// Release the transport
    pub fn into_inner(self) -> I {
        self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripheral::hootl::{SimBus, SimCamera};
    use heatseek_shared::IMAGE_SIZE;
    use heatseek_shared::regmap::STATUS_REGISTER;

    fn warm_scene() -> Vec<i16> {
        (0..IMAGE_SIZE).map(|i| (i % 97) as i16 * 3 - 100).collect()
    }

    #[test]
    fn read_without_data_fails() {
        let mut cam = Mlx90640::new(SimCamera::new(warm_scene()));
        let mut frame = RawFrame::default();
        assert_eq!(
            cam.read_image(&mut frame),
            Err(CameraError::DataNotAvailable)
        );
    }

    #[test]
    fn reads_only_the_completed_subpage() {
        let scene = warm_scene();
        let sim = SimCamera::new(scene.clone());
        let mut cam = Mlx90640::new(sim.clone());
        for pattern in [Pattern::Chess, Pattern::Interleaved] {
            cam.setup(pattern).unwrap();
            assert_eq!(cam.pattern().unwrap(), pattern);

            let mut frame = RawFrame::default();
            sim.publish_subpage_id(1);
            assert_eq!(cam.read_image(&mut frame).unwrap(), 1);
            for (idx, &p) in frame.pixels().iter().enumerate() {
                if pattern.subpage_of(idx) == 1 {
                    assert_eq!(p, scene[idx]);
                } else {
                    assert_eq!(p, 0);
                }
            }
            assert!(!cam.has_data().unwrap());
        }
    }

    #[test]
    fn rejects_invalid_subpage_id() {
        let sim = SimCamera::new(warm_scene());
        let mut cam = Mlx90640::new(sim.clone());
        sim.poke(STATUS_REGISTER, 0b1010);
        let mut frame = RawFrame::default();
        assert_eq!(
            cam.read_image(&mut frame),
            Err(CameraError::InvalidSubpage(2))
        );
    }

    #[test]
    fn refresh_rate_round_trip() {
        let mut cam = Mlx90640::new(SimCamera::new(warm_scene()));
        let rate = cam.set_refresh_rate(16.0).unwrap();
        assert_eq!(rate.register_value(), 5);
        assert_eq!(cam.refresh_rate().unwrap(), rate);
        // Pattern bit shares the word and must survive
        assert_eq!(cam.pattern().unwrap(), Pattern::Chess);
    }

    #[test]
    fn eeprom_dump_and_fields() {
        let sim = SimCamera::new(warm_scene());
        let mut cam = Mlx90640::new(sim.clone());
        let block = cam.read_eeprom_block().unwrap();
        assert_eq!(block.len(), EEPROM_SIZE);
        assert_eq!(block[0x30], sim.peek(0x2430));
        assert_eq!(cam.eeprom_field("ee_gain").unwrap(), sim.peek(0x2430) as i16 as i32);
    }

    #[test]
    fn gain_is_signed() {
        let sim = SimCamera::new(warm_scene());
        sim.poke(0x070A, (-1234_i16) as u16);
        let mut cam = Mlx90640::new(sim);
        assert_eq!(cam.read_gain().unwrap(), -1234);
    }

    #[test]
    fn detect_requires_exactly_one_device() {
        let sim = SimCamera::new(warm_scene());
        assert!(detect_camera(SimBus::new(vec![0x33], sim.clone()), 0x33).is_ok());
        assert_eq!(
            detect_camera(SimBus::new(vec![], sim.clone()), 0x33).err(),
            Some(CameraError::DeviceDetect(vec![]))
        );
        assert_eq!(
            detect_camera(SimBus::new(vec![0x33, 0x34], sim), 0x33).err(),
            Some(CameraError::DeviceDetect(vec![0x33, 0x34]))
        );
    }

    #[test]
    fn detect_checks_the_configured_address() {
        let sim = SimCamera::new(warm_scene());
        assert_eq!(
            detect_camera(SimBus::new(vec![0x34], sim), 0x33).err(),
            Some(CameraError::UnexpectedAddress {
                expected: 0x33,
                found: 0x34
            })
        );
    }

    #[test]
    fn configure_applies_pattern_and_refresh_rate() {
        let mut cam = Mlx90640::new(SimCamera::new(warm_scene()));
        let before = cam.refresh_rate().unwrap();

        let mut cfg = CameraCfg {
            pattern: Pattern::Interleaved,
            ..CameraCfg::default()
        };
        cam.configure(&cfg).unwrap();
        assert_eq!(cam.pattern().unwrap(), Pattern::Interleaved);
        assert_eq!(cam.refresh_rate().unwrap(), before);

        cfg.refresh_hz = Some(4.0);
        cam.configure(&cfg).unwrap();
        assert_eq!(cam.refresh_rate().unwrap().freq(), 4.0);
        assert_eq!(cam.pattern().unwrap(), Pattern::Interleaved);
    }

    #[test]
    fn explicit_subpage_overrides_status() {
        let scene = warm_scene();
        let sim = SimCamera::new(scene.clone());
        let mut cam = Mlx90640::new(sim.clone());
        let mut frame = RawFrame::default();

        sim.publish_subpage_id(0);
        sim.publish_subpage_id(1);
        assert_eq!(cam.last_subpage().unwrap(), 1);
        assert_eq!(cam.read_subpage(&mut frame, Some(0)).unwrap(), 0);
        for (idx, &p) in frame.pixels().iter().enumerate() {
            if Pattern::Chess.subpage_of(idx) == 0 {
                assert_eq!(p, scene[idx]);
            } else {
                assert_eq!(p, 0);
            }
        }

        sim.publish_subpage_id(0);
        assert_eq!(
            cam.read_subpage(&mut frame, Some(3)),
            Err(CameraError::InvalidSubpage(3))
        );
    }

    #[test]
    fn adc_resolution_and_vdd() {
        let sim = SimCamera::new(warm_scene());
        sim.poke(0x072A, (-6000_i16) as u16);
        let mut cam = Mlx90640::new(sim);
        assert_eq!(cam.read_vdd().unwrap(), -6000);

        assert_eq!(cam.adc_resolution().unwrap(), AdcResolution::Bits18);
        cam.set_adc_resolution(AdcResolution::Bits16).unwrap();
        assert_eq!(cam.adc_resolution().unwrap(), AdcResolution::Bits16);
        assert_eq!(cam.pattern().unwrap(), Pattern::Chess);
    }
}
