//! Hardware-out-of-the-loop stand-ins for the turret's peripherals.
//!
//! Each simulated device is a cheap handle around shared state, so a test can
//! move one handle into the sequencer and keep another to drive and inspect
//! the simulation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use heatseek_shared::image::{decode_word, encode_word};
use heatseek_shared::regmap::{
    CONTROL_REGISTER_1, EEPROM_ADDRESS, EEPROM_SIZE, REG_SIZE, STATUS_REGISTER, pixel_address,
};
use heatseek_shared::{IMAGE_SIZE, NUM_COLS, Pattern};

use super::{
    ActuatorError, CameraInterface, Flywheel, I2cBus, MAX_SERVO_ANGLE, MotorDriver,
    QuadratureCounter, Servo, TransportError, saturate_duty,
};
use crate::task::{Task, TaskError, TaskStatus};

fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(|e| {
        warn!("HOOTL shared state lock poisoned; continuing with last state.");
        e.into_inner()
    })
}

#[derive(Debug)]
struct AxisState {
    /// Shaft position in encoder counts
    position: f64,

    /// Last commanded duty, percent
    duty: f64,

    /// Counts moved per percent duty per tick
    gain: f64,

    fault: Option<String>,
}

/// A motor turning an encoder.
///
/// Each [`SimAxis::advance`] moves the shaft by `duty * gain` counts, so with
/// positive duty the counter counts up.
#[derive(Clone, Debug)]
pub struct SimAxis {
    state: Arc<Mutex<AxisState>>,
}

impl SimAxis {
    pub fn new(gain: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(AxisState {
                position: 0.0,
                duty: 0.0,
                gain,
                fault: None,
            })),
        }
    }

    pub fn motor(&self) -> SimMotor {
        SimMotor {
            state: self.state.clone(),
        }
    }

    pub fn counter(&self) -> SimCounter {
        SimCounter {
            state: self.state.clone(),
        }
    }

    /// Integrate one tick of motion
    pub fn advance(&self) {
        let mut state = lock(&self.state);
        state.position += state.duty * state.gain;
    }

    pub fn position(&self) -> f64 {
        lock(&self.state).position
    }

    /// Position as the encoder resolves it
    pub fn measured(&self) -> i64 {
        self.position().round() as i64
    }

    pub fn set_position(&self, position: f64) {
        lock(&self.state).position = position;
    }

    pub fn duty(&self) -> f64 {
        lock(&self.state).duty
    }

    /// Make every motor command fail with `message` until cleared
    pub fn set_motor_fault(&self, message: Option<&str>) {
        lock(&self.state).fault = message.map(str::to_owned);
    }
}

/// Motor driver half of a [`SimAxis`]
#[derive(Clone, Debug)]
pub struct SimMotor {
    state: Arc<Mutex<AxisState>>,
}

impl MotorDriver for SimMotor {
    fn set_duty_cycle(&mut self, duty: f64) -> Result<(), ActuatorError> {
        let mut state = lock(&self.state);
        if let Some(message) = &state.fault {
            return Err(ActuatorError::new("sim motor", message.clone()));
        }
        state.duty = saturate_duty(duty);
        Ok(())
    }
}

/// Quadrature counter half of a [`SimAxis`]. Wraps like a 16-bit timer.
#[derive(Clone, Debug)]
pub struct SimCounter {
    state: Arc<Mutex<AxisState>>,
}

impl QuadratureCounter for SimCounter {
    fn counter(&mut self) -> u16 {
        let position = lock(&self.state).position.round() as i64;
        position.rem_euclid(65536) as u16
    }
}

/// Trigger servo recording every commanded angle
#[derive(Clone, Debug, Default)]
pub struct SimServo {
    angles: Arc<Mutex<Vec<f64>>>,
}

impl SimServo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn angle(&self) -> Option<f64> {
        lock(&self.angles).last().copied()
    }

    /// Every angle commanded so far, oldest first
    pub fn history(&self) -> Vec<f64> {
        lock(&self.angles).clone()
    }
}

impl Servo for SimServo {
    fn set_angle(&mut self, angle: f64) -> Result<(), ActuatorError> {
        lock(&self.angles).push(angle.clamp(0.0, MAX_SERVO_ANGLE));
        Ok(())
    }
}

/// Flywheel output pin
#[derive(Clone, Debug, Default)]
pub struct SimFlywheel {
    on: Arc<AtomicBool>,
}

impl SimFlywheel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }
}

impl Flywheel for SimFlywheel {
    fn set_flywheel(&mut self, on: bool) -> Result<(), ActuatorError> {
        self.on.store(on, Ordering::SeqCst);
        Ok(())
    }
}

/// Power-on value of control register 1: chess pattern, 2 Hz, 18 bit, subpage mode
const CONTROL_REGISTER_RESET: u16 = 0x1901;

const DATA_AVAILABLE: u16 = 1 << 3;

#[derive(Debug)]
struct CameraState {
    /// Whole 16-bit word address space
    mem: Vec<u16>,

    /// Pixel words published on each subpage
    scene: Vec<i16>,

    next_subpage: u8,
    period_ticks: u32,
    ticks: u32,
    fault: Option<String>,
}

impl CameraState {
    fn publish(&mut self, id: u8) {
        let pattern_bit = (self.mem[CONTROL_REGISTER_1 as usize] >> 12) & 1;
        let pattern = Pattern::from_id(pattern_bit).unwrap_or_default();
        for idx in pattern.subpage_indices(id) {
            self.mem[pixel_address(idx) as usize] = self.scene[idx] as u16;
        }

        let status = &mut self.mem[STATUS_REGISTER as usize];
        *status = (*status & !0b111) | id as u16 | DATA_AVAILABLE;
        self.next_subpage = id ^ 1;
    }
}

/// MLX90640 register space with a synthetic scene.
///
/// Subpages are published alternately, either on demand or every
/// `period_ticks` calls to [`SimCamera::tick`]. Publishing writes the scene's
/// pixels for that subpage, sets `last_subpage` and raises `data_available`.
#[derive(Clone, Debug)]
pub struct SimCamera {
    state: Arc<Mutex<CameraState>>,
}

impl SimCamera {
    /// Camera seeing `scene`, a row-major frame of raw pixel words.
    /// Missing pixels read as 0.
    pub fn new(mut scene: Vec<i16>) -> Self {
        scene.resize(IMAGE_SIZE, 0);

        let mut mem = vec![0_u16; 1 << 16];
        mem[CONTROL_REGISTER_1 as usize] = CONTROL_REGISTER_RESET;
        for i in 0..EEPROM_SIZE {
            // Arbitrary but recognizable calibration contents
            mem[EEPROM_ADDRESS as usize + i] = (i as u16).wrapping_mul(0x9E37) ^ 0x5A5A;
        }

        Self {
            state: Arc::new(Mutex::new(CameraState {
                mem,
                scene,
                next_subpage: 0,
                period_ticks: 1,
                ticks: 0,
                fault: None,
            })),
        }
    }

    /// Uniform background with a warm 1x4 cluster starting at `column`, `row`
    pub fn with_warm_spot(column: usize, row: usize) -> Self {
        Self::new(warm_spot_scene(column, row))
    }

    pub fn set_scene(&self, mut scene: Vec<i16>) {
        scene.resize(IMAGE_SIZE, 0);
        lock(&self.state).scene = scene;
    }

    /// Publish a subpage every `period` ticks
    pub fn set_period_ticks(&self, period: u32) {
        lock(&self.state).period_ticks = period.max(1);
    }

    /// Advance the camera's own clock by one control tick
    pub fn tick(&self) {
        let mut state = lock(&self.state);
        state.ticks += 1;
        if state.ticks >= state.period_ticks {
            state.ticks = 0;
            let id = state.next_subpage;
            state.publish(id);
        }
    }

    /// Complete the next subpage in the alternating order
    pub fn publish_subpage(&self) {
        let mut state = lock(&self.state);
        let id = state.next_subpage;
        state.publish(id);
    }

    /// Complete a specific subpage
    pub fn publish_subpage_id(&self, id: u8) {
        lock(&self.state).publish(id & 1);
    }

    /// Make every bus transfer fail with `message` until cleared
    pub fn set_fault(&self, message: Option<&str>) {
        lock(&self.state).fault = message.map(str::to_owned);
    }

    /// Raw register word
    pub fn peek(&self, address: u16) -> u16 {
        lock(&self.state).mem[address as usize]
    }

    /// Overwrite a raw register word
    pub fn poke(&self, address: u16, value: u16) {
        lock(&self.state).mem[address as usize] = value;
    }

    fn check(state: &CameraState, address: u16) -> Result<(), TransportError> {
        match &state.fault {
            Some(message) => Err(TransportError {
                address,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl CameraInterface for SimCamera {
    fn read_into(&mut self, address: u16, buf: &mut [u8]) -> Result<(), TransportError> {
        let state = lock(&self.state);
        Self::check(&state, address)?;
        for (i, word) in buf.chunks_exact_mut(REG_SIZE).enumerate() {
            let addr = address.wrapping_add(i as u16);
            encode_word(state.mem[addr as usize], word);
        }
        Ok(())
    }

    fn write_from(&mut self, address: u16, buf: &[u8]) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        Self::check(&state, address)?;
        for (i, word) in buf.chunks_exact(REG_SIZE).enumerate() {
            let addr = address.wrapping_add(i as u16);
            if (EEPROM_ADDRESS..EEPROM_ADDRESS + EEPROM_SIZE as u16).contains(&addr) {
                debug!("Ignoring write to EEPROM word {addr:#06x}");
                continue;
            }
            state.mem[addr as usize] = decode_word(word);
        }
        Ok(())
    }
}

/// A bus with a fixed set of responding addresses, all answering as `camera`
#[derive(Clone, Debug)]
pub struct SimBus {
    devices: Vec<u8>,
    camera: SimCamera,
}

impl SimBus {
    pub fn new(devices: Vec<u8>, camera: SimCamera) -> Self {
        Self { devices, camera }
    }
}

impl I2cBus for SimBus {
    type Device = SimCamera;

    fn scan(&mut self) -> Result<Vec<u8>, TransportError> {
        Ok(self.devices.clone())
    }

    fn into_device(self, _address: u8) -> SimCamera {
        self.camera
    }
}

/// Background and hotspot pixel values of [`warm_spot_scene`]
pub const SCENE_BACKGROUND: i16 = -120;
pub const SCENE_HOTSPOT: i16 = 400;

/// Frame with a warm 1x4 cluster whose left edge is at `column`, `row`.
/// The cluster is truncated at the right edge of the frame.
pub fn warm_spot_scene(column: usize, row: usize) -> Vec<i16> {
    let mut scene = vec![SCENE_BACKGROUND; IMAGE_SIZE];
    for c in column..(column + 4).min(NUM_COLS) {
        if let Some(p) = scene.get_mut(row * NUM_COLS + c) {
            *p = SCENE_HOTSPOT;
        }
    }
    scene
}

/// Task advancing the simulated plant once per control tick
#[derive(Debug)]
pub struct PlantTask {
    axis: SimAxis,
    camera: Option<SimCamera>,
}

impl PlantTask {
    pub fn new(axis: SimAxis, camera: Option<SimCamera>) -> Self {
        Self { axis, camera }
    }
}

impl Task for PlantTask {
    fn name(&self) -> &str {
        "plant"
    }

    /// Runs after every control task in the same tick
    fn priority(&self) -> i32 {
        i32::MIN
    }

    fn background(&self) -> bool {
        true
    }

    fn poll(&mut self, _now_ms: u64) -> Result<TaskStatus, TaskError> {
        self.axis.advance();
        if let Some(camera) = &self.camera {
            camera.tick();
        }
        Ok(TaskStatus::Running)
    }
}
