//! Run one complete firing sequence against the simulated turret.
//!
//! Demonstrated here:
//!   * Discovering the camera on a (simulated) I2C bus
//!   * Publishing targets from an acquisition task to the sequencer through a queue
//!   * Running the controller against a wall clock with file and terminal logging
//!   * Running a control program with no hardware in the loop

use heatseek::{
    Controller, FiringSequencer, TurretCfg,
    calc::TargetMapper,
    camera::detect_camera,
    controller::{Clock, OpCtx},
    peripheral::hootl::{PlantTask, SimAxis, SimBus, SimCamera, SimFlywheel, SimServo},
    sequencer::{CameraTargeting, Rig, SharedTarget},
    share::{Queue, Share},
    task::{AcquisitionTask, SequencerTask},
};

use tracing::{error, info};

fn main() {
    let mut cfg = TurretCfg::default();
    cfg.camera.refresh_hz = Some(16.0);

    // Operation context; logs go to ./logs/hootl_example.log
    let ctx = OpCtx::new(cfg.tick_ms)
        .with_op_name("hootl_example")
        .with_max_ticks(2000);
    let mut controller = Controller::new(ctx).with_clock(Clock::Wall);
    if let Err(e) = controller.init_logging() {
        eprintln!("Logging unavailable: {e}");
    }

    // Simulated hardware: a warm object in front of column 12,
    // and a drive train moving 5 counts per percent duty per tick
    let sim_camera = SimCamera::with_warm_spot(12, 9);
    sim_camera.set_period_ticks(5);
    let axis = SimAxis::new(5.0);
    let servo = SimServo::new();
    let flywheel = SimFlywheel::new();

    let bus = SimBus::new(vec![cfg.camera.address], sim_camera.clone());
    let mut camera = match detect_camera(bus, cfg.camera.address) {
        Ok(camera) => camera,
        Err(e) => {
            error!("{e}");
            return;
        }
    };
    if let Err(e) = camera.configure(&cfg.camera) {
        error!("Camera setup failed: {e}");
        return;
    }

    let mapper = match TargetMapper::new(cfg.calibration.clone(), cfg.interp) {
        Ok(mapper) => mapper,
        Err(e) => {
            error!("Bad calibration: {e}");
            return;
        }
    };

    // Acquisition and sequencing are separate tasks joined by a queue
    let targets = Queue::new(4, true);
    let acquisition = AcquisitionTask::new(CameraTargeting::new(camera, mapper), targets.clone());
    let rig = Rig {
        motor: axis.motor(),
        servo: servo.clone(),
        flywheel: flywheel.clone(),
        counter: axis.counter(),
    };
    let sequencer = FiringSequencer::new(&cfg, SharedTarget::new(targets), rig);

    controller.add_task(Box::new(acquisition));
    let reports = Share::new();
    controller.add_task(Box::new(
        SequencerTask::new(sequencer, 1).with_reports(reports.clone()),
    ));
    controller.add_task(Box::new(PlantTask::new(axis.clone(), Some(sim_camera))));

    let summary = controller.run();

    info!(
        "Finished after {} ticks ({} ms); servo moves {:?}; final position {}",
        summary.ticks,
        summary.last_ms,
        servo.history(),
        axis.measured()
    );
    if let Some(report) = reports.get() {
        info!(
            "Sequence ran {}..{} ms, setpoint {:?}, fired: {}",
            report.started_ms, report.finished_ms, report.setpoint, report.fired
        );
    }
    for (task, reason) in &summary.faulted {
        error!("{task}: {reason}");
    }
}
