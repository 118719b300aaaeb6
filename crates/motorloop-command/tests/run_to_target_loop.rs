//! 后台控制循环上的命令测试

use motorloop_command::{Command, CommandRunner, Completion, RunToTarget};
use motorloop_core::{
    ControlLoop, ControlMode, PidGains, Scheduler, SchedulerConfig, SimBackend, SimPlant, Slot,
    Vendor,
};
use std::thread;
use std::time::Duration;

fn spawn_position_loop() -> (ControlLoop, motorloop_core::UnitId, motorloop_core::SimHandle) {
    let mut scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
    let backend = SimBackend::new(Vendor::Falcon500, 7, SimPlant::default());
    let sim = backend.handle();
    let id = scheduler.add_unit(backend);
    scheduler
        .unit_mut(id)
        .unwrap()
        .set_gains(Slot::Position, PidGains::pid(0.001, 0.0, 0.0))
        .unwrap();
    (ControlLoop::spawn(scheduler).unwrap(), id, sim)
}

#[test]
fn run_to_target_reaches_position() {
    let (control, id, sim) = spawn_position_loop();
    let mut command = RunToTarget::new(
        control.controller(id).unwrap(),
        ControlMode::Position,
        500.0,
        2.0,
    );

    let runner = CommandRunner::new(Duration::from_millis(20));
    let completion = runner.run(&mut command, Some(Duration::from_secs(10))).unwrap();

    assert_eq!(completion, Completion::Finished);
    assert!((sim.position() - 500.0).abs() < 10.0, "position = {}", sim.position());
}

#[test]
fn cancel_keeps_setpoint() {
    let (control, id, _sim) = spawn_position_loop();
    let controller = control.controller(id).unwrap();
    let runner = CommandRunner::new(Duration::from_millis(10));
    let cancel = runner.cancel_handle();

    // 容差极小，命令不会自然完成
    let mut command = RunToTarget::new(controller.clone(), ControlMode::Position, 5000.0, 1e-9);
    let worker = thread::spawn(move || runner.run(&mut command, None));

    thread::sleep(Duration::from_millis(100));
    cancel.cancel();
    let completion = worker.join().unwrap().unwrap();
    assert_eq!(completion, Completion::Cancelled);

    thread::sleep(Duration::from_millis(20));
    let telemetry = controller.telemetry();
    assert_eq!(telemetry.mode, ControlMode::Position);
    assert_eq!(telemetry.setpoint, 5000.0);
}

#[test]
fn initialize_sets_target_once() {
    let (control, id, _sim) = spawn_position_loop();
    let controller = control.controller(id).unwrap();
    let mut command = RunToTarget::new(controller.clone(), ControlMode::Position, 50.0, 1.0);
    command.initialize().unwrap();

    // 其他调用方随后修改目标值，轮询不会把它改回来
    controller.set(ControlMode::Position, 80.0).unwrap();
    for _ in 0..10 {
        let _ = command.is_finished();
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(controller.telemetry().setpoint, 80.0);
    assert!(!command.is_finished());
}
