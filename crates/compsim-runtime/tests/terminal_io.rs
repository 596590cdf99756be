//! Integration tests for terminal I/O between processes and surfaces.
//!
//! The bridge is pumped by hand so every step is deterministic.

use compsim_auth::CapabilitySet;
use compsim_event::names::TEXT_ENTERED;
use compsim_runtime::io::{IoBridge, IoQueue, MachineStream};
use compsim_runtime::testing::{MemorySurfaceFactory, RecordingEngine};
use compsim_runtime::{Machine, MachineEnv, ProcessError, ProcessStatus, ScriptOutcome, VfsPath};
use compsim_types::MachineId;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

/// Engine that echoes one line of input back, uppercased.
fn echo_engine() -> RecordingEngine {
    RecordingEngine::with_handler(|_, bindings| {
        let read = bindings.operation("std.read_line").expect("read_line bound");
        let print = bindings.operation("std.print").expect("print bound");
        let line = read.call(&[]).map_err(compsim_runtime::ScriptFailure::Runtime)?;
        let shout = line.as_str().unwrap_or_default().to_uppercase();
        print
            .call(&[shout.into()])
            .map_err(compsim_runtime::ScriptFailure::Runtime)?;
        Ok(ScriptOutcome::default())
    })
}

#[test]
fn spawned_process_reads_from_its_terminal() {
    let dir = TempDir::new().expect("temp dir");
    let (queue, rx) = IoQueue::channel();
    let factory = Arc::new(MemorySurfaceFactory::new());
    let mut bridge = IoBridge::new(rx, factory.clone());
    let env = MachineEnv::new(dir.path(), Arc::new(echo_engine())).with_io(queue);
    let machine = Machine::new(MachineId::new(0), "tty", &env).expect("machine");
    machine
        .vfs()
        .write()
        .write_file(&VfsPath::parse("/echo.lua").expect("path"), "-- echo")
        .expect("script");

    let tid = machine.open_terminal(None);
    bridge.pump();
    let surface = factory
        .surface(machine.designation(), tid)
        .expect("surface opened");
    assert_eq!(surface.started(), Some(tid));
    assert_eq!(surface.prefix(), "> ");

    let rt = machine.runtime();
    let pid = rt
        .create("echo", "/echo.lua", CapabilitySet::process_default())
        .expect("create");
    let stream: Arc<dyn MachineStream> = machine.terminals().get(tid).expect("terminal");
    rt.set_stream(pid, stream).expect("bind");
    rt.spawn(pid).expect("spawn");

    assert!(wait_until(|| rt.status(pid).ok() == Some(ProcessStatus::Waiting)
        && rt.info(pid).map(|i| i.runs).unwrap_or(0) == 1));
    surface.type_line("hello");

    assert!(wait_until(|| {
        bridge.pump();
        surface.output().contains(&"HELLO".to_string())
    }));
    assert!(wait_until(|| rt.status(pid).ok() == Some(ProcessStatus::Ready)));
    let entered = machine
        .bus()
        .recent(16)
        .into_iter()
        .find(|e| e.name() == TEXT_ENTERED)
        .expect("text_entered announced");
    assert_eq!(entered.param(0), Some("text: hello"));
}

#[test]
fn respawn_is_refused_while_worker_waits_and_survives_reap() {
    let dir = TempDir::new().expect("temp dir");
    let (queue, rx) = IoQueue::channel();
    let factory = Arc::new(MemorySurfaceFactory::new());
    let mut bridge = IoBridge::new(rx, factory.clone());
    let env = MachineEnv::new(dir.path(), Arc::new(echo_engine())).with_io(queue);
    let machine = Machine::new(MachineId::new(2), "tty", &env).expect("machine");
    machine
        .vfs()
        .write()
        .write_file(&VfsPath::parse("/echo.lua").expect("path"), "-- echo")
        .expect("script");

    let tid = machine.open_terminal(None);
    bridge.pump();
    let surface = factory
        .surface(machine.designation(), tid)
        .expect("surface opened");

    let rt = machine.runtime();
    let pid = rt
        .create("echo", "/echo.lua", CapabilitySet::process_default())
        .expect("create");
    let stream: Arc<dyn MachineStream> = machine.terminals().get(tid).expect("terminal");
    rt.set_stream(pid, stream).expect("bind");

    // First run completes, leaving a finished, non-continuous process.
    rt.spawn(pid).expect("spawn");
    assert!(wait_until(|| rt.status(pid).ok() == Some(ProcessStatus::Waiting)));
    surface.type_line("one");
    assert!(wait_until(|| rt.status(pid).ok() == Some(ProcessStatus::Ready)
        && rt.info(pid).map(|i| i.runs).unwrap_or(0) == 1));

    // The first worker may still be unwinding; respawn once it has.
    // Reaping right after a respawn must not drop the new run.
    assert!(wait_until(|| rt.spawn(pid).is_ok()));
    assert!(rt.reap().is_empty());
    assert!(wait_until(|| rt.status(pid).ok() == Some(ProcessStatus::Waiting)));

    assert!(matches!(rt.spawn(pid), Err(ProcessError::Busy(p)) if p == pid));
    assert!(rt.reap().is_empty());

    surface.type_line("two");
    assert!(wait_until(|| {
        bridge.pump();
        surface.output().contains(&"TWO".to_string())
    }));
    assert!(wait_until(|| rt.status(pid).ok() == Some(ProcessStatus::Ready)));
    assert_eq!(rt.info(pid).map(|i| i.runs).ok(), Some(2));
}

#[test]
fn closing_a_terminal_ends_its_surface() {
    let dir = TempDir::new().expect("temp dir");
    let (queue, rx) = IoQueue::channel();
    let factory = Arc::new(MemorySurfaceFactory::new());
    let mut bridge = IoBridge::new(rx, factory.clone()).with_prefix("$ ");
    let env = MachineEnv::new(dir.path(), Arc::new(RecordingEngine::new())).with_io(queue);
    let mut machine = Machine::new(MachineId::new(1), "tty", &env).expect("machine");

    let tid = machine.open_terminal(None);
    let named = machine.open_terminal(Some("# "));
    bridge.pump();
    assert_eq!(bridge.surface_count(), 2);
    let plain = factory.surface(machine.designation(), tid).expect("plain");
    let custom = factory.surface(machine.designation(), named).expect("custom");
    assert_eq!(plain.prefix(), "$ ");
    assert_eq!(custom.prefix(), "# ");

    machine.terminals().close(tid).expect("close");
    bridge.pump();
    assert!(plain.is_ended());
    assert!(!custom.is_ended());

    machine.shutdown().expect("shutdown");
    bridge.pump();
    assert!(custom.is_ended());
    assert_eq!(bridge.surface_count(), 0);
}
