//! Integration tests for machines driven through the registry.

use compsim_auth::CapabilitySet;
use compsim_runtime::io::BufferStream;
use compsim_runtime::persist::META_FILE_NAME;
use compsim_runtime::testing::RecordingEngine;
use compsim_runtime::{MachineEnv, MachineError, MachineRegistry, ProcessError};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn template(dir: &TempDir) -> std::path::PathBuf {
    let root = dir.path().join("template");
    fs::create_dir_all(root.join("boot")).expect("boot dir");
    fs::create_dir_all(root.join("bin")).expect("bin dir");
    fs::write(root.join("boot/boot.lua"), "call std.print booting\n").expect("boot");
    fs::write(root.join("bin/hello.lua"), "call std.print hello\n").expect("hello");
    fs::write(root.join("bin/admin.lua"), "--@requires fs\ncall fs.exists /\n").expect("admin");
    root
}

#[tokio::test]
async fn machines_boot_from_template_and_run_processes() {
    let dir = TempDir::new().expect("temp dir");
    let stream = Arc::new(BufferStream::new());
    let env = MachineEnv::new(dir.path().join("store"), Arc::new(RecordingEngine::new()))
        .with_template(template(&dir))
        .with_default_stream(stream.clone());
    let mut registry = MachineRegistry::new(env);

    let office = registry.create("office").await.expect("office");
    assert_eq!(stream.take_output(), vec!["booting"]);

    let handle = registry.get(&office).expect("handle");
    handle
        .run_process("hello", "/bin/hello.lua", CapabilitySet::process_default())
        .await
        .expect("hello runs");
    assert_eq!(stream.take_output(), vec!["hello"]);

    let denied = handle
        .run_process("admin", "/bin/admin.lua", CapabilitySet::process_default())
        .await
        .expect_err("needs fs");
    assert!(matches!(
        denied,
        MachineError::Process(ProcessError::PermissionDenied(_))
    ));

    registry.shutdown_all().await;
    let meta = fs::read_to_string(
        dir.path()
            .join("store/machines/0_office")
            .join(META_FILE_NAME),
    )
    .expect("meta saved");
    assert!(meta.contains("machine_desig=str:\"0_office\""));
    assert!(meta.contains("last_saved="));
}

#[tokio::test]
async fn template_is_not_recopied_on_restart() {
    let dir = TempDir::new().expect("temp dir");
    let tpl = template(&dir);
    let store = dir.path().join("store");
    let env = MachineEnv::new(&store, Arc::new(RecordingEngine::new())).with_template(&tpl);

    let mut first = MachineRegistry::new(env.clone());
    first.create("lab").await.expect("lab");
    first.shutdown_all().await;

    let hello = store.join("machines/0_lab/fs/bin/hello.lua");
    fs::write(&hello, "call std.print changed\n").expect("edit");

    let mut second = MachineRegistry::new(env);
    second.create("lab").await.expect("lab again");
    second.shutdown_all().await;
    assert_eq!(
        fs::read_to_string(&hello).expect("read"),
        "call std.print changed\n"
    );
}
