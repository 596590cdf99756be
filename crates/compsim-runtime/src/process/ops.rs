//! Host operations exposed to scripts.
//!
//! | Namespace | Operations |
//! |-----------|------------|
//! | `std` | `print`, `write`, `read_line`, `log` |
//! | `fs` | `exists`, `list`, `read`, `write`, `mkdir`, `is_executable`, `remove` |
//! | `process` | `current`, `list`, `create`, `fork`, `start`, `spawn`, `kill`, `status`, `set_file`, `reset_bindings_when_complete`, `pass_capabilities`, `continuous`, `reset_bindings` |
//! | `term` | `open`, `close`, `attach` |
//! | `event` | `trigger`, `list`, `recent`, `register` |
//!
//! Every operation is installed for every execution; the capability gate
//! inside [`HostOperation::call`] decides at call time. Paths are resolved
//! against the calling process's working folder.

use super::runtime::{ProcessEntry, ProcessRuntime};
use super::ProcessError;
use crate::io::MachineStream;
use crate::script::{BindingTable, BindingValue, HostOperation};
use crate::vfs::VfsPath;
use compsim_auth::CapabilitySet;
use compsim_event::EventCategory;
use compsim_types::{ProcessId, TerminalId};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

type OpResult = Result<BindingValue, String>;

pub(super) fn install(
    rt: &ProcessRuntime,
    entry: &Arc<ProcessEntry>,
    gate: &Arc<CapabilitySet>,
    bindings: &mut BindingTable,
) {
    let mut ops = Installer { gate, bindings };
    install_std(&mut ops, rt, entry);
    install_fs(&mut ops, rt, entry);
    install_process(&mut ops, rt, entry);
    install_term(&mut ops, rt, entry);
    install_event(&mut ops, rt);
}

struct Installer<'a> {
    gate: &'a Arc<CapabilitySet>,
    bindings: &'a mut BindingTable,
}

impl Installer<'_> {
    fn add<F>(&mut self, namespace: &'static str, name: &'static str, func: F)
    where
        F: Fn(&[BindingValue]) -> OpResult + Send + Sync + 'static,
    {
        self.bindings
            .add_operation(HostOperation::new(namespace, name, Arc::clone(self.gate), func));
    }
}

fn install_std(ops: &mut Installer<'_>, rt: &ProcessRuntime, entry: &Arc<ProcessEntry>) {
    let e = Arc::clone(entry);
    ops.add("std", "print", move |args| {
        let line = args
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\t");
        e.stream().write_line(&line);
        Ok(BindingValue::Nil)
    });

    let e = Arc::clone(entry);
    ops.add("std", "write", move |args| {
        let text: String = args.iter().map(ToString::to_string).collect();
        e.stream().write_line(&text);
        Ok(BindingValue::Nil)
    });

    let e = Arc::clone(entry);
    ops.add("std", "read_line", move |_| {
        let stream: Arc<dyn MachineStream> = e.stream();
        e.status.wait();
        let line = stream.read_line();
        e.status.resume();
        Ok(line.into())
    });

    let machine = rt.machine().clone();
    let pid = entry.id;
    ops.add("std", "log", move |args| {
        let level = str_arg(args, 0, "level")?;
        let msg = args.get(1).map(ToString::to_string).unwrap_or_default();
        match level {
            "error" => error!(machine = %machine, pid = %pid, "[script] {msg}"),
            "warn" => warn!(machine = %machine, pid = %pid, "[script] {msg}"),
            "info" => info!(machine = %machine, pid = %pid, "[script] {msg}"),
            "debug" => debug!(machine = %machine, pid = %pid, "[script] {msg}"),
            "trace" => trace!(machine = %machine, pid = %pid, "[script] {msg}"),
            other => return Err(format!("unknown log level '{other}'")),
        }
        Ok(BindingValue::Nil)
    });
}

fn install_fs(ops: &mut Installer<'_>, rt: &ProcessRuntime, entry: &Arc<ProcessEntry>) {
    let (r, e) = (rt.clone(), Arc::clone(entry));
    ops.add("fs", "exists", move |args| {
        let path = path_arg(&e, args, 0)?;
        Ok(r.vfs().read().exists(&path).into())
    });

    let (r, e) = (rt.clone(), Arc::clone(entry));
    ops.add("fs", "list", move |args| {
        let path = match args.first() {
            None | Some(BindingValue::Nil) => e.state.lock().working_dir.clone(),
            Some(_) => path_arg(&e, args, 0)?,
        };
        let entries = r.vfs().read().list(&path).map_err(|err| err.to_string())?;
        Ok(entries
            .into_iter()
            .map(|d| {
                BindingValue::table([
                    ("name", d.name.into()),
                    ("folder", d.is_folder.into()),
                    ("executable", d.executable.into()),
                ])
            })
            .collect::<Vec<_>>()
            .into())
    });

    let (r, e) = (rt.clone(), Arc::clone(entry));
    ops.add("fs", "read", move |args| {
        let path = path_arg(&e, args, 0)?;
        let text = r.vfs().read().read_file(&path).map_err(|err| err.to_string())?;
        Ok(text.into())
    });

    let (r, e) = (rt.clone(), Arc::clone(entry));
    ops.add("fs", "write", move |args| {
        let path = path_arg(&e, args, 0)?;
        let text = match args.get(1) {
            None | Some(BindingValue::Nil) => return Err(arg_error(1, "contents")),
            Some(v) => v.to_string(),
        };
        r.vfs()
            .write()
            .write_file(&path, &text)
            .map_err(|err| err.to_string())?;
        Ok(true.into())
    });

    let (r, e) = (rt.clone(), Arc::clone(entry));
    ops.add("fs", "mkdir", move |args| {
        let path = path_arg(&e, args, 0)?;
        r.vfs()
            .write()
            .create_dir_all(&path)
            .map_err(|err| err.to_string())?;
        Ok(true.into())
    });

    let (r, e) = (rt.clone(), Arc::clone(entry));
    ops.add("fs", "is_executable", move |args| {
        let path = path_arg(&e, args, 0)?;
        let vfs = r.vfs().read();
        let file = vfs.file(&path).map_err(|err| err.to_string())?;
        Ok(file.is_executable().into())
    });

    let (r, e) = (rt.clone(), Arc::clone(entry));
    ops.add("fs", "remove", move |args| {
        let path = path_arg(&e, args, 0)?;
        r.vfs().write().remove(&path).map_err(|err| err.to_string())?;
        Ok(true.into())
    });
}

fn install_process(ops: &mut Installer<'_>, rt: &ProcessRuntime, entry: &Arc<ProcessEntry>) {
    let me = entry.id;

    let r = rt.clone();
    ops.add("process", "current", move |_| {
        Ok(r.info(me).map_err(|e| e.to_string())?.to_binding())
    });

    let r = rt.clone();
    ops.add("process", "list", move |_| {
        Ok(r.list()
            .iter()
            .map(super::ProcessInfo::to_binding)
            .collect::<Vec<_>>()
            .into())
    });

    let (r, e) = (rt.clone(), Arc::clone(entry));
    ops.add("process", "create", move |args| {
        let name = str_arg(args, 0, "name")?;
        let path = path_arg(&e, args, 1)?;
        let pid = r
            .create(name, &path.to_string(), CapabilitySet::process_default())
            .map_err(|err| err.to_string())?;
        Ok(pid.get().into())
    });

    let r = rt.clone();
    ops.add("process", "fork", move |args| {
        let parent = pid_arg(args, 0, me)?;
        let child = r.fork(parent).map_err(|err| err.to_string())?;
        Ok(child.get().into())
    });

    let r = rt.clone();
    ops.add("process", "start", move |args| {
        let pid = pid_arg(args, 0, me)?;
        match r.start(pid) {
            Ok(_) => Ok(true.into()),
            Err(err @ ProcessError::NotFound(_)) => Err(err.to_string()),
            Err(err) => {
                debug!(pid = %pid, error = %err, "child execution did not complete");
                Ok(false.into())
            }
        }
    });

    let r = rt.clone();
    ops.add("process", "spawn", move |args| {
        let pid = pid_arg(args, 0, me)?;
        r.spawn(pid).map_err(|err| err.to_string())?;
        Ok(true.into())
    });

    let r = rt.clone();
    ops.add("process", "kill", move |args| {
        let pid = pid_arg(args, 0, me)?;
        let previous = r.kill(pid).map_err(|err| err.to_string())?;
        Ok(previous.as_str().into())
    });

    let r = rt.clone();
    ops.add("process", "status", move |args| {
        let pid = pid_arg(args, 0, me)?;
        let status = r.status(pid).map_err(|err| err.to_string())?;
        Ok(status.as_str().into())
    });

    let r = rt.clone();
    ops.add("process", "set_file", move |args| {
        let path = str_arg(args, 0, "path")?;
        r.set_file(me, path).map_err(|err| err.to_string())?;
        Ok(BindingValue::Nil)
    });

    let r = rt.clone();
    ops.add("process", "reset_bindings_when_complete", move |args| {
        r.set_reset_bindings_when_complete(me, flag_arg(args, 0))
            .map_err(|err| err.to_string())?;
        Ok(BindingValue::Nil)
    });

    let r = rt.clone();
    ops.add("process", "pass_capabilities", move |args| {
        r.set_pass_capabilities_to_fork(me, flag_arg(args, 0))
            .map_err(|err| err.to_string())?;
        Ok(BindingValue::Nil)
    });

    let r = rt.clone();
    ops.add("process", "continuous", move |args| {
        r.set_continuous(me, flag_arg(args, 0))
            .map_err(|err| err.to_string())?;
        Ok(BindingValue::Nil)
    });

    let r = rt.clone();
    ops.add("process", "reset_bindings", move |_| {
        r.reset_bindings(me).map_err(|err| err.to_string())?;
        Ok(BindingValue::Nil)
    });
}

fn install_term(ops: &mut Installer<'_>, rt: &ProcessRuntime, entry: &Arc<ProcessEntry>) {
    let r = rt.clone();
    ops.add("term", "open", move |args| {
        let prefix = args.first().and_then(BindingValue::as_str);
        let terminal = r.terminals().open(prefix);
        Ok(terminal.id().get().into())
    });

    let r = rt.clone();
    ops.add("term", "close", move |args| {
        let id = terminal_arg(args, 0)?;
        Ok(r.terminals().close(id).is_ok().into())
    });

    let r = rt.clone();
    let me = entry.id;
    ops.add("term", "attach", move |args| {
        let id = terminal_arg(args, 0)?;
        let terminal = r
            .terminals()
            .get(id)
            .ok_or_else(|| format!("unknown terminal {id}"))?;
        r.set_stream(me, terminal).map_err(|err| err.to_string())?;
        Ok(true.into())
    });
}

fn install_event(ops: &mut Installer<'_>, rt: &ProcessRuntime) {
    let r = rt.clone();
    ops.add("event", "trigger", move |args| {
        let name = str_arg(args, 0, "event name")?;
        let params = args.iter().skip(1).map(ToString::to_string).collect();
        let delivered = r.bus().trigger(name, params).map_err(|err| err.to_string())?;
        Ok(i64::try_from(delivered).unwrap_or(i64::MAX).into())
    });

    let r = rt.clone();
    ops.add("event", "list", move |args| {
        let names: Vec<String> = match args.first().and_then(BindingValue::as_str) {
            Some(category) => r.bus().events_in(&EventCategory::from_name(category)),
            None => r.bus().event_types().into_iter().map(|(name, _)| name).collect(),
        };
        Ok(names
            .into_iter()
            .map(BindingValue::from)
            .collect::<Vec<_>>()
            .into())
    });

    let r = rt.clone();
    ops.add("event", "recent", move |args| {
        let limit = match args.first() {
            None | Some(BindingValue::Nil) => crate::bus::HISTORY_LEN,
            Some(v) => v
                .as_int()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| arg_error(0, "count"))?,
        };
        Ok(r.bus()
            .recent(limit)
            .iter()
            .map(|ev| {
                BindingValue::table([
                    ("name", ev.name().into()),
                    ("category", ev.category().as_str().into()),
                    (
                        "params",
                        ev.params()
                            .iter()
                            .map(|p| BindingValue::from(p.as_str()))
                            .collect::<Vec<_>>()
                            .into(),
                    ),
                ])
            })
            .collect::<Vec<_>>()
            .into())
    });

    let r = rt.clone();
    ops.add("event", "register", move |args| {
        let name = str_arg(args, 0, "event name")?;
        let category = EventCategory::from_name(str_arg(args, 1, "category")?);
        r.bus()
            .register_event_type(name, category)
            .map_err(|err| err.to_string())?;
        Ok(BindingValue::Nil)
    });
}

fn arg_error(index: usize, expected: &str) -> String {
    format!("bad argument #{} ({expected} expected)", index + 1)
}

fn str_arg<'a>(args: &'a [BindingValue], index: usize, expected: &str) -> Result<&'a str, String> {
    args.get(index)
        .and_then(BindingValue::as_str)
        .ok_or_else(|| arg_error(index, expected))
}

/// Missing flag arguments mean `true`, so `process.continuous()` turns it on.
fn flag_arg(args: &[BindingValue], index: usize) -> bool {
    args.get(index).map_or(true, BindingValue::truthy)
}

fn path_arg(entry: &ProcessEntry, args: &[BindingValue], index: usize) -> Result<VfsPath, String> {
    let raw = str_arg(args, index, "path")?;
    let cwd = entry.state.lock().working_dir.clone();
    cwd.resolve(raw).map_err(|err| err.to_string())
}

fn pid_arg(args: &[BindingValue], index: usize, current: ProcessId) -> Result<ProcessId, String> {
    match args.get(index) {
        None | Some(BindingValue::Nil) => Ok(current),
        Some(v) => v
            .as_int()
            .and_then(|n| u32::try_from(n).ok())
            .map(ProcessId::new)
            .ok_or_else(|| arg_error(index, "process id")),
    }
}

fn terminal_arg(args: &[BindingValue], index: usize) -> Result<TerminalId, String> {
    args.get(index)
        .and_then(BindingValue::as_int)
        .and_then(|n| u32::try_from(n).ok())
        .map(TerminalId::new)
        .ok_or_else(|| arg_error(index, "terminal id"))
}
