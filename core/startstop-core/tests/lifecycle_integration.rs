//! Integration tests driving the lifecycle machine on a real worker thread.

use startstop_core::{
    ConnectError, ExitReason, LifecycleControl, LifecycleMachine, LifecycleSettings,
    RuntimeEvent, RuntimeGateway, ScriptLauncher, ScriptRunner, ThreadPacer,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const TICK: Duration = Duration::from_millis(5);

/// Fails `failures` connects, then reports quit after `polls_before_quit`
/// empty polls (never, if `None`).
struct FlakyRuntime {
    failures: usize,
    polls_before_quit: Option<usize>,
    polls: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
}

impl RuntimeGateway for FlakyRuntime {
    fn connect(&mut self) -> Result<(), ConnectError> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(ConnectError::RuntimeNotRunning {
                expected: "vrserver".to_string(),
            });
        }
        Ok(())
    }

    fn poll_event(&mut self) -> Option<RuntimeEvent> {
        let seen = self.polls.fetch_add(1, Ordering::SeqCst);
        match self.polls_before_quit {
            Some(limit) if seen == limit => Some(RuntimeEvent::Quit),
            _ => None,
        }
    }

    fn acknowledge_shutdown(&mut self) {}

    fn disconnect(&mut self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<PathBuf>>>);

impl Recorder {
    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .0
            .lock()
            .unwrap()
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

impl ScriptLauncher for Recorder {
    fn launch(&self, script: &Path) -> io::Result<()> {
        self.0.lock().unwrap().push(script.to_path_buf());
        Ok(())
    }
}

fn write_script(dir: &Path, name: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(name), "exit 0\n").unwrap();
}

struct Setup {
    _temp: TempDir,
    settings: LifecycleSettings,
    recorder: Recorder,
    polls: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
}

fn setup() -> Setup {
    let temp = TempDir::new().unwrap();
    let settings = LifecycleSettings {
        start_dir: temp.path().join("start"),
        stop_dir: temp.path().join("stop"),
        retry_interval: TICK,
        poll_interval: TICK,
    };
    Setup {
        _temp: temp,
        settings,
        recorder: Recorder::default(),
        polls: Arc::new(AtomicUsize::new(0)),
        disconnects: Arc::new(AtomicUsize::new(0)),
    }
}

fn machine(
    s: &Setup,
    failures: usize,
    polls_before_quit: Option<usize>,
    control: LifecycleControl,
) -> LifecycleMachine<FlakyRuntime, Recorder, ThreadPacer> {
    LifecycleMachine::new(
        FlakyRuntime {
            failures,
            polls_before_quit,
            polls: Arc::clone(&s.polls),
            disconnects: Arc::clone(&s.disconnects),
        },
        ScriptRunner::with_launcher("*.cmd", s.recorder.clone()).unwrap(),
        ThreadPacer,
        control,
        s.settings.clone(),
    )
}

#[test]
fn full_lifecycle_on_worker_thread() {
    let s = setup();
    write_script(&s.settings.start_dir, "on-start.cmd");
    write_script(&s.settings.start_dir, "notes.txt");
    write_script(&s.settings.stop_dir, "on-stop.cmd");

    let control = LifecycleControl::new();
    let machine = machine(&s, 2, Some(3), control.clone());
    let (tx, rx) = mpsc::channel();
    let worker = thread::spawn(move || tx.send(machine.run()).unwrap());

    thread::sleep(TICK * 4);
    assert!(s.recorder.names().is_empty(), "scripts ran before ready");
    control.mark_ready();

    let outcome = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    worker.join().unwrap();

    assert_eq!(outcome.reason, ExitReason::ShutdownSignal);
    assert_eq!(outcome.connect_attempts, 3);
    assert_eq!(
        s.recorder.names(),
        vec!["on-start.cmd".to_string(), "on-stop.cmd".to_string()]
    );
    assert_eq!(s.disconnects.load(Ordering::SeqCst), 1);
}

#[test]
fn cancel_from_shell_thread_ends_the_wait() {
    let s = setup();
    write_script(&s.settings.stop_dir, "on-stop.cmd");

    let control = LifecycleControl::new();
    control.mark_ready();
    let machine = machine(&s, 0, None, control.clone());
    let (tx, rx) = mpsc::channel();
    let worker = thread::spawn(move || tx.send(machine.run()).unwrap());

    while s.polls.load(Ordering::SeqCst) < 3 {
        thread::sleep(TICK);
    }
    assert!(control.request_cancel());

    let outcome = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    worker.join().unwrap();

    assert_eq!(outcome.reason, ExitReason::Cancelled);
    assert!(outcome.stop.is_none());
    assert!(s.recorder.names().is_empty());
    assert_eq!(s.disconnects.load(Ordering::SeqCst), 1);
}

#[test]
fn no_stop_scripts_exits_without_polling() {
    let s = setup();
    write_script(&s.settings.start_dir, "a.cmd");
    write_script(&s.settings.start_dir, "b.cmd");

    let control = LifecycleControl::new();
    control.mark_ready();
    let outcome = machine(&s, 0, None, control).run();

    assert_eq!(outcome.reason, ExitReason::NoStopScripts);
    assert_eq!(outcome.start.unwrap().launched, 2);
    assert_eq!(outcome.stop.unwrap().found, 0);
    assert_eq!(s.polls.load(Ordering::SeqCst), 0);
    assert!(s.settings.stop_dir.is_dir());
}
