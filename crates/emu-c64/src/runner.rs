//! Worker-thread front end.
//!
//! [`C64Runner`] moves a [`C64`] onto its own thread and talks to it over
//! bounded crossbeam channels: commands in, frames, audio blocks and events
//! out. Commands are applied between `run_frame` calls, which always return
//! at an instruction boundary.
//!
//! A full frame queue holds the worker for at most one frame period before
//! the frame is dropped; a full audio queue drops the block at once. Both
//! are counted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{
    Receiver, SendTimeoutError, Sender, TryRecvError, TrySendError, bounded,
};
use emu_core::{MasterClock, Ticks};
use log::{debug, warn};

use crate::c64::{C64, HaltHandle, StopReason};
use crate::config::C64Config;
use crate::disk::{Disk, TrackWarning};
use crate::error::C64Error;
use crate::input::ControlPort;
use crate::keyboard::C64Key;

const COMMAND_QUEUE: usize = 64;
const EVENT_QUEUE: usize = 32;

/// Requests to the worker.
#[derive(Debug)]
pub enum Command {
    Run,
    Halt,
    /// Execute one instruction (while halted).
    Step,
    Reset,
    AddBreakpoint(u16),
    RemoveBreakpoint(u16),
    ToggleBreakpoint(u16),
    SetSoftBreakpoint(u16),
    /// A disk decoded on the caller's thread.
    InsertDisk(Box<Disk>),
    EjectDisk,
    Key(C64Key, bool),
    Joystick(ControlPort, u8),
    Capture,
    Restore(Vec<u8>),
    Shutdown,
}

/// Notifications from the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A run ended for a reason other than a completed frame.
    Stopped(StopReason),
    /// A `Step` finished with the CPU at `pc`.
    Stepped { pc: u16 },
    /// Reply to `Capture`.
    Snapshot(Vec<u8>),
    /// Reply to a successful `Restore`.
    Restored,
    DiskInserted(Vec<TrackWarning>),
    Error(C64Error),
}

/// A completed video frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Machine frame counter when the frame was taken.
    pub number: u64,
    pub width: u32,
    pub height: u32,
    /// ARGB32 pixels, row-major.
    pub pixels: Vec<u32>,
}

#[derive(Debug, Default)]
struct Stats {
    frames_dropped: AtomicU64,
    audio_dropped: AtomicU64,
}

/// Handle to a machine running on a worker thread.
pub struct C64Runner {
    commands: Sender<Command>,
    frames: Receiver<Frame>,
    audio: Receiver<Vec<i16>>,
    events: Receiver<Event>,
    halt: HaltHandle,
    stats: Arc<Stats>,
    worker: Option<JoinHandle<C64>>,
}

impl C64Runner {
    /// Start the worker. Queue capacities come from `config`; the machine
    /// starts halted.
    pub fn spawn(c64: C64, config: &C64Config) -> std::io::Result<Self> {
        let (cmd_tx, cmd_rx) = bounded(COMMAND_QUEUE);
        let (frame_tx, frame_rx) = bounded(config.frame_queue.max(1));
        let (audio_tx, audio_rx) = bounded(config.audio_queue.max(1));
        let (event_tx, event_rx) = bounded(EVENT_QUEUE);
        let stats = Arc::new(Stats::default());
        let halt = c64.halt_handle();

        let model = c64.model();
        let frame_period = MasterClock::new(u64::from(model.cpu_frequency()))
            .duration_of(Ticks::new(u64::from(model.cycles_per_frame())));
        let worker = Worker {
            commands: cmd_rx,
            frames: frame_tx,
            audio: audio_tx,
            events: event_tx,
            stats: Arc::clone(&stats),
            frame_period,
            running: false,
        };
        let handle = thread::Builder::new()
            .name("c64-core".into())
            .spawn(move || worker.run(c64))?;

        Ok(Self {
            commands: cmd_tx,
            frames: frame_rx,
            audio: audio_rx,
            events: event_rx,
            halt,
            stats,
            worker: Some(handle),
        })
    }

    /// Queue a command. Returns false if the worker has gone.
    pub fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn run(&self) -> bool {
        self.send(Command::Run)
    }

    /// Stop at the next instruction boundary, even mid-frame.
    pub fn halt(&self) -> bool {
        self.halt.halt();
        self.send(Command::Halt)
    }

    pub fn step(&self) -> bool {
        self.send(Command::Step)
    }

    pub fn reset(&self) -> bool {
        self.send(Command::Reset)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.halt.is_running()
    }

    #[must_use]
    pub fn frames(&self) -> &Receiver<Frame> {
        &self.frames
    }

    #[must_use]
    pub fn audio(&self) -> &Receiver<Vec<i16>> {
        &self.audio
    }

    #[must_use]
    pub fn events(&self) -> &Receiver<Event> {
        &self.events
    }

    #[must_use]
    pub fn dropped_frames(&self) -> u64 {
        self.stats.frames_dropped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn dropped_audio_blocks(&self) -> u64 {
        self.stats.audio_dropped.load(Ordering::Relaxed)
    }

    /// Stop the worker and take the machine back.
    pub fn shutdown(mut self) -> Option<C64> {
        self.stop_worker()
    }

    fn stop_worker(&mut self) -> Option<C64> {
        let worker = self.worker.take()?;
        self.halt.halt();
        let _ = self.commands.send(Command::Shutdown);
        worker.join().ok()
    }
}

impl Drop for C64Runner {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

struct Worker {
    commands: Receiver<Command>,
    frames: Sender<Frame>,
    audio: Sender<Vec<i16>>,
    events: Sender<Event>,
    stats: Arc<Stats>,
    frame_period: Duration,
    running: bool,
}

impl Worker {
    fn run(mut self, c64: C64) -> C64 {
        let c64 = self.serve(c64);
        c64.halt_handle().clear_request();
        c64
    }

    fn serve(&mut self, mut c64: C64) -> C64 {
        loop {
            if self.running {
                loop {
                    match self.commands.try_recv() {
                        Ok(Command::Shutdown) | Err(TryRecvError::Disconnected) => return c64,
                        Ok(command) => self.apply(&mut c64, command),
                        Err(TryRecvError::Empty) => break,
                    }
                }
                if self.running {
                    self.run_frame(&mut c64);
                }
            } else {
                match self.commands.recv() {
                    Ok(Command::Shutdown) | Err(_) => return c64,
                    Ok(command) => self.apply(&mut c64, command),
                }
            }
        }
    }

    fn run_frame(&mut self, c64: &mut C64) {
        match c64.run_frame() {
            Ok(StopReason::FrameComplete) => {
                self.publish_frame(c64);
                self.publish_audio(c64);
            }
            Ok(reason) => {
                self.running = false;
                self.publish_audio(c64);
                self.emit(Event::Stopped(reason));
            }
            Err(e) => {
                self.running = false;
                self.emit(Event::Error(e));
            }
        }
    }

    fn apply(&mut self, c64: &mut C64, command: Command) {
        debug!("runner command: {command:?}");
        match command {
            Command::Run => {
                c64.halt_handle().clear_request();
                self.running = true;
            }
            Command::Halt => {
                c64.halt_handle().clear_request();
                if self.running {
                    self.running = false;
                    self.emit(Event::Stopped(StopReason::Halted));
                }
            }
            Command::Step => match c64.step_instruction() {
                Ok(_) => self.emit(Event::Stepped { pc: c64.pc() }),
                Err(e) => self.emit(Event::Error(e)),
            },
            Command::Reset => c64.reset(),
            Command::AddBreakpoint(addr) => c64.add_breakpoint(addr),
            Command::RemoveBreakpoint(addr) => {
                c64.remove_breakpoint(addr);
            }
            Command::ToggleBreakpoint(addr) => {
                c64.toggle_breakpoint(addr);
            }
            Command::SetSoftBreakpoint(addr) => c64.set_soft_breakpoint(addr),
            Command::InsertDisk(disk) => match c64.insert_disk_image(*disk) {
                Ok(warnings) => self.emit(Event::DiskInserted(warnings)),
                Err(e) => self.emit(Event::Error(e)),
            },
            Command::EjectDisk => {
                c64.eject_disk();
            }
            Command::Key(key, pressed) => c64.set_key(key, pressed),
            Command::Joystick(port, switches) => c64.set_joystick(port, switches),
            Command::Capture => match c64.capture() {
                Ok(snap) => self.emit(Event::Snapshot(snap)),
                Err(e) => self.emit(Event::Error(e)),
            },
            Command::Restore(bytes) => match c64.restore(&bytes) {
                Ok(()) => self.emit(Event::Restored),
                Err(e) => self.emit(Event::Error(e)),
            },
            // Handled by the loop
            Command::Shutdown => {}
        }
    }

    fn publish_frame(&self, c64: &C64) {
        let frame = Frame {
            number: c64.frames(),
            width: c64.framebuffer_width(),
            height: c64.framebuffer_height(),
            pixels: c64.framebuffer().to_vec(),
        };
        match self.frames.send_timeout(frame, self.frame_period) {
            Ok(()) | Err(SendTimeoutError::Disconnected(_)) => {}
            Err(SendTimeoutError::Timeout(frame)) => {
                let dropped = self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!("frame {} dropped ({dropped} total)", frame.number);
            }
        }
    }

    fn publish_audio(&self, c64: &mut C64) {
        let samples = c64.take_audio();
        if samples.is_empty() {
            return;
        }
        if let Err(TrySendError::Full(_)) = self.audio.try_send(samples) {
            self.stats.audio_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn emit(&self, event: Event) {
        if let Err(TrySendError::Full(_)) = self.events.try_send(event) {
            warn!("event queue full, event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RomSet;
    use std::time::Instant;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn config(frame_queue: usize) -> C64Config {
        let mut kernal = vec![0xEA; 8192];
        // $E000: INX; JMP $E000
        kernal[..4].copy_from_slice(&[0xE8, 0x4C, 0x00, 0xE0]);
        kernal[0x1FFC] = 0x00;
        kernal[0x1FFD] = 0xE0;
        C64Config {
            roms: RomSet {
                basic: vec![0; 8192],
                kernal,
                chargen: vec![0; 4096],
                drive: None,
            },
            frame_queue,
            ..C64Config::default()
        }
    }

    fn spawn(frame_queue: usize) -> C64Runner {
        let cfg = config(frame_queue);
        let c64 = C64::new(&cfg).expect("valid ROMs");
        C64Runner::spawn(c64, &cfg).expect("spawn worker")
    }

    fn next_event(runner: &C64Runner) -> Event {
        runner.events().recv_timeout(TIMEOUT).expect("event")
    }

    #[test]
    fn frames_flow_while_running() {
        let runner = spawn(2);
        assert!(runner.run());
        let first = runner.frames().recv_timeout(TIMEOUT).expect("frame");
        let second = runner.frames().recv_timeout(TIMEOUT).expect("frame");
        assert_eq!(second.number, first.number + 1);
        assert_eq!(first.pixels.len(), first.width as usize * first.height as usize);
        assert!(runner.halt());
        assert_eq!(next_event(&runner), Event::Stopped(StopReason::Halted));
        let c64 = runner.shutdown().expect("machine back");
        assert!(c64.frames() >= 2);
    }

    #[test]
    fn breakpoint_stops_the_worker() {
        let runner = spawn(2);
        runner.send(Command::AddBreakpoint(0xE001));
        runner.run();
        assert_eq!(next_event(&runner), Event::Stopped(StopReason::Breakpoint(0xE001)));
        runner.step();
        assert_eq!(next_event(&runner), Event::Stepped { pc: 0xE000 });
    }

    #[test]
    fn capture_and_restore_over_the_queue() {
        let runner = spawn(2);
        runner.send(Command::SetSoftBreakpoint(0xE001));
        runner.run();
        assert_eq!(next_event(&runner), Event::Stopped(StopReason::Breakpoint(0xE001)));
        runner.send(Command::Capture);
        let Event::Snapshot(snap) = next_event(&runner) else {
            panic!("expected a snapshot");
        };
        runner.send(Command::Restore(snap.clone()));
        assert_eq!(next_event(&runner), Event::Restored);
        runner.send(Command::Restore(b"junk".to_vec()));
        assert_eq!(next_event(&runner), Event::Error(C64Error::BadMagic));

        let c64 = runner.shutdown().expect("machine back");
        assert_eq!(c64.capture().expect("capture"), snap);
    }

    #[test]
    fn full_frame_queue_drops_frames() {
        let runner = spawn(1);
        runner.run();
        let deadline = Instant::now() + TIMEOUT;
        while runner.dropped_frames() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(runner.dropped_frames() > 0);
        runner.halt();
        assert_eq!(next_event(&runner), Event::Stopped(StopReason::Halted));
    }

    #[test]
    fn dropping_the_runner_stops_the_worker() {
        let runner = spawn(2);
        runner.run();
        drop(runner);
    }
}
