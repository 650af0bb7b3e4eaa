//! Plays a paradigm on a board.
//!
//! The [`Scheduler`] owns the loaded [`Paradigm`], turns it into one
//! [`EventThread`] per row plus the [`BarrierSet`] they meet at, and runs
//! them all under one supervisor thread. Stopping cancels every event,
//! aborts every barrier, joins every thread and writes 0 to every channel
//! the paradigm uses.

use crate::barrier::{quantize, BarrierSet};
use crate::board::{PinNumber, SharedBoard};
use crate::cancel::CancelToken;
use crate::channel::HardwareChannel;
use crate::clock::Clock;
use crate::error::{LearnMemError, Result};
use crate::event_thread::{Completion, EventKind, EventSpec, EventThread, Outcome};
use crate::firmata::PinMode;
use crate::paradigm::{normalize_hardware, HardwareEventRow, Mapping, Paradigm, ParadigmLoader};
use crate::pin_state::PinState;
use crate::result_writer::SharedSink;
use crate::status::{Runnable, SettingsBridge, Status, StatusCell};

use log::{error, info, warn};
use std::{
    collections::BTreeMap,
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

/// Event threads poll the clock this often unless configured otherwise.
pub const DEFAULT_SAMPLING_RATE: f64 = 10.0;

/// A built, not yet started schedule.
#[derive(Debug)]
pub struct Schedule {
    events: Vec<EventSpec>,
    barriers: Arc<BarrierSet>,
    duration: f64,
}

impl Schedule {
    pub fn events(&self) -> &[EventSpec] {
        &self.events
    }

    pub fn barriers(&self) -> &BarrierSet {
        &self.barriers
    }

    /// Length of the schedule in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }
}

/// A channel the schedule drives, with the mode it is driven in.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ChannelSetup {
    pin: PinNumber,
    mode: PinMode,
}

pub struct Scheduler {
    board: SharedBoard,
    pins: PinState,
    clock: Clock,
    cancel: CancelToken,
    halt: CancelToken,
    status: Arc<StatusCell>,
    sink: Option<SharedSink>,
    sampling_rate: f64,
    max_duration: Option<f64>,
    mapping: Mapping,
    paradigm: Option<Paradigm>,
    schedule: Option<Schedule>,
    channels: BTreeMap<String, ChannelSetup>,
    completion: Arc<Completion>,
    supervisor: Option<JoinHandle<()>>,
    toggled: bool,
    final_progress: Option<f64>,
}

impl Scheduler {
    /// A scheduler driving `board`, stopped by `cancel` or by its own
    /// [`Scheduler::stop`].
    pub fn new(board: SharedBoard, cancel: CancelToken) -> Self {
        Self {
            board,
            pins: PinState::new(),
            clock: Clock::wall(),
            halt: cancel.child(),
            cancel,
            status: Arc::new(StatusCell::new()),
            sink: None,
            sampling_rate: DEFAULT_SAMPLING_RATE,
            max_duration: None,
            mapping: Mapping::default(),
            paradigm: None,
            schedule: None,
            channels: BTreeMap::new(),
            completion: Arc::new(Completion::new(0)),
            supervisor: None,
            toggled: false,
            final_progress: None,
        }
    }

    /// How many times per second event threads check the clock.
    pub fn sampling_rate(mut self, hz: f64) -> Self {
        self.set_sampling_rate(hz);
        self
    }

    /// Bound the whole schedule to `seconds`.
    pub fn max_duration(mut self, seconds: Option<f64>) -> Self {
        self.max_duration = seconds.filter(|d| *d > 0.0);
        self
    }

    /// Use `clock` instead of the wall clock.
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Share pin state with the tracker or a monitor.
    pub fn pin_state_handle(mut self, pins: PinState) -> Self {
        self.pins = pins;
        self
    }

    /// Log every channel change to `sink`.
    pub fn sink(mut self, sink: SharedSink) -> Self {
        self.sink = Some(sink);
        self
    }

    fn set_sampling_rate(&mut self, hz: f64) -> bool {
        if hz.is_finite() && hz > 0.0 {
            self.sampling_rate = hz;
            true
        } else {
            warn!("Ignoring sampling rate {}", hz);
            false
        }
    }

    fn ensure_not_running(&self, action: &str) -> Result<()> {
        if self.status.get() == Status::Running {
            return Err(LearnMemError::Configuration(format!(
                "cannot {} while the schedule is running",
                action
            )));
        }
        Ok(())
    }

    /// Validate `rows` (in seconds) against `mapping` and keep the result.
    pub fn load_paradigm(
        &mut self,
        rows: &[HardwareEventRow],
        mapping: Mapping,
    ) -> Result<&Paradigm> {
        let paradigm = ParadigmLoader::new(mapping.clone()).load_rows(rows)?;
        self.load(paradigm, mapping)
    }

    /// Keep an already loaded paradigm and the mapping it was resolved
    /// against.
    pub fn load(&mut self, paradigm: Paradigm, mapping: Mapping) -> Result<&Paradigm> {
        self.ensure_not_running("load a paradigm")?;
        if let Some(previous) = self.supervisor.take() {
            if previous.join().is_err() {
                error!("Scheduler supervisor panicked");
            }
        }
        if paradigm.is_empty() {
            warn!("Loaded paradigm has no events");
        }

        // A pin in OUTPUT mode ignores analog writes, so one PWM row puts
        // its whole channel in PWM mode.
        let mut channels: BTreeMap<String, ChannelSetup> = BTreeMap::new();
        for event in paradigm.events() {
            let mode = event.row.mode();
            channels
                .entry(event.row.hardware.clone())
                .and_modify(|setup| {
                    if mode == PinMode::Pwm {
                        setup.mode = PinMode::Pwm;
                    }
                })
                .or_insert(ChannelSetup {
                    pin: event.pin,
                    mode,
                });
        }
        for hardware in channels.keys() {
            if self.pins.get(hardware).is_none() {
                self.pins.set(hardware, 0.0);
            }
        }

        self.channels = channels;
        self.mapping = mapping;
        self.schedule = None;
        self.status.reset();
        self.final_progress = None;
        self.halt = self.cancel.child();
        Ok(self.paradigm.insert(paradigm))
    }

    pub fn paradigm(&self) -> Option<&Paradigm> {
        self.paradigm.as_ref()
    }

    /// The schedule length: the last event end, bounded by the configured
    /// maximum.
    pub fn duration(&self) -> f64 {
        let paradigm = self.paradigm.as_ref().map(Paradigm::duration).unwrap_or(0.0);
        match self.max_duration {
            Some(max) => paradigm.min(max),
            None => paradigm,
        }
    }

    /// Turn the loaded paradigm into event specs and barriers. Touches no
    /// hardware.
    pub fn build(&mut self) -> Result<&Schedule> {
        self.ensure_not_running("rebuild the schedule")?;
        let paradigm = self.paradigm.as_ref().ok_or_else(|| {
            LearnMemError::Configuration("no paradigm loaded".to_owned())
        })?;
        let duration = self.duration();

        let mut events = Vec::new();
        for event in paradigm.events() {
            let row = &event.row;
            let end = row.end.min(duration);
            if quantize(end) <= quantize(row.start) {
                warn!(
                    "{}#{} starts after the schedule ends, skipping",
                    row.hardware, event.index
                );
                continue;
            }
            events.push(EventSpec {
                index: event.index,
                hardware: row.hardware.clone(),
                pin: event.pin,
                start: row.start,
                end,
                value: row.value,
                kind: EventKind::for_window(row.start, end, row.duty_cycle()),
            });
        }
        let barriers = Arc::new(BarrierSet::from_windows(
            events.iter().map(|e| (e.start, e.end)),
        ));

        info!(
            "Schedule built: {} events, {} barriers, {:.1}s",
            events.len(),
            barriers.len(),
            duration
        );
        self.status.ready();
        Ok(self.schedule.insert(Schedule {
            events,
            barriers,
            duration,
        }))
    }

    /// Start every event thread with `t0` as time zero. Starting a running
    /// schedule only logs a warning.
    pub fn start_at(&mut self, t0: Instant) -> Result<()> {
        match self.status.get() {
            Status::Running => {
                warn!("Scheduler is already running");
                return Ok(());
            }
            Status::Stopped => {
                warn!("Scheduler was stopped, load a paradigm to run again");
                return Ok(());
            }
            Status::Idle | Status::Ready => {}
        }
        if self.schedule.is_none() {
            self.build()?;
        }
        let Some(schedule) = self.schedule.as_ref() else {
            return Ok(());
        };

        for (hardware, setup) in &self.channels {
            if let Err(e) = self.channel(hardware, *setup).configure() {
                warn!("{} : could not configure pin {}: {}", hardware, setup.pin, e);
            }
        }

        let poll = Duration::from_secs_f64(1.0 / self.sampling_rate);
        let completion = Arc::new(Completion::new(schedule.events.len()));
        let mut threads = Vec::new();
        for spec in &schedule.events {
            let (Some(start_barrier), Some(end_barrier)) = (
                schedule.barriers.get(spec.start),
                schedule.barriers.get(spec.end),
            ) else {
                error!("{}#{} has no barrier", spec.hardware, spec.index);
                completion.done();
                continue;
            };
            let setup = self.channels.get(&spec.hardware).copied().unwrap_or(ChannelSetup {
                pin: spec.pin,
                mode: PinMode::for_value(spec.value),
            });
            threads.push(EventThread::new(
                spec.clone(),
                self.channel(&spec.hardware, setup),
                start_barrier,
                end_barrier,
                self.clock.clone(),
                self.halt.clone(),
                poll,
                completion.clone(),
            ));
        }

        self.clock.start(t0);
        self.status.run(t0);
        self.completion = completion;

        let status = self.status.clone();
        let barriers = schedule.barriers.clone();
        let halt = self.halt.clone();
        self.supervisor = Some(thread::spawn(move || {
            supervise(threads, barriers, halt);
            status.stop();
            info!("Scheduler : terminated.");
        }));
        info!("Scheduler : started");
        Ok(())
    }

    fn channel(&self, hardware: &str, setup: ChannelSetup) -> HardwareChannel {
        HardwareChannel::new(
            hardware,
            setup.pin,
            setup.mode,
            self.board.clone(),
            self.pins.clone(),
            self.clock.clone(),
        )
        .with_events(self.sink.clone())
    }

    /// Advance an externally driven clock to `elapsed` seconds.
    pub fn tick(&self, elapsed: f64) {
        self.clock.tick(elapsed);
    }

    /// A copy of the live hardware-name to value table.
    pub fn pin_state(&self) -> BTreeMap<String, f64> {
        self.pins.snapshot()
    }

    /// A handle onto the live pin state.
    pub fn pins(&self) -> PinState {
        self.pins.clone()
    }

    /// Percentage of the schedule elapsed: 0 before start, frozen at stop.
    pub fn progress(&self) -> f64 {
        if let Some(progress) = self.final_progress {
            return progress;
        }
        match self.status.get() {
            Status::Idle | Status::Ready => 0.0,
            Status::Running | Status::Stopped => {
                let duration = self.duration();
                if duration <= 0.0 {
                    100.0
                } else {
                    (100.0 * self.clock.elapsed() / duration).clamp(0.0, 100.0)
                }
            }
        }
    }

    /// Drive a mapped channel by hand, outside of the schedule.
    pub fn toggle(&mut self, hardware: &str, value: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&value) {
            return Err(LearnMemError::Configuration(format!(
                "value {} is outside [0, 1]",
                value
            )));
        }
        let hardware = normalize_hardware(hardware);
        let pin = self.mapping.resolve(&hardware).ok_or_else(|| {
            LearnMemError::Configuration(format!("{} is not in the mapping", hardware))
        })?;
        let wanted = PinMode::for_value(value);
        let setup = match self.channels.get(&hardware).copied() {
            Some(setup) if setup.mode == PinMode::Pwm || wanted == PinMode::Digital => setup,
            _ => {
                let setup = ChannelSetup { pin, mode: wanted };
                self.channels.insert(hardware.clone(), setup);
                if let Err(e) = self.channel(&hardware, setup).configure() {
                    warn!("{} : could not configure pin {}: {}", hardware, pin, e);
                }
                setup
            }
        };
        self.toggled = true;
        info!("{} : toggled to {}", hardware, value);
        self.channel(&hardware, setup).write(value)
    }

    /// Block until every event thread has finished.
    pub fn wait(&self) {
        self.completion.wait();
    }

    /// Like [`Scheduler::wait`], giving up after `timeout`. Returns whether
    /// every event thread finished.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.completion.wait_timeout(timeout)
    }

    /// Whether the schedule ran to its end on its own.
    pub fn is_finished(&self) -> bool {
        self.supervisor.is_some() && self.completion.remaining() == 0
    }

    /// Cancel, join and power down. Safe in any state and more than once.
    pub fn shutdown(&mut self) {
        let Some(supervisor) = self.supervisor.take() else {
            if self.toggled {
                self.power_down();
                self.toggled = false;
            }
            return;
        };

        self.final_progress = Some(self.progress());
        self.halt.cancel();
        if let Some(schedule) = &self.schedule {
            schedule.barriers.abort_all();
        }
        if supervisor.join().is_err() {
            error!("Scheduler supervisor panicked");
        }
        self.status.stop();
        self.power_down();
        self.toggled = false;
    }

    fn power_down(&self) {
        for (hardware, setup) in &self.channels {
            if let Err(e) = self.channel(hardware, *setup).turn_off() {
                error!("{} : could not be turned off: {}", hardware, e);
            }
        }
        self.pins.zero_all();
    }
}

/// Run every event thread and wait for all of them.
fn supervise(threads: Vec<EventThread>, barriers: Arc<BarrierSet>, halt: CancelToken) {
    let mut handles = Vec::new();
    for event in threads {
        let name = format!("{}#{}", event.spec().hardware, event.spec().index);
        match thread::Builder::new().name(name.clone()).spawn(move || event.run()) {
            Ok(handle) => handles.push((name, handle)),
            Err(e) => {
                // a missing party would hold its barriers forever
                error!("{} : could not spawn: {}", name, e);
                halt.cancel();
                barriers.abort_all();
            }
        }
    }

    let mut cancelled = 0;
    for (name, handle) in handles {
        match handle.join() {
            Ok(Outcome::Completed) => {}
            Ok(Outcome::Cancelled) => cancelled += 1,
            Err(_) => error!("{} : panicked", name),
        }
    }
    if cancelled > 0 {
        info!("Scheduler : {} events cancelled", cancelled);
    }
}

impl Runnable for Scheduler {
    fn start(&mut self) {
        if let Err(e) = self.start_at(Instant::now()) {
            error!("Scheduler could not start: {}", e);
        }
    }

    fn stop(&mut self) {
        self.shutdown();
    }

    fn status(&self) -> Status {
        self.status.get()
    }
}

const SCHEDULER_KEYS: &[&str] = &["sampling_rate", "duration"];

impl SettingsBridge for Scheduler {
    fn get(&self, key: &str) -> Option<f64> {
        match key {
            "sampling_rate" => Some(self.sampling_rate),
            "duration" => Some(self.duration()),
            _ => None,
        }
    }

    fn set(&mut self, key: &str, value: f64) -> bool {
        if self.status.get() == Status::Running {
            warn!("Ignoring {} = {} while running", key, value);
            return false;
        }
        match key {
            "sampling_rate" => self.set_sampling_rate(value),
            "duration" if value > 0.0 => {
                self.max_duration = Some(value);
                self.schedule = None;
                true
            }
            _ => false,
        }
    }

    fn keys(&self) -> &'static [&'static str] {
        SCHEDULER_KEYS
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{self, DummyBoard, WriteHistory};
    use crate::result_writer::{self, MemorySink};

    fn mapping() -> Mapping {
        Mapping::from_pairs([("ODOR_A", 2), ("ODOR_B", 3), ("SHOCK", 4), ("LED", 13)])
    }

    fn scheduler() -> (Scheduler, WriteHistory) {
        let dummy = DummyBoard::new();
        let history = dummy.history();
        let scheduler = Scheduler::new(board::shared(dummy), CancelToken::new()).sampling_rate(200.0);
        (scheduler, history)
    }

    #[test]
    fn simultaneous_starts_fire_together() {
        let (mut scheduler, history) = scheduler();
        let rows = [
            HardwareEventRow::new("ODOR_A", 0.1, 0.3),
            HardwareEventRow::new("ODOR_B", 0.1, 0.3),
            HardwareEventRow::new("SHOCK", 0.1, 0.2),
            HardwareEventRow::new("LED", 0.2, 0.3),
        ];
        scheduler.load_paradigm(&rows, mapping()).unwrap();
        scheduler.start_at(Instant::now()).unwrap();
        assert!(scheduler.wait_timeout(Duration::from_secs(5)));

        let on_times: Vec<Instant> = [2, 3, 4]
            .iter()
            .map(|&pin| history.writes_for(pin)[0].at)
            .collect();
        let first = on_times.iter().min().unwrap();
        let last = on_times.iter().max().unwrap();
        assert!(last.duration_since(*first) < Duration::from_millis(5));
        assert_eq!(history.last_value(13), Some(0.0));
    }

    #[test]
    fn stop_powers_down_every_channel() {
        let (mut scheduler, history) = scheduler();
        let rows = [
            HardwareEventRow::new("ODOR_A", 0.0, 60.0),
            HardwareEventRow::new("SHOCK", 0.0, 60.0).with_wave(0.01, 0.01),
            HardwareEventRow::new("LED", 30.0, 60.0),
        ];
        scheduler.load_paradigm(&rows, mapping()).unwrap();
        scheduler.start_at(Instant::now()).unwrap();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(scheduler.pin_state()["ODOR_A"], 1.0);

        scheduler.stop();

        for pin in [2, 4, 13] {
            assert_eq!(history.last_value(pin), Some(0.0), "pin {}", pin);
        }
        assert!(scheduler.pin_state().values().all(|&v| v == 0.0));
        assert_eq!(scheduler.status(), Status::Stopped);
    }

    #[test]
    fn duty_cycle_runs_whole_cycles() {
        let (mut scheduler, history) = scheduler();
        let rows = [HardwareEventRow::new("SHOCK", 0.0, 1.0).with_wave(0.2, 0.3)];
        scheduler.load_paradigm(&rows, mapping()).unwrap();
        scheduler.start_at(Instant::now()).unwrap();
        assert!(scheduler.wait_timeout(Duration::from_secs(5)));

        let values: Vec<f64> = history.writes_for(4).iter().map(|w| w.value).collect();
        assert_eq!(values.iter().filter(|&&v| v == 1.0).count(), 2);
        assert_eq!(values.last(), Some(&0.0));
    }

    #[test]
    fn half_duty_cycle_rows_make_no_thread() {
        let (mut scheduler, _) = scheduler();
        let mut half = HardwareEventRow::new("SHOCK", 0.0, 1.0);
        half.on = Some(0.5);
        let rows = [half, HardwareEventRow::new("LED", 0.0, 1.0)];
        scheduler.load_paradigm(&rows, mapping()).unwrap();
        let schedule = scheduler.build().unwrap();
        assert_eq!(schedule.events().len(), 1);
        assert_eq!(schedule.events()[0].hardware, "LED");
    }

    #[test]
    fn stop_without_start_is_a_no_op() {
        let (mut scheduler, history) = scheduler();
        scheduler.stop();
        scheduler.stop();
        assert_eq!(scheduler.status(), Status::Idle);

        scheduler
            .load_paradigm(&[HardwareEventRow::new("LED", 0.0, 1.0)], mapping())
            .unwrap();
        scheduler.stop();
        scheduler.stop();
        assert!(history.writes().is_empty());
    }

    #[test]
    fn second_start_is_ignored() {
        let (mut scheduler, history) = scheduler();
        scheduler
            .load_paradigm(&[HardwareEventRow::new("LED", 0.0, 0.1)], mapping())
            .unwrap();
        scheduler.start_at(Instant::now()).unwrap();
        scheduler.start_at(Instant::now()).unwrap();
        assert!(scheduler.wait_timeout(Duration::from_secs(5)));
        assert_eq!(history.writes_for(13).len(), 2);
    }

    #[test]
    fn global_duration_bounds_events() {
        let (scheduler, _) = scheduler();
        let mut scheduler = scheduler.max_duration(Some(1.0));
        let rows = [
            HardwareEventRow::new("LED", 0.0, 5.0),
            HardwareEventRow::new("SHOCK", 2.0, 3.0),
        ];
        scheduler.load_paradigm(&rows, mapping()).unwrap();
        let schedule = scheduler.build().unwrap();
        assert_eq!(schedule.events().len(), 1);
        assert_eq!(schedule.events()[0].end, 1.0);
        assert_eq!(schedule.barriers().parties(1.0), 1);
    }

    #[test]
    fn clamped_windows_under_a_millisecond_are_skipped() {
        let (scheduler, _) = scheduler();
        let mut scheduler = scheduler.max_duration(Some(1.0004));
        let rows = [
            HardwareEventRow::new("LED", 0.0, 5.0),
            HardwareEventRow::new("SHOCK", 1.0, 3.0),
        ];
        scheduler.load_paradigm(&rows, mapping()).unwrap();
        let schedule = scheduler.build().unwrap();
        assert_eq!(schedule.events().len(), 1);
        assert_eq!(schedule.events()[0].hardware, "LED");
        assert_eq!(schedule.barriers().parties(1.0), 1);
    }

    #[test]
    fn blink_shorter_than_a_millisecond_does_not_hold_others() {
        let (mut scheduler, history) = scheduler();
        let rows = [
            HardwareEventRow::new("LED", 0.0, 0.0004),
            HardwareEventRow::new("SHOCK", 0.0, 0.2),
        ];
        scheduler.load_paradigm(&rows, mapping()).unwrap();
        assert_eq!(scheduler.build().unwrap().barriers().parties(0.0), 1);
        scheduler.start_at(Instant::now()).unwrap();
        assert!(scheduler.wait_timeout(Duration::from_secs(2)));
        let shock: Vec<f64> = history.writes_for(4).iter().map(|w| w.value).collect();
        assert_eq!(shock, vec![1.0, 0.0]);
        assert!(history.writes_for(13).is_empty());
    }

    #[test]
    fn pwm_row_puts_its_channel_in_pwm_mode() {
        let (mut scheduler, history) = scheduler();
        let rows = [
            HardwareEventRow::new("LED", 0.0, 0.05),
            HardwareEventRow::new("LED", 0.05, 0.1).with_value(0.5),
            HardwareEventRow::new("SHOCK", 0.0, 0.1),
        ];
        scheduler.load_paradigm(&rows, mapping()).unwrap();
        scheduler.start_at(Instant::now()).unwrap();
        assert!(scheduler.wait_timeout(Duration::from_secs(5)));

        let modes = history.modes();
        assert!(modes.contains(&(13, PinMode::Pwm)));
        assert!(modes.contains(&(4, PinMode::Digital)));
        assert!(!modes.contains(&(13, PinMode::Digital)));
        // every write to a pin matches the mode it was configured in
        assert!(history.writes_for(13).iter().all(|w| w.mode == PinMode::Pwm));
        let values: Vec<f64> = history.writes_for(13).iter().map(|w| w.value).collect();
        assert!(values.contains(&0.5));
        assert_eq!(values.last(), Some(&0.0));
    }

    #[test]
    fn failing_channel_does_not_disturb_the_others() {
        let dummy = DummyBoard::new().failing_on(4);
        let history = dummy.history();
        let mut scheduler =
            Scheduler::new(board::shared(dummy), CancelToken::new()).sampling_rate(200.0);
        let rows = [
            HardwareEventRow::new("SHOCK", 0.0, 0.2),
            HardwareEventRow::new("ODOR_A", 0.0, 0.2),
            HardwareEventRow::new("LED", 0.1, 0.3),
        ];
        scheduler.load_paradigm(&rows, mapping()).unwrap();
        let t0 = Instant::now();
        scheduler.start_at(t0).unwrap();
        assert!(scheduler.wait_timeout(Duration::from_secs(5)));
        assert!(scheduler.is_finished());

        assert!(history.writes_for(4).is_empty());
        assert_eq!(scheduler.pin_state()["SHOCK"], 0.0);

        let odor = history.writes_for(2);
        assert_eq!(odor.iter().map(|w| w.value).collect::<Vec<_>>(), vec![1.0, 0.0]);
        let led = history.writes_for(13);
        assert_eq!(led.iter().map(|w| w.value).collect::<Vec<_>>(), vec![1.0, 0.0]);
        // on time, give or take scheduling jitter
        let on = led[0].at.duration_since(t0);
        let off = led[1].at.duration_since(t0);
        assert!(on >= Duration::from_millis(95) && on < Duration::from_millis(200), "{:?}", on);
        assert!(off >= Duration::from_millis(295) && off < Duration::from_millis(400), "{:?}", off);
    }

    #[test]
    fn progress_and_external_clock() {
        let (scheduler, _) = scheduler();
        let clock = Clock::ticked();
        let mut scheduler = scheduler.clock(clock.clone());
        scheduler
            .load_paradigm(&[HardwareEventRow::new("LED", 0.0, 10.0)], mapping())
            .unwrap();
        assert_eq!(scheduler.progress(), 0.0);

        scheduler.start_at(Instant::now()).unwrap();
        scheduler.tick(2.5);
        assert_eq!(scheduler.progress(), 25.0);

        scheduler.stop();
        clock.tick(7.5);
        assert_eq!(scheduler.progress(), 25.0);
    }

    #[test]
    fn toggle_drives_mapped_hardware_only() {
        let (mut scheduler, history) = scheduler();
        let sink = MemorySink::new();
        scheduler = scheduler.sink(result_writer::shared(sink.clone()));
        scheduler.load(Paradigm::default(), mapping()).unwrap();

        scheduler.toggle("led", 1.0).unwrap();
        assert_eq!(history.last_value(13), Some(1.0));
        assert_eq!(sink.controller_events().len(), 1);
        assert!(scheduler.toggle("VACUUM", 1.0).is_err());

        scheduler.stop();
        assert_eq!(history.last_value(13), Some(0.0));
    }

    #[test]
    fn shared_cancel_token_ends_the_schedule() {
        let cancel = CancelToken::new();
        let dummy = DummyBoard::new();
        let history = dummy.history();
        let mut scheduler = Scheduler::new(board::shared(dummy), cancel.clone()).sampling_rate(200.0);
        scheduler
            .load_paradigm(
                &[
                    HardwareEventRow::new("LED", 0.0, 60.0),
                    HardwareEventRow::new("SHOCK", 0.0, 30.0),
                ],
                mapping(),
            )
            .unwrap();
        scheduler.start_at(Instant::now()).unwrap();
        thread::sleep(Duration::from_millis(50));

        cancel.cancel();
        assert!(scheduler.wait_timeout(Duration::from_secs(2)));
        assert_eq!(history.last_value(13), Some(0.0));
        assert_eq!(history.last_value(4), Some(0.0));
    }

    #[test]
    fn settings_bridge_only_knows_its_keys() {
        let (mut scheduler, _) = scheduler();
        assert!(scheduler.set("sampling_rate", 50.0));
        assert_eq!(SettingsBridge::get(&scheduler, "sampling_rate"), Some(50.0));
        assert!(!scheduler.set("sampling_rate", 0.0));
        assert!(!scheduler.set("brightness", 1.0));
        assert_eq!(SettingsBridge::get(&scheduler, "brightness"), None);
        assert_eq!(scheduler.keys(), &["sampling_rate", "duration"]);
    }
}
