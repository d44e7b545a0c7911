//! Simulated vehicle travel along a route polyline.
//!
//! A [`RouteAnimator`] walks one vertex per tick from the first point of a
//! polyline to the last, and after every step reports how far (and how long,
//! at a constant speed) the terminus still is, plus which scheduled stop is
//! closest. Snapshots go out over an unbounded channel; the animator keeps
//! the only mutable copy of the state.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{AnimationError, CoordinateSource};
use crate::geo::{haversine_m, travel_time_s, LatLng};
use crate::route::StopRecord;

pub const DEFAULT_SPEED_KMH: f64 = 30.0;
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(250);
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimatorSettings {
    /// Only used to turn remaining distance into remaining time.
    pub speed_kmh: f64,
    pub tick_interval: Duration,
}

impl Default for AnimatorSettings {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnimationState {
    pub current_index: usize,
    pub position: Option<LatLng>,
    pub nearest_stop: Option<StopRecord>,
    pub remaining_distance_m: Option<f64>,
    pub remaining_time_s: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "error", rename_all = "snake_case")]
pub enum Status {
    /// Started with an empty polyline. Nothing will tick.
    Disarmed,
    Started,
    Advanced,
    /// Reached the last vertex. The run is frozen until the next start.
    Arrived,
    Failed(AnimationError),
    Stopped,
}

impl Status {
    /// No tick follows a snapshot with this status.
    pub fn is_final(&self) -> bool {
        !matches!(self, Status::Started | Status::Advanced)
    }
}

/// What consumers receive on start, on every tick and on stop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub run: u64,
    pub direction: u32,
    pub status: Status,
    pub state: AnimationState,
}

/// The state machine of a single run, free of any timer.
#[derive(Debug, Clone)]
pub struct AnimationRun {
    polyline: Vec<LatLng>,
    stops: Vec<StopRecord>,
    speed_kmh: f64,
    state: AnimationState,
    finished: bool,
}

impl AnimationRun {
    pub fn begin(polyline: Vec<LatLng>, stops: Vec<StopRecord>, speed_kmh: f64) -> (Self, Status) {
        let mut run = Self {
            polyline,
            stops,
            speed_kmh,
            state: AnimationState::default(),
            finished: false,
        };

        let Some(&first) = run.polyline.first() else {
            run.finished = true;
            return (run, Status::Disarmed);
        };

        if let Some(index) = run.stops.iter().position(|s| !s.position().is_valid()) {
            let status = run.fail(CoordinateSource::Stop, index);
            return (run, status);
        }
        if !first.is_valid() {
            let status = run.fail(CoordinateSource::Polyline, 0);
            return (run, status);
        }

        if run.polyline.len() == 1 {
            run.arrive();
            return (run, Status::Arrived);
        }

        run.state.position = Some(first);
        run.update_reading(first);
        run.state.nearest_stop = nearest_stop(first, &run.stops).cloned();
        (run, Status::Started)
    }

    /// Steps to the next vertex. `None` once the run has finished.
    pub fn advance(&mut self) -> Option<Status> {
        if self.finished {
            return None;
        }
        let next_index = self.state.current_index + 1;
        let Some(&next) = self.polyline.get(next_index) else {
            self.arrive();
            return Some(Status::Arrived);
        };
        if !next.is_valid() {
            return Some(self.fail(CoordinateSource::Polyline, next_index));
        }
        if next_index == self.polyline.len() - 1 {
            self.arrive();
            return Some(Status::Arrived);
        }

        self.state.current_index = next_index;
        self.state.position = Some(next);
        self.update_reading(next);
        self.state.nearest_stop = nearest_stop(next, &self.stops).cloned();
        Some(Status::Advanced)
    }

    pub fn state(&self) -> &AnimationState {
        &self.state
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn destination(&self) -> Option<LatLng> {
        self.polyline.last().copied()
    }

    fn update_reading(&mut self, from: LatLng) {
        let distance = self
            .destination()
            .and_then(|dest| haversine_m(from, dest))
            // Straight-line distance can grow on a winding route; never report it going back up.
            .map(|d| match self.state.remaining_distance_m {
                Some(previous) => previous.min(d),
                None => d,
            });
        self.state.remaining_distance_m = distance;
        self.state.remaining_time_s = distance.and_then(|d| travel_time_s(d, self.speed_kmh));
    }

    fn arrive(&mut self) {
        self.state.current_index = self.polyline.len().saturating_sub(1);
        self.state.position = self.destination();
        self.state.nearest_stop = self.stops.last().cloned();
        self.state.remaining_distance_m = Some(0.0);
        self.state.remaining_time_s = Some(0.0);
        self.finished = true;
    }

    fn fail(&mut self, origin: CoordinateSource, index: usize) -> Status {
        self.state = AnimationState::default();
        self.finished = true;
        Status::Failed(AnimationError::MalformedCoordinate { origin, index })
    }
}

/// Closest stop to `position`; the first one listed wins a tie.
pub fn nearest_stop(position: LatLng, stops: &[StopRecord]) -> Option<&StopRecord> {
    let mut best: Option<(&StopRecord, f64)> = None;
    for stop in stops {
        let Some(d) = haversine_m(position, stop.position()) else {
            continue;
        };
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((stop, d)),
        }
    }
    best.map(|(stop, _)| stop)
}

#[derive(Default)]
struct Shared {
    // Bumped by every start and stop. A tick only acts if it still matches.
    generation: u64,
    direction: u32,
    run: Option<AnimationRun>,
}

pub struct RouteAnimator {
    settings: AnimatorSettings,
    shared: Arc<Mutex<Shared>>,
    ticker: Option<JoinHandle<()>>,
    updates: mpsc::UnboundedSender<Snapshot>,
}

impl RouteAnimator {
    pub fn new(settings: AnimatorSettings) -> (Self, mpsc::UnboundedReceiver<Snapshot>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let animator = Self {
            settings: AnimatorSettings {
                tick_interval: settings.tick_interval.max(MIN_TICK_INTERVAL),
                ..settings
            },
            shared: Arc::new(Mutex::new(Shared::default())),
            ticker: None,
            updates,
        };
        (animator, rx)
    }

    pub fn settings(&self) -> AnimatorSettings {
        self.settings
    }

    /// Tears down any active run and begins a new one. Must be called from
    /// within a tokio runtime. Returns the new run's id.
    pub fn start(&mut self, polyline: Vec<LatLng>, stops: Vec<StopRecord>, direction: u32) -> u64 {
        self.cancel_ticker();

        let points = polyline.len();
        let (run, status) = AnimationRun::begin(polyline, stops, self.settings.speed_kmh);
        let keep_ticking = !run.is_finished();

        // Sent under the lock so snapshots stay in generation order.
        let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        shared.generation += 1;
        shared.direction = direction;
        let generation = shared.generation;

        match &status {
            Status::Disarmed => info!(run = generation, direction, "No polyline to animate"),
            Status::Failed(e) => warn!(run = generation, direction, "Animation aborted at start: {}", e),
            _ => info!(run = generation, direction, points, "Animation started"),
        }
        let _ = self.updates.send(Snapshot {
            run: generation,
            direction,
            status,
            state: run.state().clone(),
        });
        shared.run = Some(run);
        drop(shared);

        if keep_ticking {
            self.ticker = Some(tokio::spawn(drive(
                self.shared.clone(),
                self.updates.clone(),
                generation,
                self.settings.tick_interval,
            )));
        }
        generation
    }

    /// Cancels the active run and clears all state. A no-op when already stopped.
    pub fn stop(&mut self) {
        self.cancel_ticker();

        let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        if shared.run.take().is_none() {
            return;
        }
        let stopped = shared.generation;
        // Invalidates any tick of the stopped run; the next start bumps again.
        shared.generation += 1;
        info!(run = stopped, "Animation stopped");
        let _ = self.updates.send(Snapshot {
            run: stopped,
            direction: shared.direction,
            status: Status::Stopped,
            state: AnimationState::default(),
        });
    }

    pub fn state(&self) -> AnimationState {
        let shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        shared.run.as_ref().map(|r| r.state().clone()).unwrap_or_default()
    }

    /// Whether a timer is still armed for the current run.
    pub fn is_ticking(&self) -> bool {
        let shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        matches!(&shared.run, Some(run) if !run.is_finished())
    }

    fn cancel_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

impl Drop for RouteAnimator {
    fn drop(&mut self) {
        self.cancel_ticker();
    }
}

async fn drive(
    shared: Arc<Mutex<Shared>>,
    updates: mpsc::UnboundedSender<Snapshot>,
    generation: u64,
    period: Duration,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let mut guard = shared.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.generation != generation {
            return;
        }
        let direction = guard.direction;
        let Some(run) = guard.run.as_mut() else {
            return;
        };
        let Some(status) = run.advance() else {
            return;
        };
        let snapshot = Snapshot {
            run: generation,
            direction,
            status,
            state: run.state().clone(),
        };

        match &snapshot.status {
            Status::Arrived => info!(run = generation, "Arrived at terminus"),
            Status::Failed(e) => warn!(run = generation, "Animation aborted: {}", e),
            _ => debug!(
                run = generation,
                index = snapshot.state.current_index,
                remaining_m = ?snapshot.state.remaining_distance_m,
                "Tick"
            ),
        }

        let done = snapshot.status.is_final();
        // Sent under the guard so snapshots stay in generation order.
        let _ = updates.send(snapshot);
        drop(guard);
        if done {
            return;
        }
    }
}
