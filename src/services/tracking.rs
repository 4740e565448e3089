//! Live per-device consumption tracking.
//!
//! A device that is switched on gets a [`ConsumptionTracker`] inside a
//! [`TrackingRegistry`]. The registry is ticked by its owner with the
//! current time; each tracker keeps its own recompute and persistence
//! deadlines, so devices never wait on each other.
//!
//! Two counters are kept per session:
//! - `current_session_kwh`: energy since the device was switched on, for display;
//! - `persisted_session_kwh`: the part of it already written as usage records.
//!
//! Only the difference between the two is ever written, so a session's
//! records always sum to the energy of the whole session, whatever the
//! timing of persistence ticks and failed writes.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::{debug, error, info, warn};
use std::collections::BTreeMap;

use crate::db::models::NewUsageRecord;
use crate::db::store::{StoreError, UsageStore};
use crate::models::energy::{usage_source, DeviceId, UserId};
use crate::services::estimator::session_kwh;

const MAX_CADENCE_SECS: u64 = 86_400;

/// Tick cadences of a tracker. Persistence is strictly less frequent than
/// recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub recompute: Duration,
    pub persist: Duration,
    /// Consecutive failed writes before a failure is escalated.
    pub max_persist_attempts: u32,
}

impl Cadence {
    pub fn new(recompute_secs: u64, persist_secs: u64, max_persist_attempts: u32) -> Result<Self, String> {
        if recompute_secs == 0 || recompute_secs > MAX_CADENCE_SECS {
            return Err(format!("recompute cadence must be within 1..={MAX_CADENCE_SECS}s"));
        }
        if persist_secs > MAX_CADENCE_SECS {
            return Err(format!("persistence cadence must be at most {MAX_CADENCE_SECS}s"));
        }
        if persist_secs <= recompute_secs {
            return Err(format!(
                "persistence cadence ({persist_secs}s) must be longer than recompute cadence ({recompute_secs}s)"
            ));
        }
        if max_persist_attempts == 0 {
            return Err("max persistence attempts must be at least 1".to_string());
        }
        Ok(Cadence {
            recompute: Duration::seconds(recompute_secs as i64),
            persist: Duration::seconds(persist_secs as i64),
            max_persist_attempts,
        })
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Cadence {
            recompute: Duration::seconds(10),
            persist: Duration::seconds(60),
            max_persist_attempts: 5,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error("reading cumulative usage of device {device_id} failed: {source}")]
    Store {
        device_id: DeviceId,
        #[source]
        source: StoreError,
    },
    #[error("wattage of device {device_id} must be positive, got {wattage}")]
    InvalidWattage { device_id: DeviceId, wattage: f64 },
    #[error("persisting {unsaved_kwh:.6} kWh for device {device_id} failed {attempts} time(s) in a row: {last_error}")]
    PersistenceExhausted {
        device_id: DeviceId,
        attempts: u32,
        unsaved_kwh: f64,
        last_error: String,
    },
    #[error("dropped {lost_kwh:.6} kWh of device {device_id} after {attempts} failed final write(s): {last_error}")]
    FlushAbandoned {
        device_id: DeviceId,
        attempts: u32,
        lost_kwh: f64,
        last_error: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    Idle,
    Tracking,
}

#[derive(Debug, Clone)]
pub struct ConsumptionTracker {
    pub device_id: DeviceId,
    pub user_id: UserId,
    pub wattage: f64,
    pub started_at: DateTime<Utc>,
    /// Persisted total of the device when the session started.
    pub last_cumulative_kwh: f64,
    pub current_session_kwh: f64,
    persisted_session_kwh: f64,
    next_recompute: DateTime<Utc>,
    next_persist: DateTime<Utc>,
    failed_attempts: u32,
}

impl ConsumptionTracker {
    fn recompute(&mut self, now: DateTime<Utc>) {
        let kwh = session_kwh(self.wattage, self.started_at, now);
        // never move backwards, even if the clock does
        if kwh > self.current_session_kwh {
            self.current_session_kwh = kwh;
        }
    }

    /// Session energy not yet written to the store.
    pub fn unsaved_kwh(&self) -> f64 {
        (self.current_session_kwh - self.persisted_session_kwh).max(0.0)
    }

    /// Write the unsaved delta. On failure nothing is marked as persisted.
    fn flush<S: UsageStore + ?Sized>(&mut self, store: &mut S, now: DateTime<Utc>) -> Result<f64, StoreError> {
        let delta = self.unsaved_kwh();
        if delta <= 0.0 {
            return Ok(0.0);
        }
        let record = NewUsageRecord::new(
            self.user_id,
            self.device_id,
            now.date_naive(),
            delta,
            usage_source::TRACKED,
        );
        match store.insert_usage(&record) {
            Ok(_) => {
                self.persisted_session_kwh += delta;
                self.failed_attempts = 0;
                Ok(delta)
            }
            Err(e) => {
                self.failed_attempts += 1;
                Err(e)
            }
        }
    }
}

/// Energy of a stopped session whose final write has not succeeded yet.
#[derive(Debug, Clone, PartialEq)]
struct PendingFlush {
    user_id: UserId,
    device_id: DeviceId,
    date: NaiveDate,
    kwh: f64,
    attempts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopOutcome {
    pub device_id: DeviceId,
    pub session_kwh: f64,
    /// `last_cumulative_kwh + session_kwh`.
    pub final_cumulative_kwh: f64,
    /// Energy queued for a retried write because the final write failed.
    pub pending_kwh: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedDevice {
    pub device_id: DeviceId,
    pub consumption_kwh: f64,
    pub is_active: bool,
}

#[derive(Debug, Default)]
pub struct TickReport {
    pub recomputed: usize,
    pub persisted: usize,
    pub persisted_kwh: f64,
    pub failures: Vec<TrackingError>,
}

/// Owner of all live trackers of one application context.
#[derive(Debug)]
pub struct TrackingRegistry {
    cadence: Cadence,
    trackers: BTreeMap<DeviceId, ConsumptionTracker>,
    pending: Vec<PendingFlush>,
}

impl TrackingRegistry {
    pub fn new(cadence: Cadence) -> Self {
        TrackingRegistry {
            cadence,
            trackers: BTreeMap::new(),
            pending: Vec::new(),
        }
    }

    pub fn state(&self, device_id: DeviceId) -> TrackingState {
        if self.trackers.contains_key(&device_id) {
            TrackingState::Tracking
        } else {
            TrackingState::Idle
        }
    }

    pub fn is_tracking(&self, device_id: DeviceId) -> bool {
        self.state(device_id) == TrackingState::Tracking
    }

    pub fn tracker(&self, device_id: DeviceId) -> Option<&ConsumptionTracker> {
        self.trackers.get(&device_id)
    }

    /// Devices currently tracked.
    pub fn tracked_ids(&self) -> Vec<DeviceId> {
        self.trackers.keys().copied().collect()
    }

    /// Live total of a tracked device; idle devices read as 0.
    pub fn current_consumption(&self, device_id: DeviceId) -> f64 {
        self.trackers
            .get(&device_id)
            .map(|t| t.last_cumulative_kwh + t.current_session_kwh)
            .unwrap_or(0.0)
    }

    pub fn tracked_devices(&self) -> Vec<TrackedDevice> {
        self.trackers
            .values()
            .map(|t| TrackedDevice {
                device_id: t.device_id,
                consumption_kwh: t.last_cumulative_kwh + t.current_session_kwh,
                is_active: true,
            })
            .collect()
    }

    /// kWh of stopped sessions still waiting for a successful write.
    pub fn pending_kwh(&self) -> f64 {
        self.pending.iter().map(|p| p.kwh).sum()
    }

    /// Idle -> Tracking. Returns `false` if the device was already tracked.
    pub fn start<S: UsageStore + ?Sized>(
        &mut self,
        store: &mut S,
        user_id: UserId,
        device_id: DeviceId,
        wattage: f64,
        now: DateTime<Utc>,
    ) -> Result<bool, TrackingError> {
        if self.trackers.contains_key(&device_id) {
            debug!("Tracking: device {} already tracked; start ignored", device_id);
            return Ok(false);
        }
        if !wattage.is_finite() || wattage <= 0.0 {
            return Err(TrackingError::InvalidWattage { device_id, wattage });
        }

        let persisted = store
            .device_total(user_id, device_id)
            .map_err(|source| TrackingError::Store { device_id, source })?;
        let queued: f64 = self
            .pending
            .iter()
            .filter(|p| p.device_id == device_id)
            .map(|p| p.kwh)
            .sum();
        let last_cumulative_kwh = persisted + queued;

        self.trackers.insert(
            device_id,
            ConsumptionTracker {
                device_id,
                user_id,
                wattage,
                started_at: now,
                last_cumulative_kwh,
                current_session_kwh: 0.0,
                persisted_session_kwh: 0.0,
                next_recompute: now + self.cadence.recompute,
                next_persist: now + self.cadence.persist,
                failed_attempts: 0,
            },
        );
        info!(
            "Tracking: started device {} (user {}, {}W, base {:.3} kWh)",
            device_id, user_id, wattage, last_cumulative_kwh
        );
        Ok(true)
    }

    /// Tracking -> Idle. The tracker is removed before anything else so a
    /// late tick for this device is a no-op. Returns `None` if the device
    /// was not tracked.
    pub fn stop<S: UsageStore + ?Sized>(
        &mut self,
        store: &mut S,
        device_id: DeviceId,
        now: DateTime<Utc>,
    ) -> Option<StopOutcome> {
        let Some(mut tracker) = self.trackers.remove(&device_id) else {
            debug!("Tracking: device {} not tracked; stop ignored", device_id);
            return None;
        };

        tracker.recompute(now);
        let pending_kwh = match tracker.flush(store, now) {
            Ok(_) => 0.0,
            Err(e) => {
                let kwh = tracker.unsaved_kwh();
                warn!(
                    "Tracking: final write for device {} failed ({}); {:.6} kWh queued for retry",
                    device_id, e, kwh
                );
                self.pending.push(PendingFlush {
                    user_id: tracker.user_id,
                    device_id,
                    date: now.date_naive(),
                    kwh,
                    attempts: 1,
                });
                kwh
            }
        };

        let outcome = StopOutcome {
            device_id,
            session_kwh: tracker.current_session_kwh,
            final_cumulative_kwh: tracker.last_cumulative_kwh + tracker.current_session_kwh,
            pending_kwh,
        };
        info!(
            "Tracking: stopped device {} (session {:.6} kWh, cumulative {:.3} kWh)",
            device_id, outcome.session_kwh, outcome.final_cumulative_kwh
        );
        Some(outcome)
    }

    /// Stop every tracker, e.g. on shutdown.
    pub fn stop_all<S: UsageStore + ?Sized>(&mut self, store: &mut S, now: DateTime<Utc>) -> Vec<StopOutcome> {
        self.tracked_ids()
            .into_iter()
            .filter_map(|id| self.stop(store, id, now))
            .collect()
    }

    /// Run whatever is due for one device. Returns `false` without touching
    /// anything if the device is not tracked (a tick that arrived after stop).
    pub fn tick_device<S: UsageStore + ?Sized>(
        &mut self,
        store: &mut S,
        device_id: DeviceId,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> bool {
        let cadence = self.cadence;
        let Some(tracker) = self.trackers.get_mut(&device_id) else {
            return false;
        };

        if now >= tracker.next_recompute {
            tracker.recompute(now);
            tracker.next_recompute = now + cadence.recompute;
            report.recomputed += 1;
            debug!(
                "Tracking: device {} session {:.6} kWh, total {:.6} kWh",
                device_id,
                tracker.current_session_kwh,
                tracker.last_cumulative_kwh + tracker.current_session_kwh
            );
        }

        if now >= tracker.next_persist {
            tracker.recompute(now);
            match tracker.flush(store, now) {
                Ok(kwh) => {
                    tracker.next_persist = now + cadence.persist;
                    if kwh > 0.0 {
                        report.persisted += 1;
                        report.persisted_kwh += kwh;
                        debug!("Tracking: persisted {:.6} kWh for device {}", kwh, device_id);
                    }
                }
                Err(e) => {
                    // retry at the recompute cadence; the delta stays unsaved
                    tracker.next_persist = now + cadence.recompute;
                    warn!(
                        "Tracking: write for device {} failed (attempt {}): {}",
                        device_id, tracker.failed_attempts, e
                    );
                    if tracker.failed_attempts % cadence.max_persist_attempts.max(1) == 0 {
                        let failure = TrackingError::PersistenceExhausted {
                            device_id,
                            attempts: tracker.failed_attempts,
                            unsaved_kwh: tracker.unsaved_kwh(),
                            last_error: e.to_string(),
                        };
                        error!("Tracking: {}", failure);
                        report.failures.push(failure);
                    }
                }
            }
        }
        true
    }

    /// Advance every tracker and retry queued final writes.
    pub fn tick<S: UsageStore + ?Sized>(&mut self, store: &mut S, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();
        for device_id in self.tracked_ids() {
            self.tick_device(store, device_id, now, &mut report);
        }
        self.drain_pending(store, &mut report);
        report
    }

    fn drain_pending<S: UsageStore + ?Sized>(&mut self, store: &mut S, report: &mut TickReport) {
        if self.pending.is_empty() {
            return;
        }
        let max_attempts = self.cadence.max_persist_attempts;
        let mut still_pending = Vec::with_capacity(self.pending.len());
        for mut p in std::mem::take(&mut self.pending) {
            let record = NewUsageRecord::new(p.user_id, p.device_id, p.date, p.kwh, usage_source::TRACKED);
            match store.insert_usage(&record) {
                Ok(_) => {
                    report.persisted += 1;
                    report.persisted_kwh += p.kwh;
                    info!("Tracking: queued {:.6} kWh for device {} persisted", p.kwh, p.device_id);
                }
                Err(e) => {
                    p.attempts += 1;
                    if p.attempts >= max_attempts {
                        let failure = TrackingError::FlushAbandoned {
                            device_id: p.device_id,
                            attempts: p.attempts,
                            lost_kwh: p.kwh,
                            last_error: e.to_string(),
                        };
                        error!("Tracking: {}", failure);
                        report.failures.push(failure);
                    } else {
                        warn!(
                            "Tracking: queued write for device {} failed (attempt {}): {}",
                            p.device_id, p.attempts, e
                        );
                        still_pending.push(p);
                    }
                }
            }
        }
        self.pending = still_pending;
    }
}
