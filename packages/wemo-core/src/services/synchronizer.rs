//! Per-device polling loop that republishes live appliance state.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::binder::DeviceChannels;
use super::classifier::{Capability, CapabilitySet};
use super::registry::DeviceRecord;
use crate::bus::ChannelValue;
use crate::protocol_constants::MILLIWATTS_PER_WATT;
use crate::wemo::soap::SoapError;
use crate::wemo::ApplianceControl;

/// Poll interval for a capability set: the motion interval when motion is
/// sensed, the default one otherwise.
pub fn poll_interval_for(capabilities: CapabilitySet, default: Duration, motion: Duration) -> Duration {
    if capabilities.contains(Capability::MotionSensing) {
        motion
    } else {
        default
    }
}

/// Keeps one bound device's channels in step with the appliance.
pub struct StateSynchronizer {
    record: Arc<DeviceRecord>,
    channels: Arc<DeviceChannels>,
    control: Arc<dyn ApplianceControl>,
    interval: Duration,
    consecutive_failures: AtomicU32,
    /// Last motion sample; events fire on the absent -> present edge only.
    motion_present: AtomicBool,
}

impl StateSynchronizer {
    pub fn new(
        record: Arc<DeviceRecord>,
        channels: Arc<DeviceChannels>,
        control: Arc<dyn ApplianceControl>,
        interval: Duration,
    ) -> Self {
        Self {
            record,
            channels,
            control,
            interval,
            consecutive_failures: AtomicU32::new(0),
            motion_present: AtomicBool::new(false),
        }
    }

    /// Polls on a fixed interval until `cancel` fires.
    ///
    /// The first tick runs immediately. Ticks missed while a slow poll was in
    /// flight are skipped rather than bunched up.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        log::debug!(
            "[Sync] Polling {} every {:?}",
            self.record.serial(),
            self.interval
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.tick().await,
            }
        }

        log::debug!("[Sync] Stopped polling {}", self.record.serial());
    }

    /// One sampling pass.
    ///
    /// A failed binary-state read skips the rest of the tick. A failed power
    /// read only skips the power sample.
    pub async fn tick(&self) {
        let handle = self.record.handle();
        let wants_state = self.channels.on_off.is_some() || self.channels.motion.is_some();

        if wants_state {
            let state = match self.control.get_binary_state(&handle).await {
                Ok(state) => state,
                Err(e) => {
                    self.note_failure("binary state", &e);
                    return;
                }
            };

            if let Some(on_off) = &self.channels.on_off {
                on_off.push_state(ChannelValue::OnOff(state != 0));
            }
            if let Some(motion) = &self.channels.motion {
                let present = state != 0;
                let was_present = self.motion_present.swap(present, Ordering::Relaxed);
                if present && !was_present {
                    log::debug!("[Sync] Motion on {}", self.record.serial());
                    motion.push_event();
                }
            }
        }

        if let Some(power) = &self.channels.power {
            match self.control.get_power_sample(&handle).await {
                Ok(milliwatts) => {
                    power.push_state(ChannelValue::Power(milliwatts as f64 / MILLIWATTS_PER_WATT));
                }
                Err(e) => {
                    self.note_failure("power sample", &e);
                    return;
                }
            }
        }

        let previous = self.consecutive_failures.swap(0, Ordering::Relaxed);
        if previous > 0 {
            log::info!(
                "[Sync] {} reachable again after {} failed poll(s)",
                self.record.serial(),
                previous
            );
        }
    }

    fn note_failure(&self, what: &str, error: &SoapError) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures == 1 {
            log::warn!(
                "[Sync] {} {} query failed, skipping tick: {}",
                self.record.serial(),
                what,
                error
            );
        } else {
            log::debug!(
                "[Sync] {} {} query failed ({} in a row, transient={}): {}",
                self.record.serial(),
                what,
                failures,
                error.is_transient(),
                error
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusHandle, Channel, ChannelKind};
    use crate::services::classifier::ThingType;
    use crate::services::registry::DeviceRegistry;
    use crate::services::test_support::{descriptor, FakeAppliance, RecordingChannel};

    struct Fixture {
        appliance: Arc<FakeAppliance>,
        on_off: Option<Arc<RecordingChannel>>,
        power: Option<Arc<RecordingChannel>>,
        motion: Option<Arc<RecordingChannel>>,
        sync: StateSynchronizer,
    }

    fn fixture(caps: &[Capability]) -> Fixture {
        let registry = DeviceRegistry::new();
        let caps = CapabilitySet::of(caps);
        let record = registry
            .insert(
                descriptor("S1", "Thing", "urn:Belkin:device:x:1"),
                caps,
                ThingType::Socket,
            )
            .unwrap();

        let make = |kind: ChannelKind, cap: Capability| {
            caps.contains(cap)
                .then(|| Arc::new(RecordingChannel::new(format!("S1/{}", kind.slug()), kind)))
        };
        let on_off = make(ChannelKind::OnOff, Capability::Switchable);
        let power = make(ChannelKind::Power, Capability::PowerMetered);
        let motion = make(ChannelKind::Motion, Capability::MotionSensing);

        let as_dyn = |c: &Option<Arc<RecordingChannel>>| c.clone().map(|c| c as Arc<dyn Channel>);
        let channels = Arc::new(DeviceChannels {
            handle: BusHandle::new("S1"),
            on_off: as_dyn(&on_off),
            power: as_dyn(&power),
            motion: as_dyn(&motion),
        });

        let appliance = Arc::new(FakeAppliance::default());
        let sync = StateSynchronizer::new(
            record,
            channels,
            appliance.clone(),
            Duration::from_secs(5),
        );
        Fixture {
            appliance,
            on_off,
            power,
            motion,
            sync,
        }
    }

    #[tokio::test]
    async fn switch_tick_pushes_binary_state() {
        let f = fixture(&[Capability::Switchable]);
        f.appliance.set_binary_state(1);
        f.sync.tick().await;
        f.appliance.set_binary_state(0);
        f.sync.tick().await;

        assert_eq!(
            f.on_off.unwrap().states(),
            vec![ChannelValue::OnOff(true), ChannelValue::OnOff(false)]
        );
    }

    #[tokio::test]
    async fn insight_idle_state_counts_as_on() {
        let f = fixture(&[Capability::Switchable, Capability::PowerMetered]);
        f.appliance.set_binary_state(8);
        f.appliance.set_power_mw(45000);
        f.sync.tick().await;

        assert_eq!(f.on_off.unwrap().states(), vec![ChannelValue::OnOff(true)]);
        assert_eq!(f.power.unwrap().states(), vec![ChannelValue::Power(45.0)]);
    }

    #[tokio::test]
    async fn motion_fires_on_transition_to_present() {
        let f = fixture(&[Capability::MotionSensing]);
        let motion = f.motion.clone().unwrap();

        f.appliance.set_binary_state(0);
        f.sync.tick().await;
        assert_eq!(motion.events(), 0);

        f.appliance.set_binary_state(1);
        for _ in 0..5 {
            f.sync.tick().await;
        }
        assert_eq!(motion.events(), 1);

        f.appliance.set_binary_state(0);
        f.sync.tick().await;
        assert_eq!(motion.events(), 1);

        f.appliance.set_binary_state(1);
        f.sync.tick().await;
        assert_eq!(motion.events(), 2);
        assert!(motion.states().is_empty());
    }

    #[tokio::test]
    async fn failed_motion_query_does_not_retrigger() {
        let f = fixture(&[Capability::MotionSensing]);
        let motion = f.motion.clone().unwrap();

        f.appliance.set_binary_state(1);
        f.sync.tick().await;
        f.appliance.fail_queries(true);
        f.sync.tick().await;
        f.appliance.fail_queries(false);
        f.sync.tick().await;

        assert_eq!(motion.events(), 1);
    }

    #[tokio::test]
    async fn failed_query_skips_tick() {
        let f = fixture(&[Capability::Switchable, Capability::PowerMetered]);
        f.appliance.fail_queries(true);
        f.sync.tick().await;
        assert!(f.on_off.as_ref().unwrap().states().is_empty());
        assert!(f.power.as_ref().unwrap().states().is_empty());

        f.appliance.fail_queries(false);
        f.appliance.set_binary_state(1);
        f.sync.tick().await;
        assert_eq!(f.on_off.unwrap().states().len(), 1);
        assert_eq!(f.power.unwrap().states().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_polls_on_interval_until_cancelled() {
        let f = fixture(&[Capability::Switchable]);
        let appliance = f.appliance.clone();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(f.sync.run(cancel.clone()));

        // First tick fires immediately, then every 5s
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(appliance.state_queries(), 1);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(appliance.state_queries(), 3);

        cancel.cancel();
        task.await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(appliance.state_queries(), 3);
    }

    #[test]
    fn motion_devices_poll_faster() {
        let default = Duration::from_secs(5);
        let motion = Duration::from_secs(2);
        assert_eq!(
            poll_interval_for(CapabilitySet::of(&[Capability::MotionSensing]), default, motion),
            motion
        );
        assert_eq!(
            poll_interval_for(CapabilitySet::of(&[Capability::Switchable]), default, motion),
            default
        );
    }
}
