use std::time::Duration;

use chrono::TimeDelta;

use crate::{
    core::{PersistedRecord, Sample},
    prelude::*,
};

/// Check whether any consumption value differs from the last persisted record.
///
/// Consumption values are the per-phase energy, current, and power, and the total power.
/// Voltage and frequency are for monitoring only and never justify a write on their own.
///
/// With nothing persisted yet, the sample is always considered changed.
#[must_use]
pub fn consumption_changed(previous: Option<&PersistedRecord>, candidate: &Sample) -> bool {
    let Some(previous) = previous else {
        return true;
    };
    let previous = &previous.sample;
    previous.energy != candidate.energy
        || previous.current != candidate.current
        || previous.power != candidate.power
        || previous.total_power != candidate.total_power
}

/// Forces a write when the last persisted record gets too old, so that the stored time series
/// never has gaps longer than the threshold even under a perfectly flat load.
#[must_use]
#[derive(Copy, Clone, Debug)]
pub struct StalenessPolicy {
    threshold: TimeDelta,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self { threshold: TimeDelta::hours(1) }
    }
}

impl StalenessPolicy {
    pub fn try_new(threshold: Duration) -> Result<Self> {
        let threshold = TimeDelta::from_std(threshold)
            .with_context(|| format!("staleness threshold `{threshold:?}` is out of range"))?;
        ensure!(threshold > TimeDelta::zero(), "staleness threshold must be positive");
        Ok(Self { threshold })
    }

    #[must_use]
    pub const fn threshold(&self) -> TimeDelta {
        self.threshold
    }

    /// Strictly longer than the threshold since the persisted sample was captured.
    #[must_use]
    pub fn expired(&self, previous: &PersistedRecord, candidate: &Sample) -> bool {
        candidate.timestamp - previous.sample.timestamp > self.threshold
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::{
        core::{Phases, RecordId},
        quantity::{
            electric::{Amperes, Hertz, Volts},
            energy::KilowattHours,
            power::{Kilowatts, Watts},
        },
    };

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn base() -> Sample {
        Sample::builder()
            .device_id("laadpaal_noord")
            .timestamp(t0())
            .energy(Phases::new(KilowattHours(10.0), KilowattHours(20.0), KilowattHours(30.0)))
            .current(Phases::uniform(Amperes(16.0)))
            .power(Phases::uniform(Watts(3680.0)))
            .voltage(Phases::uniform(Volts(230.0)))
            .frequency(Hertz(50.0))
            .total_power(Kilowatts(11.04))
            .build()
    }

    fn persisted(sample: Sample) -> PersistedRecord {
        PersistedRecord { id: RecordId(1), created_at: sample.timestamp, sample }
    }

    #[test]
    fn first_sample_is_always_changed() {
        assert!(consumption_changed(None, &base()));
    }

    #[test]
    fn identical_is_unchanged() {
        assert!(!consumption_changed(Some(&persisted(base())), &base()));
    }

    #[test]
    fn voltage_and_frequency_are_ignored() {
        let previous = persisted(base());
        let mut candidate = base();
        candidate.voltage = Phases::new(Volts(228.1), Volts(231.7), Volts(229.9));
        candidate.frequency = Hertz(49.95);
        candidate.timestamp = t0() + TimeDelta::minutes(1);
        assert!(!consumption_changed(Some(&previous), &candidate));
    }

    #[test]
    fn every_consumption_field_counts() {
        let previous = persisted(base());
        let mutations: [fn(&mut Sample); 10] = [
            |sample| sample.energy.l1 += KilowattHours(0.01),
            |sample| sample.energy.l2 += KilowattHours(0.01),
            |sample| sample.energy.l3 += KilowattHours(0.01),
            |sample| sample.current.l1 = Amperes(15.9),
            |sample| sample.current.l2 = Amperes(15.9),
            |sample| sample.current.l3 = Amperes(15.9),
            |sample| sample.power.l1 = Watts(3679.0),
            |sample| sample.power.l2 = Watts(3679.0),
            |sample| sample.power.l3 = Watts(3679.0),
            |sample| sample.total_power = Kilowatts(11.0),
        ];
        for (i, mutate) in mutations.into_iter().enumerate() {
            let mut candidate = base();
            mutate(&mut candidate);
            assert!(consumption_changed(Some(&previous), &candidate), "mutation #{i}");
        }
    }

    #[test]
    fn expiry_is_strict() -> Result {
        let policy = StalenessPolicy::default();
        let previous = persisted(base());
        let mut candidate = base();

        candidate.timestamp = t0() + TimeDelta::hours(1);
        assert!(!policy.expired(&previous, &candidate));

        candidate.timestamp = t0() + TimeDelta::hours(1) + TimeDelta::seconds(1);
        assert!(policy.expired(&previous, &candidate));

        let policy = StalenessPolicy::try_new(Duration::from_secs(300))?;
        candidate.timestamp = t0() + TimeDelta::minutes(6);
        assert!(policy.expired(&previous, &candidate));
        Ok(())
    }

    #[test]
    fn expiry_counts_whole_days() {
        let previous = persisted(base());
        let mut candidate = base();
        candidate.timestamp = t0() + TimeDelta::days(1) + TimeDelta::minutes(10);
        assert!(StalenessPolicy::default().expired(&previous, &candidate));
    }

    #[test]
    fn zero_threshold_is_rejected() {
        assert!(StalenessPolicy::try_new(Duration::ZERO).is_err());
    }
}
