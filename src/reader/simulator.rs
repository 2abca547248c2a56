use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    core::{DeviceId, Phases, Sample},
    error::ReadError,
    quantity::{
        electric::{Amperes, Hertz, Volts},
        energy::KilowattHours,
        power::{Kilowatts, Watts},
    },
    reader::Reader,
};

/// Simulated three-phase charger that alternates between charging and idling.
///
/// Energy is integrated over the real time between the reads.
#[must_use]
pub struct Simulator {
    device_id: DeviceId,
    energy: Phases<KilowattHours>,
    last_read_at: Option<DateTime<Utc>>,
    n_reads: u64,
}

impl Simulator {
    const CHARGING_CURRENT: Amperes = Amperes(16.0);
    const VOLTAGE: Volts = Volts(230.0);
    const FREQUENCY: Hertz = Hertz(50.0);

    /// Number of reads after which the simulated car switches between charging and idling.
    const SESSION_LENGTH: u64 = 6;

    pub const fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            energy: Phases::uniform(KilowattHours::ZERO),
            last_read_at: None,
            n_reads: 0,
        }
    }

    const fn is_charging(&self) -> bool {
        (self.n_reads / Self::SESSION_LENGTH) % 2 == 0
    }

    fn read_at(&mut self, now: DateTime<Utc>) -> Sample {
        // Keep the timestamps monotonic, even if the wall clock goes backwards.
        let now = self.last_read_at.map_or(now, |last_read_at| now.max(last_read_at));

        let current = if self.is_charging() { Self::CHARGING_CURRENT } else { Amperes::ZERO };
        let phase_power = Watts(Self::VOLTAGE.0 * current.0);
        if let Some(last_read_at) = self.last_read_at {
            let added = Kilowatts::from(phase_power) * (now - last_read_at);
            self.energy = self.energy.map(|energy| energy + added);
        }
        self.last_read_at = Some(now);
        self.n_reads += 1;

        Sample::builder()
            .device_id(self.device_id.clone())
            .timestamp(now)
            .current(Phases::uniform(current))
            .power(Phases::uniform(phase_power))
            .voltage(Phases::uniform(Self::VOLTAGE))
            .frequency(Self::FREQUENCY)
            .energy(self.energy)
            .total_power(Kilowatts::from(phase_power) * 3.0)
            .build()
    }
}

#[async_trait]
impl Reader for Simulator {
    async fn read(&mut self) -> Result<Sample, ReadError> {
        Ok(self.read_at(Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::{TimeDelta, TimeZone};

    use super::*;

    #[test]
    fn charging_session_ok() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut simulator = Simulator::new(DeviceId::from("sim"));

        let first = simulator.read_at(t0);
        assert_eq!(first.energy.l1, KilowattHours::ZERO);
        assert_eq!(first.current.l1, Amperes(16.0));
        assert_abs_diff_eq!(first.total_power.0, 11.04, epsilon = 1e-9);

        let second = simulator.read_at(t0 + TimeDelta::minutes(30));
        assert_abs_diff_eq!(second.energy.l2.0, 1.84, epsilon = 1e-9);
    }

    #[test]
    fn idles_between_sessions() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut simulator = Simulator::new(DeviceId::from("sim"));
        let samples: Vec<Sample> = (0..8)
            .map(|minutes| simulator.read_at(t0 + TimeDelta::minutes(minutes)))
            .collect();
        assert_eq!(samples[6].current.l1, Amperes::ZERO);
        assert_eq!(samples[6].total_power, Kilowatts::ZERO);
        assert_eq!(samples[7].energy, samples[6].energy);
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut simulator = Simulator::new(DeviceId::from("sim"));
        simulator.read_at(t0);
        let sample = simulator.read_at(t0 - TimeDelta::seconds(5));
        assert_eq!(sample.timestamp, t0);
    }
}
