use std::ops::Mul;

use chrono::TimeDelta;

use crate::quantity::power::Kilowatts;

quantity!(KilowattHours, "kWh", 2);

impl Mul<TimeDelta> for Kilowatts {
    type Output = KilowattHours;

    fn mul(self, rhs: TimeDelta) -> Self::Output {
        let hours = rhs.as_seconds_f64() / 3600.0;
        KilowattHours(self.0 * hours)
    }
}
