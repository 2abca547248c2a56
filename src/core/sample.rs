use std::collections::BTreeMap;

use bon::Builder;
use chrono::{DateTime, SecondsFormat, Utc};
use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

use crate::quantity::{
    electric::{Amperes, Hertz, Volts},
    energy::KilowattHours,
    power::{Kilowatts, Watts},
};

/// Energy device identifier, as it appears in the device configuration.
#[derive(
    Clone,
    Debug,
    Display,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    Deserialize,
    From,
    Into,
)]
#[serde(transparent)]
pub struct DeviceId(String);

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// L1, L2, and L3 values of a three-phase quantity.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Phases<T> {
    pub l1: T,
    pub l2: T,
    pub l3: T,
}

impl<T> Phases<T> {
    pub const fn new(l1: T, l2: T, l3: T) -> Self {
        Self { l1, l2, l3 }
    }

    pub const fn uniform(value: T) -> Self
    where
        T: Copy,
    {
        Self { l1: value, l2: value, l3: value }
    }

    pub fn map<R>(self, f: impl Fn(T) -> R) -> Phases<R> {
        Phases { l1: f(self.l1), l2: f(self.l2), l3: f(self.l3) }
    }

    pub fn into_array(self) -> [T; 3] {
        [self.l1, self.l2, self.l3]
    }
}

/// One reading of a three-phase energy meter.
#[must_use]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Builder)]
pub struct Sample {
    #[builder(into)]
    pub device_id: DeviceId,

    /// Capture time.
    #[builder(default = Utc::now())]
    pub timestamp: DateTime<Utc>,

    #[builder(default)]
    pub current: Phases<Amperes>,

    /// Per-phase active power.
    #[builder(default)]
    pub power: Phases<Watts>,

    #[builder(default)]
    pub voltage: Phases<Volts>,

    #[builder(default)]
    pub frequency: Hertz,

    /// Per-phase cumulative active energy.
    #[builder(default)]
    pub energy: Phases<KilowattHours>,

    /// Total instantaneous active power.
    #[builder(default)]
    pub total_power: Kilowatts,
}

impl Sample {
    /// Flat key-value representation for the outbound event stream.
    ///
    /// The stream is public, so it must not carry anything but the meter values.
    #[must_use]
    pub fn to_payload(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("energy_device_id", self.device_id.to_string()),
            ("created_at", self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("kwh_l1", self.energy.l1.to_decimal_string()),
            ("kwh_l2", self.energy.l2.to_decimal_string()),
            ("kwh_l3", self.energy.l3.to_decimal_string()),
            ("a_l1", self.current.l1.to_decimal_string()),
            ("a_l2", self.current.l2.to_decimal_string()),
            ("a_l3", self.current.l3.to_decimal_string()),
            ("p_l1", self.power.l1.to_decimal_string()),
            ("p_l2", self.power.l2.to_decimal_string()),
            ("p_l3", self.power.l3.to_decimal_string()),
            ("v_l1", self.voltage.l1.to_decimal_string()),
            ("v_l2", self.voltage.l2.to_decimal_string()),
            ("v_l3", self.voltage.l3.to_decimal_string()),
            ("hz", self.frequency.to_decimal_string()),
            ("kw_total", self.total_power.to_decimal_string()),
        ])
    }
}
