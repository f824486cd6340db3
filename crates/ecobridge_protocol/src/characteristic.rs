//! GATT characteristics exposed by ECO16BT thermostats

use std::fmt;

use uuid::Uuid;

/// A characteristic the bridge reads from or writes to
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum Characteristic {
    /// Generic Access device name
    DeviceName,
    /// Realtime temperatures, relay, mode and boost summary
    RealtimeState,
    /// 7-day / 12-month on-off ratios (chunked)
    Monitoring,
    /// Per-hour on-off ratios (chunked)
    RealtimePower,
    CalendarMode,
    CalendarDay,
    VacationTime,
    FloorArea,
    HeatingPower,
    SensorType,
    AdaptiveControl,
    TemperatureLimits,
    DateTime,
    DaylightSaving,
    /// Factory reset id, written with the pairing key at the start of every session
    Pairing,
    Boost,
}

impl Characteristic {
    /// All characteristics, in declaration order
    pub const ALL: [Characteristic; 16] = [
        Self::DeviceName,
        Self::RealtimeState,
        Self::Monitoring,
        Self::RealtimePower,
        Self::CalendarMode,
        Self::CalendarDay,
        Self::VacationTime,
        Self::FloorArea,
        Self::HeatingPower,
        Self::SensorType,
        Self::AdaptiveControl,
        Self::TemperatureLimits,
        Self::DateTime,
        Self::DaylightSaving,
        Self::Pairing,
        Self::Boost,
    ];

    /// 128-bit UUID of the characteristic
    pub const fn uuid(self) -> Uuid {
        let raw: u128 = match self {
            Self::DeviceName => 0x00002a00_0000_1000_8000_00805f9b34fb,
            Self::RealtimeState => 0x66ad3e6b_3135_4ada_bb2b_8b22916b21d4,
            Self::Monitoring => 0xecc794d2_c790_4abd_88a5_79abf9417908,
            Self::RealtimePower => 0xc1686f28_fa1b_4791_9eca_35523fb3597e,
            Self::CalendarMode => 0x636d45fd_d7be_491f_966c_380f8631b2c6,
            Self::CalendarDay => 0x20db94b9_bd18_4f84_bf16_de1163adfd8c,
            Self::VacationTime => 0x6584e9c6_4784_41aa_ac09_c899191048ae,
            Self::FloorArea => 0x5c897ab6_354c_443d_9f36_f3f7263868dd,
            Self::HeatingPower => 0x53b7bf87_6cf0_4790_839a_e72d3afbec44,
            Self::SensorType => 0xf561ce1f_61fb_4fa2_8bef_5fecc949b55b,
            Self::AdaptiveControl => 0xc2dc85e9_47bf_4968_9562_d2e1980ed4e4,
            Self::TemperatureLimits => 0x89b4c78f_6d5e_4cfa_8e81_4eca9738bbfd,
            Self::DateTime => 0xb43f918a_b084_45c8_9b60_df648c4a4a1e,
            Self::DaylightSaving => 0xe4f66642_ed89_4c73_be57_2158c225bbde,
            Self::Pairing => 0xf366dddb_ebe2_43ee_83c0_472ded74c8fa,
            Self::Boost => 0xca3c0685_b708_4cd4_a049_5badd10469e7,
        };
        Uuid::from_u128(raw)
    }

    /// Look up a characteristic by UUID
    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.uuid() == uuid)
    }

    /// Short name used in logs
    pub fn name(self) -> &'static str {
        match self {
            Self::DeviceName => "device-name",
            Self::RealtimeState => "realtime-state",
            Self::Monitoring => "monitoring",
            Self::RealtimePower => "realtime-power",
            Self::CalendarMode => "calendar-mode",
            Self::CalendarDay => "calendar-day",
            Self::VacationTime => "vacation-time",
            Self::FloorArea => "floor-area",
            Self::HeatingPower => "heating-power",
            Self::SensorType => "sensor-type",
            Self::AdaptiveControl => "adaptive-control",
            Self::TemperatureLimits => "temperature-limits",
            Self::DateTime => "date-time",
            Self::DaylightSaving => "daylight-saving",
            Self::Pairing => "pairing",
            Self::Boost => "boost",
        }
    }
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
