//! Power saving mode timer encoding
//!
//! `AT+CPSMS` carries the requested periodic TAU and active time as the
//! binary string form of two 3GPP TS 24.008 information elements:
//!
//! - **GPRS Timer 3** (table 10.5.163a) for the periodic timer
//! - **GPRS Timer** (table 10.5.172) for the active timer
//!
//! # Format
//! - Bits 8..6: unit of the timer value
//! - Bits 5..1: binary coded timer value (0..=31)
//!
//! On the wire each element is an 8-character string of `0`/`1`, most
//! significant bit first.

use std::fmt;

/// Largest value the 5-bit magnitude field can hold
pub const IE_VALUE_MAX: u32 = 0x1f;

/// Width of the magnitude field in bits
const VALUE_BITS: u32 = 5;

/// Which information element a timer is encoded as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TimerKind {
    /// Requested periodic TAU (GPRS Timer 3)
    Periodic,
    /// Requested active time (GPRS Timer)
    Active,
}

/// One row of a unit table: the step size and its 3-bit tag
#[derive(Debug, Clone, Copy)]
struct TimerUnit {
    seconds: u32,
    tag: u8,
}

impl TimerUnit {
    const fn new(seconds: u32, tag: u8) -> Self {
        Self { seconds, tag }
    }

    /// Longest duration this unit represents without overflowing the value field
    fn max_seconds(&self) -> u32 {
        self.seconds * IE_VALUE_MAX
    }
}

/// GPRS Timer 3 units, finest first
const PERIODIC_UNITS: [TimerUnit; 7] = [
    TimerUnit::new(2, 0b011),           // 2 seconds
    TimerUnit::new(30, 0b100),          // 30 seconds
    TimerUnit::new(60, 0b101),          // 1 minute
    TimerUnit::new(10 * 60, 0b000),     // 10 minutes
    TimerUnit::new(60 * 60, 0b001),     // 1 hour
    TimerUnit::new(10 * 60 * 60, 0b010), // 10 hours
    TimerUnit::new(320 * 60 * 60, 0b110), // 320 hours
];

/// GPRS Timer units, finest first
const ACTIVE_UNITS: [TimerUnit; 3] = [
    TimerUnit::new(2, 0b000),      // 2 seconds
    TimerUnit::new(60, 0b001),     // 1 minute
    TimerUnit::new(6 * 60, 0b010), // decihours
];

/// Tag of the active timer's 1-minute unit
const ACTIVE_MINUTE_TAG: u8 = 0b001;

/// Pick the first unit whose range covers `seconds`
///
/// The coarsest unit always matches; its count is clamped to the field width.
fn select_unit(units: &[TimerUnit], seconds: u32) -> (TimerUnit, u32) {
    for unit in &units[..units.len() - 1] {
        if seconds <= unit.max_seconds() {
            return (*unit, seconds / unit.seconds);
        }
    }

    let last = units[units.len() - 1];
    (last, (seconds / last.seconds).min(IE_VALUE_MAX))
}

fn table(kind: TimerKind) -> &'static [TimerUnit] {
    match kind {
        TimerKind::Periodic => &PERIODIC_UNITS,
        TimerKind::Active => &ACTIVE_UNITS,
    }
}

/// An encoded GPRS timer information element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GprsTimer {
    kind: TimerKind,
    tag: u8,
    value: u8,
}

impl GprsTimer {
    /// The 3-bit unit tag
    pub fn unit_tag(&self) -> u8 {
        self.tag
    }

    /// The 5-bit magnitude
    pub fn value(&self) -> u8 {
        self.value
    }

    /// Which element this timer encodes
    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    /// The full octet: unit tag in the top three bits, magnitude below
    pub fn to_byte(&self) -> u8 {
        (self.tag << VALUE_BITS) | self.value
    }

    /// The octet as sent in `AT+CPSMS`, e.g. `"01111110"`
    pub fn to_bit_string(&self) -> String {
        format!("{:08b}", self.to_byte())
    }

    /// Step size of the selected unit in seconds
    pub fn unit_seconds(&self) -> u32 {
        table(self.kind)
            .iter()
            .find(|unit| unit.tag == self.tag)
            .map(|unit| unit.seconds)
            .unwrap_or(0)
    }

    /// Duration the modem will read back from this element, in seconds
    pub fn seconds(&self) -> u64 {
        u64::from(self.value) * u64::from(self.unit_seconds())
    }
}

impl fmt::Display for GprsTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_bit_string())
    }
}

/// Encode a requested periodic TAU as a GPRS Timer 3 element
pub fn encode_periodic(seconds: u32) -> GprsTimer {
    let (unit, count) = select_unit(&PERIODIC_UNITS, seconds);
    GprsTimer {
        kind: TimerKind::Periodic,
        tag: unit.tag,
        value: count as u8,
    }
}

/// Encode a requested active time as a GPRS Timer element
pub fn encode_active(seconds: u32) -> GprsTimer {
    let (unit, count) = select_unit(&ACTIVE_UNITS, seconds);

    // The minute encoding folds the unit bit into the raw value; only the
    // low five bits reach the magnitude field.
    let raw = if unit.tag == ACTIVE_MINUTE_TAG {
        (1 << VALUE_BITS) | count
    } else {
        count
    };

    GprsTimer {
        kind: TimerKind::Active,
        tag: unit.tag,
        value: (raw & IE_VALUE_MAX) as u8,
    }
}

/// The pair of elements sent when enabling power saving mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PsmTimers {
    /// Requested periodic TAU
    pub periodic: GprsTimer,
    /// Requested active time
    pub active: GprsTimer,
}

impl PsmTimers {
    /// Encode both durations; `None` when both are zero (PSM disabled)
    pub fn new(periodic_seconds: u32, active_seconds: u32) -> Option<Self> {
        if periodic_seconds == 0 && active_seconds == 0 {
            return None;
        }

        Some(Self {
            periodic: encode_periodic(periodic_seconds),
            active: encode_active(active_seconds),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_both_zero_disables() {
        assert!(PsmTimers::new(0, 0).is_none());
        assert!(PsmTimers::new(0, 2).is_some());
        assert!(PsmTimers::new(2, 0).is_some());
    }

    #[test]
    fn test_periodic_two_second_bucket() {
        let t = encode_periodic(62);
        assert_eq!(t.unit_tag(), 0b011);
        assert_eq!(t.value(), 31);
        assert_eq!(t.to_bit_string(), "01111111");
    }

    #[test]
    fn test_sixty_seconds_fits_two_second_unit() {
        let t = encode_periodic(60);
        assert_eq!(t.unit_tag(), 0b011);
        assert_eq!(t.value(), 30);
        assert_eq!(t.to_bit_string(), "01111110");
    }

    #[test]
    fn test_periodic_thirty_second_bucket() {
        let t = encode_periodic(63);
        assert_eq!(t.unit_tag(), 0b100);
        assert_eq!(t.value(), 2);
        assert_eq!(t.to_bit_string(), "10000010");

        // 621 seconds is still within 31 * 30s
        let t = encode_periodic(621);
        assert_eq!(t.unit_tag(), 0b100);
        assert_eq!(t.value(), 20);
    }

    #[test]
    fn test_periodic_minute_and_ten_minute_buckets() {
        let t = encode_periodic(931);
        assert_eq!(t.unit_tag(), 0b101);
        assert_eq!(t.value(), 15);

        let t = encode_periodic(1861);
        assert_eq!(t.unit_tag(), 0b000);
        assert_eq!(t.value(), 3);
    }

    #[test]
    fn test_periodic_hour_bucket() {
        // 621 minutes
        let t = encode_periodic(621 * 60);
        assert_eq!(t.unit_tag(), 0b001);
        assert_eq!(t.value(), 10);
        assert_eq!(t.to_bit_string(), "00101010");
    }

    #[test]
    fn test_periodic_ten_hour_bucket() {
        let t = encode_periodic(1_000_000);
        assert_eq!(t.unit_tag(), 0b010);
        assert_eq!(t.value(), 27);
    }

    #[test]
    fn test_periodic_320_hour_bucket_clamps() {
        let t = encode_periodic(10 * 60 * 60 * 31 + 1);
        assert_eq!(t.unit_tag(), 0b110);
        assert_eq!(t.value(), 0);

        let t = encode_periodic(40_000_000);
        assert_eq!(t.unit_tag(), 0b110);
        assert_eq!(t.value(), 31);
        assert_eq!(t.to_bit_string(), "11011111");

        let t = encode_periodic(u32::MAX);
        assert_eq!(t.value(), 31);
    }

    #[test]
    fn test_active_two_second_bucket() {
        let t = encode_active(10);
        assert_eq!(t.to_bit_string(), "00000101");
    }

    #[test]
    fn test_active_minute_bucket() {
        let t = encode_active(90);
        assert_eq!(t.unit_tag(), 0b001);
        assert_eq!(t.value(), 1);
        assert_eq!(t.to_byte(), (1 << 5) | 1);
        assert_eq!(t.to_bit_string(), "00100001");
    }

    #[test]
    fn test_active_decihour_bucket_clamps() {
        let t = encode_active(3600);
        assert_eq!(t.unit_tag(), 0b010);
        assert_eq!(t.value(), 10);

        let t = encode_active(1_000_000);
        assert_eq!(t.unit_tag(), 0b010);
        assert_eq!(t.value(), 31);
    }

    #[test]
    fn test_decoded_seconds() {
        assert_eq!(encode_periodic(60).seconds(), 60);
        assert_eq!(encode_active(90).seconds(), 60);
        assert_eq!(encode_periodic(621 * 60).seconds(), 36_000);
    }

    fn check_round_down(timer: GprsTimer, requested: u32, coarsest: u32) -> Result<(), TestCaseError> {
        let decoded = timer.seconds();
        let unit = u64::from(timer.unit_seconds());
        prop_assert!(decoded <= u64::from(requested));
        if u64::from(requested) < u64::from(coarsest) * 32 {
            prop_assert!(u64::from(requested) - decoded < unit);
        }
        Ok(())
    }

    proptest! {
        #[test]
        fn periodic_never_exceeds_request(secs in 0u32..50_000_000u32) {
            let t = encode_periodic(secs);
            prop_assert!(t.value() as u32 <= IE_VALUE_MAX);
            check_round_down(t, secs, 320 * 60 * 60)?;
        }

        #[test]
        fn active_never_exceeds_request(secs in 0u32..100_000u32) {
            let t = encode_active(secs);
            prop_assert!(t.value() as u32 <= IE_VALUE_MAX);
            check_round_down(t, secs, 6 * 60)?;
        }

        #[test]
        fn bit_string_matches_byte(secs: u32) {
            let t = encode_periodic(secs);
            let s = t.to_bit_string();
            prop_assert_eq!(s.len(), 8);
            prop_assert_eq!(u8::from_str_radix(&s, 2).unwrap(), t.to_byte());
        }
    }
}
