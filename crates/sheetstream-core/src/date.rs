//! Date-serial conversions
//!
//! Spreadsheets store dates as a day count (the "OA date"). In the 1900 date system the
//! format deliberately keeps Lotus 1-2-3's leap-year bug: 1900-02-29 exists as serial 60,
//! so serials up to 60 are one day "late" relative to a 1899-12-30 epoch.

use chrono::{Duration, NaiveDate, NaiveDateTime};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Largest serial the format can represent (9999-12-31)
pub const MAX_SERIAL: f64 = 2_958_465.999_999;

fn epoch_1900() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

fn epoch_1904() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1904, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

fn first_representable() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1900, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Convert a date-time to a 1900-system serial.
///
/// Returns `None` for dates before 1900-01-01, which the format cannot store as numbers.
pub fn datetime_to_serial(dt: NaiveDateTime) -> Option<f64> {
    if dt < first_representable() {
        return None;
    }
    let millis = (dt - epoch_1900()).num_milliseconds();
    let mut serial = millis as f64 / MILLIS_PER_DAY;
    if serial <= 60.0 {
        serial -= 1.0;
    }
    Some(serial)
}

/// Convert a serial back to a date-time.
///
/// `date1904` selects the 1904 date system (no leap-year correction). Returns `None` for
/// negative or out-of-range serials.
pub fn serial_to_datetime(serial: f64, date1904: bool) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 || serial > MAX_SERIAL {
        return None;
    }

    let (epoch, days) = if date1904 {
        (epoch_1904(), serial)
    } else if serial < 60.0 {
        (epoch_1900() + Duration::days(1), serial)
    } else {
        (epoch_1900(), serial)
    };

    let millis = (days * MILLIS_PER_DAY).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}
