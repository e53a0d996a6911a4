use chrono::{Duration, NaiveDate, NaiveTime, Timelike};

use crate::domain::models::ShiftCode;

// Three 8-hour bands
//
//  00    06         14         22    24
//  |  C  |    A     |    B     |  C  |
//  ^ belongs to the C shift that started the day before
//
const A_START_HOUR: u32 = 6;
const B_START_HOUR: u32 = 14;
const C_START_HOUR: u32 = 22;

/// Returns the roster date and shift code active at `date` / `time`.
///
/// The C band crosses midnight, so early-morning times map to the previous
/// calendar day's C shift.
pub fn active_shift(date: NaiveDate, time: NaiveTime) -> (NaiveDate, ShiftCode) {
    let hour = time.hour();
    if hour < A_START_HOUR {
        (date - Duration::days(1), ShiftCode::C)
    } else if hour < B_START_HOUR {
        (date, ShiftCode::A)
    } else if hour < C_START_HOUR {
        (date, ShiftCode::B)
    } else {
        (date, ShiftCode::C)
    }
}
