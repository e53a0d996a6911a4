use chrono::{Duration, NaiveDate};

use crate::domain::models::{EmployeeId, RosterPolicy, ShiftAssignment, ShiftCode};
use crate::error::AppError;

/// Number of consecutive calendar days produced by one generation.
pub const HORIZON_DAYS: u32 = 30;

/// Days shown to operators in the editable grid (today .. today+7).
pub const VISIBLE_DAYS: u32 = 8;

/// Generates the 30-day roster for one employee.
///
/// Pure and deterministic. Off days are not emitted, matching the write path
/// where a missing row means Off.
///
/// ```text
///  Rotating 6-2, initial A
///  day  1..6   A
///  day  7..8   -
///  day  9..14  B
///  day 15..16  -
///  day 17..22  C
///  day 23..24  -
///  day 25..30  A
/// ```
pub fn generate(
    employee_id: EmployeeId,
    start: NaiveDate,
    policy: RosterPolicy,
    initial_shift: ShiftCode,
) -> Result<Vec<ShiftAssignment>, AppError> {
    if !initial_shift.is_working() {
        return Err(AppError::validation(
            "initial shift must be one of A, B or C",
        ));
    }

    let mut shift = initial_shift;
    let mut worked = 0;
    let mut off = 0;
    let mut assignments = Vec::with_capacity(HORIZON_DAYS as usize);

    for offset in 0..HORIZON_DAYS {
        let date = start + Duration::days(offset as i64);

        if worked < policy.work_length() {
            assignments.push(ShiftAssignment {
                employee_id,
                date,
                shift,
            });
            worked += 1;
        } else {
            off += 1;
            if off == policy.off_length() {
                worked = 0;
                off = 0;
                if policy.rotates() {
                    // is_working() checked above, so the successor exists
                    shift = shift.next_in_rotation().unwrap_or(shift);
                }
            }
        }
    }

    Ok(assignments)
}
