use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime};
use tracing::{info, warn};

use crate::application::dto::{RosterGrid, RosterGridRow};
use crate::domain::models::{Employee, EmployeeId, Role, ShiftAssignment, ShiftCode};
use crate::domain::shift_clock::active_shift;
use crate::error::AppError;
use crate::infrastructure::repository::RosterRepository;
use crate::Result;

/// Roster rows for an inclusive date range, keyed employee -> date -> shift.
/// A missing (employee, date) pair is Off.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub employees: Vec<Employee>,
    pub shifts: BTreeMap<EmployeeId, BTreeMap<NaiveDate, ShiftCode>>,
}

impl RosterWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn shift_for(&self, employee_id: EmployeeId, date: NaiveDate) -> ShiftCode {
        self.shifts
            .get(&employee_id)
            .and_then(|days| days.get(&date))
            .copied()
            .unwrap_or(ShiftCode::Off)
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        let len = (self.end - self.start).num_days() + 1;
        (0..len).map(|d| self.start + Duration::days(d)).collect()
    }

    pub fn to_grid(&self) -> RosterGrid {
        let dates = self.dates();
        let rows = self
            .employees
            .iter()
            .map(|employee| RosterGridRow {
                employee_id: employee.id,
                name: employee.name.clone(),
                role: employee.role,
                cells: dates.iter().map(|d| self.shift_for(employee.id, *d)).collect(),
            })
            .collect();
        RosterGrid { dates, rows }
    }
}

/// Always-fresh roster access: every load is a remote read, every save a
/// remote write. Nothing here is cached beyond the last loaded window.
///
/// Mutating calls take `&mut self`, so a save can never interleave with a
/// load on the same store.
pub struct RosterStore {
    repo: Arc<dyn RosterRepository>,
    window: Option<RosterWindow>,
}

impl RosterStore {
    pub fn new(repo: Arc<dyn RosterRepository>) -> Self {
        Self { repo, window: None }
    }

    pub fn window(&self) -> Option<&RosterWindow> {
        self.window.as_ref()
    }

    /// Fetches employees and assignments for `start..=end` and replaces the
    /// held window. On failure the previous window stays as it was.
    pub async fn load_window(&mut self, start: NaiveDate, end: NaiveDate) -> Result<&RosterWindow> {
        if end < start {
            return Err(AppError::validation(format!(
                "window end {end} is before start {start}"
            )));
        }

        let employees = self.repo.list_employees().await?;
        let assignments = self.repo.fetch_assignments(start, end).await?;

        let mut shifts: BTreeMap<EmployeeId, BTreeMap<NaiveDate, ShiftCode>> = employees
            .iter()
            .map(|e| (e.id, BTreeMap::new()))
            .collect();
        for row in assignments {
            shifts.entry(row.employee_id).or_default().insert(row.date, row.shift);
        }

        info!(%start, %end, employees = employees.len(), "roster window loaded");
        Ok(&*self.window.insert(RosterWindow {
            start,
            end,
            employees,
            shifts,
        }))
    }

    /// Persists edits as one batched upsert. Off edits are dropped (Off is
    /// never stored); later edits for the same (employee, date) win.
    ///
    /// Returns the number of rows written. The held window is not patched;
    /// callers reload after a successful save.
    pub async fn save_window(&mut self, edits: &[ShiftAssignment]) -> Result<u64> {
        if edits.is_empty() {
            return Err(AppError::state("there are no pending roster edits to save"));
        }

        let mut batch: BTreeMap<(EmployeeId, NaiveDate), ShiftAssignment> = BTreeMap::new();
        for edit in edits {
            batch.insert((edit.employee_id, edit.date), *edit);
        }
        let rows: Vec<ShiftAssignment> = batch
            .into_values()
            .filter(|edit| edit.shift.is_working())
            .collect();

        if rows.is_empty() {
            info!(edits = edits.len(), "only Off edits, nothing to write");
            return Ok(0);
        }

        match self.repo.upsert_assignments(&rows).await {
            Ok(written) => {
                info!(rows = rows.len(), written, "roster saved");
                Ok(written)
            }
            Err(e) => {
                warn!(error = %e, rows = rows.len(), "roster save failed");
                Err(e)
            }
        }
    }

    /// Employees with `role` working the shift active at `date` / `time`,
    /// answered from the loaded window.
    pub fn current_shift_for(&self, role: Role, date: NaiveDate, time: NaiveTime) -> Result<Vec<Employee>> {
        let window = self
            .window
            .as_ref()
            .ok_or_else(|| AppError::state("no roster window is loaded"))?;

        let (shift_date, code) = active_shift(date, time);
        if !window.contains(shift_date) {
            return Err(AppError::state(format!(
                "{shift_date} is outside the loaded roster window"
            )));
        }

        Ok(window
            .employees
            .iter()
            .filter(|e| e.role == role && window.shift_for(e.id, shift_date) == code)
            .cloned()
            .collect())
    }
}
