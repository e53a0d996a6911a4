use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::models::{EmployeeId, Role, ShiftCode};
use crate::error::AppError;

/// One employee row of the roster grid (display only)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterGridRow {
    pub employee_id: EmployeeId,
    pub name: String,
    pub role: Role,
    pub cells: Vec<ShiftCode>, // one per date in RosterGrid::dates
}

/// Employee x date grid for the editable 8-day window
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterGrid {
    pub dates: Vec<NaiveDate>,
    pub rows: Vec<RosterGridRow>,
}

/// Flat dashboard counters fed by the live cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCounters {
    pub fleet_total: usize,
    pub fleet_down: usize,
    pub fleet_queued: usize,
    pub equipment_total: usize,
    pub equipment_down: usize,
    pub active_fronts: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// Toast-style message for the UI layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub severity: Severity,
    pub message: String,
}

impl Notice {
    pub fn success<S: Into<String>>(message: S) -> Self {
        Self {
            severity: Severity::Success,
            message: message.into(),
        }
    }

    pub fn from_error(error: &AppError) -> Self {
        match error {
            AppError::Validation(msg) | AppError::State(msg) => Self {
                severity: Severity::Warning,
                message: msg.clone(),
            },
            AppError::RemoteIo(msg) => Self {
                severity: Severity::Error,
                message: format!("Could not reach the server, please retry ({msg})"),
            },
            AppError::Auth(_) => Self {
                severity: Severity::Error,
                message: String::from("Your session has ended, please log in again"),
            },
        }
    }
}
