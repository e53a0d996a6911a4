//! Data-access interfaces consumed by the core.
//!
//! Storage is an opaque remote collaborator; `SqliteRepository` is the
//! implementation shipped with the crate, tests substitute their own.

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::warn;

use crate::domain::models::*;
use crate::Result;

/// Roster and employee rows.
#[async_trait]
pub trait RosterRepository: Send + Sync {
    async fn list_employees(&self) -> Result<Vec<Employee>>;

    async fn insert_employee(&self, name: &str, role: Role) -> Result<EmployeeId>;

    async fn update_employee(&self, id: EmployeeId, name: &str, role: Role) -> Result<()>;

    /// Deleting an employee cascades to all of its assignments.
    async fn delete_employee(&self, id: EmployeeId) -> Result<()>;

    /// Working-day rows with `start <= date <= end`.
    async fn fetch_assignments(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ShiftAssignment>>;

    /// Batched upsert keyed by (employee, date). All rows land or none do.
    async fn upsert_assignments(&self, rows: &[ShiftAssignment]) -> Result<u64>;

    /// Creates an employee together with its working days. Either both land
    /// or neither does, so a failed call can be retried as is.
    ///
    /// The default compensates: the employee is deleted again when the
    /// roster write fails. Stores with transactions should override it.
    async fn insert_employee_with_roster(
        &self,
        name: &str,
        role: Role,
        days: &[(NaiveDate, ShiftCode)],
    ) -> Result<EmployeeId> {
        let employee_id = self.insert_employee(name, role).await?;
        if days.is_empty() {
            return Ok(employee_id);
        }

        let rows: Vec<ShiftAssignment> = days
            .iter()
            .map(|&(date, shift)| ShiftAssignment {
                employee_id,
                date,
                shift,
            })
            .collect();
        if let Err(e) = self.upsert_assignments(&rows).await {
            if let Err(undo) = self.delete_employee(employee_id).await {
                warn!(employee_id, error = %undo, "could not remove employee after failed roster write");
            }
            return Err(e);
        }
        Ok(employee_id)
    }
}

/// Read side of the volatile collections, plus the target sub-record write.
#[async_trait]
pub trait LiveSource: Send + Sync {
    async fn fetch_collection(&self, collection: Collection) -> Result<CollectionItems>;

    async fn upsert_target(
        &self,
        front_id: FrontId,
        effective_from: NaiveDate,
        volume: f64,
    ) -> Result<i64>;
}

/// User records and the stub credential check.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_credentials(&self, username: &str, password: &str) -> Result<Option<AppUser>>;

    /// Replaces the password and clears `first_login` in one write.
    /// Returns `false` when `current` does not match.
    async fn change_password(&self, user_id: UserId, current: &str, new: &str) -> Result<bool>;

    async fn create_user(&self, user: &NewUser) -> Result<UserId>;

    async fn set_user_role(&self, user_id: UserId, role: UserRole) -> Result<()>;
}
