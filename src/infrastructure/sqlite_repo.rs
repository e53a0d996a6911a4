use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

use crate::domain::models::*;
use crate::infrastructure::notifier::ChangeHub;
use crate::infrastructure::repository::{LiveSource, RosterRepository, UserRepository};
use crate::error::AppError;
use crate::Result;

/// SQLite-backed persistence collaborator.
///
/// Every committed write is announced on the attached `ChangeHub`, which is
/// what drives push invalidation of the live cache.
pub struct SqliteRepository {
    pool: SqlitePool,
    hub: Option<ChangeHub>,
}

// =====================
// Row helpers for decoding
// =====================

#[derive(FromRow)]
struct EmployeeRow {
    id: i64,
    name: String,
    role: String,
}

impl TryFrom<EmployeeRow> for Employee {
    type Error = AppError;

    fn try_from(row: EmployeeRow) -> Result<Self> {
        Ok(Employee {
            id: row.id,
            name: row.name,
            role: row.role.parse()?,
        })
    }
}

#[derive(FromRow)]
struct AssignmentRow {
    employee_id: i64,
    work_date: NaiveDate,
    shift_code: String,
}

impl TryFrom<AssignmentRow> for ShiftAssignment {
    type Error = AppError;

    fn try_from(row: AssignmentRow) -> Result<Self> {
        Ok(ShiftAssignment {
            employee_id: row.employee_id,
            date: row.work_date,
            shift: row.shift_code.parse()?,
        })
    }
}

#[derive(FromRow)]
struct FleetRow {
    id: i64,
    plate: String,
    kind: String,
    status: String,
}

#[derive(FromRow)]
struct EquipmentRow {
    id: i64,
    name: String,
    status: String,
}

#[derive(FromRow)]
struct FrontRow {
    id: i64,
    name: String,
    active: bool,
}

#[derive(FromRow)]
struct TargetRow {
    id: i64,
    front_id: i64,
    effective_from: NaiveDate,
    volume: f64,
}

#[derive(FromRow)]
struct UserRow {
    id: i64,
    username: String,
    full_name: String,
    role: String,
    first_login: bool,
}

impl TryFrom<UserRow> for AppUser {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(AppUser {
            id: row.id,
            username: row.username,
            full_name: row.full_name,
            role: row.role.parse()?,
            first_login: row.first_login,
        })
    }
}

/// Stored values that fail to parse are a broken remote, not bad user input.
fn decode_err(e: AppError) -> AppError {
    AppError::remote(format!("malformed row: {e}"))
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, hub: None }
    }

    pub fn with_hub(pool: SqlitePool, hub: ChangeHub) -> Self {
        Self {
            pool,
            hub: Some(hub),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn notify(&self, table: Table, op: ChangeOp) {
        if let Some(hub) = &self.hub {
            hub.publish(table, op);
        }
    }

    // =================================================================
    // Fleet / equipment / service front writes
    // =================================================================

    pub async fn insert_fleet_item(&self, plate: &str, kind: &str, status: FleetStatus) -> Result<i64> {
        let id = sqlx::query("INSERT INTO fleet_items (plate, kind, status) VALUES (?, ?, ?)")
            .bind(plate)
            .bind(kind)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        self.notify(Table::FleetItems, ChangeOp::Insert);
        Ok(id)
    }

    pub async fn set_fleet_status(&self, id: i64, status: FleetStatus) -> Result<()> {
        let affected = sqlx::query("UPDATE fleet_items SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(AppError::validation(format!("fleet item {id} not found")));
        }
        self.notify(Table::FleetItems, ChangeOp::Update);
        Ok(())
    }

    pub async fn insert_equipment_item(&self, name: &str, status: EquipmentStatus) -> Result<i64> {
        let id = sqlx::query("INSERT INTO equipment_items (name, status) VALUES (?, ?)")
            .bind(name)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        self.notify(Table::EquipmentItems, ChangeOp::Insert);
        Ok(id)
    }

    pub async fn set_equipment_status(&self, id: i64, status: EquipmentStatus) -> Result<()> {
        let affected = sqlx::query("UPDATE equipment_items SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(AppError::validation(format!("equipment item {id} not found")));
        }
        self.notify(Table::EquipmentItems, ChangeOp::Update);
        Ok(())
    }

    pub async fn insert_service_front(&self, name: &str) -> Result<FrontId> {
        let id = sqlx::query("INSERT INTO service_fronts (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        self.notify(Table::ServiceFronts, ChangeOp::Insert);
        Ok(id)
    }

    async fn fetch_fleet(&self) -> Result<Vec<FleetItem>> {
        let rows: Vec<FleetRow> =
            sqlx::query_as("SELECT id, plate, kind, status FROM fleet_items ORDER BY id ASC")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|row| {
                Ok(FleetItem {
                    id: row.id,
                    plate: row.plate,
                    kind: row.kind,
                    status: row.status.parse().map_err(decode_err)?,
                })
            })
            .collect()
    }

    async fn fetch_equipment(&self) -> Result<Vec<EquipmentItem>> {
        let rows: Vec<EquipmentRow> =
            sqlx::query_as("SELECT id, name, status FROM equipment_items ORDER BY id ASC")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|row| {
                Ok(EquipmentItem {
                    id: row.id,
                    name: row.name,
                    status: row.status.parse().map_err(decode_err)?,
                })
            })
            .collect()
    }

    async fn fetch_service_fronts(&self) -> Result<Vec<ServiceFront>> {
        let fronts: Vec<FrontRow> =
            sqlx::query_as("SELECT id, name, active FROM service_fronts ORDER BY id ASC")
                .fetch_all(&self.pool)
                .await?;

        // One query per front; the number of fronts is small
        let mut out = Vec::with_capacity(fronts.len());
        for front in fronts {
            let targets: Vec<TargetRow> = sqlx::query_as(
                "SELECT id, front_id, effective_from, volume FROM targets
                 WHERE front_id = ? ORDER BY effective_from ASC",
            )
            .bind(front.id)
            .fetch_all(&self.pool)
            .await?;

            out.push(ServiceFront {
                id: front.id,
                name: front.name,
                active: front.active,
                targets: targets
                    .into_iter()
                    .map(|t| Target {
                        id: t.id,
                        front_id: t.front_id,
                        effective_from: t.effective_from,
                        volume: t.volume,
                    })
                    .collect(),
            });
        }
        Ok(out)
    }
}

// =================================================================
// Roster rows
// =================================================================

#[async_trait]
impl RosterRepository for SqliteRepository {
    async fn list_employees(&self) -> Result<Vec<Employee>> {
        let rows: Vec<EmployeeRow> =
            sqlx::query_as("SELECT id, name, role FROM employees ORDER BY name ASC, id ASC")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|row| Employee::try_from(row).map_err(decode_err))
            .collect()
    }

    async fn insert_employee(&self, name: &str, role: Role) -> Result<EmployeeId> {
        let id = sqlx::query("INSERT INTO employees (name, role) VALUES (?, ?)")
            .bind(name)
            .bind(role.as_str())
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        info!(employee_id = id, role = role.as_str(), "employee created");
        self.notify(Table::Employees, ChangeOp::Insert);
        Ok(id)
    }

    async fn update_employee(&self, id: EmployeeId, name: &str, role: Role) -> Result<()> {
        let affected = sqlx::query("UPDATE employees SET name = ?, role = ? WHERE id = ?")
            .bind(name)
            .bind(role.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(AppError::validation(format!("employee {id} not found")));
        }
        self.notify(Table::Employees, ChangeOp::Update);
        Ok(())
    }

    async fn delete_employee(&self, id: EmployeeId) -> Result<()> {
        // ON DELETE CASCADE removes the assignments too
        sqlx::query("DELETE FROM employees WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        info!(employee_id = id, "employee deleted");
        self.notify(Table::Employees, ChangeOp::Delete);
        Ok(())
    }

    async fn fetch_assignments(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ShiftAssignment>> {
        let rows: Vec<AssignmentRow> = sqlx::query_as(
            "SELECT employee_id, work_date, shift_code FROM shift_assignments
             WHERE work_date >= ?1 AND work_date <= ?2
             ORDER BY employee_id ASC, work_date ASC",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| ShiftAssignment::try_from(row).map_err(decode_err))
            .collect()
    }

    async fn upsert_assignments(&self, rows: &[ShiftAssignment]) -> Result<u64> {
        if let Some(off) = rows.iter().find(|row| !row.shift.is_working()) {
            return Err(AppError::validation(format!(
                "Off is never stored (employee {}, {})",
                off.employee_id, off.date
            )));
        }

        // 1. Begin; a failure anywhere below rolls the whole batch back
        let mut tx = self.pool.begin().await?;

        // 2. Upsert every row
        let mut written = 0;
        for row in rows {
            written += sqlx::query(
                "INSERT INTO shift_assignments (employee_id, work_date, shift_code)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (employee_id, work_date) DO UPDATE SET shift_code = excluded.shift_code",
            )
            .bind(row.employee_id)
            .bind(row.date)
            .bind(row.shift.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        // 3. Commit
        tx.commit().await?;

        debug!(rows = rows.len(), "assignments upserted");
        self.notify(Table::ShiftAssignments, ChangeOp::Update);
        Ok(written)
    }

    async fn insert_employee_with_roster(
        &self,
        name: &str,
        role: Role,
        days: &[(NaiveDate, ShiftCode)],
    ) -> Result<EmployeeId> {
        if let Some((date, _)) = days.iter().find(|(_, shift)| !shift.is_working()) {
            return Err(AppError::validation(format!("Off is never stored ({date})")));
        }

        // 1. Begin; the employee row and its days commit together
        let mut tx = self.pool.begin().await?;

        // 2. Employee
        let employee_id = sqlx::query("INSERT INTO employees (name, role) VALUES (?, ?)")
            .bind(name)
            .bind(role.as_str())
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        // 3. Working days
        for &(date, shift) in days {
            sqlx::query(
                "INSERT INTO shift_assignments (employee_id, work_date, shift_code)
                 VALUES (?1, ?2, ?3)",
            )
            .bind(employee_id)
            .bind(date)
            .bind(shift.as_str())
            .execute(&mut *tx)
            .await?;
        }

        // 4. Commit
        tx.commit().await?;

        info!(employee_id, role = role.as_str(), days = days.len(), "employee created with roster");
        self.notify(Table::Employees, ChangeOp::Insert);
        if !days.is_empty() {
            self.notify(Table::ShiftAssignments, ChangeOp::Insert);
        }
        Ok(employee_id)
    }
}

// =================================================================
// Live collections
// =================================================================

#[async_trait]
impl LiveSource for SqliteRepository {
    async fn fetch_collection(&self, collection: Collection) -> Result<CollectionItems> {
        match collection {
            Collection::Fleet => Ok(CollectionItems::Fleet(self.fetch_fleet().await?)),
            Collection::Equipment => Ok(CollectionItems::Equipment(self.fetch_equipment().await?)),
            Collection::ServiceFronts => {
                Ok(CollectionItems::ServiceFronts(self.fetch_service_fronts().await?))
            }
        }
    }

    async fn upsert_target(
        &self,
        front_id: FrontId,
        effective_from: NaiveDate,
        volume: f64,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO targets (front_id, effective_from, volume) VALUES (?1, ?2, ?3)
             ON CONFLICT (front_id, effective_from) DO UPDATE SET volume = excluded.volume
             RETURNING id",
        )
        .bind(front_id)
        .bind(effective_from)
        .bind(volume)
        .fetch_one(&self.pool)
        .await?;
        self.notify(Table::Targets, ChangeOp::Update);
        Ok(id)
    }
}

// =================================================================
// Users
// =================================================================

#[async_trait]
impl UserRepository for SqliteRepository {
    async fn find_by_credentials(&self, username: &str, password: &str) -> Result<Option<AppUser>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, username, full_name, role, first_login FROM app_users
             WHERE username = ? AND password = ?",
        )
        .bind(username)
        .bind(password)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| AppUser::try_from(row).map_err(decode_err))
            .transpose()
    }

    async fn change_password(&self, user_id: UserId, current: &str, new: &str) -> Result<bool> {
        // Single statement: the password and first_login flag change together
        let affected = sqlx::query(
            "UPDATE app_users SET password = ?1, first_login = 0
             WHERE id = ?2 AND password = ?3",
        )
        .bind(new)
        .bind(user_id)
        .bind(current)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 1 {
            self.notify(Table::AppUsers, ChangeOp::Update);
        }
        Ok(affected == 1)
    }

    async fn create_user(&self, user: &NewUser) -> Result<UserId> {
        let id = sqlx::query(
            "INSERT INTO app_users (username, full_name, password, role, first_login)
             VALUES (?, ?, ?, ?, 1)",
        )
        .bind(&user.username)
        .bind(&user.full_name)
        .bind(&user.password)
        .bind(user.role.as_str())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        info!(user_id = id, username = %user.username, "user created");
        self.notify(Table::AppUsers, ChangeOp::Insert);
        Ok(id)
    }

    async fn set_user_role(&self, user_id: UserId, role: UserRole) -> Result<()> {
        let affected = sqlx::query("UPDATE app_users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(AppError::validation(format!("user {user_id} not found")));
        }
        self.notify(Table::AppUsers, ChangeOp::Update);
        Ok(())
    }
}

#[cfg(test)]
mod sqlite_repo_tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    // in-memory DB, one connection so every query sees the same database
    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create memory pool");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("failed to run migrations");

        pool
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_and_fetch_assignments() {
        let repo = SqliteRepository::new(setup_test_db().await);
        let id = repo.insert_employee("Rosa", Role::ScaleOperator).await.unwrap();

        let rows = [
            ShiftAssignment { employee_id: id, date: date(6), shift: ShiftCode::A },
            ShiftAssignment { employee_id: id, date: date(7), shift: ShiftCode::A },
        ];
        repo.upsert_assignments(&rows).await.unwrap();

        // overwrite one day
        repo.upsert_assignments(&[ShiftAssignment { employee_id: id, date: date(7), shift: ShiftCode::C }])
            .await
            .unwrap();

        let fetched = repo.fetch_assignments(date(1), date(31)).await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[1].shift, ShiftCode::C);
    }

    #[tokio::test]
    async fn test_failed_batch_writes_nothing() {
        let repo = SqliteRepository::new(setup_test_db().await);
        let id = repo.insert_employee("Rosa", Role::ScaleOperator).await.unwrap();

        // second row violates the employee foreign key
        let rows = [
            ShiftAssignment { employee_id: id, date: date(6), shift: ShiftCode::A },
            ShiftAssignment { employee_id: id + 100, date: date(6), shift: ShiftCode::A },
        ];
        assert!(matches!(
            repo.upsert_assignments(&rows).await,
            Err(AppError::RemoteIo(_))
        ));
        assert!(repo.fetch_assignments(date(1), date(31)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_employee_with_roster_commits_together() {
        let repo = SqliteRepository::new(setup_test_db().await);

        let id = repo
            .insert_employee_with_roster("Rosa", Role::ScaleOperator, &[(date(6), ShiftCode::A), (date(7), ShiftCode::B)])
            .await
            .unwrap();
        let fetched = repo.fetch_assignments(date(1), date(31)).await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert!(fetched.iter().all(|a| a.employee_id == id));

        // the repeated day violates the primary key after the employee row was written
        let r = repo
            .insert_employee_with_roster("Ivan", Role::TankerDriver, &[(date(6), ShiftCode::C), (date(6), ShiftCode::C)])
            .await;
        assert!(matches!(r, Err(AppError::RemoteIo(_))));

        let employees = repo.list_employees().await.unwrap();
        assert_eq!(employees.len(), 1);
        assert_eq!(employees[0].name, "Rosa");
        assert_eq!(repo.fetch_assignments(date(1), date(31)).await.unwrap().len(), 2);

        let r = repo
            .insert_employee_with_roster("Ivan", Role::TankerDriver, &[(date(6), ShiftCode::Off)])
            .await;
        assert!(matches!(r, Err(AppError::Validation(_))));
        assert_eq!(repo.list_employees().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_employee_cascades() {
        let repo = SqliteRepository::new(setup_test_db().await);
        let id = repo.insert_employee("Tomas", Role::TankerDriver).await.unwrap();
        repo.upsert_assignments(&[ShiftAssignment { employee_id: id, date: date(6), shift: ShiftCode::B }])
            .await
            .unwrap();

        repo.delete_employee(id).await.unwrap();

        let left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shift_assignments")
            .fetch_one(repo.pool())
            .await
            .unwrap();
        assert_eq!(left, 0, "assignments should be removed with their employee");
    }

    #[tokio::test]
    async fn test_change_password_clears_first_login() {
        let repo = SqliteRepository::new(setup_test_db().await);
        let user = NewUser {
            username: "ana".into(),
            full_name: "Ana Ruiz".into(),
            password: "start123".into(),
            role: UserRole::Standard,
        };
        let id = repo.create_user(&user).await.unwrap();

        let found = repo.find_by_credentials("ana", "start123").await.unwrap().unwrap();
        assert!(found.first_login);

        assert!(!repo.change_password(id, "wrong", "newpass1").await.unwrap());
        assert!(repo.change_password(id, "start123", "newpass1").await.unwrap());

        assert!(repo.find_by_credentials("ana", "start123").await.unwrap().is_none());
        let found = repo.find_by_credentials("ana", "newpass1").await.unwrap().unwrap();
        assert!(!found.first_login);
    }

    #[tokio::test]
    async fn test_service_fronts_carry_targets() {
        let repo = SqliteRepository::new(setup_test_db().await);
        let front = repo.insert_service_front("North pit").await.unwrap();
        repo.upsert_target(front, date(1), 1200.0).await.unwrap();
        repo.upsert_target(front, date(1), 1500.0).await.unwrap();

        let items = repo.fetch_collection(Collection::ServiceFronts).await.unwrap();
        let CollectionItems::ServiceFronts(fronts) = items else {
            panic!("wrong collection");
        };
        assert_eq!(fronts.len(), 1);
        assert_eq!(fronts[0].targets.len(), 1);
        assert_eq!(fronts[0].targets[0].volume, 1500.0);
    }
}
