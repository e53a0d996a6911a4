use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::info;

use crate::application::dto::{DashboardCounters, Notice, RosterGrid};
use crate::application::live_cache::{CacheScope, LiveCache};
use crate::application::roster_store::RosterStore;
use crate::application::session::SessionController;
use crate::domain::models::*;
use crate::domain::roster_gen::{self, VISIBLE_DAYS};
use crate::domain::shift_clock::active_shift;
use crate::error::AppError;
use crate::infrastructure::repository::{LiveSource, RosterRepository, UserRepository};
use crate::Result;

/// Thin orchestrator behind the admin roster page and the dashboard.
///
/// Every entry point checks the session first; any `Auth` failure on the way
/// ends the session through `SessionController::guard`.
pub struct AdminRosterView {
    session: SessionController,
    store: RosterStore,
    cache: Arc<LiveCache>,
    roster: Arc<dyn RosterRepository>,
    live: Arc<dyn LiveSource>,
    users: Arc<dyn UserRepository>,
    today: Option<NaiveDate>,
}

impl AdminRosterView {
    pub fn new(
        session: SessionController,
        cache: Arc<LiveCache>,
        roster: Arc<dyn RosterRepository>,
        live: Arc<dyn LiveSource>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            session,
            store: RosterStore::new(Arc::clone(&roster)),
            cache,
            roster,
            live,
            users,
            today: None,
        }
    }

    pub fn store(&self) -> &RosterStore {
        &self.store
    }

    fn window_bounds(today: NaiveDate) -> (NaiveDate, NaiveDate) {
        (today, today + Duration::days(VISIBLE_DAYS as i64 - 1))
    }

    async fn reload(&mut self) -> Result<RosterGrid> {
        let today = self
            .today
            .ok_or_else(|| AppError::state("the roster page has not been opened"))?;
        let (start, end) = Self::window_bounds(today);
        Ok(self.store.load_window(start, end).await?.to_grid())
    }

    /// Opens the page: starts the change feeds and loads today .. today+7.
    pub async fn open(&mut self, today: NaiveDate) -> Result<RosterGrid> {
        self.session.require_interactive()?;
        self.cache.subscribe_to_changes();
        self.today = Some(today);
        let grid = self.reload().await;
        self.session.guard(grid)
    }

    pub fn grid(&self) -> Option<RosterGrid> {
        self.store.window().map(|w| w.to_grid())
    }

    /// Saves grid edits as one batch, then reloads the window from the
    /// remote source rather than patching it locally.
    pub async fn save_edits(&mut self, edits: &[ShiftAssignment]) -> Result<(RosterGrid, Notice)> {
        self.session.require_admin()?;

        // 1. One batched write
        let saved = self.store.save_window(edits).await;
        let written = self.session.guard(saved)?;

        // 2. Everything cached may depend on the roster
        self.cache.invalidate(CacheScope::All);

        // 3. Reload, never patch
        let grid = self.reload().await;
        let grid = self.session.guard(grid)?;
        Ok((grid, Notice::success(format!("Roster saved ({written} rows)"))))
    }

    /// Creates an employee and persists the 30-day roster of the role's policy.
    pub async fn add_employee(
        &mut self,
        name: &str,
        role: Role,
        start: NaiveDate,
        initial_shift: ShiftCode,
    ) -> Result<EmployeeId> {
        self.session.require_admin()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation("the employee name is empty"));
        }
        if !initial_shift.is_working() {
            return Err(AppError::validation("initial shift must be one of A, B or C"));
        }

        // 1. Generate (the id is not known yet; only the days are kept)
        let days: Vec<(NaiveDate, ShiftCode)> =
            roster_gen::generate(0, start, role.policy(), initial_shift)?
                .into_iter()
                .map(|a| (a.date, a.shift))
                .collect();

        // 2. Employee and days in one write
        let created = self.roster.insert_employee_with_roster(name, role, &days).await;
        let employee_id = self.session.guard(created)?;
        info!(employee_id, policy = ?role.policy(), days = days.len(), "initial roster generated");

        if self.today.is_some() {
            let grid = self.reload().await;
            self.session.guard(grid)?;
        }
        Ok(employee_id)
    }

    pub async fn update_employee(&mut self, id: EmployeeId, name: &str, role: Role) -> Result<()> {
        self.session.require_admin()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation("the employee name is empty"));
        }
        let updated = self.roster.update_employee(id, name, role).await;
        self.session.guard(updated)?;
        if self.today.is_some() {
            let grid = self.reload().await;
            self.session.guard(grid)?;
        }
        Ok(())
    }

    pub async fn remove_employee(&mut self, id: EmployeeId) -> Result<()> {
        self.session.require_admin()?;
        let removed = self.roster.delete_employee(id).await;
        self.session.guard(removed)?;
        if self.today.is_some() {
            let grid = self.reload().await;
            self.session.guard(grid)?;
        }
        Ok(())
    }

    /// Employees with `role` on shift at `now`.
    ///
    /// Answered from the loaded window when it covers the shift; otherwise
    /// (the C shift that started the day before the window) the shift's day
    /// is read on its own.
    pub async fn on_shift(&self, role: Role, now: NaiveDateTime) -> Result<Vec<Employee>> {
        self.session.require_interactive()?;
        let (shift_date, _) = active_shift(now.date(), now.time());
        if self.store.window().is_some_and(|w| w.contains(shift_date)) {
            return self.store.current_shift_for(role, now.date(), now.time());
        }

        let mut day = RosterStore::new(Arc::clone(&self.roster));
        let loaded = day.load_window(shift_date, shift_date).await.map(|_| ());
        let crew = loaded.and_then(|_| day.current_shift_for(role, now.date(), now.time()));
        self.session.guard(crew)
    }

    pub async fn dashboard(&self, force_refresh: bool) -> Result<DashboardCounters> {
        self.session.require_interactive()?;
        let counters = self.collect_counters(force_refresh).await;
        self.session.guard(counters)
    }

    async fn collect_counters(&self, force_refresh: bool) -> Result<DashboardCounters> {
        let fleet = self.cache.fleet(force_refresh).await?;
        let equipment = self.cache.equipment(force_refresh).await?;
        let fronts = self.cache.service_fronts(force_refresh).await?;

        Ok(DashboardCounters {
            fleet_total: fleet.len(),
            fleet_down: fleet.iter().filter(|f| f.status == FleetStatus::Down).count(),
            fleet_queued: fleet.iter().filter(|f| f.status == FleetStatus::Queued).count(),
            equipment_total: equipment.len(),
            equipment_down: equipment
                .iter()
                .filter(|e| e.status == EquipmentStatus::Down)
                .count(),
            active_fronts: fronts.iter().filter(|f| f.active).count(),
        })
    }

    pub async fn save_target(
        &self,
        front_id: FrontId,
        effective_from: NaiveDate,
        volume: f64,
    ) -> Result<Notice> {
        self.session.require_admin()?;
        if !volume.is_finite() || volume < 0.0 {
            return Err(AppError::validation("the target volume must be a positive number"));
        }
        let saved = self.live.upsert_target(front_id, effective_from, volume).await;
        self.session.guard(saved)?;
        self.cache.invalidate(CacheScope::All);
        Ok(Notice::success("Target saved"))
    }

    pub async fn create_user(&self, user: NewUser) -> Result<UserId> {
        self.session.require_admin()?;
        if user.username.trim().is_empty() || user.full_name.trim().is_empty() {
            return Err(AppError::validation("username and full name are required"));
        }
        if user.password.is_empty() {
            return Err(AppError::validation("an initial password is required"));
        }
        let created = self.users.create_user(&user).await;
        self.session.guard(created)
    }

    pub async fn set_user_role(&self, user_id: UserId, role: UserRole) -> Result<()> {
        self.session.require_admin()?;
        let updated = self.users.set_user_role(user_id, role).await;
        self.session.guard(updated)
    }
}
