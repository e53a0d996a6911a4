mod tools;

#[cfg(test)]
mod admin_view_tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate};
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    use shift_roster_core::{
        application::admin_view::AdminRosterView,
        application::dto::Severity,
        application::session::SessionState,
        config::AppConfig,
        domain::models::{
            Collection, Employee, EmployeeId, EquipmentStatus, FleetStatus, NewUser, Role,
            ShiftAssignment, ShiftCode, UserRole,
        },
        infrastructure::repository::{LiveSource, RosterRepository},
        infrastructure::sqlite_repo::SqliteRepository,
        AppError, AppServices, Result,
    };

    use crate::tools;

    // ========================================================================
    // setup
    // ========================================================================

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
            .expect("Failed to run migrations");

        pool
    }

    /// Users that skip the first-login password change.
    async fn seed_user(pool: &SqlitePool, username: &str, role: &str) {
        sqlx::query(
            "INSERT INTO app_users (username, full_name, password, role, first_login)
             VALUES (?, ?, 'pass-123', ?, 0)",
        )
        .bind(username)
        .bind(format!("{username} user"))
        .bind(role)
        .execute(pool)
        .await
        .unwrap();
    }

    async fn admin_services() -> AppServices {
        let pool = setup_test_db().await;
        seed_user(&pool, "admin", "admin").await;
        seed_user(&pool, "viewer", "standard").await;
        let services = AppServices::new(pool, &AppConfig::default());
        services.session.login("admin", "pass-123").await.unwrap();
        services
    }

    /// SQLite for everything except assignment writes, which always fail.
    /// Employee creation goes through the compensating default.
    struct FailingWrites(SqliteRepository);

    #[async_trait]
    impl RosterRepository for FailingWrites {
        async fn list_employees(&self) -> Result<Vec<Employee>> {
            self.0.list_employees().await
        }

        async fn insert_employee(&self, name: &str, role: Role) -> Result<EmployeeId> {
            self.0.insert_employee(name, role).await
        }

        async fn update_employee(&self, id: EmployeeId, name: &str, role: Role) -> Result<()> {
            self.0.update_employee(id, name, role).await
        }

        async fn delete_employee(&self, id: EmployeeId) -> Result<()> {
            self.0.delete_employee(id).await
        }

        async fn fetch_assignments(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<ShiftAssignment>> {
            self.0.fetch_assignments(start, end).await
        }

        async fn upsert_assignments(&self, _rows: &[ShiftAssignment]) -> Result<u64> {
            Err(AppError::remote("connection reset"))
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
    }

    async fn wait_until_stale(services: &AppServices, collection: Collection) {
        for _ in 0..200 {
            if services.cache.status(collection).is_some_and(|s| s.stale) {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("{} never became stale", collection.as_str());
    }

    // ========================================================================
    // roster page
    // ========================================================================

    #[tokio::test]
    async fn opening_the_page_needs_a_session() {
        let pool = setup_test_db().await;
        let services = AppServices::new(pool, &AppConfig::default());
        let mut view = services.admin_view();

        let r = view.open(today()).await;
        assert!(matches!(r, Err(AppError::Auth(_))));
        assert_eq!(services.cache.feed_count(), 0);
    }

    #[tokio::test]
    async fn new_employee_gets_the_generated_roster() {
        let services = admin_services().await;
        let mut view = services.admin_view();
        let grid = view.open(today()).await.unwrap();
        assert!(grid.rows.is_empty());
        assert_eq!(grid.dates.len(), 8);
        assert!(services.cache.feed_count() > 0);

        let rosa = view
            .add_employee("  Rosa  ", Role::ScaleOperator, today(), ShiftCode::A)
            .await
            .unwrap();
        let ivan = view
            .add_employee("Ivan", Role::GeneralServices, today(), ShiftCode::C)
            .await
            .unwrap();

        let grid = view.grid().unwrap();
        tools::show_output::show_roster_grid_debug_data(&grid);

        let rosa_row = grid.rows.iter().find(|r| r.employee_id == rosa).unwrap();
        assert_eq!(rosa_row.name, "Rosa");
        assert_eq!(&rosa_row.cells[..6], &[ShiftCode::A; 6]);
        assert_eq!(&rosa_row.cells[6..], &[ShiftCode::Off; 2]);

        let ivan_row = grid.rows.iter().find(|r| r.employee_id == ivan).unwrap();
        assert_eq!(ivan_row.cells[5], ShiftCode::Off);
        assert_eq!(ivan_row.cells[6], ShiftCode::C);

        // the full horizon was written, not just the visible days
        let stored = services
            .repo
            .fetch_assignments(today(), today() + Duration::days(29))
            .await
            .unwrap();
        assert_eq!(stored.iter().filter(|a| a.employee_id == rosa).count(), 24);
        assert_eq!(stored.iter().filter(|a| a.employee_id == ivan).count(), 25);
    }

    #[tokio::test]
    async fn invalid_new_employees_are_rejected() {
        let services = admin_services().await;
        let mut view = services.admin_view();

        let r = view.add_employee("   ", Role::TankerDriver, today(), ShiftCode::A).await;
        assert!(matches!(r, Err(AppError::Validation(_))));
        let r = view.add_employee("Rosa", Role::TankerDriver, today(), ShiftCode::Off).await;
        assert!(matches!(r, Err(AppError::Validation(_))));
        assert!(services.repo.list_employees().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn saved_edits_are_reloaded_from_storage() {
        let services = admin_services().await;
        let mut view = services.admin_view();
        view.open(today()).await.unwrap();
        let rosa = view
            .add_employee("Rosa", Role::ScaleOperator, today(), ShiftCode::A)
            .await
            .unwrap();

        let (grid, notice) = view
            .save_edits(&[
                ShiftAssignment { employee_id: rosa, date: today(), shift: ShiftCode::C },
                ShiftAssignment { employee_id: rosa, date: today() + Duration::days(7), shift: ShiftCode::B },
                ShiftAssignment { employee_id: rosa, date: today() + Duration::days(6), shift: ShiftCode::Off },
            ])
            .await
            .unwrap();

        assert_eq!(notice.severity, Severity::Success);
        let row = &grid.rows[0];
        assert_eq!(row.cells[0], ShiftCode::C);
        assert_eq!(row.cells[1], ShiftCode::A);
        assert_eq!(row.cells[6], ShiftCode::Off);
        assert_eq!(row.cells[7], ShiftCode::B);

        // nothing pending
        let r = view.save_edits(&[]).await;
        assert!(matches!(r, Err(AppError::State(_))));
    }

    #[tokio::test]
    async fn standard_users_cannot_edit() {
        let pool = setup_test_db().await;
        seed_user(&pool, "viewer", "standard").await;
        let services = AppServices::new(pool, &AppConfig::default());
        services.session.login("viewer", "pass-123").await.unwrap();

        let mut view = services.admin_view();
        view.open(today()).await.unwrap();

        let r = view.add_employee("Rosa", Role::ScaleOperator, today(), ShiftCode::A).await;
        assert!(matches!(r, Err(AppError::State(_))));
        let r = view.save_target(1, today(), 100.0).await;
        assert!(matches!(r, Err(AppError::State(_))));

        // still logged in, only the action was refused
        assert_eq!(services.session.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn removing_an_employee_drops_their_row() {
        let services = admin_services().await;
        let mut view = services.admin_view();
        view.open(today()).await.unwrap();
        let rosa = view
            .add_employee("Rosa", Role::ScaleOperator, today(), ShiftCode::A)
            .await
            .unwrap();
        view.update_employee(rosa, "Rosa M.", Role::ProductionLead).await.unwrap();
        assert_eq!(view.grid().unwrap().rows[0].name, "Rosa M.");

        view.remove_employee(rosa).await.unwrap();
        assert!(view.grid().unwrap().rows.is_empty());
        let left = services
            .repo
            .fetch_assignments(today(), today() + Duration::days(29))
            .await
            .unwrap();
        assert!(left.is_empty());
    }

    #[tokio::test]
    async fn on_shift_lists_the_current_crew() {
        let services = admin_services().await;
        let mut view = services.admin_view();
        view.open(today()).await.unwrap();
        let rosa = view
            .add_employee("Rosa", Role::ScaleOperator, today(), ShiftCode::B)
            .await
            .unwrap();
        view.add_employee("Ivan", Role::TankerDriver, today(), ShiftCode::B)
            .await
            .unwrap();

        let afternoon = today().and_hms_opt(15, 0, 0).unwrap();
        let crew = view.on_shift(Role::ScaleOperator, afternoon).await.unwrap();
        assert_eq!(crew.len(), 1);
        assert_eq!(crew[0].id, rosa);

        let morning = today().and_hms_opt(7, 0, 0).unwrap();
        assert!(view.on_shift(Role::ScaleOperator, morning).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn night_crew_from_yesterday_is_on_shift_before_six() {
        let services = admin_services().await;
        let mut view = services.admin_view();
        view.open(today()).await.unwrap();

        let yesterday = today() - Duration::days(1);
        let tomas = view
            .add_employee("Tomas", Role::ScaleOperator, yesterday, ShiftCode::C)
            .await
            .unwrap();
        view.add_employee("Rosa", Role::ScaleOperator, today(), ShiftCode::C)
            .await
            .unwrap();

        // 03:00 today still belongs to the C shift that started yesterday
        let early = today().and_hms_opt(3, 0, 0).unwrap();
        let crew = view.on_shift(Role::ScaleOperator, early).await.unwrap();
        assert_eq!(crew.iter().map(|e| e.id).collect::<Vec<_>>(), vec![tomas]);

        // 23:00 is tonight's C shift, answered from the loaded window
        let late = today().and_hms_opt(23, 0, 0).unwrap();
        assert_eq!(view.on_shift(Role::ScaleOperator, late).await.unwrap().len(), 2);
        assert_eq!(services.session.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn failed_roster_write_leaves_no_employee_behind() {
        let services = admin_services().await;
        let failing = Arc::new(FailingWrites(SqliteRepository::new(services.repo.pool().clone())));
        let mut view = AdminRosterView::new(
            services.session.clone(),
            Arc::clone(&services.cache),
            failing,
            services.repo.clone(),
            services.repo.clone(),
        );
        view.open(today()).await.unwrap();

        let r = view.add_employee("Rosa", Role::ScaleOperator, today(), ShiftCode::A).await;
        assert!(matches!(r, Err(AppError::RemoteIo(_))));

        assert!(services.repo.list_employees().await.unwrap().is_empty());
        assert!(view.grid().unwrap().rows.is_empty());

        // retrying against a healthy store creates exactly one employee
        let mut view = services.admin_view();
        view.open(today()).await.unwrap();
        view.add_employee("Rosa", Role::ScaleOperator, today(), ShiftCode::A)
            .await
            .unwrap();
        assert_eq!(services.repo.list_employees().await.unwrap().len(), 1);
    }

    // ========================================================================
    // dashboard and targets
    // ========================================================================

    #[tokio::test]
    async fn dashboard_counts_and_follows_changes() {
        let services = admin_services().await;
        let repo = &services.repo;
        repo.insert_fleet_item("ABC-123", "tanker", FleetStatus::Queued).await.unwrap();
        let truck = repo.insert_fleet_item("XYZ-987", "tanker", FleetStatus::Available).await.unwrap();
        repo.insert_equipment_item("loader 1", EquipmentStatus::Operational).await.unwrap();
        repo.insert_equipment_item("loader 2", EquipmentStatus::Down).await.unwrap();
        repo.insert_service_front("North pit").await.unwrap();
        let south = repo.insert_service_front("South pit").await.unwrap();
        sqlx::query("UPDATE service_fronts SET active = 0 WHERE id = ?")
            .bind(south)
            .execute(repo.pool())
            .await
            .unwrap();

        let mut view = services.admin_view();
        view.open(today()).await.unwrap();

        let counters = view.dashboard(false).await.unwrap();
        tools::show_output::show_dashboard_debug_data(&counters);
        assert_eq!(counters.fleet_total, 2);
        assert_eq!(counters.fleet_queued, 1);
        assert_eq!(counters.fleet_down, 0);
        assert_eq!(counters.equipment_total, 2);
        assert_eq!(counters.equipment_down, 1);
        assert_eq!(counters.active_fronts, 1);

        repo.set_fleet_status(truck, FleetStatus::Down).await.unwrap();
        wait_until_stale(&services, Collection::Fleet).await;
        // equipment did not change
        assert!(!services.cache.status(Collection::Equipment).unwrap().stale);

        let counters = view.dashboard(false).await.unwrap();
        assert_eq!(counters.fleet_down, 1);
        assert!(!services.cache.status(Collection::Fleet).unwrap().stale);
    }

    #[tokio::test]
    async fn saved_target_shows_up_after_invalidation() {
        let services = admin_services().await;
        let front = services.repo.insert_service_front("North pit").await.unwrap();

        let mut view = services.admin_view();
        view.open(today()).await.unwrap();
        view.dashboard(false).await.unwrap();

        let r = view.save_target(front, today(), -5.0).await;
        assert!(matches!(r, Err(AppError::Validation(_))));
        let r = view.save_target(front, today(), f64::NAN).await;
        assert!(matches!(r, Err(AppError::Validation(_))));

        let notice = view.save_target(front, today(), 1250.0).await.unwrap();
        assert_eq!(notice.severity, Severity::Success);
        for collection in Collection::ALL {
            assert!(services.cache.status(collection).unwrap().stale);
        }

        let fronts = services.cache.service_fronts(false).await.unwrap();
        assert_eq!(fronts[0].targets.len(), 1);
        assert_eq!(fronts[0].targets[0].volume, 1250.0);

        // same front and date overwrites
        view.save_target(front, today(), 1400.0).await.unwrap();
        let fronts = services.cache.service_fronts(false).await.unwrap();
        assert_eq!(fronts[0].targets.len(), 1);
        assert_eq!(fronts[0].targets[0].volume, 1400.0);

        let again = services.repo.upsert_target(front, today(), 1400.0).await.unwrap();
        assert_eq!(again, fronts[0].targets[0].id);
    }

    // ========================================================================
    // users
    // ========================================================================

    #[tokio::test]
    async fn created_users_must_change_their_password() {
        let services = admin_services().await;
        let view = services.admin_view();

        let r = view
            .create_user(NewUser {
                username: "".into(),
                full_name: "Nobody".into(),
                password: "x".into(),
                role: UserRole::Standard,
            })
            .await;
        assert!(matches!(r, Err(AppError::Validation(_))));

        let id = view
            .create_user(NewUser {
                username: "carla".into(),
                full_name: "Carla Ruiz".into(),
                password: "first-pass".into(),
                role: UserRole::Standard,
            })
            .await
            .unwrap();
        view.set_user_role(id, UserRole::Admin).await.unwrap();

        services.session.logout();
        let state = services.session.login("carla", "first-pass").await.unwrap();
        assert_eq!(state, SessionState::PasswordChangeRequired);
        assert_eq!(services.session.session().unwrap().role, UserRole::Admin);

        // blocked until the password is changed
        let r = view.dashboard(false).await;
        assert!(matches!(r, Err(AppError::State(_))));
    }
}
