use shift_roster_core::application::dto::{DashboardCounters, RosterGrid};

#[allow(dead_code)]
pub fn show_roster_grid_debug_data(grid: &RosterGrid) {
    println!("\n=======================================================");
    println!("[DEBUG] roster grid ({} employees x {} days)", grid.rows.len(), grid.dates.len());
    println!("=======================================================");

    let header: Vec<String> = grid.dates.iter().map(|d| d.format("%a %d").to_string()).collect();
    println!("{:<20} | {}", "employee", header.join(" | "));
    println!("-------------------------------------------------------");

    for row in &grid.rows {
        let cells: Vec<String> = row
            .cells
            .iter()
            .map(|c| if c.is_working() { format!("{:<6}", c.as_str()) } else { String::from("--    ") })
            .collect();
        println!("{:<20} | {}", format!("{} ({:?})", row.name, row.role), cells.join(" | "));
    }
    println!("=======================================================\n");
}

#[allow(dead_code)]
pub fn show_dashboard_debug_data(counters: &DashboardCounters) {
    println!("\n=======================================================");
    println!("[DEBUG] dashboard");
    println!("   fleet     : {} total, {} down, {} queued", counters.fleet_total, counters.fleet_down, counters.fleet_queued);
    println!("   equipment : {} total, {} down", counters.equipment_total, counters.equipment_down);
    println!("   fronts    : {} active", counters.active_fronts);
    println!("=======================================================\n");
}
