// =====================
// Domain model definitions
// =====================

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub type EmployeeId = i64;
pub type UserId = i64;
pub type FrontId = i64;

// --- Shift codes ---

/// A, B, C are working shifts. `Off` is never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShiftCode {
    A,
    B,
    C,
    Off,
}

impl ShiftCode {
    /// Rotation order, walked backwards: A -> B -> C -> A.
    const CYCLE: [ShiftCode; 3] = [ShiftCode::C, ShiftCode::B, ShiftCode::A];

    pub fn is_working(self) -> bool {
        !matches!(self, ShiftCode::Off)
    }

    /// Next working shift in the rotation. `Off` has no successor.
    pub fn next_in_rotation(self) -> Option<ShiftCode> {
        let index = Self::CYCLE.iter().position(|code| *code == self)?;
        Some(Self::CYCLE[(index + Self::CYCLE.len() - 1) % Self::CYCLE.len()])
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ShiftCode::A => "A",
            ShiftCode::B => "B",
            ShiftCode::C => "C",
            ShiftCode::Off => "Off",
        }
    }
}

impl fmt::Display for ShiftCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShiftCode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "a" => Ok(ShiftCode::A),
            "B" | "b" => Ok(ShiftCode::B),
            "C" | "c" => Ok(ShiftCode::C),
            "Off" | "off" | "OFF" | "" => Ok(ShiftCode::Off),
            other => Err(AppError::validation(format!("unknown shift code '{other}'"))),
        }
    }
}

// --- Roster policies ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RosterPolicy {
    /// 6 on, 2 off, shift code advances after every block.
    #[serde(rename = "rotating-6-2")]
    Rotating6x2,
    /// 6 on, 2 off, shift code never changes.
    #[serde(rename = "fixed-6-2")]
    Fixed6x2,
    /// 5 on, 1 off, shift code never changes.
    #[serde(rename = "fixed-5-1")]
    Fixed5x1,
}

impl RosterPolicy {
    pub fn work_length(self) -> u32 {
        match self {
            RosterPolicy::Rotating6x2 | RosterPolicy::Fixed6x2 => 6,
            RosterPolicy::Fixed5x1 => 5,
        }
    }

    pub fn off_length(self) -> u32 {
        match self {
            RosterPolicy::Rotating6x2 | RosterPolicy::Fixed6x2 => 2,
            RosterPolicy::Fixed5x1 => 1,
        }
    }

    pub fn rotates(self) -> bool {
        matches!(self, RosterPolicy::Rotating6x2)
    }
}

impl FromStr for RosterPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rotating-6-2" => Ok(RosterPolicy::Rotating6x2),
            "fixed-6-2" => Ok(RosterPolicy::Fixed6x2),
            "fixed-5-1" => Ok(RosterPolicy::Fixed5x1),
            other => Err(AppError::validation(format!("unknown roster policy '{other}'"))),
        }
    }
}

// --- Employees ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    ProductionLead,
    ScaleOperator,
    TankerDriver,
    GeneralServices,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::ProductionLead,
        Role::ScaleOperator,
        Role::TankerDriver,
        Role::GeneralServices,
    ];

    /// Business rule binding each role to its roster policy.
    pub fn policy(self) -> RosterPolicy {
        match self {
            Role::ProductionLead | Role::ScaleOperator => RosterPolicy::Rotating6x2,
            Role::TankerDriver => RosterPolicy::Fixed6x2,
            Role::GeneralServices => RosterPolicy::Fixed5x1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::ProductionLead => "production_lead",
            Role::ScaleOperator => "scale_operator",
            Role::TankerDriver => "tanker_driver",
            Role::GeneralServices => "general_services",
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| AppError::validation(format!("unknown role '{s}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: EmployeeId,
    pub name: String,
    pub role: Role,
}

/// (employee, date, shift). Unique per (employee, date).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftAssignment {
    pub employee_id: EmployeeId,
    pub date: NaiveDate,
    pub shift: ShiftCode,
}

// --- Users ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Standard,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Standard => "standard",
        }
    }
}

impl FromStr for UserRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "standard" => Ok(UserRole::Standard),
            other => Err(AppError::validation(format!("unknown user role '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppUser {
    pub id: UserId,
    pub username: String,
    pub full_name: String,
    pub role: UserRole,
    pub first_login: bool,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub full_name: String,
    pub password: String,
    pub role: UserRole,
}

// --- Fleet / equipment / service fronts ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FleetStatus {
    Available,
    Queued,
    Loading,
    Down,
}

impl FleetStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FleetStatus::Available => "available",
            FleetStatus::Queued => "queued",
            FleetStatus::Loading => "loading",
            FleetStatus::Down => "down",
        }
    }
}

impl FromStr for FleetStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(FleetStatus::Available),
            "queued" => Ok(FleetStatus::Queued),
            "loading" => Ok(FleetStatus::Loading),
            "down" => Ok(FleetStatus::Down),
            other => Err(AppError::validation(format!("unknown fleet status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetItem {
    pub id: i64,
    pub plate: String,
    pub kind: String,
    pub status: FleetStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentStatus {
    Operational,
    Down,
}

impl EquipmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EquipmentStatus::Operational => "operational",
            EquipmentStatus::Down => "down",
        }
    }
}

impl FromStr for EquipmentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "operational" => Ok(EquipmentStatus::Operational),
            "down" => Ok(EquipmentStatus::Down),
            other => Err(AppError::validation(format!("unknown equipment status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentItem {
    pub id: i64,
    pub name: String,
    pub status: EquipmentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub id: i64,
    pub front_id: FrontId,
    pub effective_from: NaiveDate,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceFront {
    pub id: FrontId,
    pub name: String,
    pub active: bool,
    pub targets: Vec<Target>,
}

// --- Cached collections and remote tables ---

/// Named volatile collections held by the live cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Fleet,
    Equipment,
    ServiceFronts,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::Fleet,
        Collection::Equipment,
        Collection::ServiceFronts,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Fleet => "trucks",
            Collection::Equipment => "equipment",
            Collection::ServiceFronts => "service_fronts",
        }
    }

    /// Tables whose changes make this collection stale.
    pub fn tables(self) -> &'static [Table] {
        match self {
            Collection::Fleet => &[Table::FleetItems],
            Collection::Equipment => &[Table::EquipmentItems],
            Collection::ServiceFronts => &[Table::ServiceFronts, Table::Targets],
        }
    }
}

impl FromStr for Collection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trucks" | "fleet" => Ok(Collection::Fleet),
            "equipment" => Ok(Collection::Equipment),
            "service_fronts" => Ok(Collection::ServiceFronts),
            other => Err(AppError::validation(format!("unknown collection '{other}'"))),
        }
    }
}

/// Remote tables owned by the persistence collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Employees,
    ShiftAssignments,
    FleetItems,
    EquipmentItems,
    ServiceFronts,
    Targets,
    AppUsers,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::Employees => "employees",
            Table::ShiftAssignments => "shift_assignments",
            Table::FleetItems => "fleet_items",
            Table::EquipmentItems => "equipment_items",
            Table::ServiceFronts => "service_fronts",
            Table::Targets => "targets",
            Table::AppUsers => "app_users",
        }
    }

    /// The cached collection fed by this table, if any.
    pub fn collection(self) -> Option<Collection> {
        match self {
            Table::FleetItems => Some(Collection::Fleet),
            Table::EquipmentItems => Some(Collection::Equipment),
            Table::ServiceFronts | Table::Targets => Some(Collection::ServiceFronts),
            Table::Employees | Table::ShiftAssignments | Table::AppUsers => None,
        }
    }
}

/// Items of one cached collection, as returned by the remote source.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "collection", content = "items", rename_all = "snake_case")]
pub enum CollectionItems {
    Fleet(Vec<FleetItem>),
    Equipment(Vec<EquipmentItem>),
    ServiceFronts(Vec<ServiceFront>),
}

impl CollectionItems {
    pub fn collection(&self) -> Collection {
        match self {
            CollectionItems::Fleet(_) => Collection::Fleet,
            CollectionItems::Equipment(_) => Collection::Equipment,
            CollectionItems::ServiceFronts(_) => Collection::ServiceFronts,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CollectionItems::Fleet(items) => items.len(),
            CollectionItems::Equipment(items) => items.len(),
            CollectionItems::ServiceFronts(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// One event from a remote change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub table: Table,
    pub op: ChangeOp,
    pub at: DateTime<Utc>,
}
