//! Employee roster record store.
//!
//! Records live in a single persisted JSON snapshot under a storage root,
//! seeded from a static JSON document on first run. Load-time reconciliation:
//!   1. Versioned snapshot at the supported version: used as-is.
//!   2. Versionless legacy snapshot: staleness check, then either a one-time
//!      migration to the stamped format or a reseed.
//!   3. Absent, corrupt, or empty data: reseed from the seed document.
//! Every mutation rewrites the whole snapshot (write-through), so the
//! in-memory list and the persisted snapshot stay equal between calls.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};

const DATA_FILE: &str = "employees.json";
const SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Employee ID {0} already exists")]
    DuplicateId(i64),

    #[error("Employee {0} not found")]
    NotFound(i64),

    #[error("Seed data unavailable: {0}")]
    SeedUnavailable(String),

    #[error("Snapshot version {0} is newer than this app supports")]
    UnsupportedVersion(i64),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl RosterError {
    /// True for the validation family that a form surfaces to the user and
    /// that aborts the triggering action without a partial write.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            RosterError::MissingField(_)
                | RosterError::InvalidEmail(_)
                | RosterError::DuplicateId(_)
                | RosterError::NotFound(_)
        )
    }
}

/// One employee record, serialized camelCase to match the seed document and
/// the persisted snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub join_date: String,
    #[serde(default)]
    pub basic_salary: f64,
    #[serde(default)]
    pub variance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

impl Employee {
    /// Net pay is always computed, never stored.
    pub fn net_salary(&self) -> f64 {
        self.basic_salary + self.variance
    }
}

/// Patch applied by `RosterStore::update`. `None` fields keep the stored
/// value, so an edit form that never shows `fullName` or `joinDate` leaves
/// them untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeePatch {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub role: Option<String>,
    pub join_date: Option<String>,
    pub basic_salary: Option<f64>,
    pub variance: Option<f64>,
}

/// Flat form state for the add and edit views. Every field is the raw string
/// the matching input holds; parsing happens when the form is turned into a
/// store input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeForm {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub country_code: String,
    pub phone: String,
    pub department: String,
    pub role: String,
    pub join_date: String,
    pub basic_salary: String,
    pub variance: String,
}

impl EmployeeForm {
    /// Populate the edit view from a stored record. The combined phone value
    /// is split back into its country code and local number.
    pub fn from_record(record: &Employee) -> Self {
        let (country_code, local) = split_phone(&record.phone);
        EmployeeForm {
            id: record.id.to_string(),
            full_name: record.full_name.clone(),
            email: record.email.clone(),
            country_code,
            phone: local,
            department: record.department.clone(),
            role: record.role.clone(),
            join_date: record.join_date.clone(),
            basic_salary: if record.basic_salary == 0.0 {
                String::new()
            } else {
                format!("{}", record.basic_salary)
            },
            variance: format!("{}", record.variance),
        }
    }

    /// Display-only net salary, recomputed whenever either pay field changes.
    pub fn net_salary(&self) -> f64 {
        parse_number(&self.basic_salary) + parse_number(&self.variance)
    }

    /// The add-form payload. An empty variance field contributes zero.
    pub fn create_input(&self) -> Employee {
        Employee {
            id: parse_id(&self.id),
            full_name: self.full_name.clone(),
            email: self.email.clone(),
            phone: join_phone(&self.country_code, &self.phone),
            department: self.department.clone(),
            role: self.role.clone(),
            join_date: self.join_date.clone(),
            basic_salary: parse_number(&self.basic_salary),
            variance: parse_number(&self.variance),
            last_updated: None,
        }
    }

    /// The edit-form payload. `fullName` and `joinDate` are absent so the
    /// store preserves the stored values.
    pub fn update_patch(&self) -> EmployeePatch {
        EmployeePatch {
            full_name: None,
            email: Some(self.email.clone()),
            phone: Some(join_phone(&self.country_code, &self.phone)),
            department: Some(self.department.clone()),
            role: Some(self.role.clone()),
            join_date: None,
            basic_salary: Some(parse_number(&self.basic_salary)),
            variance: Some(parse_number(&self.variance)),
        }
    }

    pub fn clear(&mut self) {
        *self = EmployeeForm::default();
    }
}

/// Synchronous key-value text store: named slots resolved as sanitized
/// relative paths under a root directory.
#[derive(Debug)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, RosterError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|err| RosterError::Storage(err.to_string()))?;
        Ok(FileStorage { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absent slots read as `None`; only I/O failures are errors.
    pub fn read_text(&self, name: &str) -> Result<Option<String>, RosterError> {
        let path = self.root.join(sanitize_relative_path(name)?);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(path).map_err(|err| RosterError::Storage(err.to_string()))?;
        Ok(Some(data))
    }

    pub fn write_text(&self, name: &str, text: &str) -> Result<(), RosterError> {
        let path = self.root.join(sanitize_relative_path(name)?);
        write_text_file(path, text)
    }
}

fn sanitize_relative_path(value: &str) -> Result<PathBuf, RosterError> {
    let mut out = PathBuf::new();
    for component in PathBuf::from(value).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return Err(RosterError::Storage("Invalid storage slot name.".to_string())),
        }
    }
    if out.as_os_str().is_empty() {
        return Err(RosterError::Storage("Invalid storage slot name.".to_string()));
    }
    Ok(out)
}

fn write_text_file(path: PathBuf, content: &str) -> Result<(), RosterError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| RosterError::Storage(err.to_string()))?;
    }
    fs::write(path, content).map_err(|err| RosterError::Storage(err.to_string()))?;
    Ok(())
}

/// Read the seed document: a JSON array of employee objects. Any failure maps
/// to `SeedUnavailable`; the caller decides whether that is fatal.
pub fn load_seed(path: &Path) -> Result<Vec<Value>, RosterError> {
    let raw = fs::read_to_string(path)
        .map_err(|err| RosterError::SeedUnavailable(format!("{}: {}", path.display(), err)))?;
    let parsed: Value = serde_json::from_str(&raw)
        .map_err(|err| RosterError::SeedUnavailable(format!("{}: {}", path.display(), err)))?;
    match parsed {
        Value::Array(records) => Ok(records),
        _ => Err(RosterError::SeedUnavailable(format!(
            "{}: expected a JSON array of records",
            path.display()
        ))),
    }
}

/// Owns the canonical record list and its persisted mirror.
#[derive(Debug)]
pub struct RosterStore {
    storage: FileStorage,
    seed_path: PathBuf,
    employees: Vec<Employee>,
}

impl RosterStore {
    /// Open the store and reconcile against the persisted snapshot and the
    /// seed document.
    pub fn open(
        storage_root: impl AsRef<Path>,
        seed_path: impl AsRef<Path>,
    ) -> Result<Self, RosterError> {
        let storage = FileStorage::open(storage_root)?;
        let mut store = RosterStore {
            storage,
            seed_path: seed_path.as_ref().to_path_buf(),
            employees: Vec::new(),
        };
        store.reconcile_on_load()?;
        Ok(store)
    }

    /// Classify the persisted snapshot and settle on a record list.
    /// Idempotent: a snapshot that is already fresh is loaded without a
    /// rewrite.
    pub fn reconcile_on_load(&mut self) -> Result<(), RosterError> {
        let raw = self.storage.read_text(DATA_FILE)?;
        let parsed = raw
            .as_deref()
            .and_then(|text| serde_json::from_str::<Value>(text).ok());

        match parsed {
            Some(Value::Array(records)) => {
                // Versionless snapshots predate the schema stamp. Only they
                // run the staleness check; stamped snapshots keep legitimate
                // zero-variance rows.
                if legacy_snapshot_is_stale(&records) {
                    warn!("Discarding stale legacy snapshot ({} records)", records.len());
                    self.reseed()?;
                } else {
                    self.employees = records.iter().map(normalize_record).collect();
                    self.persist()?;
                    info!(
                        "Migrated legacy snapshot to version {} ({} records)",
                        SCHEMA_VERSION,
                        self.employees.len()
                    );
                }
            }
            Some(Value::Object(doc)) => {
                let version = value_id(doc.get("version"));
                if version > SCHEMA_VERSION as i64 {
                    return Err(RosterError::UnsupportedVersion(version));
                }
                let records = match doc.get("employees").and_then(Value::as_array) {
                    Some(records) => records.as_slice(),
                    None => &[],
                };
                if records.is_empty() {
                    self.reseed()?;
                } else {
                    self.employees = records.iter().map(normalize_record).collect();
                    if version < SCHEMA_VERSION as i64 {
                        self.persist()?;
                    }
                }
            }
            Some(_) => {
                warn!("Persisted snapshot is not a roster document, reseeding");
                self.reseed()?;
            }
            None => {
                if raw.is_some() {
                    warn!("Persisted snapshot is not valid JSON, reseeding");
                }
                self.reseed()?;
            }
        }
        Ok(())
    }

    /// The record list in insertion order.
    pub fn employees(&self) -> &[Employee] {
        &self.employees
    }

    pub fn find(&self, id: i64) -> Option<&Employee> {
        self.employees.iter().find(|emp| emp.id == id)
    }

    /// Append a new record. `last_updated` on the input is ignored; the store
    /// stamps its own.
    pub fn create(&mut self, record: Employee) -> Result<&Employee, RosterError> {
        if record.id == 0 {
            return Err(RosterError::MissingField("id"));
        }
        if record.full_name.is_empty() {
            return Err(RosterError::MissingField("fullName"));
        }
        if record.email.is_empty() {
            return Err(RosterError::MissingField("email"));
        }
        if !email_is_valid(&record.email) {
            return Err(RosterError::InvalidEmail(record.email));
        }
        if self.employees.iter().any(|emp| emp.id == record.id) {
            return Err(RosterError::DuplicateId(record.id));
        }

        let mut record = record;
        record.last_updated = Some(now_string());
        let id = record.id;
        self.employees.push(record);
        self.persist()?;
        debug!("Created employee {}", id);
        Ok(&self.employees[self.employees.len() - 1])
    }

    /// Merge a patch over an existing record. Fields the patch leaves as
    /// `None` keep their stored values.
    pub fn update(&mut self, id: i64, patch: &EmployeePatch) -> Result<&Employee, RosterError> {
        let idx = self
            .employees
            .iter()
            .position(|emp| emp.id == id)
            .ok_or(RosterError::NotFound(id))?;
        if let Some(email) = &patch.email {
            if !email_is_valid(email) {
                return Err(RosterError::InvalidEmail(email.clone()));
            }
        }

        {
            let emp = &mut self.employees[idx];
            if let Some(full_name) = &patch.full_name {
                emp.full_name = full_name.clone();
            }
            if let Some(email) = &patch.email {
                emp.email = email.clone();
            }
            if let Some(phone) = &patch.phone {
                emp.phone = phone.clone();
            }
            if let Some(department) = &patch.department {
                emp.department = department.clone();
            }
            if let Some(role) = &patch.role {
                emp.role = role.clone();
            }
            if let Some(join_date) = &patch.join_date {
                emp.join_date = join_date.clone();
            }
            if let Some(basic_salary) = patch.basic_salary {
                emp.basic_salary = basic_salary;
            }
            if let Some(variance) = patch.variance {
                emp.variance = variance;
            }
            emp.last_updated = Some(now_string());
        }
        self.persist()?;
        debug!("Updated employee {}", id);
        Ok(&self.employees[idx])
    }

    /// Remove a record. A missing id is a no-op, not an error.
    pub fn delete(&mut self, id: i64) -> Result<bool, RosterError> {
        let before = self.employees.len();
        self.employees.retain(|emp| emp.id != id);
        if self.employees.len() == before {
            return Ok(false);
        }
        self.persist()?;
        debug!("Deleted employee {}", id);
        Ok(true)
    }

    fn reseed(&mut self) -> Result<(), RosterError> {
        match load_seed(&self.seed_path) {
            Ok(records) => {
                self.employees = records.iter().map(normalize_record).collect();
                self.persist()?;
                info!(
                    "Seeded {} employees from {}",
                    self.employees.len(),
                    self.seed_path.display()
                );
            }
            Err(err) => {
                // The seed being unreachable leaves the roster empty for this
                // session; the slot is left unwritten so a later load retries.
                error!("Data error: {}", err);
                self.employees.clear();
            }
        }
        Ok(())
    }

    fn persist(&self) -> Result<(), RosterError> {
        let doc = json!({
            "version": SCHEMA_VERSION,
            "employees": &self.employees,
        });
        let content =
            serde_json::to_string(&doc).map_err(|err| RosterError::Storage(err.to_string()))?;
        self.storage.write_text(DATA_FILE, &content)
    }
}

/// Stale when the list is empty, when the first record predates the
/// `basicSalary` field, or when any record has a numeric zero variance
/// alongside positive total pay. The last check cannot tell pre-migration
/// data apart from a genuine zero-variance row, which is why it never runs
/// against stamped snapshots.
fn legacy_snapshot_is_stale(records: &[Value]) -> bool {
    let Some(first) = records.first() else {
        return true;
    };
    if !has_key(first, "basicSalary") {
        return true;
    }
    records.iter().any(|record| {
        let variance_is_zero = record.get("variance").and_then(Value::as_f64) == Some(0.0);
        let total = value_number(record.get("basicSalary")) + value_number(record.get("variance"));
        variance_is_zero && total > 0.0
    })
}

/// Coerce one raw seed or legacy record into the typed shape: numeric id,
/// phone defaulted, pay fields always numbers with the single-`salary`
/// fallback folded into `basicSalary`.
fn normalize_record(value: &Value) -> Employee {
    let basic = value_number(value.get("basicSalary"));
    let basic = if basic != 0.0 {
        basic
    } else {
        value_number(value.get("salary"))
    };
    Employee {
        id: value_id(value.get("id")),
        full_name: value_text(value.get("fullName")),
        email: value_text(value.get("email")),
        phone: value_text(value.get("phone")),
        department: value_text(value.get("department")),
        role: value_text(value.get("role")),
        join_date: value_text(value.get("joinDate")),
        basic_salary: basic,
        variance: value_number(value.get("variance")),
        last_updated: nonempty_text(value.get("lastUpdated")),
    }
}

fn email_regex() -> &'static Regex {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    EMAIL_RE.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles")
    })
}

pub fn email_is_valid(email: &str) -> bool {
    email_regex().is_match(email)
}

fn phone_prefix_regex() -> &'static Regex {
    static PHONE_RE: OnceLock<Regex> = OnceLock::new();
    PHONE_RE.get_or_init(|| Regex::new(r"^(\+\d+)\s*(.*)$").expect("phone pattern compiles"))
}

/// Split a combined phone value into `(countryCode, localNumber)`. Values
/// without a `+digits` prefix are all local number.
pub fn split_phone(full: &str) -> (String, String) {
    match phone_prefix_regex().captures(full) {
        Some(caps) => {
            let code = caps[1].to_string();
            let local: String = caps[2].chars().filter(|ch| !ch.is_whitespace()).collect();
            (code, local)
        }
        None => (String::new(), full.to_string()),
    }
}

/// Pure concatenation, matching what the save path stores. Not an inverse of
/// `split_phone`: an empty country code still contributes the separator
/// space.
pub fn join_phone(country_code: &str, local: &str) -> String {
    format!("{} {}", country_code, local)
}

/// `Number(..)`-style coercion for form field strings: blank parses to zero,
/// unparsable input parses to zero.
fn parse_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

fn parse_id(text: &str) -> i64 {
    let trimmed = text.trim();
    match trimmed.parse::<i64>() {
        Ok(id) => id,
        Err(_) => trimmed
            .parse::<f64>()
            .map(|value| value.round() as i64)
            .unwrap_or(0),
    }
}

fn value_id(value: Option<&Value>) -> i64 {
    match value {
        Some(v) => {
            if let Some(num) = v.as_i64() {
                num
            } else if let Some(num) = v.as_u64() {
                num as i64
            } else if let Some(num) = v.as_f64() {
                num.round() as i64
            } else if let Some(text) = v.as_str() {
                parse_id(text)
            } else {
                0
            }
        }
        None => 0,
    }
}

fn value_number(value: Option<&Value>) -> f64 {
    match value {
        Some(v) => {
            if let Some(num) = v.as_f64() {
                num
            } else if let Some(text) = v.as_str() {
                parse_number(text)
            } else {
                0.0
            }
        }
        None => 0.0,
    }
}

fn value_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(num)) => num.to_string(),
        _ => String::new(),
    }
}

fn nonempty_text(value: Option<&Value>) -> Option<String> {
    let text = value_text(value);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn has_key(value: &Value, key: &str) -> bool {
    value
        .as_object()
        .map(|obj| obj.contains_key(key))
        .unwrap_or(false)
}

fn now_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Avatar and badge class names for a department, matched case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DepartmentStyle {
    pub avatar: &'static str,
    pub badge: &'static str,
}

pub fn department_style(department: &str) -> DepartmentStyle {
    let (avatar, badge) = match department.to_lowercase().as_str() {
        "it" | "engineering" => ("avatar-blue", "badge-blue"),
        "hr" | "human resources" => ("avatar-purple", "badge-purple"),
        "sales" => ("avatar-green", "badge-green"),
        "finance" => ("avatar-orange", "badge-orange"),
        _ => ("avatar-blue", "badge-blue"),
    };
    DepartmentStyle { avatar, badge }
}

/// First letter of each name part, first two parts, uppercased. Blank names
/// render as the placeholder.
pub fn name_initials(name: &str) -> String {
    let initials: String = name
        .split_whitespace()
        .filter_map(|part| part.chars().next())
        .take(2)
        .collect();
    if initials.is_empty() {
        "??".to_string()
    } else {
        initials.to_uppercase()
    }
}

/// Whole-rupee INR with Indian digit grouping: the last three digits, then
/// groups of two.
pub fn format_inr(amount: f64) -> String {
    let rounded = amount.abs().round() as i64;
    let grouped = group_indian(&rounded.to_string());
    if amount < 0.0 && rounded != 0 {
        format!("-\u{20b9}{}", grouped)
    } else {
        format!("\u{20b9}{}", grouped)
    }
}

fn group_indian(digits: &str) -> String {
    let len = digits.len();
    if len <= 3 {
        return digits.to_string();
    }
    let (head, tail) = digits.split_at(len - 3);
    let mut parts: Vec<&str> = Vec::new();
    let mut idx = head.len();
    while idx > 2 {
        parts.push(&head[idx - 2..idx]);
        idx -= 2;
    }
    parts.push(&head[..idx]);
    parts.reverse();
    format!("{},{}", parts.join(","), tail)
}

/// Medium date label for the roster table, e.g. `Jan 1, 2020`. Unparsable
/// input falls back to the raw string.
pub fn format_join_date(date: &str) -> String {
    match NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d") {
        Ok(parsed) => parsed.format("%b %-d, %Y").to_string(),
        Err(_) => date.to_string(),
    }
}

/// Timestamp label for the roster table, e.g. `1/1/2020, 9:30:00 AM`.
pub fn format_timestamp(timestamp: Option<&str>) -> String {
    let Some(raw) = timestamp else {
        return "N/A".to_string();
    };
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => parsed.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string(),
        Err(_) => "N/A".to_string(),
    }
}

/// One fully formatted table row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterRow {
    pub id: i64,
    pub full_name: String,
    pub initials: String,
    pub avatar_class: &'static str,
    pub badge_class: &'static str,
    pub email: String,
    pub phone: String,
    pub department: String,
    pub role: String,
    pub join_date_label: String,
    pub last_updated_label: String,
    pub basic_salary_label: String,
    pub variance_label: String,
    pub net_salary_label: String,
}

pub fn build_roster_rows(employees: &[Employee]) -> Vec<RosterRow> {
    employees
        .iter()
        .map(|emp| {
            let style = department_style(&emp.department);
            RosterRow {
                id: emp.id,
                full_name: emp.full_name.clone(),
                initials: name_initials(&emp.full_name),
                avatar_class: style.avatar,
                badge_class: style.badge,
                email: emp.email.clone(),
                phone: emp.phone.clone(),
                department: emp.department.clone(),
                role: emp.role.clone(),
                join_date_label: format_join_date(&emp.join_date),
                last_updated_label: format_timestamp(emp.last_updated.as_deref()),
                basic_salary_label: format_inr(emp.basic_salary),
                variance_label: format_inr(emp.variance),
                net_salary_label: format_inr(emp.net_salary()),
            }
        })
        .collect()
}
