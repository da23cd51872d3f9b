//! JSON file databases under the data directory.
//!
//! ```text
//! data/
//!   patients.json      {"lastId": n, "patients": [...]}
//!   patients/<id>.xlsx one workbook per patient
//!   pswrds.json        {"lastId": n, "users": [...]}
//!   actions.json       [{"time", "userId", "login", "name", "action", "details"}]
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, FixedOffset, Offset, SecondsFormat, Utc};
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SheetError;

/// Asia/Tashkent has no DST.
const TASHKENT_OFFSET_SECS: i32 = 5 * 60 * 60;

/// How far back the activity log is listed.
const ACTION_WINDOW_DAYS: i64 = 7;

/// Current Tashkent wall-clock time, e.g. `2026-10-18T14:05:00.000+05:00`.
pub fn tashkent_now() -> String {
    tashkent_time(Utc::now())
}

pub fn tashkent_time(at: DateTime<Utc>) -> String {
    let offset = FixedOffset::east_opt(TASHKENT_OFFSET_SECS).unwrap_or_else(|| Utc.fix());
    at.with_timezone(&offset)
        .to_rfc3339_opts(SecondsFormat::Millis, false)
}

/// One entry of `patients.json`
///
/// Name and phone are copies of the header cells of the patient's workbook,
/// refreshed on every save.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    /// Sequential id, also the workbook file name (`patients/<id>.xlsx`)
    pub id: u64,

    /// Full name from the name cell, empty until first saved
    #[serde(default)]
    pub name: String,

    /// Phone number from the phone cell
    #[serde(default)]
    pub phone: String,

    /// RFC 3339 timestamp at +05:00
    #[serde(default)]
    pub created_at: String,

    /// RFC 3339 timestamp of the last save
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientDb {
    #[serde(default)]
    pub last_id: u64,
    #[serde(default)]
    pub patients: Vec<PatientRecord>,
}

impl PatientDb {
    pub fn find(&self, id: u64) -> Option<&PatientRecord> {
        self.patients.iter().find(|p| p.id == id)
    }

    pub fn find_mut(&mut self, id: u64) -> Option<&mut PatientRecord> {
        self.patients.iter_mut().find(|p| p.id == id)
    }

    /// Allocate the next id and append an empty record.
    pub fn create(&mut self) -> &PatientRecord {
        self.last_id += 1;
        let now = tashkent_now();
        self.patients.push(PatientRecord {
            id: self.last_id,
            name: String::new(),
            phone: String::new(),
            created_at: now.clone(),
            updated_at: now,
        });
        &self.patients[self.patients.len() - 1]
    }

    /// Drop every record whose id is listed. Returns the ids actually removed.
    pub fn remove(&mut self, ids: &[u64]) -> Vec<u64> {
        let mut removed = Vec::new();
        self.patients.retain(|p| {
            if ids.contains(&p.id) {
                removed.push(p.id);
                false
            } else {
                true
            }
        });
        removed
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Super,
    Simple,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "super" => Some(Role::Super),
            "simple" => Some(Role::Simple),
            _ => None,
        }
    }
}

/// One account in `pswrds.json`
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Sequential id, never reused
    pub id: u64,

    /// Display name shown in the UI and the actions log
    #[serde(default)]
    pub name: String,

    /// Login name (unique across users)
    pub login: String,

    /// Argon2 hash of the user's password
    pub password_hash: String,

    /// Super users manage accounts and read the actions log
    pub role: Role,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDb {
    #[serde(default)]
    pub last_id: u64,
    #[serde(default)]
    pub users: Vec<UserRecord>,
}

impl UserDb {
    pub fn find(&self, id: u64) -> Option<&UserRecord> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn find_mut(&mut self, id: u64) -> Option<&mut UserRecord> {
        self.users.iter_mut().find(|u| u.id == id)
    }

    pub fn by_login(&self, login: &str) -> Option<&UserRecord> {
        self.users.iter().find(|u| u.login == login)
    }

    /// True when `login` belongs to someone other than `except`.
    pub fn login_taken(&self, login: &str, except: Option<u64>) -> bool {
        self.users
            .iter()
            .any(|u| u.login == login && Some(u.id) != except)
    }
}

/// One line of the activity log in `actions.json`
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEntry {
    /// RFC 3339 timestamp at +05:00
    pub time: String,

    /// Acting user, if known
    pub user_id: Option<u64>,

    /// Login of the acting user at the time of the action
    #[serde(default)]
    pub login: String,

    /// Display name of the acting user at the time of the action
    #[serde(default)]
    pub name: String,

    /// Action kind such as `login` or `update_patient`
    pub action: String,

    /// Action-specific payload (ids, names)
    #[serde(default)]
    pub details: Value,
}

pub struct DataStore {
    data_dir: PathBuf,
    /// Where `template.xlsx` may live, in lookup order.
    template_candidates: Vec<PathBuf>,
}

impl DataStore {
    pub fn new(data_dir: impl Into<PathBuf>, template_candidates: Vec<PathBuf>) -> Self {
        DataStore {
            data_dir: data_dir.into(),
            template_candidates,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn patients_dir(&self) -> PathBuf {
        self.data_dir.join("patients")
    }

    fn patients_json(&self) -> PathBuf {
        self.data_dir.join("patients.json")
    }

    fn users_json(&self) -> PathBuf {
        self.data_dir.join("pswrds.json")
    }

    fn actions_json(&self) -> PathBuf {
        self.data_dir.join("actions.json")
    }

    pub fn patient_workbook_path(&self, id: u64) -> PathBuf {
        self.patients_dir().join(format!("{}.xlsx", id))
    }

    pub fn template_path(&self) -> Result<PathBuf, SheetError> {
        self.template_candidates
            .iter()
            .find(|p| p.is_file())
            .cloned()
            .ok_or_else(|| SheetError::MissingTemplate {
                searched: self.template_candidates.clone(),
            })
    }

    /// Create the directory tree and seed `patients.json`. Fails when no
    /// template workbook can be found.
    pub fn ensure_layout(&self) -> Result<(), SheetError> {
        fs::create_dir_all(self.patients_dir())?;
        self.template_path()?;

        if !self.patients_json().exists() {
            info!("Creating {}", self.patients_json().display());
            self.write_patients(&PatientDb::default())?;
        }
        Ok(())
    }

    pub fn has_users(&self) -> bool {
        self.users_json().exists()
    }

    /// Seed the user list with `admin` when none exists yet.
    pub fn ensure_users(&self, admin: UserRecord) -> Result<(), SheetError> {
        if self.has_users() {
            return Ok(());
        }
        fs::create_dir_all(&self.data_dir)?;
        info!("Seeding default user '{}'", admin.login);
        self.write_users(&UserDb {
            last_id: admin.id,
            users: vec![admin],
        })
    }

    pub fn read_patients(&self) -> Result<PatientDb, SheetError> {
        read_json_or_default(&self.patients_json())
    }

    pub fn write_patients(&self, db: &PatientDb) -> Result<(), SheetError> {
        write_json(&self.patients_json(), db)
    }

    pub fn read_users(&self) -> Result<UserDb, SheetError> {
        read_json_or_default(&self.users_json())
    }

    pub fn write_users(&self, db: &UserDb) -> Result<(), SheetError> {
        write_json(&self.users_json(), db)
    }

    pub fn read_actions(&self) -> Result<Vec<ActionEntry>, SheetError> {
        read_json_or_default(&self.actions_json())
    }

    pub fn append_action(&self, entry: ActionEntry) -> Result<(), SheetError> {
        let mut actions = self.read_actions().unwrap_or_else(|e| {
            warn!("Discarding unreadable action log: {}", e);
            Vec::new()
        });
        actions.push(entry);
        write_json(&self.actions_json(), &actions)
    }

    /// Entries from the last seven days, newest first.
    pub fn recent_actions(&self, now: DateTime<Utc>) -> Result<Vec<ActionEntry>, SheetError> {
        let cutoff = now - Duration::days(ACTION_WINDOW_DAYS);
        let mut recent: Vec<(DateTime<Utc>, ActionEntry)> = self
            .read_actions()?
            .into_iter()
            .filter_map(|entry| {
                let at = DateTime::parse_from_rfc3339(&entry.time).ok()?.with_timezone(&Utc);
                (at >= cutoff).then_some((at, entry))
            })
            .collect();
        recent.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(recent.into_iter().map(|(_, entry)| entry).collect())
    }

    /// Path of the patient's workbook, cloning the template first if needed.
    pub fn ensure_patient_workbook(&self, id: u64) -> Result<PathBuf, SheetError> {
        let path = self.patient_workbook_path(id);
        if !path.exists() {
            fs::create_dir_all(self.patients_dir())?;
            fs::copy(self.template_path()?, &path)?;
        }
        Ok(path)
    }

    pub fn remove_patient_workbook(&self, id: u64) -> Result<(), SheetError> {
        match fs::remove_file(self.patient_workbook_path(id)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, SheetError> {
    match fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => Ok(T::default()),
        Ok(text) => Ok(serde_json::from_str(&text)?),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), SheetError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store_with_template(dir: &Path) -> DataStore {
        let template = dir.join("template.xlsx");
        let mut workbook = rust_xlsxwriter::Workbook::new();
        workbook.add_worksheet();
        workbook.save(&template).unwrap();
        DataStore::new(dir.join("data"), vec![template])
    }

    fn action(time: &str, action: &str) -> ActionEntry {
        ActionEntry {
            time: time.to_string(),
            user_id: Some(1),
            login: "admin".into(),
            name: "Admin".into(),
            action: action.into(),
            details: Value::Null,
        }
    }

    #[test]
    fn test_tashkent_offset() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 20, 30, 0).unwrap();
        assert_eq!(tashkent_time(at), "2026-01-03T01:30:00.000+05:00");
    }

    #[test]
    fn test_layout_requires_template() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("template.xlsx");
        let store = DataStore::new(dir.path().join("data"), vec![missing.clone()]);
        match store.ensure_layout() {
            Err(SheetError::MissingTemplate { searched }) => assert_eq!(searched, vec![missing]),
            other => panic!("expected MissingTemplate, got {:?}", other),
        }

        let store = store_with_template(dir.path());
        store.ensure_layout().unwrap();
        assert!(store.patients_dir().is_dir());
        assert_eq!(store.read_patients().unwrap().last_id, 0);
    }

    #[test]
    fn test_patient_ids_and_workbooks() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_template(dir.path());
        store.ensure_layout().unwrap();

        let mut db = store.read_patients().unwrap();
        let first = db.create().id;
        let second = db.create().id;
        assert_eq!((first, second), (1, 2));
        store.write_patients(&db).unwrap();

        let path = store.ensure_patient_workbook(first).unwrap();
        assert!(path.is_file());

        let mut db = store.read_patients().unwrap();
        assert_eq!(db.remove(&[first, 99]), vec![first]);
        assert_eq!(db.last_id, 2);
        assert!(db.find(second).is_some());

        store.remove_patient_workbook(first).unwrap();
        store.remove_patient_workbook(first).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_patients_json_is_camel_case() {
        let db = PatientDb {
            last_id: 1,
            patients: vec![PatientRecord {
                id: 1,
                name: "Ali".into(),
                phone: String::new(),
                created_at: "t".into(),
                updated_at: "t".into(),
            }],
        };
        let json = serde_json::to_value(&db).unwrap();
        assert_eq!(json["lastId"], 1);
        assert_eq!(json["patients"][0]["createdAt"], "t");
    }

    #[test]
    fn test_user_and_action_records_on_disk() {
        let user: UserRecord = serde_json::from_value(serde_json::json!({
            "id": 3,
            "login": "nurse",
            "passwordHash": "$argon2id$x",
            "role": "simple"
        }))
        .unwrap();
        assert_eq!(user.name, "");
        assert_eq!(user.role, Role::Simple);
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["passwordHash"], "$argon2id$x");
        assert!(json.get("password_hash").is_none());

        let entry: ActionEntry = serde_json::from_value(serde_json::json!({
            "time": "2026-10-17T10:00:00.000+05:00",
            "userId": null,
            "action": "login"
        }))
        .unwrap();
        assert_eq!(entry.user_id, None);
        assert_eq!(entry.details, Value::Null);
        let json = serde_json::to_value(action("t", "export_patients")).unwrap();
        assert_eq!(json["userId"], 1);
        assert_eq!(json["login"], "admin");
    }

    #[test]
    fn test_recent_actions_window_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_template(dir.path());
        fs::create_dir_all(store.data_dir()).unwrap();

        store.append_action(action("2026-10-01T10:00:00.000Z", "old")).unwrap();
        store.append_action(action("2026-10-15T10:00:00.000+05:00", "older")).unwrap();
        store.append_action(action("2026-10-17T10:00:00.000Z", "newest")).unwrap();
        store.append_action(action("garbage", "broken")).unwrap();

        let now = Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap();
        let recent: Vec<String> = store
            .recent_actions(now)
            .unwrap()
            .into_iter()
            .map(|a| a.action)
            .collect();
        assert_eq!(recent, vec!["newest", "older"]);
    }

    #[test]
    fn test_login_taken_ignores_self() {
        let db = UserDb {
            last_id: 2,
            users: vec![
                UserRecord {
                    id: 1,
                    name: "Admin".into(),
                    login: "admin".into(),
                    password_hash: "x".into(),
                    role: Role::Super,
                },
                UserRecord {
                    id: 2,
                    name: "Nurse".into(),
                    login: "nurse".into(),
                    password_hash: "x".into(),
                    role: Role::Simple,
                },
            ],
        };
        assert!(db.login_taken("admin", Some(2)));
        assert!(!db.login_taken("admin", Some(1)));
        assert_eq!(db.by_login("nurse").map(|u| u.id), Some(2));
        assert_eq!(Role::parse("super"), Some(Role::Super));
        assert_eq!(Role::parse("root"), None);
    }
}
