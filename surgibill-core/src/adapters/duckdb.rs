//! DuckDB repository implementation

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use duckdb::{params, Connection, ToSql};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{
    ChargeType, Dimensions, Page, Reference, ReferenceKind, Rule, RuleFilter, RuleKind, RuleScope,
    RuleValue, ValidityWindow,
};
use crate::ports::{ConflictGuard, ReferenceLookup, ReferenceRegistry, RuleStore};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of attempts when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
        || lower.contains("could not set lock on file")
}

/// Columns read for every rule query, in [`RuleRow`] order
const RULE_COLUMNS: &str = "rule_id, rule_kind, business_unit, hospital_id, doctor_id,
     payment_type_id, surgical_category_id, procedure_id,
     percentage::VARCHAR, charge_type, charge_value::VARCHAR,
     validity_from::VARCHAR, validity_to::VARCHAR, is_active,
     created_by, updated_by, created_at, updated_at, priority";

const REFERENCE_COLUMNS: &str =
    "reference_id, kind, business_unit, code, name, is_active, created_at";

/// DuckDB repository implementation
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl DuckDbRepository {
    /// Open (or create) the database file.
    ///
    /// Lock contention from another process is retried with exponential
    /// backoff before giving up.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: db_path.to_path_buf(),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        eprintln!(
                            "[surgibill] Database busy, retrying in {}ms (attempt {}/{}): {}",
                            delay.as_millis(),
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::database(format!("Failed to open database after {} retries", MAX_RETRIES))
        }))
    }

    /// In-memory database, mostly for tests and embedding
    pub fn open_in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory_with_flags(config)?),
            db_path: PathBuf::from(":memory:"),
        })
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading stays off; nothing here needs one
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))
    }

    /// Apply pending schema migrations
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.conn()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Size of the database file in bytes (0 for in-memory databases)
    pub fn get_db_size(&self) -> Result<u64> {
        if !self.db_path.exists() {
            return Ok(0);
        }
        Ok(std::fs::metadata(&self.db_path)?.len())
    }

    // === Rule operations ===

    pub fn get_rule(&self, id: Uuid) -> Result<Option<Rule>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM sys_rules WHERE rule_id = ?", RULE_COLUMNS);
        let mut rules = query_rules(&conn, &sql, &[&id.to_string()])?;
        Ok(rules.pop())
    }

    pub fn find_candidates(&self, scope: &RuleScope, dimensions: &Dimensions) -> Result<Vec<Rule>> {
        let conn = self.conn()?;
        // A NULL dimension on the rule is a wildcard. A NULL query value only
        // matches wildcard rules, which `col = NULL` (never true) gives us.
        let sql = format!(
            "SELECT {} FROM sys_rules
             WHERE rule_kind = ? AND business_unit = ? AND hospital_id = ?
               AND doctor_id IS NOT DISTINCT FROM ?
               AND is_active
               AND (payment_type_id IS NULL OR payment_type_id = ?)
               AND (surgical_category_id IS NULL OR surgical_category_id = ?)
               AND (procedure_id IS NULL OR procedure_id = ?)
             ORDER BY priority DESC, updated_at DESC",
            RULE_COLUMNS
        );
        query_rules(
            &conn,
            &sql,
            &[
                &scope.kind.as_str(),
                &scope.business_unit,
                &scope.hospital.to_string(),
                &opt_id(scope.doctor),
                &opt_id(dimensions.payment_type),
                &opt_id(dimensions.surgical_category),
                &opt_id(dimensions.procedure),
            ],
        )
    }

    pub fn list_rules(&self, filter: &RuleFilter) -> Result<Page<Rule>> {
        filter.validate()?;
        let conn = self.conn()?;

        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(bu) = &filter.business_unit {
            clauses.push("business_unit = ?");
            values.push(Box::new(bu.clone()));
        }
        if let Some(hospital) = filter.hospital {
            clauses.push("hospital_id = ?");
            values.push(Box::new(hospital.to_string()));
        }
        if let Some(kind) = filter.kind {
            clauses.push("rule_kind = ?");
            values.push(Box::new(kind.as_str()));
        }
        if !filter.include_inactive {
            clauses.push("is_active");
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let refs: Vec<&dyn ToSql> = values.iter().map(|b| b.as_ref()).collect();

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM sys_rules {}", where_sql),
            refs.as_slice(),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {} FROM sys_rules {}
             ORDER BY hospital_id, priority DESC, validity_from, rule_id
             LIMIT {} OFFSET {}",
            RULE_COLUMNS,
            where_sql,
            filter.page_size,
            filter.offset()
        );
        let items = query_rules(&conn, &sql, refs.as_slice())?;

        Ok(Page {
            items,
            page: filter.page,
            page_size: filter.page_size,
            total: total.max(0) as u64,
        })
    }

    pub fn all_rules(&self) -> Result<Vec<Rule>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM sys_rules ORDER BY business_unit, hospital_id, priority DESC",
            RULE_COLUMNS
        );
        query_rules(&conn, &sql, &[])
    }

    /// Persist `rule` if `guard` accepts it against its stored siblings.
    ///
    /// The sibling read, the guard and the write share one transaction and
    /// the connection lock, so concurrent writers are serialised.
    pub fn save_checked(&self, rule: &Rule, guard: ConflictGuard) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let sql = format!(
            "SELECT {} FROM sys_rules
             WHERE rule_kind = ? AND business_unit = ? AND hospital_id = ?
               AND doctor_id IS NOT DISTINCT FROM ?
               AND payment_type_id IS NOT DISTINCT FROM ?
               AND surgical_category_id IS NOT DISTINCT FROM ?
               AND procedure_id IS NOT DISTINCT FROM ?
               AND is_active
               AND rule_id <> ?",
            RULE_COLUMNS
        );
        let siblings = query_rules(
            &tx,
            &sql,
            &[
                &rule.kind().as_str(),
                &rule.business_unit,
                &rule.hospital.to_string(),
                &opt_id(rule.doctor()),
                &opt_id(rule.dimensions.payment_type),
                &opt_id(rule.dimensions.surgical_category),
                &opt_id(rule.dimensions.procedure),
                &rule.id.to_string(),
            ],
        )?;

        // Dropping `tx` on the error path rolls back
        guard(rule, &siblings)?;

        let exists: i64 = tx.query_row(
            "SELECT COUNT(*) FROM sys_rules WHERE rule_id = ?",
            [rule.id.to_string()],
            |row| row.get(0),
        )?;
        let (percentage, charge_type, charge_value) = value_columns(&rule.value);

        // Plain UPDATE instead of ON CONFLICT: DuckDB refuses upserts that
        // assign indexed columns
        if exists > 0 {
            tx.execute(
                "UPDATE sys_rules SET
                    rule_kind = ?, business_unit = ?, hospital_id = ?, doctor_id = ?,
                    payment_type_id = ?, surgical_category_id = ?, procedure_id = ?,
                    percentage = CAST(? AS DECIMAL(18, 4)), charge_type = ?,
                    charge_value = CAST(? AS DECIMAL(18, 4)),
                    validity_from = ?, validity_to = ?, priority = ?, is_active = ?,
                    updated_by = ?, updated_at = ?
                 WHERE rule_id = ?",
                params![
                    rule.kind().as_str(),
                    rule.business_unit,
                    rule.hospital.to_string(),
                    opt_id(rule.doctor()),
                    opt_id(rule.dimensions.payment_type),
                    opt_id(rule.dimensions.surgical_category),
                    opt_id(rule.dimensions.procedure),
                    percentage,
                    charge_type,
                    charge_value,
                    rule.validity.from().to_string(),
                    rule.validity.to().to_string(),
                    rule.priority(),
                    rule.is_active,
                    rule.updated_by,
                    format_timestamp(&rule.updated_at),
                    rule.id.to_string(),
                ],
            )?;
        } else {
            tx.execute(
                "INSERT INTO sys_rules (rule_id, rule_kind, business_unit, hospital_id, doctor_id,
                                        payment_type_id, surgical_category_id, procedure_id,
                                        percentage, charge_type, charge_value,
                                        validity_from, validity_to, priority, is_active,
                                        created_by, updated_by, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?,
                         CAST(? AS DECIMAL(18, 4)), ?, CAST(? AS DECIMAL(18, 4)),
                         ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    rule.id.to_string(),
                    rule.kind().as_str(),
                    rule.business_unit,
                    rule.hospital.to_string(),
                    opt_id(rule.doctor()),
                    opt_id(rule.dimensions.payment_type),
                    opt_id(rule.dimensions.surgical_category),
                    opt_id(rule.dimensions.procedure),
                    percentage,
                    charge_type,
                    charge_value,
                    rule.validity.from().to_string(),
                    rule.validity.to().to_string(),
                    rule.priority(),
                    rule.is_active,
                    rule.created_by,
                    rule.updated_by,
                    format_timestamp(&rule.created_at),
                    format_timestamp(&rule.updated_at),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn set_inactive(
        &self,
        id: Uuid,
        actor: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<Rule>> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE sys_rules SET is_active = FALSE, updated_by = ?, updated_at = ?
             WHERE rule_id = ?",
            params![actor, format_timestamp(&at), id.to_string()],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        let sql = format!("SELECT {} FROM sys_rules WHERE rule_id = ?", RULE_COLUMNS);
        Ok(query_rules(&conn, &sql, &[&id.to_string()])?.pop())
    }

    // === Reference operations ===

    pub fn find_reference(&self, kind: ReferenceKind, id: Uuid) -> Result<Option<Reference>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM sys_references WHERE reference_id = ? AND kind = ?",
            REFERENCE_COLUMNS
        );
        let mut refs = query_references(&conn, &sql, &[&id.to_string(), &kind.as_str()])?;
        Ok(refs.pop())
    }

    pub fn save_reference(&self, reference: &Reference) -> Result<()> {
        let conn = self.conn()?;
        let duplicate: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sys_references
             WHERE kind = ? AND business_unit = ? AND code = ? AND reference_id <> ?",
            params![
                reference.kind.as_str(),
                reference.business_unit,
                reference.code,
                reference.id.to_string()
            ],
            |row| row.get(0),
        )?;
        if duplicate > 0 {
            return Err(Error::validation(
                "code",
                format!(
                    "{} code '{}' already exists in {}",
                    reference.kind, reference.code, reference.business_unit
                ),
            ));
        }

        conn.execute(
            "INSERT INTO sys_references (reference_id, kind, business_unit, code, name,
                                         is_active, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (reference_id) DO UPDATE SET
                name = EXCLUDED.name,
                is_active = EXCLUDED.is_active",
            params![
                reference.id.to_string(),
                reference.kind.as_str(),
                reference.business_unit,
                reference.code,
                reference.name,
                reference.is_active,
                format_timestamp(&reference.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn list_references(
        &self,
        kind: Option<ReferenceKind>,
        business_unit: Option<&str>,
    ) -> Result<Vec<Reference>> {
        let conn = self.conn()?;

        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<&dyn ToSql> = Vec::new();
        let kind = kind.map(|k| k.as_str());
        if let Some(kind) = &kind {
            clauses.push("kind = ?");
            values.push(kind);
        }
        if let Some(bu) = &business_unit {
            clauses.push("business_unit = ?");
            values.push(bu);
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let sql = format!(
            "SELECT {} FROM sys_references {} ORDER BY kind, business_unit, code",
            REFERENCE_COLUMNS, where_sql
        );
        query_references(&conn, &sql, values.as_slice())
    }

    // === Status and integrity ===

    /// (kind, total, active) rule counts
    pub fn count_rules_by_kind(&self) -> Result<Vec<(String, i64, i64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT rule_kind, COUNT(*), COUNT(*) FILTER (WHERE is_active)
             FROM sys_rules GROUP BY rule_kind ORDER BY rule_kind",
        )?;
        let counts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(counts)
    }

    /// (kind, count) reference counts
    pub fn count_references_by_kind(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT kind, COUNT(*) FROM sys_references GROUP BY kind ORDER BY kind",
        )?;
        let counts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(counts)
    }

    /// Rules whose cached priority column disagrees with their dimensions,
    /// as (rule id, stored, expected)
    pub fn find_stale_priorities(&self) -> Result<Vec<(Uuid, i32, i32)>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM sys_rules", RULE_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], RuleRow::from_row)?
            .collect::<duckdb::Result<Vec<_>>>()?;

        let mut stale = Vec::new();
        for row in rows {
            let stored = row.priority;
            let rule = row.into_rule()?;
            if stored != rule.priority() {
                stale.push((rule.id, stored, rule.priority()));
            }
        }
        Ok(stale)
    }

    /// Active-rule references with no matching registered reference of the
    /// right kind in the rule's business unit, as (rule id, kind, raw id)
    pub fn find_dangling_references(&self) -> Result<Vec<(Uuid, ReferenceKind, String)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "WITH refs AS (
                SELECT rule_id, business_unit, 'hospital' AS kind, hospital_id AS ref_id
                  FROM sys_rules WHERE is_active
                UNION ALL
                SELECT rule_id, business_unit, 'doctor', doctor_id
                  FROM sys_rules WHERE is_active AND doctor_id IS NOT NULL
                UNION ALL
                SELECT rule_id, business_unit, 'payment_type', payment_type_id
                  FROM sys_rules WHERE is_active AND payment_type_id IS NOT NULL
                UNION ALL
                SELECT rule_id, business_unit, 'surgical_category', surgical_category_id
                  FROM sys_rules WHERE is_active AND surgical_category_id IS NOT NULL
                UNION ALL
                SELECT rule_id, business_unit, 'procedure', procedure_id
                  FROM sys_rules WHERE is_active AND procedure_id IS NOT NULL
             )
             SELECT r.rule_id, r.kind, r.ref_id
             FROM refs r
             LEFT JOIN sys_references ref
               ON ref.reference_id = r.ref_id
              AND ref.kind = r.kind
              AND ref.business_unit = r.business_unit
              AND ref.is_active
             WHERE ref.reference_id IS NULL
             ORDER BY r.rule_id, r.kind",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(rule_id, kind, ref_id)| {
                Ok((parse_uuid("rule_id", &rule_id)?, ReferenceKind::from_str(&kind)?, ref_id))
            })
            .collect()
    }
}

// === Port implementations ===

#[async_trait]
impl RuleStore for DuckDbRepository {
    async fn get_rule(&self, id: Uuid) -> Result<Option<Rule>> {
        DuckDbRepository::get_rule(self, id)
    }

    async fn find_candidates(
        &self,
        scope: &RuleScope,
        dimensions: &Dimensions,
    ) -> Result<Vec<Rule>> {
        DuckDbRepository::find_candidates(self, scope, dimensions)
    }

    async fn list_rules(&self, filter: &RuleFilter) -> Result<Page<Rule>> {
        DuckDbRepository::list_rules(self, filter)
    }

    async fn all_rules(&self) -> Result<Vec<Rule>> {
        DuckDbRepository::all_rules(self)
    }

    async fn save_checked(&self, rule: &Rule, guard: ConflictGuard) -> Result<()> {
        DuckDbRepository::save_checked(self, rule, guard)
    }

    async fn set_inactive(
        &self,
        id: Uuid,
        actor: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<Rule>> {
        DuckDbRepository::set_inactive(self, id, actor, at)
    }
}

#[async_trait]
impl ReferenceLookup for DuckDbRepository {
    async fn find_reference(&self, kind: ReferenceKind, id: Uuid) -> Result<Option<Reference>> {
        DuckDbRepository::find_reference(self, kind, id)
    }
}

#[async_trait]
impl ReferenceRegistry for DuckDbRepository {
    async fn save_reference(&self, reference: &Reference) -> Result<()> {
        DuckDbRepository::save_reference(self, reference)
    }

    async fn list_references(
        &self,
        kind: Option<ReferenceKind>,
        business_unit: Option<&str>,
    ) -> Result<Vec<Reference>> {
        DuckDbRepository::list_references(self, kind, business_unit)
    }
}

// === Row mapping ===

/// Raw column values of a sys_rules row (see [`RULE_COLUMNS`])
struct RuleRow {
    id: String,
    kind: String,
    business_unit: String,
    hospital: String,
    doctor: Option<String>,
    payment_type: Option<String>,
    surgical_category: Option<String>,
    procedure: Option<String>,
    percentage: Option<String>,
    charge_type: Option<String>,
    charge_value: Option<String>,
    validity_from: String,
    validity_to: String,
    is_active: bool,
    created_by: Option<String>,
    updated_by: Option<String>,
    created_at: String,
    updated_at: String,
    priority: i32,
}

impl RuleRow {
    fn from_row(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            business_unit: row.get(2)?,
            hospital: row.get(3)?,
            doctor: row.get(4)?,
            payment_type: row.get(5)?,
            surgical_category: row.get(6)?,
            procedure: row.get(7)?,
            percentage: row.get(8)?,
            charge_type: row.get(9)?,
            charge_value: row.get(10)?,
            validity_from: row.get(11)?,
            validity_to: row.get(12)?,
            is_active: row.get(13)?,
            created_by: row.get(14)?,
            updated_by: row.get(15)?,
            created_at: row.get(16)?,
            updated_at: row.get(17)?,
            priority: row.get(18)?,
        })
    }

    fn into_rule(self) -> Result<Rule> {
        let kind = RuleKind::from_str(&self.kind)?;
        let value = match kind {
            RuleKind::CreditNote => RuleValue::CreditNote {
                percentage: parse_decimal("percentage", self.percentage.as_deref())?,
            },
            RuleKind::DoctorAssignment => RuleValue::DoctorAssignment {
                doctor: parse_uuid("doctor_id", self.doctor.as_deref().unwrap_or_default())?,
                charge_type: ChargeType::from_str(self.charge_type.as_deref().unwrap_or_default())?,
                charge_value: parse_decimal("charge_value", self.charge_value.as_deref())?,
            },
        };

        Ok(Rule {
            id: parse_uuid("rule_id", &self.id)?,
            business_unit: self.business_unit,
            hospital: parse_uuid("hospital_id", &self.hospital)?,
            dimensions: Dimensions {
                payment_type: parse_opt_uuid("payment_type_id", self.payment_type)?,
                surgical_category: parse_opt_uuid("surgical_category_id", self.surgical_category)?,
                procedure: parse_opt_uuid("procedure_id", self.procedure)?,
            },
            value,
            validity: ValidityWindow::new(
                parse_date("validity_from", &self.validity_from)?,
                parse_date("validity_to", &self.validity_to)?,
            )?,
            is_active: self.is_active,
            created_by: self.created_by,
            updated_by: self.updated_by,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
        })
    }
}

fn query_rules(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<Rule>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, RuleRow::from_row)?
        .collect::<duckdb::Result<Vec<_>>>()?;
    rows.into_iter().map(RuleRow::into_rule).collect()
}

fn query_references(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> Result<Vec<Reference>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, bool>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<duckdb::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(id, kind, business_unit, code, name, is_active, created_at)| {
            Ok(Reference {
                id: parse_uuid("reference_id", &id)?,
                kind: ReferenceKind::from_str(&kind)?,
                business_unit,
                code,
                name,
                is_active,
                created_at: parse_timestamp("created_at", &created_at)?,
            })
        })
        .collect()
}

// Helper functions

fn value_columns(value: &RuleValue) -> (Option<String>, Option<&'static str>, Option<String>) {
    match value {
        RuleValue::CreditNote { percentage } => (Some(percentage.to_string()), None, None),
        RuleValue::DoctorAssignment {
            charge_type,
            charge_value,
            ..
        } => (None, Some(charge_type.as_str()), Some(charge_value.to_string())),
    }
}

fn opt_id(id: Option<Uuid>) -> Option<String> {
    id.map(|id| id.to_string())
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    // Fixed width keeps the column sortable as text
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn corrupt(column: &str, value: &str) -> Error {
    Error::database(format!("unreadable {} value '{}'", column, value))
}

fn parse_uuid(column: &str, s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|_| corrupt(column, s))
}

fn parse_opt_uuid(column: &str, s: Option<String>) -> Result<Option<Uuid>> {
    s.map(|s| parse_uuid(column, &s)).transpose()
}

fn parse_decimal(column: &str, s: Option<&str>) -> Result<Decimal> {
    let s = s.ok_or_else(|| corrupt(column, "NULL"))?;
    Decimal::from_str(s)
        .map(|d| d.normalize())
        .map_err(|_| corrupt(column, s))
}

fn parse_date(column: &str, s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| corrupt(column, s))
}

fn parse_timestamp(column: &str, s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| corrupt(column, s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::check_conflicts;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn repo() -> DuckDbRepository {
        let repo = DuckDbRepository::open_in_memory().unwrap();
        repo.ensure_schema().unwrap();
        repo
    }

    fn credit(hospital: Uuid, dims: Dimensions, pct: &str) -> Rule {
        Rule::credit_note(
            "BU",
            hospital,
            dims,
            Decimal::from_str_exact(pct).unwrap(),
            ValidityWindow::new(d(2024, 1, 1), d(2025, 1, 1)).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_rule_round_trips_exactly() {
        let repo = repo();
        let hospital = Uuid::new_v4();
        let rule = credit(hospital, Dimensions::any().with_procedure(Uuid::new_v4()), "12.25");
        repo.save_checked(&rule, check_conflicts).unwrap();

        let loaded = repo.get_rule(rule.id).unwrap().unwrap();
        assert_eq!(loaded.value, RuleValue::CreditNote { percentage: Decimal::from_str_exact("12.25").unwrap() });
        assert_eq!(loaded.dimensions, rule.dimensions);
        assert_eq!(loaded.validity, rule.validity);
        assert_eq!(loaded.priority(), 100);
    }

    #[test]
    fn test_doctor_assignment_round_trip() {
        let repo = repo();
        let doctor = Uuid::new_v4();
        let rule = Rule::doctor_assignment(
            "BU",
            Uuid::new_v4(),
            doctor,
            Dimensions::any(),
            ChargeType::Fixed,
            Decimal::new(150000, 2),
            ValidityWindow::new(d(2024, 1, 1), d(2025, 1, 1)).unwrap(),
        )
        .unwrap();
        repo.save_checked(&rule, check_conflicts).unwrap();

        let loaded = repo.get_rule(rule.id).unwrap().unwrap();
        assert_eq!(loaded.doctor(), Some(doctor));
        assert_eq!(loaded.value, rule.value);
    }

    #[test]
    fn test_candidates_respect_wildcards() {
        let repo = repo();
        let hospital = Uuid::new_v4();
        let p = Uuid::new_v4();
        let wide = credit(hospital, Dimensions::any(), "5");
        let specific = credit(hospital, Dimensions::any().with_procedure(p), "10");
        let other = credit(hospital, Dimensions::any().with_procedure(Uuid::new_v4()), "15");
        for r in [&wide, &specific, &other] {
            repo.save_checked(r, check_conflicts).unwrap();
        }

        let scope = wide.scope();
        let found = repo
            .find_candidates(&scope, &Dimensions::any().with_procedure(p))
            .unwrap();
        let ids: Vec<Uuid> = found.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![specific.id, wide.id]);

        // Omitting the procedure only leaves the wildcard rule
        let found = repo.find_candidates(&scope, &Dimensions::any()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, wide.id);
    }

    #[test]
    fn test_save_checked_rolls_back_on_conflict() {
        let repo = repo();
        let hospital = Uuid::new_v4();
        let first = credit(hospital, Dimensions::any(), "5");
        let second = credit(hospital, Dimensions::any(), "6");
        repo.save_checked(&first, check_conflicts).unwrap();

        let err = repo.save_checked(&second, check_conflicts).unwrap_err();
        assert!(matches!(err, Error::Conflict { existing, .. } if existing == first.id));
        assert!(repo.get_rule(second.id).unwrap().is_none());
    }

    #[test]
    fn test_set_inactive() {
        let repo = repo();
        let rule = credit(Uuid::new_v4(), Dimensions::any(), "5");
        repo.save_checked(&rule, check_conflicts).unwrap();

        let updated = repo
            .set_inactive(rule.id, Some("auditor"), Utc::now())
            .unwrap()
            .unwrap();
        assert!(!updated.is_active);
        assert_eq!(updated.updated_by.as_deref(), Some("auditor"));
        assert!(repo.set_inactive(Uuid::new_v4(), None, Utc::now()).unwrap().is_none());
        assert!(repo.find_candidates(&rule.scope(), &Dimensions::any()).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_reference_code_rejected() {
        let repo = repo();
        let a = Reference::new(ReferenceKind::Hospital, "BU", "CITY", "City Hospital").unwrap();
        let b = Reference::new(ReferenceKind::Hospital, "BU", "city", "Other").unwrap();
        repo.save_reference(&a).unwrap();
        assert_eq!(repo.save_reference(&b).unwrap_err().field(), Some("code"));

        // Same code in another business unit is fine
        let c = Reference::new(ReferenceKind::Hospital, "BU-2", "CITY", "City").unwrap();
        repo.save_reference(&c).unwrap();
        assert_eq!(repo.list_references(Some(ReferenceKind::Hospital), None).unwrap().len(), 2);
        assert_eq!(repo.list_references(None, Some("BU")).unwrap().len(), 1);
    }

    #[test]
    fn test_stale_priority_detected() {
        let repo = repo();
        let rule = credit(Uuid::new_v4(), Dimensions::any().with_payment_type(Uuid::new_v4()), "5");
        repo.save_checked(&rule, check_conflicts).unwrap();
        assert!(repo.find_stale_priorities().unwrap().is_empty());

        repo.conn()
            .unwrap()
            .execute("UPDATE sys_rules SET priority = 100", [])
            .unwrap();
        let stale = repo.find_stale_priorities().unwrap();
        assert_eq!(stale, vec![(rule.id, 100, 1)]);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(is_retryable_error("IO Error: Could not set lock on file"));
        assert!(is_retryable_error("database is locked"));
        assert!(!is_retryable_error("Catalog Error: table does not exist"));
    }
}
