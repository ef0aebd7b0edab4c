//! Database migrations - embedded SQL files
//!
//! Migrations are compiled into the binary with include_str! and applied in
//! order by [`crate::services::MigrationService`].

/// All migrations, embedded at compile time.
/// Format: (filename, sql_content)
///
/// New migrations go at the end as NNN_description.sql.
pub const MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_reference_data.sql", include_str!("001_reference_data.sql")),
    ("002_rules.sql", include_str!("002_rules.sql")),
];
