//! Migration scripts shipped with the binary. The canonical copies live in the
//! workspace `migrations/` directory; `dragonfly migrate --dir` reads them from
//! disk instead.

pub const MIGRATIONS: &[(&str, &str)] = &[
    (
        "V1__baseline.sql",
        include_str!("../../../../migrations/V1__baseline.sql"),
    ),
    (
        "V2__benchmark_tracking.sql",
        include_str!("../../../../migrations/V2__benchmark_tracking.sql"),
    ),
    (
        "V3__indexing_history.sql",
        include_str!("../../../../migrations/V3__indexing_history.sql"),
    ),
    (
        "V4__tenant_credentials.sql",
        include_str!("../../../../migrations/V4__tenant_credentials.sql"),
    ),
];

pub const HISTORY_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_history (
  installed_rank INTEGER PRIMARY KEY,
  version INTEGER NOT NULL,
  description TEXT NOT NULL,
  script TEXT NOT NULL,
  checksum TEXT NOT NULL,
  installed_by TEXT NOT NULL,
  installed_on TEXT NOT NULL,
  execution_time_ms INTEGER NOT NULL,
  success INTEGER NOT NULL
);
"#;
