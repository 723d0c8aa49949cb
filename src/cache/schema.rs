//! Table Schema Module
//!
//! SQL for one backing table, rendered once per store for its dialect.
//!
//! ```sql
//! CREATE TABLE <table> (
//!   `key`   VARCHAR(max_key_size) NOT NULL PRIMARY KEY,
//!   val     VARBINARY(max_val_size),
//!   expires BIGINT,            -- seconds to live from `touched`
//!   touched BIGINT NOT NULL    -- unix milliseconds
//! )
//! ```

use crate::config::StoreOptions;
use crate::pool::Dialect;

/// Pre-rendered statements for one table.
#[derive(Debug, Clone)]
pub struct TableSql {
    pub create: String,
    pub drop: String,
    pub upsert: String,
    pub select_val: String,
    pub select_meta: String,
    pub touch: String,
    pub set_expires: String,
    pub delete: String,
    pub sweep_expired: String,
    pub count: String,
    pub oldest: String,
}

impl TableSql {
    pub fn new(dialect: Dialect, options: &StoreOptions) -> Self {
        let t = options.tablename.as_str();

        let create = match dialect {
            Dialect::MySql => format!(
                "CREATE TABLE IF NOT EXISTS {t} (\
                 `key` VARCHAR({k}) NOT NULL, \
                 val VARBINARY({v}), \
                 expires BIGINT NULL, \
                 touched BIGINT NOT NULL, \
                 PRIMARY KEY (`key`))",
                k = options.max_key_size,
                v = options.max_val_size,
            ),
            // SQLite ignores declared lengths, so bound them with CHECKs
            Dialect::Sqlite => format!(
                "CREATE TABLE IF NOT EXISTS {t} (\
                 `key` TEXT NOT NULL PRIMARY KEY CHECK (length(`key`) <= {k}), \
                 val BLOB CHECK (length(val) <= {v}), \
                 expires INTEGER, \
                 touched INTEGER NOT NULL)",
                k = options.max_key_size,
                v = options.max_val_size,
            ),
        };

        let upsert = match dialect {
            Dialect::MySql => format!(
                "INSERT INTO {t} (`key`, val, expires, touched) VALUES (?, ?, ?, ?) \
                 ON DUPLICATE KEY UPDATE \
                 val = VALUES(val), expires = VALUES(expires), touched = VALUES(touched)"
            ),
            Dialect::Sqlite => format!(
                "INSERT INTO {t} (`key`, val, expires, touched) VALUES (?, ?, ?, ?) \
                 ON CONFLICT(`key`) DO UPDATE SET \
                 val = excluded.val, expires = excluded.expires, touched = excluded.touched"
            ),
        };

        Self {
            create,
            drop: format!("DROP TABLE IF EXISTS {t}"),
            upsert,
            select_val: format!("SELECT val FROM {t} WHERE `key` = ?"),
            select_meta: format!("SELECT `key`, expires, touched FROM {t} WHERE `key` = ?"),
            touch: format!("UPDATE {t} SET touched = ? WHERE `key` = ?"),
            set_expires: format!("UPDATE {t} SET expires = ? WHERE `key` = ?"),
            delete: format!("DELETE FROM {t} WHERE `key` = ?"),
            sweep_expired: format!(
                "DELETE FROM {t} WHERE expires IS NOT NULL AND touched + expires * 1000 <= ?"
            ),
            count: format!("SELECT COUNT(*) FROM {t}"),
            oldest: format!(
                "SELECT `key`, expires, touched FROM {t} ORDER BY touched ASC, `key` ASC LIMIT ?"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mysql_schema_bounds_columns() {
        let options = StoreOptions::new("testdict").max_key_size(40).max_val_size(900);
        let sql = TableSql::new(Dialect::MySql, &options);

        assert!(sql.create.contains("`key` VARCHAR(40) NOT NULL"));
        assert!(sql.create.contains("val VARBINARY(900)"));
        assert!(sql.upsert.contains("ON DUPLICATE KEY UPDATE"));
    }

    #[test]
    fn test_sqlite_schema_uses_checks_and_on_conflict() {
        let sql = TableSql::new(Dialect::Sqlite, &StoreOptions::new("testdict"));

        assert!(sql.create.contains("length(`key`) <= 100"));
        assert!(sql.create.contains("length(val) <= 500"));
        assert!(sql.upsert.contains("ON CONFLICT(`key`) DO UPDATE"));
    }

    #[test]
    fn test_statements_target_table() {
        let sql = TableSql::new(Dialect::Sqlite, &StoreOptions::new("sessions"));
        for stmt in [&sql.drop, &sql.select_val, &sql.touch, &sql.delete, &sql.count, &sql.oldest] {
            assert!(stmt.contains("sessions"), "{}", stmt);
        }
        assert!(sql.oldest.contains("ORDER BY touched ASC, `key` ASC"));
    }
}
