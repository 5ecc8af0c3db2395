//! SQL Server tables, created on startup when missing.
//!
//! `seq` identity columns give a stable newest-first order for rows written
//! within the same clock tick.

pub const TABLES: [(&str, &str); 7] = [
    (
        "items",
        r#"
        IF OBJECT_ID(N'dbo.items', N'U') IS NULL
        CREATE TABLE dbo.items (
            id NVARCHAR(64) NOT NULL PRIMARY KEY,
            name NVARCHAR(255) NOT NULL,
            category NVARCHAR(32) NOT NULL,
            quantity INT NOT NULL DEFAULT 0,
            location NVARCHAR(255) NOT NULL DEFAULT '',
            supplier NVARCHAR(255) NOT NULL DEFAULT '',
            reorder_level INT NOT NULL DEFAULT 0,
            notes NVARCHAR(MAX) NOT NULL DEFAULT '',
            sku NVARCHAR(64) NULL,
            unit_cost DECIMAL(10, 2) NULL,
            last_count_date DATETIME NULL,
            last_count_by NVARCHAR(255) NULL,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "transactions",
        r#"
        IF OBJECT_ID(N'dbo.transactions', N'U') IS NULL
        CREATE TABLE dbo.transactions (
            seq BIGINT IDENTITY(1, 1) NOT NULL,
            id NVARCHAR(64) NOT NULL PRIMARY KEY,
            item_id NVARCHAR(64) NOT NULL
                REFERENCES dbo.items(id) ON DELETE CASCADE,
            [type] NVARCHAR(16) NOT NULL,
            quantity INT NOT NULL,
            previous_quantity INT NOT NULL,
            new_quantity INT NOT NULL,
            user_id NVARCHAR(64) NOT NULL,
            user_name NVARCHAR(255) NOT NULL,
            job_reference NVARCHAR(255) NULL,
            notes NVARCHAR(MAX) NULL,
            from_location NVARCHAR(255) NULL,
            to_location NVARCHAR(255) NULL,
            created_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "count_sessions",
        r#"
        IF OBJECT_ID(N'dbo.count_sessions', N'U') IS NULL
        CREATE TABLE dbo.count_sessions (
            seq BIGINT IDENTITY(1, 1) NOT NULL,
            id NVARCHAR(64) NOT NULL PRIMARY KEY,
            name NVARCHAR(255) NOT NULL,
            [type] NVARCHAR(16) NOT NULL,
            status NVARCHAR(16) NOT NULL,
            started_by NVARCHAR(64) NOT NULL,
            started_by_name NVARCHAR(255) NOT NULL,
            total_items INT NOT NULL DEFAULT 0,
            counted_items INT NOT NULL DEFAULT 0,
            discrepancy_count INT NOT NULL DEFAULT 0,
            notes NVARCHAR(MAX) NULL,
            started_at DATETIME NOT NULL,
            completed_at DATETIME NULL
        )
        "#,
    ),
    (
        "counts",
        r#"
        IF OBJECT_ID(N'dbo.counts', N'U') IS NULL
        CREATE TABLE dbo.counts (
            seq BIGINT IDENTITY(1, 1) NOT NULL,
            id NVARCHAR(64) NOT NULL PRIMARY KEY,
            item_id NVARCHAR(64) NOT NULL
                REFERENCES dbo.items(id) ON DELETE CASCADE,
            counted_quantity INT NOT NULL,
            system_quantity INT NOT NULL,
            discrepancy INT NOT NULL,
            user_id NVARCHAR(64) NOT NULL,
            user_name NVARCHAR(255) NOT NULL,
            count_type NVARCHAR(16) NOT NULL,
            count_session_id NVARCHAR(64) NULL,
            notes NVARCHAR(MAX) NULL,
            created_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "users",
        r#"
        IF OBJECT_ID(N'dbo.users', N'U') IS NULL
        CREATE TABLE dbo.users (
            id NVARCHAR(64) NOT NULL PRIMARY KEY,
            name NVARCHAR(255) NOT NULL,
            pin NVARCHAR(128) NOT NULL,
            role NVARCHAR(16) NOT NULL,
            active BIT NOT NULL DEFAULT 1,
            created_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "ai_count_logs",
        r#"
        IF OBJECT_ID(N'dbo.ai_count_logs', N'U') IS NULL
        CREATE TABLE dbo.ai_count_logs (
            seq BIGINT IDENTITY(1, 1) NOT NULL,
            id NVARCHAR(64) NOT NULL PRIMARY KEY,
            item_id NVARCHAR(64) NULL
                REFERENCES dbo.items(id) ON DELETE SET NULL,
            image_url NVARCHAR(MAX) NOT NULL,
            ai_count INT NOT NULL,
            confirmed_count INT NOT NULL,
            user_id NVARCHAR(64) NOT NULL,
            user_name NVARCHAR(255) NOT NULL,
            profile_name NVARCHAR(255) NULL,
            created_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "chat_messages",
        r#"
        IF OBJECT_ID(N'dbo.chat_messages', N'U') IS NULL
        CREATE TABLE dbo.chat_messages (
            seq BIGINT IDENTITY(1, 1) NOT NULL,
            id NVARCHAR(64) NOT NULL PRIMARY KEY,
            user_id NVARCHAR(64) NOT NULL,
            user_name NVARCHAR(255) NOT NULL,
            role NVARCHAR(16) NOT NULL,
            content NVARCHAR(MAX) NOT NULL,
            created_at DATETIME NOT NULL
        )
        "#,
    ),
];

/// Deletion order respecting foreign keys
pub const RESET_ORDER: [&str; 7] = [
    "chat_messages",
    "ai_count_logs",
    "counts",
    "count_sessions",
    "transactions",
    "items",
    "users",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_table_is_reset() {
        let mut created: Vec<&str> = TABLES.iter().map(|(name, _)| *name).collect();
        let mut reset = RESET_ORDER.to_vec();
        created.sort_unstable();
        reset.sort_unstable();
        assert_eq!(created, reset);
    }

    #[test]
    fn test_children_created_after_items() {
        let position = |table: &str| TABLES.iter().position(|(name, _)| *name == table).unwrap();
        assert!(position("items") < position("transactions"));
        assert!(position("items") < position("counts"));
        assert!(position("items") < position("ai_count_logs"));
        assert!(RESET_ORDER.iter().position(|t| *t == "items") > RESET_ORDER.iter().position(|t| *t == "counts"));
    }
}
