use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use tiberius::{Row, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::Compat;
use tracing::{debug, error};

use super::{schema, Database};
use crate::models::{
    AiCountLog, ChatMessage, ChatRole, CountSession, CountType, InventoryCount, Item, SessionStatus,
    Transaction, TransactionType, User,
};
use crate::store::{
    AppliedChange, InventoryStore, StockChange, StockOutcome, StockPlanner, StockRejection,
    StoreBackend, StoreError,
};

type SqlClient = tiberius::Client<Compat<TcpStream>>;

/// Any server error inside the batch aborts and rolls back the whole transaction
const BEGIN_STOCK_TRANSACTION: &str = "SET XACT_ABORT ON; BEGIN TRANSACTION";

/// SQL Server error number for a primary key violation
const DUPLICATE_KEY_ERROR: u32 = 2627;

const ITEM_COLUMNS: &str = "id, name, category, quantity, location, supplier, reorder_level, notes, sku, \
     CAST(unit_cost AS NVARCHAR(32)) AS unit_cost, last_count_date, last_count_by, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, item_id, [type], quantity, previous_quantity, new_quantity, user_id, \
     user_name, job_reference, notes, from_location, to_location, created_at";

const COUNT_COLUMNS: &str = "id, item_id, counted_quantity, system_quantity, discrepancy, user_id, user_name, \
     count_type, count_session_id, notes, created_at";

const SESSION_COLUMNS: &str = "id, name, [type], status, started_by, started_by_name, total_items, \
     counted_items, discrepancy_count, notes, started_at, completed_at";

const USER_COLUMNS: &str = "id, name, pin, role, active, created_at";

const AI_LOG_COLUMNS: &str = "id, item_id, image_url, ai_count, confirmed_count, user_id, user_name, \
     profile_name, created_at";

const CHAT_COLUMNS: &str = "id, user_id, user_name, role, content, created_at";

fn db_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Database(e.to_string())
}

fn write_err(e: tiberius::error::Error, id: &str) -> StoreError {
    if let tiberius::error::Error::Server(token) = &e {
        if token.code() == DUPLICATE_KEY_ERROR {
            return StoreError::Duplicate(id.to_string());
        }
    }
    db_err(e)
}

fn to_utc(at: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(at, Utc)
}

fn text(row: &Row, column: &str) -> String {
    row.get::<&str, _>(column).unwrap_or("").to_string()
}

fn opt_text(row: &Row, column: &str) -> Option<String> {
    row.get::<&str, _>(column).map(str::to_string)
}

fn int(row: &Row, column: &str) -> i32 {
    row.get::<i32, _>(column).unwrap_or(0)
}

fn timestamp(row: &Row, column: &str) -> DateTime<Utc> {
    row.get::<NaiveDateTime, _>(column)
        .map(to_utc)
        .unwrap_or_else(Utc::now)
}

fn opt_timestamp(row: &Row, column: &str) -> Option<DateTime<Utc>> {
    row.get::<NaiveDateTime, _>(column).map(to_utc)
}

fn parse_or<T: FromStr>(row: &Row, column: &str, fallback: T) -> T {
    row.get::<&str, _>(column)
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

fn map_item(row: &Row) -> Item {
    Item {
        id: text(row, "id"),
        name: text(row, "name"),
        category: parse_or(row, "category", Default::default()),
        quantity: int(row, "quantity"),
        location: text(row, "location"),
        supplier: text(row, "supplier"),
        reorder_level: int(row, "reorder_level"),
        notes: text(row, "notes"),
        sku: opt_text(row, "sku"),
        unit_cost: row
            .get::<&str, _>("unit_cost")
            .and_then(|v| BigDecimal::from_str(v.trim()).ok()),
        last_count_date: opt_timestamp(row, "last_count_date"),
        last_count_by: opt_text(row, "last_count_by"),
        created_at: timestamp(row, "created_at"),
        updated_at: timestamp(row, "updated_at"),
    }
}

fn map_transaction(row: &Row) -> Transaction {
    Transaction {
        id: text(row, "id"),
        item_id: text(row, "item_id"),
        transaction_type: parse_or(row, "type", TransactionType::Adjustment),
        quantity: int(row, "quantity"),
        previous_quantity: int(row, "previous_quantity"),
        new_quantity: int(row, "new_quantity"),
        user_id: text(row, "user_id"),
        user_name: text(row, "user_name"),
        job_reference: opt_text(row, "job_reference"),
        notes: opt_text(row, "notes"),
        from_location: opt_text(row, "from_location"),
        to_location: opt_text(row, "to_location"),
        created_at: timestamp(row, "created_at"),
    }
}

fn map_count(row: &Row) -> InventoryCount {
    InventoryCount {
        id: text(row, "id"),
        item_id: text(row, "item_id"),
        counted_quantity: int(row, "counted_quantity"),
        system_quantity: int(row, "system_quantity"),
        discrepancy: int(row, "discrepancy"),
        user_id: text(row, "user_id"),
        user_name: text(row, "user_name"),
        count_type: parse_or(row, "count_type", CountType::Spot),
        count_session_id: opt_text(row, "count_session_id"),
        notes: opt_text(row, "notes"),
        created_at: timestamp(row, "created_at"),
    }
}

fn map_session(row: &Row) -> CountSession {
    CountSession {
        id: text(row, "id"),
        name: text(row, "name"),
        count_type: parse_or(row, "type", CountType::Quarterly),
        status: parse_or(row, "status", SessionStatus::InProgress),
        started_by: text(row, "started_by"),
        started_by_name: text(row, "started_by_name"),
        total_items: int(row, "total_items"),
        counted_items: int(row, "counted_items"),
        discrepancy_count: int(row, "discrepancy_count"),
        notes: opt_text(row, "notes"),
        started_at: timestamp(row, "started_at"),
        completed_at: opt_timestamp(row, "completed_at"),
    }
}

fn map_user(row: &Row) -> User {
    User {
        id: text(row, "id"),
        name: text(row, "name"),
        pin: text(row, "pin"),
        role: parse_or(row, "role", Default::default()),
        active: row.get::<bool, _>("active").unwrap_or(false),
        created_at: timestamp(row, "created_at"),
    }
}

fn map_ai_log(row: &Row) -> AiCountLog {
    AiCountLog {
        id: text(row, "id"),
        item_id: opt_text(row, "item_id"),
        image_url: text(row, "image_url"),
        ai_count: int(row, "ai_count"),
        confirmed_count: int(row, "confirmed_count"),
        user_id: text(row, "user_id"),
        user_name: text(row, "user_name"),
        profile_name: opt_text(row, "profile_name"),
        created_at: timestamp(row, "created_at"),
    }
}

fn map_chat(row: &Row) -> ChatMessage {
    ChatMessage {
        id: text(row, "id"),
        user_id: text(row, "user_id"),
        user_name: text(row, "user_name"),
        role: parse_or(row, "role", ChatRole::User),
        content: text(row, "content"),
        created_at: timestamp(row, "created_at"),
    }
}

async fn fetch(client: &mut SqlClient, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, StoreError> {
    client
        .query(sql, params)
        .await
        .map_err(db_err)?
        .into_first_result()
        .await
        .map_err(db_err)
}

async fn execute(client: &mut SqlClient, sql: &str, params: &[&dyn ToSql]) -> Result<u64, StoreError> {
    Ok(client.execute(sql, params).await.map_err(db_err)?.total())
}

async fn insert_item_row(client: &mut SqlClient, item: &Item) -> Result<(), StoreError> {
    let unit_cost = item.unit_cost.as_ref().map(ToString::to_string);
    client
        .execute(
            r#"
            INSERT INTO dbo.items (
                id, name, category, quantity, location, supplier, reorder_level, notes, sku,
                unit_cost, last_count_date, last_count_by, created_at, updated_at
            ) VALUES (@P1, @P2, @P3, @P4, @P5, @P6, @P7, @P8, @P9,
                      CAST(@P10 AS DECIMAL(10, 2)), @P11, @P12, @P13, @P14)
            "#,
            &[
                &item.id,
                &item.name,
                &item.category.as_str(),
                &item.quantity,
                &item.location,
                &item.supplier,
                &item.reorder_level,
                &item.notes,
                &item.sku,
                &unit_cost,
                &item.last_count_date.map(|d| d.naive_utc()),
                &item.last_count_by,
                &item.created_at.naive_utc(),
                &item.updated_at.naive_utc(),
            ],
        )
        .await
        .map_err(|e| write_err(e, &item.id))?;
    Ok(())
}

async fn insert_transaction_row(client: &mut SqlClient, tx: &Transaction) -> Result<(), StoreError> {
    execute(
        client,
        r#"
        INSERT INTO dbo.transactions (
            id, item_id, [type], quantity, previous_quantity, new_quantity, user_id, user_name,
            job_reference, notes, from_location, to_location, created_at
        ) VALUES (@P1, @P2, @P3, @P4, @P5, @P6, @P7, @P8, @P9, @P10, @P11, @P12, @P13)
        "#,
        &[
            &tx.id,
            &tx.item_id,
            &tx.transaction_type.as_str(),
            &tx.quantity,
            &tx.previous_quantity,
            &tx.new_quantity,
            &tx.user_id,
            &tx.user_name,
            &tx.job_reference,
            &tx.notes,
            &tx.from_location,
            &tx.to_location,
            &tx.created_at.naive_utc(),
        ],
    )
    .await?;
    Ok(())
}

async fn insert_count_row(client: &mut SqlClient, count: &InventoryCount) -> Result<(), StoreError> {
    execute(
        client,
        r#"
        INSERT INTO dbo.counts (
            id, item_id, counted_quantity, system_quantity, discrepancy, user_id, user_name,
            count_type, count_session_id, notes, created_at
        ) VALUES (@P1, @P2, @P3, @P4, @P5, @P6, @P7, @P8, @P9, @P10, @P11)
        "#,
        &[
            &count.id,
            &count.item_id,
            &count.counted_quantity,
            &count.system_quantity,
            &count.discrepancy,
            &count.user_id,
            &count.user_name,
            &count.count_type.as_str(),
            &count.count_session_id,
            &count.notes,
            &count.created_at.naive_utc(),
        ],
    )
    .await?;
    Ok(())
}

async fn insert_user_row(client: &mut SqlClient, user: &User) -> Result<(), StoreError> {
    client
        .execute(
            "INSERT INTO dbo.users (id, name, pin, role, active, created_at) VALUES (@P1, @P2, @P3, @P4, @P5, @P6)",
            &[
                &user.id,
                &user.name,
                &user.pin,
                &user.role.as_str(),
                &user.active,
                &user.created_at.naive_utc(),
            ],
        )
        .await
        .map_err(|e| write_err(e, &user.id))?;
    Ok(())
}

async fn write_stock_change(
    client: &mut SqlClient,
    item_id: &str,
    change: &StockChange,
) -> Result<(), StoreError> {
    let stamp_at = change.count_stamp.as_ref().map(|s| s.at.naive_utc());
    let stamp_by = change.count_stamp.as_ref().map(|s| s.by.clone());
    execute(
        client,
        r#"
        UPDATE dbo.items
        SET quantity = @P2,
            last_count_date = COALESCE(@P3, last_count_date),
            last_count_by = COALESCE(@P4, last_count_by),
            updated_at = @P5
        WHERE id = @P1
        "#,
        &[
            &item_id,
            &change.new_quantity,
            &stamp_at,
            &stamp_by,
            &change.updated_at.naive_utc(),
        ],
    )
    .await?;

    if let Some(tx) = &change.transaction {
        insert_transaction_row(client, tx).await?;
    }
    if let Some(count) = &change.count {
        insert_count_row(client, count).await?;
    }
    Ok(())
}

/// Runs the planner inside the open transaction; a panic becomes an error so
/// the caller still rolls back
fn run_planner(
    planner: StockPlanner,
    item: &Item,
) -> Result<Result<StockChange, StockRejection>, StoreError> {
    panic::catch_unwind(AssertUnwindSafe(|| planner(item)))
        .map_err(|_| db_err(format!("Stock planner panicked for item {}", item.id)))
}

async fn rollback(client: &mut SqlClient) {
    if let Err(e) = client.simple_query("ROLLBACK").await {
        error!("❌ Failed to roll back transaction: {}", e);
    }
}

/// Inventory persistence on SQL Server
#[derive(Clone, Debug)]
pub struct SqlServerStore {
    db: Database,
}

impl SqlServerStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn client(&self) -> Result<bb8::PooledConnection<'_, bb8_tiberius::ConnectionManager>, StoreError> {
        self.db.get_client().await.map_err(db_err)
    }
}

#[async_trait]
impl InventoryStore for SqlServerStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::SqlServer
    }

    async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        let mut client = self.client().await?;
        let sql = format!("SELECT {ITEM_COLUMNS} FROM dbo.items WITH (NOLOCK) ORDER BY name");
        let rows = fetch(&mut client, &sql, &[]).await?;
        Ok(rows.iter().map(map_item).collect())
    }

    async fn get_item(&self, id: &str) -> Result<Option<Item>, StoreError> {
        let mut client = self.client().await?;
        let sql = format!("SELECT {ITEM_COLUMNS} FROM dbo.items WHERE id = @P1");
        let rows = fetch(&mut client, &sql, &[&id]).await?;
        Ok(rows.first().map(map_item))
    }

    async fn count_items(&self) -> Result<usize, StoreError> {
        let mut client = self.client().await?;
        let rows = fetch(&mut client, "SELECT COUNT(*) AS item_count FROM dbo.items", &[]).await?;
        Ok(rows.first().map(|r| int(r, "item_count")).unwrap_or(0).max(0) as usize)
    }

    async fn insert_item(&self, item: &Item) -> Result<(), StoreError> {
        let mut client = self.client().await?;
        insert_item_row(&mut client, item).await
    }

    async fn insert_items(&self, items: &[Item]) -> Result<usize, StoreError> {
        // A pooled connection would carry an unfinished transaction to its next
        // borrower if this future were dropped mid-way
        let mut client = self.db.dedicated_client().await.map_err(db_err)?;
        client
            .simple_query(BEGIN_STOCK_TRANSACTION)
            .await
            .map_err(|e| db_err(format!("Failed to begin transaction: {e}")))?;

        let result: Result<StockOutcome, StoreError> = async {
            let sql = format!("SELECT {ITEM_COLUMNS} FROM dbo.items WITH (UPDLOCK, ROWLOCK) WHERE id = @P1");
            let rows = fetch(&mut client, &sql, &[&item_id]).await?;
            let Some(mut item) = rows.first().map(map_item) else {
                return Ok(StockOutcome::ItemNotFound);
            };

            let change = match run_planner(planner, &item)? {
                Ok(change) => change,
                Err(rejection) => return Ok(StockOutcome::Rejected(rejection)),
            };

            write_stock_change(&mut client, item_id, &change).await?;
            change.apply_to(&mut item);
            Ok(StockOutcome::Applied(AppliedChange {
                item,
                transaction: change.transaction,
                count: change.count,
            }))
        }
        .await;

        match result {
            Ok(outcome @ StockOutcome::Applied(_)) => {
                if let Err(e) = client.simple_query("COMMIT").await {
                    error!(item_id, "❌ Commit failed, rolling back: {}", e);
                    rollback(&mut client).await;
                    return Err(db_err(format!("Failed to commit transaction: {e}")));
                }
                debug!(item_id, "✅ Stock change committed");
                Ok(outcome)
            }
            Ok(outcome) => {
                rollback(&mut client).await;
                Ok(outcome)
            }
            Err(e) => {
                error!(item_id, "❌ Stock change failed, rolling back: {}", e);
                rollback(&mut client).await;
                Err(e)
            }
        }
    }

    async fn item_transactions(&self, item_id: &str) -> Result<Vec<Transaction>, StoreError> {
        let mut client = self.client().await?;
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM dbo.transactions WHERE item_id = @P1 ORDER BY seq DESC"
        );
        let rows = fetch(&mut client, &sql, &[&item_id]).await?;
        Ok(rows.iter().map(map_transaction).collect())
    }

    async fn transactions_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let mut client = self.client().await?;
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM dbo.transactions \
             WHERE created_at >= @P1 AND created_at <= @P2 ORDER BY seq DESC"
        );
        let rows = fetch(&mut client, &sql, &[&start.naive_utc(), &end.naive_utc()]).await?;
        Ok(rows.iter().map(map_transaction).collect())
    }

    async fn recent_transactions(&self, limit: usize) -> Result<Vec<Transaction>, StoreError> {
        let mut client = self.client().await?;
        let limit = i32::try_from(limit).unwrap_or(i32::MAX);
        let sql = format!("SELECT TOP (@P1) {TRANSACTION_COLUMNS} FROM dbo.transactions ORDER BY seq DESC");
        let rows = fetch(&mut client, &sql, &[&limit]).await?;
        Ok(rows.iter().map(map_transaction).collect())
    }

    async fn session_counts(&self, session_id: &str) -> Result<Vec<InventoryCount>, StoreError> {
        let mut client = self.client().await?;
        let sql = format!(
            "SELECT {COUNT_COLUMNS} FROM dbo.counts WHERE count_session_id = @P1 ORDER BY seq DESC"
        );
        let rows = fetch(&mut client, &sql, &[&session_id]).await?;
        Ok(rows.iter().map(map_count).collect())
    }

    async fn counts_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<InventoryCount>, StoreError> {
        let mut client = self.client().await?;
        let sql = format!(
            "SELECT {COUNT_COLUMNS} FROM dbo.counts \
             WHERE created_at >= @P1 AND created_at <= @P2 ORDER BY seq DESC"
        );
        let rows = fetch(&mut client, &sql, &[&start.naive_utc(), &end.naive_utc()]).await?;
        Ok(rows.iter().map(map_count).collect())
    }

    async fn insert_session(&self, session: &CountSession) -> Result<(), StoreError> {
        let mut client = self.client().await?;
        client
            .execute(
                r#"
                INSERT INTO dbo.count_sessions (
                    id, name, [type], status, started_by, started_by_name, total_items,
                    counted_items, discrepancy_count, notes, started_at, completed_at
                ) VALUES (@P1, @P2, @P3, @P4, @P5, @P6, @P7, @P8, @P9, @P10, @P11, @P12)
                "#,
                &[
                    &session.id,
                    &session.name,
                    &session.count_type.as_str(),
                    &session.status.as_str(),
                    &session.started_by,
                    &session.started_by_name,
                    &session.total_items,
                    &session.counted_items,
                    &session.discrepancy_count,
                    &session.notes,
                    &session.started_at.naive_utc(),
                    &session.completed_at.map(|d| d.naive_utc()),
                ],
            )
            .await
            .map_err(|e| write_err(e, &session.id))?;
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<CountSession>, StoreError> {
        let mut client = self.client().await?;
        let sql = format!("SELECT {SESSION_COLUMNS} FROM dbo.count_sessions WHERE id = @P1");
        let rows = fetch(&mut client, &sql, &[&id]).await?;
        Ok(rows.first().map(map_session))
    }

    async fn list_sessions(
        &self,
        status: SessionStatus,
        limit: Option<usize>,
    ) -> Result<Vec<CountSession>, StoreError> {
        let mut client = self.client().await?;
        let order = match status {
            SessionStatus::InProgress => "started_at DESC, seq DESC",
            SessionStatus::Completed => "completed_at DESC, seq DESC",
        };
        let status_str = status.as_str();
        let rows = match limit {
            Some(limit) => {
                let limit = i32::try_from(limit).unwrap_or(i32::MAX);
                let sql = format!(
                    "SELECT TOP (@P2) {SESSION_COLUMNS} FROM dbo.count_sessions WHERE status = @P1 ORDER BY {order}"
                );
                fetch(&mut client, &sql, &[&status_str, &limit]).await?
            }
            None => {
                let sql = format!(
                    "SELECT {SESSION_COLUMNS} FROM dbo.count_sessions WHERE status = @P1 ORDER BY {order}"
                );
                fetch(&mut client, &sql, &[&status_str]).await?
            }
        };
        Ok(rows.iter().map(map_session).collect())
    }

    async fn update_session(&self, session: &CountSession) -> Result<bool, StoreError> {
        let mut client = self.client().await?;
        let affected = execute(
            &mut client,
            r#"
            UPDATE dbo.count_sessions
            SET name = @P2, status = @P3, counted_items = @P4, discrepancy_count = @P5,
                notes = @P6, completed_at = @P7
            WHERE id = @P1
            "#,
            &[
                &session.id,
                &session.name,
                &session.status.as_str(),
                &session.counted_items,
                &session.discrepancy_count,
                &session.notes,
                &session.completed_at.map(|d| d.naive_utc()),
            ],
        )
        .await?;
        Ok(affected > 0)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut client = self.client().await?;
        let sql = format!("SELECT {USER_COLUMNS} FROM dbo.users ORDER BY name");
        let rows = fetch(&mut client, &sql, &[]).await?;
        Ok(rows.iter().map(map_user).collect())
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        let mut client = self.client().await?;
        let sql = format!("SELECT {USER_COLUMNS} FROM dbo.users WHERE id = @P1");
        let rows = fetch(&mut client, &sql, &[&id]).await?;
        Ok(rows.first().map(map_user))
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut client = self.client().await?;
        insert_user_row(&mut client, user).await
    }

    async fn update_user(&self, user: &User) -> Result<bool, StoreError> {
        let mut client = self.client().await?;
        let affected = execute(
            &mut client,
            "UPDATE dbo.users SET name = @P2, pin = @P3, role = @P4, active = @P5 WHERE id = @P1",
            &[
                &user.id,
                &user.name,
                &user.pin,
                &user.role.as_str(),
                &user.active,
            ],
        )
        .await?;
        Ok(affected > 0)
    }

    async fn insert_ai_log(&self, log: &AiCountLog) -> Result<(), StoreError> {
        let mut client = self.client().await?;
        execute(
            &mut client,
            r#"
            INSERT INTO dbo.ai_count_logs (
                id, item_id, image_url, ai_count, confirmed_count, user_id, user_name,
                profile_name, created_at
            ) VALUES (@P1, @P2, @P3, @P4, @P5, @P6, @P7, @P8, @P9)
            "#,
            &[
                &log.id,
                &log.item_id,
                &log.image_url,
                &log.ai_count,
                &log.confirmed_count,
                &log.user_id,
                &log.user_name,
                &log.profile_name,
                &log.created_at.naive_utc(),
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_ai_logs(&self, limit: usize) -> Result<Vec<AiCountLog>, StoreError> {
        let mut client = self.client().await?;
        let limit = i32::try_from(limit).unwrap_or(i32::MAX);
        let sql = format!("SELECT TOP (@P1) {AI_LOG_COLUMNS} FROM dbo.ai_count_logs ORDER BY seq DESC");
        let rows = fetch(&mut client, &sql, &[&limit]).await?;
        Ok(rows.iter().map(map_ai_log).collect())
    }

    async fn chat_messages(&self, user_id: Option<&str>) -> Result<Vec<ChatMessage>, StoreError> {
        let mut client = self.client().await?;
        let rows = match user_id {
            Some(user_id) => {
                let sql = format!(
                    "SELECT {CHAT_COLUMNS} FROM dbo.chat_messages WHERE user_id = @P1 ORDER BY seq ASC"
                );
                fetch(&mut client, &sql, &[&user_id]).await?
            }
            None => {
                let sql = format!("SELECT {CHAT_COLUMNS} FROM dbo.chat_messages ORDER BY seq ASC");
                fetch(&mut client, &sql, &[]).await?
            }
        };
        Ok(rows.iter().map(map_chat).collect())
    }

    async fn insert_chat_message(&self, message: &ChatMessage) -> Result<(), StoreError> {
        let mut client = self.client().await?;
        execute(
            &mut client,
            r#"
            INSERT INTO dbo.chat_messages (id, user_id, user_name, role, content, created_at)
            VALUES (@P1, @P2, @P3, @P4, @P5, @P6)
            "#,
            &[
                &message.id,
                &message.user_id,
                &message.user_name,
                &message.role.as_str(),
                &message.content,
                &message.created_at.naive_utc(),
            ],
        )
        .await?;
        Ok(())
    }

    async fn clear_chat_messages(&self, user_id: &str) -> Result<usize, StoreError> {
        let mut client = self.client().await?;
        let affected = execute(
            &mut client,
            "DELETE FROM dbo.chat_messages WHERE user_id = @P1",
            &[&user_id],
        )
        .await?;
        Ok(affected as usize)
    }

    async fn reset_all(&self, admin: &User) -> Result<(), StoreError> {
        let mut client = self.client().await?;
        client
            .simple_query("BEGIN TRANSACTION")
            .await
            .map_err(|e| db_err(format!("Failed to begin transaction: {e}")))?;

        let result: Result<(), StoreError> = async {
            for table in schema::RESET_ORDER {
                let sql = format!("DELETE FROM dbo.{table}");
                execute(&mut client, &sql, &[]).await?;
            }
            insert_user_row(&mut client, admin).await
        }
        .await;

        match result {
            Ok(()) => {
                client
                    .simple_query("COMMIT")
                    .await
                    .map_err(|e| db_err(format!("Failed to commit transaction: {e}")))?;
                Ok(())
            }
            Err(e) => {
                rollback(&mut client).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, NewItem};
    use crate::store::planner;

    fn item(quantity: i32) -> Item {
        NewItem {
            name: "Trespa Meteon 8mm".to_string(),
            category: Category::Trespa,
            quantity,
            ..Default::default()
        }
        .into_item(Utc::now())
    }

    #[test]
    fn test_panicking_planner_becomes_store_error() {
        let current = item(5);
        let result = run_planner(planner(|_: &Item| panic!("bad arithmetic")), &current);
        assert!(matches!(result, Err(StoreError::Database(msg)) if msg.contains(&current.id)));
    }

    #[test]
    fn test_planner_rejection_passes_through() {
        let current = item(5);
        let result = run_planner(
            planner(|i: &Item| {
                Err(StockRejection::Insufficient {
                    requested: 9,
                    available: i.quantity,
                })
            }),
            &current,
        )
        .unwrap();
        assert_eq!(
            result,
            Err(StockRejection::Insufficient { requested: 9, available: 5 })
        );
    }

    #[test]
    fn test_stock_transaction_aborts_on_server_error() {
        assert!(BEGIN_STOCK_TRANSACTION.starts_with("SET XACT_ABORT ON;"));
    }
}
