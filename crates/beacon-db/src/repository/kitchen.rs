//! Kitchen orders and their bump chain.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use beacon_core::{new_id, KitchenOrder, KitchenOrderItem, KitchenOrderStatus, SyncFlag};

use crate::error::DbResult;

const ORDER_COLUMNS: &str = "id, sale_id, table_id, order_type, status, notes, sync_status, \
     created_at, fired_at, completed_at";

/// Inbound item for a new kitchen order.
#[derive(Debug, Clone)]
pub struct NewKitchenItem {
    pub product_id: Option<String>,
    pub name: Option<String>,
    pub quantity: f64,
    pub station: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct KitchenRepository {
    pool: SqlitePool,
}

impl KitchenRepository {
    pub fn new(pool: SqlitePool) -> Self {
        KitchenRepository { pool }
    }

    pub async fn create(
        &self,
        conn: &mut SqliteConnection,
        sale_id: Option<&str>,
        table_id: Option<&str>,
        order_type: Option<&str>,
        notes: Option<&str>,
        items: &[NewKitchenItem],
    ) -> DbResult<KitchenOrder> {
        let now = Utc::now();
        let order = KitchenOrder {
            id: new_id(),
            sale_id: sale_id.map(str::to_string),
            table_id: table_id.map(str::to_string),
            order_type: order_type.map(str::to_string),
            status: KitchenOrderStatus::Pending,
            notes: notes.map(str::to_string),
            sync_status: SyncFlag::Pending,
            created_at: now,
            fired_at: None,
            completed_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO kitchen_orders (id, sale_id, table_id, order_type, status, notes,
                                        sync_status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&order.id)
        .bind(&order.sale_id)
        .bind(&order.table_id)
        .bind(&order.order_type)
        .bind(order.status)
        .bind(&order.notes)
        .bind(order.sync_status)
        .bind(order.created_at)
        .execute(&mut *conn)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO kitchen_order_items (id, kitchen_order_id, product_id, name,
                                                 quantity, station, notes, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(new_id())
            .bind(&order.id)
            .bind(&item.product_id)
            .bind(&item.name)
            .bind(item.quantity)
            .bind(&item.station)
            .bind(&item.notes)
            .bind(now)
            .execute(&mut *conn)
            .await?;
        }

        Ok(order)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<KitchenOrder>> {
        let order = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM kitchen_orders WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    pub async fn get_items(&self, order_id: &str) -> DbResult<Vec<KitchenOrderItem>> {
        let items = sqlx::query_as(
            "SELECT id, kitchen_order_id, product_id, name, quantity, station, notes, created_at \
             FROM kitchen_order_items WHERE kitchen_order_id = ?1 ORDER BY created_at",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    pub async fn list(&self, status: Option<KitchenOrderStatus>) -> DbResult<Vec<KitchenOrder>> {
        let orders = match status {
            Some(s) => {
                sqlx::query_as(&format!(
                    "SELECT {ORDER_COLUMNS} FROM kitchen_orders WHERE status = ?1 \
                     ORDER BY created_at"
                ))
                .bind(s)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {ORDER_COLUMNS} FROM kitchen_orders ORDER BY created_at"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(orders)
    }

    /// Writes a status transition on the caller's transaction.
    ///
    /// `fired_at` is stamped on the move to PREPARING and `completed_at`
    /// on the move to COMPLETED; timestamps already set are preserved.
    pub async fn set_status(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        status: KitchenOrderStatus,
    ) -> DbResult<()> {
        let now = Utc::now();
        let fired = matches!(status, KitchenOrderStatus::Preparing).then_some(now);
        let completed = matches!(status, KitchenOrderStatus::Completed).then_some(now);

        sqlx::query(
            "UPDATE kitchen_orders SET status = ?1, \
             fired_at = COALESCE(fired_at, ?2), \
             completed_at = COALESCE(completed_at, ?3), \
             sync_status = ?4 \
             WHERE id = ?5",
        )
        .bind(status)
        .bind(fired)
        .bind(completed)
        .bind(SyncFlag::Pending)
        .bind(id)
        .execute(conn)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn make_order(db: &Database) -> KitchenOrder {
        let mut tx = db.pool().begin().await.unwrap();
        let order = db
            .kitchen()
            .create(
                &mut tx,
                None,
                Some("tbl-4"),
                Some("DINE_IN"),
                None,
                &[NewKitchenItem {
                    product_id: Some("p1".into()),
                    name: Some("Margherita".into()),
                    quantity: 1.0,
                    station: Some("pizza".into()),
                    notes: None,
                }],
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();
        order
    }

    #[tokio::test]
    async fn test_create_starts_pending() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let order = make_order(&db).await;

        assert_eq!(order.status, KitchenOrderStatus::Pending);
        assert_eq!(db.kitchen().get_items(&order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bump_stamps_timestamps() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let kitchen = db.kitchen();
        let order = make_order(&db).await;

        let mut tx = db.pool().begin().await.unwrap();
        kitchen
            .set_status(&mut tx, &order.id, KitchenOrderStatus::Preparing)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let o = kitchen.get(&order.id).await.unwrap().unwrap();
        assert!(o.fired_at.is_some());
        assert!(o.completed_at.is_none());
        let fired = o.fired_at;

        for status in [KitchenOrderStatus::Ready, KitchenOrderStatus::Completed] {
            let mut tx = db.pool().begin().await.unwrap();
            kitchen.set_status(&mut tx, &order.id, status).await.unwrap();
            tx.commit().await.unwrap();
        }

        let o = kitchen.get(&order.id).await.unwrap().unwrap();
        assert_eq!(o.status, KitchenOrderStatus::Completed);
        assert!(o.completed_at.is_some());
        // fired_at set once, preserved across later transitions.
        assert_eq!(o.fired_at, fired);
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let kitchen = db.kitchen();
        let order = make_order(&db).await;
        make_order(&db).await;

        let mut tx = db.pool().begin().await.unwrap();
        kitchen
            .set_status(&mut tx, &order.id, KitchenOrderStatus::Preparing)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let pending = kitchen.list(Some(KitchenOrderStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(kitchen.list(None).await.unwrap().len(), 2);
    }
}
