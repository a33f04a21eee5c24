//! # Sale Repository
//!
//! Sales, their line items and payments. A sale arrives from the terminal
//! complete (items + payments in one request body) and is inserted
//! atomically with its outbox row by the HTTP handler's transaction.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use beacon_core::{new_id, Payment, Sale, SaleItem, SaleStatus, SyncFlag};

use crate::error::{DbError, DbResult};

const SALE_COLUMNS: &str = "id, receipt_number, status, subtotal, tax_total, discount_total, \
     total, order_type, customer_id, table_id, user_id, terminal_id, notes, sync_status, \
     created_at, updated_at, voided_at, void_reason";

/// Inbound line item for a new sale.
#[derive(Debug, Clone)]
pub struct NewSaleItem {
    pub product_id: Option<String>,
    pub name: Option<String>,
    pub quantity: f64,
    pub unit_price: f64,
    pub line_total: f64,
    pub modifiers: Option<String>,
}

/// Inbound payment for a new sale.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub method: String,
    pub amount: f64,
    pub tendered: Option<f64>,
    pub change_due: Option<f64>,
    pub reference: Option<String>,
}

/// Inbound sale, validated by the route before it gets here.
#[derive(Debug, Clone, Default)]
pub struct NewSale {
    pub subtotal: f64,
    pub tax_total: f64,
    pub discount_total: f64,
    pub total: f64,
    pub order_type: Option<String>,
    pub customer_id: Option<String>,
    pub table_id: Option<String>,
    pub user_id: Option<String>,
    pub terminal_id: Option<String>,
    pub notes: Option<String>,
    pub items: Vec<NewSaleItem>,
    pub payments: Vec<NewPayment>,
}

#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Inserts a completed sale with its items and payments on the
    /// caller's transaction.
    pub async fn create(
        &self,
        conn: &mut SqliteConnection,
        new: &NewSale,
        receipt_number: &str,
    ) -> DbResult<Sale> {
        let now = Utc::now();
        let sale = Sale {
            id: new_id(),
            receipt_number: receipt_number.to_string(),
            status: SaleStatus::Completed,
            subtotal: new.subtotal,
            tax_total: new.tax_total,
            discount_total: new.discount_total,
            total: new.total,
            order_type: new.order_type.clone(),
            customer_id: new.customer_id.clone(),
            table_id: new.table_id.clone(),
            user_id: new.user_id.clone(),
            terminal_id: new.terminal_id.clone(),
            notes: new.notes.clone(),
            sync_status: SyncFlag::Pending,
            created_at: now,
            updated_at: now,
            voided_at: None,
            void_reason: None,
        };

        debug!(id = %sale.id, receipt = %sale.receipt_number, "Inserting sale");

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, receipt_number, status, subtotal, tax_total, discount_total, total,
                order_type, customer_id, table_id, user_id, terminal_id, notes,
                sync_status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.receipt_number)
        .bind(sale.status)
        .bind(sale.subtotal)
        .bind(sale.tax_total)
        .bind(sale.discount_total)
        .bind(sale.total)
        .bind(&sale.order_type)
        .bind(&sale.customer_id)
        .bind(&sale.table_id)
        .bind(&sale.user_id)
        .bind(&sale.terminal_id)
        .bind(&sale.notes)
        .bind(sale.sync_status)
        .bind(sale.created_at)
        .bind(sale.updated_at)
        .execute(&mut *conn)
        .await?;

        for item in &new.items {
            sqlx::query(
                r#"
                INSERT INTO sale_items (id, sale_id, product_id, name, quantity,
                                        unit_price, line_total, modifiers, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(new_id())
            .bind(&sale.id)
            .bind(&item.product_id)
            .bind(&item.name)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.line_total)
            .bind(&item.modifiers)
            .bind(now)
            .execute(&mut *conn)
            .await?;
        }

        for payment in &new.payments {
            sqlx::query(
                r#"
                INSERT INTO payments (id, sale_id, method, amount, tendered,
                                      change_due, reference, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(new_id())
            .bind(&sale.id)
            .bind(&payment.method)
            .bind(payment.amount)
            .bind(payment.tendered)
            .bind(payment.change_due)
            .bind(&payment.reference)
            .bind(now)
            .execute(&mut *conn)
            .await?;
        }

        Ok(sale)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as(&format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(sale)
    }

    pub async fn get_items(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let items = sqlx::query_as(
            "SELECT id, sale_id, product_id, name, quantity, unit_price, line_total, \
             modifiers, created_at FROM sale_items WHERE sale_id = ?1 ORDER BY created_at",
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    pub async fn get_payments(&self, sale_id: &str) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as(
            "SELECT id, sale_id, method, amount, tendered, change_due, reference, created_at \
             FROM payments WHERE sale_id = ?1 ORDER BY created_at",
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }

    /// Flips a COMPLETED sale to VOIDED on the caller's transaction.
    /// The route has already rejected double-voids; this enforces it again
    /// at the store level.
    pub async fn mark_voided(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        reason: Option<&str>,
    ) -> DbResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE sales SET status = ?1, voided_at = ?2, void_reason = ?3, \
             updated_at = ?2, sync_status = ?4 WHERE id = ?5 AND status = ?6",
        )
        .bind(SaleStatus::Voided)
        .bind(now)
        .bind(reason)
        .bind(SyncFlag::Pending)
        .bind(id)
        .bind(SaleStatus::Completed)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale (completed)", id));
        }
        Ok(())
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn new_sale() -> NewSale {
        NewSale {
            subtotal: 10.0,
            total: 10.0,
            items: vec![NewSaleItem {
                product_id: Some("p1".into()),
                name: Some("Margherita".into()),
                quantity: 1.0,
                unit_price: 10.0,
                line_total: 10.0,
                modifiers: None,
            }],
            payments: vec![NewPayment {
                method: "CASH".into(),
                amount: 10.0,
                tendered: Some(10.0),
                change_due: Some(0.0),
                reference: None,
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_writes_children() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sales = db.sales();

        let mut tx = db.pool().begin().await.unwrap();
        let sale = sales.create(&mut tx, &new_sale(), "20260802-0001").await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(sale.status, SaleStatus::Completed);
        assert_eq!(sales.get_items(&sale.id).await.unwrap().len(), 1);
        assert_eq!(sales.get_payments(&sale.id).await.unwrap().len(), 1);
        let loaded = sales.get(&sale.id).await.unwrap().unwrap();
        assert_eq!(loaded.sync_status, SyncFlag::Pending);
    }

    #[tokio::test]
    async fn test_void_only_once() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sales = db.sales();

        let mut tx = db.pool().begin().await.unwrap();
        let sale = sales.create(&mut tx, &new_sale(), "20260802-0001").await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = db.pool().begin().await.unwrap();
        sales.mark_voided(&mut tx, &sale.id, Some("test")).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = db.pool().begin().await.unwrap();
        let err = sales.mark_voided(&mut tx, &sale.id, None).await;
        assert!(err.is_err());
    }
}
