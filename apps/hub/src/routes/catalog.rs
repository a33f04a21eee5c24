//! Read-only catalog routes over the reference mirrors.
//!
//! Single-statement selects; the hub never writes these tables outside
//! the pull engine.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::state::SharedState;

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProductRow {
    pub id: String,
    pub category_id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub price: Option<f64>,
    pub tax_rate: Option<f64>,
    pub is_pizza: Option<bool>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    category: Option<String>,
}

/// `GET /api/products?category=`
pub async fn list_products(
    State(state): State<SharedState>,
    Query(query): Query<ProductQuery>,
) -> ApiResult<Json<Value>> {
    const COLUMNS: &str = "id, category_id, name, description, sku, barcode, price, \
         tax_rate, is_pizza, is_active";

    let products: Vec<ProductRow> = match query.category {
        Some(category) => sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM products WHERE category_id = ?1 ORDER BY name"
        ))
        .bind(category)
        .fetch_all(state.db.pool())
        .await
        .map_err(beacon_db::DbError::from)?,
        None => sqlx::query_as(&format!("SELECT {COLUMNS} FROM products ORDER BY name"))
            .fetch_all(state.db.pool())
            .await
            .map_err(beacon_db::DbError::from)?,
    };

    Ok(Json(json!({ "products": products })))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRow {
    pub id: String,
    pub name: Option<String>,
    pub sort_order: Option<i64>,
    pub is_active: Option<bool>,
}

/// `GET /api/categories`
pub async fn list_categories(State(state): State<SharedState>) -> ApiResult<Json<Value>> {
    let categories: Vec<CategoryRow> = sqlx::query_as(
        "SELECT id, name, sort_order, is_active FROM categories ORDER BY sort_order, name",
    )
    .fetch_all(state.db.pool())
    .await
    .map_err(beacon_db::DbError::from)?;

    Ok(Json(json!({ "categories": categories })))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FloorRow {
    pub id: String,
    pub name: Option<String>,
    pub sort_order: Option<i64>,
}

/// `GET /api/floors`
pub async fn list_floors(State(state): State<SharedState>) -> ApiResult<Json<Value>> {
    let floors: Vec<FloorRow> =
        sqlx::query_as("SELECT id, name, sort_order FROM floors ORDER BY sort_order, name")
            .fetch_all(state.db.pool())
            .await
            .map_err(beacon_db::DbError::from)?;

    Ok(Json(json!({ "floors": floors })))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DiningTableRow {
    pub id: String,
    pub floor_id: Option<String>,
    pub name: Option<String>,
    pub seats: Option<i64>,
    pub pos_x: Option<f64>,
    pub pos_y: Option<f64>,
    pub status: Option<String>,
}

/// `GET /api/dining-tables`
pub async fn list_tables(State(state): State<SharedState>) -> ApiResult<Json<Value>> {
    let tables: Vec<DiningTableRow> = sqlx::query_as(
        "SELECT id, floor_id, name, seats, pos_x, pos_y, status FROM dining_tables ORDER BY name",
    )
    .fetch_all(state.db.pool())
    .await
    .map_err(beacon_db::DbError::from)?;

    Ok(Json(json!({ "tables": tables })))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRow {
    pub id: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// `GET /api/customers`
pub async fn list_customers(State(state): State<SharedState>) -> ApiResult<Json<Value>> {
    let customers: Vec<CustomerRow> =
        sqlx::query_as("SELECT id, name, phone, email FROM customers ORDER BY name")
            .fetch_all(state.db.pool())
            .await
            .map_err(beacon_db::DbError::from)?;

    Ok(Json(json!({ "customers": customers })))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DealRow {
    pub id: String,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub is_active: Option<bool>,
}

/// `GET /api/deals`
pub async fn list_deals(State(state): State<SharedState>) -> ApiResult<Json<Value>> {
    let deals: Vec<DealRow> =
        sqlx::query_as("SELECT id, name, price, is_active FROM deals ORDER BY name")
            .fetch_all(state.db.pool())
            .await
            .map_err(beacon_db::DbError::from)?;

    Ok(Json(json!({ "deals": deals })))
}
