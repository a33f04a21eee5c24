//! # The Pull Plan
//!
//! Static, dependency-ordered list of every replicated entity type. A
//! referenced table always appears before its referencing tables, so one
//! pass in plan order keeps foreign keys satisfiable without deferred
//! constraints. Runtime walks the same order every cycle.

/// How pulled rows land in the local table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// `INSERT .. ON CONFLICT(id) DO UPDATE` — the default.
    Upsert,
    /// DELETE the whole table, then INSERT. For tables whose cloud ids
    /// are recycled across syncs (the pizza price matrices).
    Replace,
}

/// One entry of the pull plan.
#[derive(Debug, Clone, Copy)]
pub struct EntityPlan {
    /// Sync-state key and cloud endpoint segment:
    /// `GET {base}/api/hub/sync/{entity_type}`.
    pub entity_type: &'static str,
    /// Local mirror table.
    pub table: &'static str,
    /// Store columns, primary key first. Also the retention filter for
    /// the field transform.
    pub columns: &'static [&'static str],
    pub mode: WriteMode,
    /// Per-entity field renames applied before the camelCase rule.
    pub renames: &'static [(&'static str, &'static str)],
    /// Whether the endpoint may send a `deletedIds` list.
    pub has_deleted_ids: bool,
}

/// The plan, leaves first. Order is load-bearing:
/// categories before products, products before variants and deal items,
/// pizza base config before the price matrices.
pub const PULL_PLAN: &[EntityPlan] = &[
    EntityPlan {
        entity_type: "categories",
        table: "categories",
        columns: &[
            "id", "tenant_id", "location_id", "name", "sort_order", "is_active",
            "created_at", "updated_at",
        ],
        mode: WriteMode::Upsert,
        renames: &[],
        has_deleted_ids: false,
    },
    EntityPlan {
        entity_type: "products",
        table: "products",
        columns: &[
            "id", "tenant_id", "location_id", "category_id", "name", "description",
            "sku", "barcode", "price", "cost", "tax_rate", "is_pizza", "is_active",
            "created_at", "updated_at",
        ],
        mode: WriteMode::Upsert,
        renames: &[],
        has_deleted_ids: false,
    },
    EntityPlan {
        entity_type: "product_variants",
        table: "product_variants",
        columns: &["id", "product_id", "name", "price_delta", "sort_order", "updated_at"],
        mode: WriteMode::Upsert,
        renames: &[],
        has_deleted_ids: false,
    },
    EntityPlan {
        entity_type: "taxes",
        table: "taxes",
        columns: &["id", "tenant_id", "name", "rate", "is_inclusive", "is_active", "updated_at"],
        mode: WriteMode::Upsert,
        renames: &[],
        has_deleted_ids: false,
    },
    EntityPlan {
        entity_type: "users",
        table: "users",
        columns: &[
            "id", "tenant_id", "name", "role", "pin_hash", "permissions",
            "max_discount", "is_active", "updated_at",
        ],
        mode: WriteMode::Upsert,
        renames: &[],
        has_deleted_ids: false,
    },
    EntityPlan {
        entity_type: "customers",
        table: "customers",
        columns: &[
            "id", "tenant_id", "location_id", "name", "phone", "email", "address",
            "notes", "updated_at",
        ],
        mode: WriteMode::Upsert,
        renames: &[],
        has_deleted_ids: true,
    },
    EntityPlan {
        entity_type: "deals",
        table: "deals",
        columns: &[
            "id", "tenant_id", "location_id", "name", "price", "starts_at", "ends_at",
            "is_active", "updated_at",
        ],
        mode: WriteMode::Upsert,
        renames: &[],
        has_deleted_ids: false,
    },
    EntityPlan {
        entity_type: "deal_items",
        table: "deal_items",
        columns: &["id", "deal_id", "product_id", "quantity", "updated_at"],
        mode: WriteMode::Upsert,
        renames: &[],
        has_deleted_ids: false,
    },
    EntityPlan {
        entity_type: "modifier_groups",
        table: "modifier_groups",
        columns: &["id", "tenant_id", "name", "min_select", "max_select", "updated_at"],
        mode: WriteMode::Upsert,
        renames: &[],
        has_deleted_ids: false,
    },
    EntityPlan {
        entity_type: "modifiers",
        table: "modifiers",
        columns: &["id", "group_id", "name", "price", "updated_at"],
        mode: WriteMode::Upsert,
        renames: &[("modifierGroupId", "group_id")],
        has_deleted_ids: false,
    },
    EntityPlan {
        entity_type: "floors",
        table: "floors",
        columns: &["id", "tenant_id", "location_id", "name", "sort_order", "updated_at"],
        mode: WriteMode::Upsert,
        renames: &[],
        has_deleted_ids: false,
    },
    EntityPlan {
        entity_type: "tables",
        table: "dining_tables",
        columns: &["id", "floor_id", "name", "seats", "pos_x", "pos_y", "status", "updated_at"],
        mode: WriteMode::Upsert,
        renames: &[],
        has_deleted_ids: true,
    },
    EntityPlan {
        entity_type: "pizza_sizes",
        table: "pizza_sizes",
        columns: &["id", "tenant_id", "name", "inches", "sort_order", "updated_at"],
        mode: WriteMode::Upsert,
        renames: &[],
        has_deleted_ids: false,
    },
    EntityPlan {
        entity_type: "pizza_crusts",
        table: "pizza_crusts",
        columns: &["id", "tenant_id", "name", "sort_order", "updated_at"],
        mode: WriteMode::Upsert,
        renames: &[],
        has_deleted_ids: false,
    },
    EntityPlan {
        entity_type: "pizza_toppings",
        table: "pizza_toppings",
        columns: &["id", "tenant_id", "name", "category", "sort_order", "updated_at"],
        mode: WriteMode::Upsert,
        renames: &[],
        has_deleted_ids: false,
    },
    // The price matrices arrive with recycled ids; full replace every pull.
    // The size field shows up as either `sizeId` or `pizzaSizeId` depending
    // on the cloud endpoint's vintage.
    EntityPlan {
        entity_type: "pizza_topping_prices",
        table: "pizza_topping_prices",
        columns: &["id", "topping_id", "size_id", "price"],
        mode: WriteMode::Replace,
        renames: &[
            ("pizzaSizeId", "size_id"),
            ("pizzaToppingId", "topping_id"),
        ],
        has_deleted_ids: false,
    },
    EntityPlan {
        entity_type: "pizza_crust_prices",
        table: "pizza_crust_prices",
        columns: &["id", "crust_id", "size_id", "price"],
        mode: WriteMode::Replace,
        renames: &[("pizzaSizeId", "size_id"), ("pizzaCrustId", "crust_id")],
        has_deleted_ids: false,
    },
    EntityPlan {
        entity_type: "pizza_cheese_prices",
        table: "pizza_cheese_prices",
        columns: &["id", "size_id", "price"],
        mode: WriteMode::Replace,
        renames: &[("pizzaSizeId", "size_id")],
        has_deleted_ids: false,
    },
];
