use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::routes::AppState;

/// Pipe sizes in catalog order, paired with the column holding their price.
const SIZE_TIERS: [(&str, &str); 7] = [
    ("1/2\"", "size_half_price"),
    ("1\"", "size_one_price"),
    ("1 1/2\"", "size_one_half_price"),
    ("2\"", "size_two_price"),
    ("2 1/2\"", "size_two_half_price"),
    ("3\"", "size_three_price"),
    ("4\"", "size_four_price"),
];

#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: i64,
    pub item_name: String,
    /// Prices per size tier, in [`SIZE_TIERS`] order. 0 means the size isn't offered.
    #[serde(skip)]
    pub prices: [i64; 7],
    pub category: Option<String>,
    pub company: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct SizePrice {
    pub label: &'static str,
    pub price: i64,
}

#[derive(Debug, Serialize)]
pub struct ProductWithSizes {
    #[serde(flatten)]
    pub product: Product,
    pub sizes: Vec<SizePrice>,
}

#[derive(Debug, Deserialize)]
pub struct NewProduct {
    pub item_name: String,
    #[serde(default)]
    pub size_half_price: i64,
    #[serde(default)]
    pub size_one_price: i64,
    #[serde(default)]
    pub size_one_half_price: i64,
    #[serde(default)]
    pub size_two_price: i64,
    #[serde(default)]
    pub size_two_half_price: i64,
    #[serde(default)]
    pub size_three_price: i64,
    #[serde(default)]
    pub size_four_price: i64,
    pub category: Option<String>,
    pub company: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateProductsResponse {
    pub message: &'static str,
    pub inserted_rows: usize,
}

#[derive(Debug, Deserialize)]
pub struct FilterQuery {
    #[serde(alias = "filterType")]
    pub filter_type: Option<String>,
    #[serde(alias = "filterValue")]
    pub filter_value: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Catalog {
    pub products: Vec<ProductWithSizes>,
    pub categories: Vec<String>,
    pub companies: Vec<String>,
}

impl Product {
    /// Every size tier with its price, offered or not.
    pub fn all_sizes(&self) -> Vec<SizePrice> {
        SIZE_TIERS
            .iter()
            .zip(self.prices)
            .map(|(&(label, _), price)| SizePrice { label, price })
            .collect()
    }

    /// Only the size tiers that carry a price.
    pub fn offered_sizes(&self) -> Vec<SizePrice> {
        self.all_sizes().into_iter().filter(|s| s.price > 0).collect()
    }
}

fn product_select() -> String {
    let price_columns: Vec<&str> = SIZE_TIERS.iter().map(|(_, col)| *col).collect();
    format!(
        "SELECT id, item_name, {}, category, company, created_at FROM products",
        price_columns.join(", ")
    )
}

fn row_to_product(row: &rusqlite::Row) -> rusqlite::Result<Product> {
    let mut prices = [0i64; 7];
    for (i, price) in prices.iter_mut().enumerate() {
        *price = row.get(2 + i)?;
    }
    Ok(Product {
        id: row.get(0)?,
        item_name: row.get(1)?,
        prices,
        category: row.get(9)?,
        company: row.get(10)?,
        created_at: row.get(11)?,
    })
}

/// POST /api/v1/products — bulk insert, all or nothing.
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<Vec<NewProduct>>,
) -> AppResult<(StatusCode, Json<CreateProductsResponse>)> {
    if body.is_empty() {
        return Err(AppError::Validation("No products provided".into()));
    }
    if body.iter().any(|p| p.item_name.trim().is_empty()) {
        return Err(AppError::Validation("Every product needs an item_name".into()));
    }

    let now = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO products (item_name, size_half_price, size_one_price, size_one_half_price,
                                   size_two_price, size_two_half_price, size_three_price, size_four_price,
                                   category, company, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )?;
        for p in &body {
            stmt.execute(rusqlite::params![
                p.item_name.trim(),
                p.size_half_price,
                p.size_one_price,
                p.size_one_half_price,
                p.size_two_price,
                p.size_two_half_price,
                p.size_three_price,
                p.size_four_price,
                p.category,
                p.company,
                now,
            ])?;
        }
    }
    tx.commit()?;

    tracing::info!(count = body.len(), "products added");

    Ok((
        StatusCode::CREATED,
        Json(CreateProductsResponse {
            message: "Products added successfully",
            inserted_rows: body.len(),
        }),
    ))
}

/// GET /api/v1/products?filter_type=category&filter_value=Valves
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> AppResult<Json<Vec<ProductWithSizes>>> {
    let column = match query.filter_type.as_deref() {
        None | Some("all") => None,
        Some("category") => Some("category"),
        Some("company") => Some("company"),
        Some(_) => return Err(AppError::Validation("Invalid filter type".into())),
    };

    let conn = state.db.get()?;
    let products = match column {
        None => {
            let mut stmt = conn.prepare(&format!("{} ORDER BY item_name", product_select()))?;
            let rows = stmt.query_map([], row_to_product)?;
            rows.collect::<Result<Vec<_>, _>>()?
        }
        Some(column) => {
            let value = query
                .filter_value
                .ok_or_else(|| AppError::Validation("filter_value is required".into()))?;
            let mut stmt = conn.prepare(&format!(
                "{} WHERE {column} = ?1 ORDER BY item_name",
                product_select()
            ))?;
            let rows = stmt.query_map(rusqlite::params![value], row_to_product)?;
            rows.collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(Json(
        products
            .into_iter()
            .map(|product| ProductWithSizes {
                sizes: product.all_sizes(),
                product,
            })
            .collect(),
    ))
}

/// GET /api/v1/products/catalog
pub async fn catalog(State(state): State<AppState>) -> AppResult<Json<Catalog>> {
    let conn = state.db.get()?;

    let mut stmt = conn.prepare(&format!("{} ORDER BY item_name", product_select()))?;
    let products = stmt
        .query_map([], row_to_product)?
        .collect::<Result<Vec<_>, _>>()?;

    let categories = distinct_values(&conn, "category")?;
    let companies = distinct_values(&conn, "company")?;

    Ok(Json(Catalog {
        products: products
            .into_iter()
            .map(|product| ProductWithSizes {
                sizes: product.offered_sizes(),
                product,
            })
            .collect(),
        categories,
        companies,
    }))
}

fn distinct_values(conn: &rusqlite::Connection, column: &str) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT DISTINCT {column} FROM products WHERE {column} IS NOT NULL ORDER BY {column}"
    ))?;
    let values = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(values)
}
