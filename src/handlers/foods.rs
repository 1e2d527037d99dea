//! Food and category lookup handlers.
//!
//! The data-access surface of the API:
//! - GET /foods/search?name= - search foods by name
//! - GET /foods/search/:food_name/calories - quick calorie lookup
//! - GET /foods/:id - one food by ID
//! - GET /foods - paginated listing
//! - GET /categories - all categories
//!
//! All of these sit behind the authentication and rate-limiting pipeline.

use crate::{
    error::AppError,
    models::food::{
        CaloriesResponse, Category, FoodListResponse, FoodSearchResponse, FoodWithCategory,
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

/// Columns returned for every food lookup, joined with the category name.
const FOOD_SELECT: &str = r#"
    SELECT f.id, f.name, f.serving, f.weight_g, f.calories_kcal, f.reference, c.name AS category
    FROM foods f
    LEFT JOIN categories c ON f.category_id = c.id
"#;

/// Query parameters for `GET /foods/search`.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    /// Food name to search for (substring match, case-insensitive)
    pub name: String,
}

/// Query parameters for the paginated `GET /foods`.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Page number, starting from 1
    #[serde(default = "default_page")]
    pub page: i64,

    /// Items per page, 1 to 100
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    20
}

/// Validate a search term: at least 2 characters after trimming.
///
/// Counts characters, not bytes, so a single multi-byte character like
/// `"é"` is still too short and a two-character CJK term is accepted.
fn validate_search_term(name: &str) -> Result<&str, AppError> {
    let term = name.trim();
    if term.chars().count() < 2 {
        return Err(AppError::InvalidRequest(
            "Search term must be at least 2 characters long".to_string(),
        ));
    }
    Ok(term)
}

/// Row offset for a 1-based page. Rejects pages far beyond any real
/// dataset instead of overflowing the multiplication.
fn page_offset(page: i64, per_page: i64) -> Result<i64, AppError> {
    (page - 1)
        .checked_mul(per_page)
        .ok_or_else(|| AppError::InvalidRequest("page is out of range".to_string()))
}

/// Search for foods by name.
///
/// # Endpoint
///
/// `GET /foods/search?name=nasi%20lemak`
///
/// # Response
///
/// - **Success (200 OK)**: matches with their calorie data (may be empty)
/// - **Error (400)**: search term shorter than 2 characters
pub async fn search_foods(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<FoodSearchResponse>, AppError> {
    let term = validate_search_term(&params.name)?;

    let foods = sqlx::query_as::<_, FoodWithCategory>(&format!(
        "{FOOD_SELECT} WHERE f.name ILIKE $1 ORDER BY f.name"
    ))
    .bind(format!("%{term}%"))
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(FoodSearchResponse {
        total: foods.len() as i64,
        foods,
    }))
}

/// Quick calorie lookup: just the calories of the first match.
///
/// # Endpoint
///
/// `GET /foods/search/{food_name}/calories`
///
/// # Response
///
/// - **Success (200 OK)**: name, calories and serving of the best match
/// - **Error (404)**: nothing matched the term
pub async fn get_food_calories(
    State(state): State<AppState>,
    Path(food_name): Path<String>,
) -> Result<Json<CaloriesResponse>, AppError> {
    let foods = sqlx::query_as::<_, FoodWithCategory>(&format!(
        "{FOOD_SELECT} WHERE f.name ILIKE $1 ORDER BY f.name"
    ))
    .bind(format!("%{}%", food_name.trim()))
    .fetch_all(&state.pool)
    .await?;

    let total_matches = foods.len() as i64;
    let first = foods.into_iter().next().ok_or(AppError::FoodNotFound)?;

    Ok(Json(CaloriesResponse {
        food_name: first.name,
        calories_kcal: first.calories_kcal,
        serving: first.serving,
        total_matches,
    }))
}

/// Get detailed information about one food by its ID.
///
/// # Endpoint
///
/// `GET /foods/{id}`
///
/// # Response
///
/// - **Success (200 OK)**: the food with its category
/// - **Error (404)**: no food with that ID
pub async fn get_food(
    State(state): State<AppState>,
    Path(food_id): Path<i64>,
) -> Result<Json<FoodWithCategory>, AppError> {
    let food = sqlx::query_as::<_, FoodWithCategory>(&format!("{FOOD_SELECT} WHERE f.id = $1"))
        .bind(food_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(AppError::FoodNotFound)?;

    Ok(Json(food))
}

/// Paginated list of all foods.
///
/// # Endpoint
///
/// `GET /foods?page=1&per_page=20`
///
/// # Response
///
/// - **Success (200 OK)**: one page plus the total row count
/// - **Error (400)**: page < 1 or per_page outside 1..=100
pub async fn list_foods(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<FoodListResponse>, AppError> {
    if params.page < 1 {
        return Err(AppError::InvalidRequest(
            "page must be at least 1".to_string(),
        ));
    }
    if !(1..=100).contains(&params.per_page) {
        return Err(AppError::InvalidRequest(
            "per_page must be between 1 and 100".to_string(),
        ));
    }

    let offset = page_offset(params.page, params.per_page)?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM foods")
        .fetch_one(&state.pool)
        .await?;

    let foods = sqlx::query_as::<_, FoodWithCategory>(&format!(
        "{FOOD_SELECT} ORDER BY f.id LIMIT $1 OFFSET $2"
    ))
    .bind(params.per_page)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(FoodListResponse {
        total,
        page: params.page,
        per_page: params.per_page,
        foods,
    }))
}

/// List all food categories.
///
/// # Endpoint
///
/// `GET /categories`
pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<Category>>, AppError> {
    let categories =
        sqlx::query_as::<_, Category>("SELECT id, name FROM categories ORDER BY name")
            .fetch_all(&state.pool)
            .await?;

    Ok(Json(categories))
}
