//! Food and category models and response types.
//!
//! The reference data of the API: food items with calorie information,
//! grouped into categories.

use serde::Serialize;

/// A food row joined with its category name.
///
/// Most nutrition columns are optional; the source dataset is uneven.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct FoodWithCategory {
    /// Unique identifier
    pub id: i64,

    /// Food name (e.g., "Nasi lemak (biasa)")
    pub name: String,

    /// Serving description (e.g., "1 set")
    pub serving: Option<String>,

    /// Serving weight in grams
    pub weight_g: Option<f64>,

    /// Calories per serving in kcal
    pub calories_kcal: Option<f64>,

    /// Data source reference
    pub reference: Option<String>,

    /// Category name, if categorized
    pub category: Option<String>,
}

/// A food category.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// Response body for `GET /foods/search`.
#[derive(Debug, Serialize)]
pub struct FoodSearchResponse {
    /// Number of matches
    pub total: i64,

    pub foods: Vec<FoodWithCategory>,
}

/// Response body for the paginated `GET /foods`.
#[derive(Debug, Serialize)]
pub struct FoodListResponse {
    /// Total rows in the foods table, not just this page
    pub total: i64,

    pub page: i64,
    pub per_page: i64,
    pub foods: Vec<FoodWithCategory>,
}

/// Response body for the quick calorie lookup.
#[derive(Debug, Serialize)]
pub struct CaloriesResponse {
    /// Name of the first matching food
    pub food_name: String,

    pub calories_kcal: Option<f64>,
    pub serving: Option<String>,

    /// How many foods matched the search term in total
    pub total_matches: i64,
}
