//! Company full-text search.
//!
//! One parameterised query serves the whole search surface. Ranking: an
//! exact tax-id prefix match always wins with rank 1.0; otherwise the
//! Romanian-language FTS rank of the company name (diacritics folded via
//! `immutable_unaccent`), ties broken by name.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use super::{DbError, DbResult};

/// One row of the search result. Optional address fields come back as
/// empty strings rather than NULLs so the caller never branches.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Company {
    pub registration_code: String,
    pub name: String,
    pub tax_id: String,
    pub registration_date: String,
    pub euid: String,
    pub legal_form: String,
    pub country: String,
    pub county: String,
    pub locality: String,
    pub street_name: String,
    pub street_number: String,
    pub building: String,
    pub staircase: String,
    pub floor: String,
    pub apartment: String,
    pub postal_code: String,
    pub sector: String,
    pub address_details: String,
    pub website: String,
    pub parent_company_country: String,
    pub rank: f32,
}

const SEARCH_QUERY: &str = r#"
    SELECT
        registration_code,
        name,
        COALESCE(tax_id, '') AS tax_id,
        COALESCE(registration_date, '') AS registration_date,
        COALESCE(euid, '') AS euid,
        COALESCE(legal_form, '') AS legal_form,
        COALESCE(country, '') AS country,
        COALESCE(county, '') AS county,
        COALESCE(locality, '') AS locality,
        COALESCE(street_name, '') AS street_name,
        COALESCE(street_number, '') AS street_number,
        COALESCE(building, '') AS building,
        COALESCE(staircase, '') AS staircase,
        COALESCE(floor, '') AS floor,
        COALESCE(apartment, '') AS apartment,
        COALESCE(postal_code, '') AS postal_code,
        COALESCE(sector, '') AS sector,
        COALESCE(address_details, '') AS address_details,
        COALESCE(website, '') AS website,
        COALESCE(parent_company_country, '') AS parent_company_country,
        (CASE
            WHEN tax_id ILIKE $1 || '%' THEN 1.0
            ELSE ts_rank(name_tsvector, query)
        END)::real AS rank
    FROM companies
    LEFT JOIN LATERAL (
        SELECT to_tsquery('romanian', immutable_unaccent($2)) AS query
    ) q ON true
    WHERE
        tax_id ILIKE '%' || $1 || '%'
        OR name_tsvector @@ query
    ORDER BY rank DESC, name
    LIMIT $3
"#;

/// Search companies by name or tax id.
///
/// The term is split on whitespace and the words are OR-ed into one
/// tsquery, so any matching word ranks the row.
///
/// # Errors
///
/// [`DbError::EmptyQuery`] for an empty or whitespace-only term, before
/// any database round trip; [`DbError::Sqlx`] for query failures.
pub async fn search_companies(
    pool: &PgPool,
    term: &str,
    limit: i64,
) -> DbResult<Vec<Company>> {
    let words: Vec<&str> = term.split_whitespace().collect();
    if words.is_empty() {
        return Err(DbError::EmptyQuery);
    }
    let ts_query = words.join(" | ");

    let companies = sqlx::query_as::<_, Company>(SEARCH_QUERY)
        .bind(term)
        .bind(&ts_query)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(companies)
}
