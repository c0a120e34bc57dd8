//! Media item persistence
//!
//! One row per root item. The whole tree is stored as JSON in `data`; kind,
//! state, title and request columns are denormalized copies for filtering.

use chrono::{DateTime, Utc};
use mediaferry_common::media::{ItemKind, MediaItem, State};
use mediaferry_common::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Order of listed items by request time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Desc,
    Asc,
}

impl SortOrder {
    fn sql(&self) -> &'static str {
        match self {
            SortOrder::Desc => "DESC",
            SortOrder::Asc => "ASC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "desc" => Ok(SortOrder::Desc),
            "asc" => Ok(SortOrder::Asc),
            _ => Err(format!("Invalid sort: {}. Valid sort values are: asc, desc", s)),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql().to_ascii_lowercase())
    }
}

/// Filters for [`MediaStore::list`]
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFilter {
    pub kind: Option<ItemKind>,
    pub state: Option<State>,
    /// Case-insensitive title substring
    pub search: Option<String>,
    pub sort: SortOrder,
    /// 1-based
    pub page: u32,
    pub limit: u32,
}

impl Default for ItemFilter {
    fn default() -> Self {
        Self {
            kind: None,
            state: None,
            search: None,
            sort: SortOrder::Desc,
            page: 1,
            limit: 50,
        }
    }
}

/// Root item counts for `GET /stats`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub total_items: u64,
    pub incomplete_items: u64,
    pub by_kind: BTreeMap<String, u64>,
    pub by_state: BTreeMap<String, u64>,
}

/// SQLite-backed store of root items
#[derive(Clone)]
pub struct MediaStore {
    pool: SqlitePool,
}

fn timestamp(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|t| t.to_rfc3339())
}

fn decode(row: &sqlx::sqlite::SqliteRow) -> Result<MediaItem> {
    let data: String = row.try_get("data")?;
    Ok(serde_json::from_str(&data)?)
}

impl MediaStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace a root item; returns the previously stored state
    pub async fn upsert(&self, item: &MediaItem) -> Result<Option<State>> {
        let previous: Option<String> =
            sqlx::query_scalar("SELECT state FROM media_items WHERE item_id = ?")
                .bind(&item.item_id)
                .fetch_optional(&self.pool)
                .await?;

        sqlx::query(
            r#"
            INSERT INTO media_items
                (item_id, kind, imdb_id, title, state, requested_at, requested_by, indexed_at, data, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(item_id) DO UPDATE SET
                kind = excluded.kind,
                imdb_id = excluded.imdb_id,
                title = excluded.title,
                state = excluded.state,
                requested_at = excluded.requested_at,
                requested_by = excluded.requested_by,
                indexed_at = excluded.indexed_at,
                data = excluded.data,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&item.item_id)
        .bind(item.kind.as_str())
        .bind(&item.imdb_id)
        .bind(&item.title)
        .bind(item.state().as_str())
        .bind(timestamp(item.requested_at))
        .bind(&item.requested_by)
        .bind(timestamp(item.indexed_at))
        .bind(serde_json::to_string(item)?)
        .execute(&self.pool)
        .await?;

        Ok(previous.and_then(|s| s.parse().ok()))
    }

    pub async fn get(&self, item_id: &str) -> Result<Option<MediaItem>> {
        let row = sqlx::query("SELECT data FROM media_items WHERE item_id = ?")
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode).transpose()
    }

    pub async fn get_by_imdb(&self, imdb_id: &str) -> Result<Option<MediaItem>> {
        let row = sqlx::query("SELECT data FROM media_items WHERE imdb_id = ? LIMIT 1")
            .bind(imdb_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode).transpose()
    }

    /// Returns whether a row was removed
    pub async fn delete(&self, item_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM media_items WHERE item_id = ?")
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// One page of items plus the total matching the filter
    pub async fn list(&self, filter: &ItemFilter) -> Result<(Vec<MediaItem>, u64)> {
        let kind = filter.kind.map(|k| k.as_str());
        let state = filter.state.map(|s| s.as_str());
        let search = filter
            .search
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.to_lowercase()));

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM media_items
            WHERE (?1 IS NULL OR kind = ?1)
              AND (?2 IS NULL OR state = ?2)
              AND (?3 IS NULL OR LOWER(title) LIKE ?3)
            "#,
        )
        .bind(kind)
        .bind(state)
        .bind(&search)
        .fetch_one(&self.pool)
        .await?;

        let limit = filter.limit.max(1) as i64;
        let offset = (filter.page.max(1) as i64 - 1) * limit;
        let sql = format!(
            r#"
            SELECT data FROM media_items
            WHERE (?1 IS NULL OR kind = ?1)
              AND (?2 IS NULL OR state = ?2)
              AND (?3 IS NULL OR LOWER(title) LIKE ?3)
            ORDER BY requested_at {}, item_id
            LIMIT ?4 OFFSET ?5
            "#,
            filter.sort.sql()
        );
        let rows = sqlx::query(&sql)
            .bind(kind)
            .bind(state)
            .bind(&search)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let items = rows.iter().map(decode).collect::<Result<Vec<_>>>()?;
        Ok((items, total as u64))
    }

    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM media_items")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Every root item that is not Completed
    pub async fn incomplete(&self) -> Result<Vec<MediaItem>> {
        let rows = sqlx::query(
            "SELECT data FROM media_items WHERE state != ? ORDER BY requested_at, item_id",
        )
        .bind(State::Completed.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decode).collect()
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();
        for (column, counts) in [("kind", &mut stats.by_kind), ("state", &mut stats.by_state)] {
            let rows = sqlx::query(&format!(
                "SELECT {column} AS name, COUNT(*) AS count FROM media_items GROUP BY {column}"
            ))
            .fetch_all(&self.pool)
            .await?;
            for row in rows {
                let name: String = row.try_get("name")?;
                let count: i64 = row.try_get("count")?;
                counts.insert(name, count as u64);
            }
        }
        stats.total_items = stats.by_kind.values().sum();
        stats.incomplete_items = stats.total_items
            - stats.by_state.get(State::Completed.as_str()).copied().unwrap_or(0);
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use mediaferry_common::db::create_tables;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> MediaStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_tables(&pool).await.unwrap();
        MediaStore::new(pool)
    }

    fn movie(imdb_id: &str, title: &str, days_ago: i64) -> MediaItem {
        let mut movie = MediaItem::movie(imdb_id);
        movie.title = Some(title.to_string());
        movie.requested_at = Some(Utc::now() - Duration::days(days_ago));
        movie
    }

    #[tokio::test]
    async fn test_upsert_round_trip_and_previous_state() {
        let store = store().await;
        let mut show = MediaItem::show("tt0944947");
        show.title = Some("Game of Thrones".to_string());
        let mut season = MediaItem::season(1);
        season.add_child(MediaItem::episode(1));
        show.add_child(season);

        assert_eq!(store.upsert(&show).await.unwrap(), None);
        let loaded = store.get("tt0944947").await.unwrap().unwrap();
        assert_eq!(loaded, show);
        assert_eq!(loaded.children[0].children[0].item_id, "tt0944947/1/1");

        show.node_mut(mediaferry_common::ItemPath::episode(1, 1)).unwrap().update_folder =
            Some("updated".to_string());
        let previous = store.upsert(&show).await.unwrap();
        assert_eq!(previous, Some(State::Indexed));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_filters_and_pages() {
        let store = store().await;
        for (i, (id, title)) in [("tt1", "Alpha"), ("tt2", "Beta"), ("tt3", "Alphabet")].iter().enumerate() {
            store.upsert(&movie(id, title, i as i64)).await.unwrap();
        }
        store.upsert(&MediaItem::requested("tt4", "manual")).await.unwrap();

        let (items, total) = store.list(&ItemFilter::default()).await.unwrap();
        assert_eq!(total, 4);
        assert_eq!(items[0].item_id, "tt4");

        let filter = ItemFilter {
            search: Some("alpha".to_string()),
            sort: SortOrder::Asc,
            ..Default::default()
        };
        let (items, total) = store.list(&filter).await.unwrap();
        assert_eq!(total, 2);
        let ids: Vec<_> = items.iter().map(|i| i.item_id.as_str()).collect();
        assert_eq!(ids, vec!["tt3", "tt1"]);

        let filter = ItemFilter {
            kind: Some(ItemKind::Movie),
            page: 2,
            limit: 2,
            ..Default::default()
        };
        let (items, total) = store.list(&filter).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(items.len(), 1);

        let filter = ItemFilter {
            state: Some(State::Requested),
            ..Default::default()
        };
        assert_eq!(store.list(&filter).await.unwrap().1, 1);
    }

    #[tokio::test]
    async fn test_lookup_delete_and_incomplete() {
        let store = store().await;
        let mut done = movie("tt0133093", "The Matrix", 3);
        done.update_folder = Some("updated".to_string());
        store.upsert(&done).await.unwrap();
        store.upsert(&movie("tt0234215", "The Matrix Reloaded", 1)).await.unwrap();

        assert!(store.get_by_imdb("tt0133093").await.unwrap().is_some());
        assert!(store.get_by_imdb("tt9999999").await.unwrap().is_none());

        let incomplete = store.incomplete().await.unwrap();
        assert_eq!(incomplete.len(), 1);
        assert_eq!(incomplete[0].item_id, "tt0234215");

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_items, 2);
        assert_eq!(stats.incomplete_items, 1);
        assert_eq!(stats.by_kind.get("movie"), Some(&2));
        assert_eq!(stats.by_state.get("Completed"), Some(&1));

        assert!(store.delete("tt0133093").await.unwrap());
        assert!(!store.delete("tt0133093").await.unwrap());
        assert!(store.get("tt0133093").await.unwrap().is_none());
        assert!(store.get("tt0234215").await.unwrap().is_some());
    }

    #[test]
    fn test_sort_parse() {
        assert_eq!("ASC".parse::<SortOrder>().unwrap(), SortOrder::Asc);
        assert!("sideways".parse::<SortOrder>().is_err());
    }
}
