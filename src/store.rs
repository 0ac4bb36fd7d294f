//! The on-disk vector index.
//!
//! Chunks and their embeddings live in a single SQLite file inside the
//! index directory, opened in WAL mode. Writes for one source file happen
//! in a transaction that deletes the source's old chunks and inserts the
//! new ones, so readers never observe a half-replaced document. Similarity
//! search scans stored embeddings and ranks by cosine similarity in Rust.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{Chunk, ScoredChunk};

const INDEX_FILE: &str = "index.sqlite";

pub struct IndexStore {
    pool: SqlitePool,
}

impl IndexStore {
    /// Open (creating if missing) the index at `<index_dir>/index.sqlite`.
    pub async fn open(index_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(index_dir)?;
        let db_path = index_dir.join(INDEX_FILE);

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                metadata_json TEXT NOT NULL DEFAULT '{}',
                embedding BLOB,
                created_at INTEGER NOT NULL,
                UNIQUE(source, chunk_index)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Replace all chunks for one source file in a single transaction.
    ///
    /// `embeddings` is parallel to `chunks`; `None` stores the chunk with a
    /// NULL embedding, which similarity search skips.
    pub async fn replace_source(
        &self,
        source: &str,
        chunks: &[Chunk],
        embeddings: &[Option<Vec<f32>>],
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE source = ?")
            .bind(source)
            .execute(&mut *tx)
            .await?;

        for (i, chunk) in chunks.iter().enumerate() {
            let blob = embeddings.get(i).and_then(|e| e.as_ref()).map(|v| vec_to_blob(v));
            sqlx::query(
                r#"
                INSERT INTO chunks (id, source, chunk_index, text, metadata_json, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.source)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.metadata_json)
            .bind(blob)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Remove every chunk for a source. Returns the number removed.
    pub async fn remove_source(&self, source: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE source = ?")
            .bind(source)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Rank stored chunks against a query vector by cosine similarity.
    ///
    /// Full scan over embedded chunks; ties break on (source, chunk_index)
    /// so results are deterministic.
    pub async fn search(&self, query_vec: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT id, source, chunk_index, text, metadata_json, embedding
            FROM chunks
            WHERE embedding IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                ScoredChunk {
                    id: row.get("id"),
                    source: row.get("source"),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    metadata_json: row.get("metadata_json"),
                    score: cosine_similarity(query_vec, &vec) as f64,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.source.cmp(&b.source))
                .then_with(|| a.chunk_index.cmp(&b.chunk_index))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    pub async fn chunk_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn source_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT source) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn chunk(source: &str, index: i64, text: &str) -> Chunk {
        Chunk {
            id: Uuid::new_v4().to_string(),
            source: source.to_string(),
            chunk_index: index,
            text: text.to_string(),
            metadata_json: "{}".to_string(),
        }
    }

    #[tokio::test]
    async fn replace_source_swaps_chunks_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::open(dir.path()).await.unwrap();

        let first = vec![chunk("a.pdf", 0, "old one"), chunk("a.pdf", 1, "old two")];
        store
            .replace_source("a.pdf", &first, &[None, None])
            .await
            .unwrap();
        assert_eq!(store.chunk_count().await.unwrap(), 2);

        let second = vec![chunk("a.pdf", 0, "new one")];
        store
            .replace_source("a.pdf", &second, &[None])
            .await
            .unwrap();
        assert_eq!(store.chunk_count().await.unwrap(), 1);
        assert_eq!(store.source_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn replace_source_leaves_other_sources_alone() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::open(dir.path()).await.unwrap();

        store
            .replace_source("a.pdf", &[chunk("a.pdf", 0, "alpha")], &[None])
            .await
            .unwrap();
        store
            .replace_source("b.pdf", &[chunk("b.pdf", 0, "beta")], &[None])
            .await
            .unwrap();
        store.replace_source("a.pdf", &[], &[]).await.unwrap();

        assert_eq!(store.chunk_count().await.unwrap(), 1);
        assert_eq!(store.source_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn search_ranks_by_cosine_and_skips_unembedded() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::open(dir.path()).await.unwrap();

        let chunks = vec![
            chunk("a.pdf", 0, "east"),
            chunk("a.pdf", 1, "north"),
            chunk("a.pdf", 2, "no vector"),
        ];
        let embeddings = vec![
            Some(vec![1.0, 0.0]),
            Some(vec![0.0, 1.0]),
            None,
        ];
        store
            .replace_source("a.pdf", &chunks, &embeddings)
            .await
            .unwrap();

        let results = store.search(&[0.9, 0.1], 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "east");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn search_empty_index_returns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::open(dir.path()).await.unwrap();
        let results = store.search(&[1.0, 0.0], 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn remove_source_reports_removed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::open(dir.path()).await.unwrap();
        store
            .replace_source("a.pdf", &[chunk("a.pdf", 0, "x"), chunk("a.pdf", 1, "y")], &[None, None])
            .await
            .unwrap();
        assert_eq!(store.remove_source("a.pdf").await.unwrap(), 2);
        assert_eq!(store.remove_source("a.pdf").await.unwrap(), 0);
    }
}
