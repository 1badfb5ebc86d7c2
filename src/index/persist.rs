//! On-disk layout of a knowledge base index directory:
//!
//! ```text
//! <dir>/manifest.json          points at the live generation
//! <dir>/gen-<generation>.sqlite3
//! ```
//!
//! A generation file is complete before the manifest is renamed over the
//! previous one, so readers only ever see whole generations.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};

use super::splitter::Chunk;
use super::store::IndexedChunk;
use super::IndexError;
use crate::corpus::Corpus;

pub const MANIFEST_FILE: &str = "manifest.json";
const GENERATION_PREFIX: &str = "gen-";
const GENERATION_SUFFIX: &str = ".sqlite3";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub corpus: Corpus,
    pub generation: String,
    pub embedding_model: String,
    pub dimension: usize,
    pub document_count: usize,
    pub chunk_count: usize,
    /// SHA-256 over the rendered documents the generation was built from.
    pub corpus_digest: String,
    pub built_at: DateTime<Utc>,
}

impl IndexManifest {
    pub fn new(
        corpus: Corpus,
        embedding_model: &str,
        dimension: usize,
        document_count: usize,
        chunk_count: usize,
        corpus_digest: &str,
    ) -> Self {
        let built_at = Utc::now();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let generation = format!("{}-{}", built_at.format("%Y%m%dT%H%M%S%3fZ"), &suffix[..8]);

        Self {
            corpus,
            generation,
            embedding_model: embedding_model.to_string(),
            dimension,
            document_count,
            chunk_count,
            corpus_digest: corpus_digest.to_string(),
            built_at,
        }
    }

    pub fn file_name(&self) -> String {
        generation_file_name(&self.generation)
    }
}

pub(crate) fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_FILE)
}

fn generation_file_name(generation: &str) -> String {
    format!("{}{}{}", GENERATION_PREFIX, generation, GENERATION_SUFFIX)
}

async fn open_pool(path: &Path, create: bool) -> Result<SqlitePool, IndexError> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(create)
        .read_only(!create)
        .journal_mode(SqliteJournalMode::Delete)
        .synchronous(SqliteSynchronous::Full);

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(IndexError::storage)
}

pub(crate) async fn write_generation(
    dir: &Path,
    manifest: &IndexManifest,
    entries: &[IndexedChunk],
) -> Result<(), IndexError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|err| IndexError::io(dir, err))?;

    let path = dir.join(manifest.file_name());
    let pool = open_pool(&path, true).await?;
    let result = write_rows(&pool, manifest, entries).await;
    pool.close().await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&path).await;
    }
    result
}

async fn write_rows(
    pool: &SqlitePool,
    manifest: &IndexManifest,
    entries: &[IndexedChunk],
) -> Result<(), IndexError> {
    sqlx::query(
        "CREATE TABLE chunks (
            position INTEGER PRIMARY KEY,
            corpus TEXT NOT NULL,
            document_index INTEGER NOT NULL,
            chunk_index INTEGER NOT NULL,
            content TEXT NOT NULL,
            embedding BLOB NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(IndexError::storage)?;

    sqlx::query(
        "CREATE TABLE index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(IndexError::storage)?;

    let mut tx = pool.begin().await.map_err(IndexError::storage)?;

    for (key, value) in [
        ("embedding_model", manifest.embedding_model.clone()),
        ("dimension", manifest.dimension.to_string()),
        ("corpus", manifest.corpus.as_str().to_string()),
    ] {
        sqlx::query("INSERT INTO index_meta (key, value) VALUES (?1, ?2)")
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(IndexError::storage)?;
    }

    for (position, entry) in entries.iter().enumerate() {
        sqlx::query(
            "INSERT INTO chunks (position, corpus, document_index, chunk_index, content, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(position as i64)
        .bind(entry.chunk.corpus.as_str())
        .bind(entry.chunk.document_index as i64)
        .bind(entry.chunk.chunk_index as i64)
        .bind(&entry.chunk.content)
        .bind(serialize_embedding(&entry.embedding))
        .execute(&mut *tx)
        .await
        .map_err(IndexError::storage)?;
    }

    tx.commit().await.map_err(IndexError::storage)?;
    Ok(())
}

pub(crate) async fn read_generation(
    dir: &Path,
    manifest: &IndexManifest,
) -> Result<Vec<IndexedChunk>, IndexError> {
    let path = dir.join(manifest.file_name());
    if !path.is_file() {
        return Err(IndexError::Corrupt(format!(
            "manifest references missing generation {}",
            path.display()
        )));
    }

    let pool = open_pool(&path, false).await?;
    let result = read_rows(&pool, manifest).await;
    pool.close().await;
    result
}

async fn read_rows(
    pool: &SqlitePool,
    manifest: &IndexManifest,
) -> Result<Vec<IndexedChunk>, IndexError> {
    let model: Option<String> =
        sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'embedding_model'")
            .fetch_optional(pool)
            .await
            .map_err(IndexError::storage)?;
    if model.as_deref() != Some(manifest.embedding_model.as_str()) {
        return Err(IndexError::Corrupt(format!(
            "generation {} was built with {:?}, manifest says {}",
            manifest.generation, model, manifest.embedding_model
        )));
    }

    let rows = sqlx::query(
        "SELECT corpus, document_index, chunk_index, content, embedding
         FROM chunks
         ORDER BY position",
    )
    .fetch_all(pool)
    .await
    .map_err(IndexError::storage)?;

    if rows.len() != manifest.chunk_count {
        return Err(IndexError::Corrupt(format!(
            "generation {} holds {} chunks, manifest expects {}",
            manifest.generation,
            rows.len(),
            manifest.chunk_count
        )));
    }

    rows.iter()
        .map(|row| {
            let corpus_name: String = row.get("corpus");
            let corpus = Corpus::parse(&corpus_name)
                .ok_or_else(|| IndexError::Corrupt(format!("unknown corpus '{}'", corpus_name)))?;
            let bytes: Vec<u8> = row.get("embedding");
            let embedding = deserialize_embedding(&bytes)?;
            if embedding.len() != manifest.dimension {
                return Err(IndexError::Corrupt(format!(
                    "embedding of dimension {} in an index of dimension {}",
                    embedding.len(),
                    manifest.dimension
                )));
            }

            Ok(IndexedChunk {
                chunk: Chunk {
                    corpus,
                    document_index: row.get::<i64, _>("document_index") as usize,
                    chunk_index: row.get::<i64, _>("chunk_index") as usize,
                    content: row.get("content"),
                },
                embedding,
            })
        })
        .collect()
}

pub(crate) async fn write_manifest(dir: &Path, manifest: &IndexManifest) -> Result<(), IndexError> {
    let path = manifest_path(dir);
    let tmp = dir.join(format!("{}.tmp", MANIFEST_FILE));
    let json = serde_json::to_vec_pretty(manifest).map_err(|err| IndexError::io(&tmp, err))?;

    tokio::fs::write(&tmp, json)
        .await
        .map_err(|err| IndexError::io(&tmp, err))?;
    tokio::fs::rename(&tmp, &path)
        .await
        .map_err(|err| IndexError::io(&path, err))?;
    Ok(())
}

pub(crate) async fn read_manifest(dir: &Path) -> Result<IndexManifest, IndexError> {
    let path = manifest_path(dir);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(IndexError::Missing(dir.to_path_buf()))
        }
        Err(err) => return Err(IndexError::io(&path, err)),
    };

    serde_json::from_slice(&bytes)
        .map_err(|err| IndexError::Corrupt(format!("{}: {}", path.display(), err)))
}

/// Removes generation files under `dir` whose generation is not in `keep`.
/// Best-effort: failures are logged and skipped.
pub(crate) async fn prune_generations(dir: &Path, keep: &[&str]) -> usize {
    let keep_files: Vec<String> = keep.iter().map(|g| generation_file_name(g)).collect();
    let mut removed = 0;

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!("Failed to list index directory {}: {}", dir.display(), err);
            return 0;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        let is_generation =
            name.starts_with(GENERATION_PREFIX) && name.ends_with(GENERATION_SUFFIX);
        if !is_generation || keep_files.contains(&name) {
            continue;
        }

        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => removed += 1,
            Err(err) => tracing::warn!("Failed to prune {}: {}", entry.path().display(), err),
        }
    }

    removed
}

fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn deserialize_embedding(bytes: &[u8]) -> Result<Vec<f32>, IndexError> {
    if bytes.len() % 4 != 0 {
        return Err(IndexError::Corrupt(format!(
            "embedding blob of {} bytes",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
