use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info, warn};
use uuid::Uuid;

use donna_core::config::MemoryConfig;

use crate::db::{blob_to_embedding, embedding_to_blob, init_db};
use crate::embeddings::{cosine_similarity, Embedder};
use crate::error::Result;
use crate::types::{MemoryHit, MemoryRecord, MemoryType};

/// Recency boost window and ceiling: a memory touched within the last week
/// gets up to this many extra points, fading linearly.
const RECENCY_WINDOW_DAYS: f64 = 7.0;
const RECENCY_BOOST_MAX: f64 = 10.0;

/// Tier caps for context assembly.
const TIER_CRITICAL_MAX: usize = 3;
const TIER_CONTEXTUAL_MAX: usize = 3;
const TIER_BACKGROUND_MAX: usize = 5;
const CRITICAL_IMPORTANCE: f64 = 80.0;
const BACKGROUND_EFFECTIVE_MIN: f64 = 50.0;

/// Per-senior semantic store with decay and near-duplicate suppression.
pub struct MemoryStore {
    db: Mutex<Connection>,
    embedder: Arc<dyn Embedder>,
    config: MemoryConfig,
}

impl MemoryStore {
    pub fn new(conn: Connection, embedder: Arc<dyn Embedder>, config: MemoryConfig) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            embedder,
            config,
        })
    }

    /// Importance as seen by readers: base decayed by half-life, plus a
    /// bounded boost for recently touched memories. Never written back.
    pub fn effective_importance(&self, record: &MemoryRecord, now: DateTime<Utc>) -> f64 {
        let age_days = (now - record.created_at).num_seconds() as f64 / 86_400.0;
        let decayed =
            record.importance * 0.5f64.powf(age_days.max(0.0) / self.config.decay_half_life_days);

        let since_access = (now - record.last_accessed_at).num_seconds() as f64 / 86_400.0;
        let boost = if (0.0..RECENCY_WINDOW_DAYS).contains(&since_access) {
            RECENCY_BOOST_MAX * (1.0 - since_access / RECENCY_WINDOW_DAYS)
        } else {
            0.0
        };
        decayed + boost
    }

    /// Store a memory, deduplicating against everything the senior already
    /// has. Returns the id of the surviving record, or `None` when the
    /// embedding service was unavailable and the write was skipped.
    pub async fn remember(
        &self,
        senior_id: &str,
        memory_type: MemoryType,
        content: &str,
        importance: f64,
        source_call_id: Option<&str>,
    ) -> Result<Option<String>> {
        let embedding = match self.embedder.embed(content).await {
            Ok(e) => e,
            Err(e) => {
                // degrade: a missed memory write never fails the caller
                warn!(error = %e, "embedding unavailable, skipping memory write");
                return Ok(None);
            }
        };

        let importance = importance.clamp(0.0, 100.0);
        let existing = self.load_all(senior_id)?;
        let nearest = existing
            .iter()
            .map(|r| (cosine_similarity(&embedding, &r.embedding), r))
            .max_by(|a, b| a.0.total_cmp(&b.0));

        if let Some((similarity, twin)) = nearest {
            if similarity >= self.config.dedup_similarity {
                // the higher-importance record wins and absorbs the write
                if importance > twin.importance {
                    debug!(id = %twin.id, similarity, "duplicate memory, raising importance");
                    let db = self.db.lock().unwrap();
                    db.execute(
                        "UPDATE memories SET importance = ?1, last_accessed_at = ?2 WHERE id = ?3",
                        rusqlite::params![importance, Utc::now().to_rfc3339(), twin.id],
                    )?;
                } else {
                    debug!(id = %twin.id, similarity, "duplicate memory, dropping write");
                }
                return Ok(Some(twin.id.clone()));
            }
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO memories
             (id, senior_id, type, content, embedding, importance,
              created_at, last_accessed_at, access_count, source_call_id)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?7,0,?8)",
            rusqlite::params![
                id,
                senior_id,
                memory_type.to_string(),
                content,
                embedding_to_blob(&embedding),
                importance,
                now,
                source_call_id,
            ],
        )?;
        info!(senior_id, %id, "memory stored");
        Ok(Some(id))
    }

    /// Semantic search: top-k above the threshold, ordered by similarity.
    /// Touches `last_accessed_at` on every returned record.
    pub async fn search(
        &self,
        senior_id: &str,
        query: &str,
        k: usize,
        threshold: Option<f32>,
    ) -> Result<Vec<MemoryHit>> {
        let threshold = threshold.unwrap_or(self.config.search_threshold);
        let embedding = match self.embedder.embed(query).await {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "embedding unavailable, search degraded to empty");
                return Ok(Vec::new());
            }
        };

        let mut scored: Vec<(f32, MemoryRecord)> = self
            .load_all(senior_id)?
            .into_iter()
            .map(|r| (cosine_similarity(&embedding, &r.embedding), r))
            .filter(|(s, _)| *s >= threshold)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(k);

        let hits: Vec<MemoryHit> = scored
            .iter()
            .map(|(s, r)| MemoryHit::from_record(r, Some(*s)))
            .collect();
        self.touch(scored.iter().map(|(_, r)| r.id.as_str()))?;
        Ok(hits)
    }

    /// Build the tiered context block for the system prompt:
    /// critical (concerns / importance ≥ 80), contextual (semantic hits for
    /// the current topic), background (effective importance ≥ 50, grouped by
    /// type). A record surfaces in at most one tier per build.
    pub async fn tiered_context(&self, senior_id: &str, topic: Option<&str>) -> Result<String> {
        let now = Utc::now();
        let all = self.load_all(senior_id)?;
        let mut used: Vec<String> = Vec::new();
        let mut out = String::new();

        // Tier 1 — critical
        let mut critical: Vec<&MemoryRecord> = all
            .iter()
            .filter(|r| r.memory_type == MemoryType::Concern || r.importance >= CRITICAL_IMPORTANCE)
            .collect();
        critical.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        critical.truncate(TIER_CRITICAL_MAX);
        if !critical.is_empty() {
            out.push_str("Important:\n");
            for r in &critical {
                out.push_str(&format!("- {}\n", r.content));
                used.push(r.id.clone());
            }
        }

        // Tier 2 — contextual, only when a topic is known
        if let Some(topic) = topic {
            let hits = self
                .search(senior_id, topic, TIER_CONTEXTUAL_MAX + used.len(), None)
                .await?;
            let fresh: Vec<_> = hits
                .into_iter()
                .filter(|h| !used.contains(&h.id))
                .take(TIER_CONTEXTUAL_MAX)
                .collect();
            if !fresh.is_empty() {
                out.push_str("Relevant now:\n");
                for h in &fresh {
                    out.push_str(&format!("- {}\n", h.content));
                    used.push(h.id.clone());
                }
            }
        }

        // Tier 3 — background, grouped by type
        let mut background: Vec<&MemoryRecord> = all
            .iter()
            .filter(|r| !used.contains(&r.id))
            .filter(|r| self.effective_importance(r, now) >= BACKGROUND_EFFECTIVE_MIN)
            .collect();
        background.sort_by(|a, b| {
            (a.memory_type.to_string(), std::cmp::Reverse(a.importance as i64))
                .cmp(&(b.memory_type.to_string(), std::cmp::Reverse(b.importance as i64)))
        });
        background.truncate(TIER_BACKGROUND_MAX);
        if !background.is_empty() {
            out.push_str("Background:\n");
            for r in &background {
                out.push_str(&format!("- ({}) {}\n", r.memory_type, r.content));
            }
        }

        Ok(out)
    }

    /// All memories for a senior, embeddings included.
    pub fn load_all(&self, senior_id: &str) -> Result<Vec<MemoryRecord>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, senior_id, type, content, embedding, importance,
                    created_at, last_accessed_at, access_count, source_call_id
             FROM memories WHERE senior_id = ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![senior_id], row_to_record)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn count(&self, senior_id: &str) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let n: i64 = db.query_row(
            "SELECT COUNT(*) FROM memories WHERE senior_id = ?1",
            rusqlite::params![senior_id],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    fn touch<'a>(&self, ids: impl Iterator<Item = &'a str>) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        for id in ids {
            db.execute(
                "UPDATE memories
                 SET last_accessed_at = ?1, access_count = access_count + 1
                 WHERE id = ?2",
                rusqlite::params![now, id],
            )?;
        }
        Ok(())
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let type_str: String = row.get(2)?;
    let blob: Vec<u8> = row.get(4)?;
    let created: String = row.get(6)?;
    let accessed: String = row.get(7)?;
    Ok(MemoryRecord {
        id: row.get(0)?,
        senior_id: row.get(1)?,
        memory_type: type_str.parse().unwrap_or(MemoryType::Fact),
        content: row.get(3)?,
        embedding: blob_to_embedding(&blob),
        importance: row.get(5)?,
        created_at: parse_ts(&created),
        last_accessed_at: parse_ts(&accessed),
        access_count: row.get::<_, i64>(8)? as u32,
        source_call_id: row.get(9)?,
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Deterministic embedder: known phrases get fixed directions, unknown
    /// text hashes to something orthogonal-ish.
    struct FakeEmbedder {
        table: HashMap<&'static str, Vec<f32>>,
    }

    impl FakeEmbedder {
        fn new() -> Self {
            let mut table = HashMap::new();
            table.insert("Margaret loves her rose garden", vec![1.0, 0.0, 0.0]);
            table.insert("Margaret adores her rose garden", vec![0.99, 0.14, 0.0]);
            table.insert("Her son Tom lives in Denver", vec![0.0, 1.0, 0.0]);
            table.insert("garden", vec![0.95, 0.05, 0.0]);
            Self { table }
        }
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if let Some(v) = self.table.get(text) {
                return Ok(v.clone());
            }
            if text == "down" {
                return Err(crate::error::MemoryError::Embedding("down".into()));
            }
            // crude but stable fallback direction
            let h = text.len() as f32;
            Ok(vec![0.1, 0.1, h.max(1.0)])
        }
    }

    fn store() -> MemoryStore {
        MemoryStore::new(
            Connection::open_in_memory().unwrap(),
            Arc::new(FakeEmbedder::new()),
            MemoryConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn near_duplicates_collapse_to_one_record() {
        let store = store();
        store
            .remember("s-1", MemoryType::Preference, "Margaret loves her rose garden", 60.0, None)
            .await
            .unwrap();
        store
            .remember("s-1", MemoryType::Preference, "Margaret adores her rose garden", 50.0, None)
            .await
            .unwrap();
        assert_eq!(store.count("s-1").unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_with_higher_importance_wins() {
        let store = store();
        let id1 = store
            .remember("s-1", MemoryType::Preference, "Margaret loves her rose garden", 50.0, None)
            .await
            .unwrap()
            .unwrap();
        let id2 = store
            .remember("s-1", MemoryType::Preference, "Margaret adores her rose garden", 90.0, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(id1, id2);
        let all = store.load_all("s-1").unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].importance, 90.0);
        // the original content was kept — the write was absorbed
        assert_eq!(all[0].content, "Margaret loves her rose garden");
    }

    #[tokio::test]
    async fn identical_double_write_yields_one_record() {
        let store = store();
        for _ in 0..2 {
            store
                .remember("s-1", MemoryType::Preference, "Margaret loves her rose garden", 60.0, None)
                .await
                .unwrap();
        }
        assert_eq!(store.count("s-1").unwrap(), 1);
    }

    #[tokio::test]
    async fn distinct_memories_both_stored() {
        let store = store();
        store
            .remember("s-1", MemoryType::Preference, "Margaret loves her rose garden", 60.0, None)
            .await
            .unwrap();
        store
            .remember("s-1", MemoryType::Relationship, "Her son Tom lives in Denver", 70.0, None)
            .await
            .unwrap();
        assert_eq!(store.count("s-1").unwrap(), 2);
    }

    #[tokio::test]
    async fn embedding_outage_skips_the_write() {
        let store = store();
        let id = store
            .remember("s-1", MemoryType::Fact, "down", 60.0, None)
            .await
            .unwrap();
        assert!(id.is_none());
        assert_eq!(store.count("s-1").unwrap(), 0);
    }

    #[tokio::test]
    async fn search_orders_by_similarity_and_touches_records() {
        let store = store();
        store
            .remember("s-1", MemoryType::Preference, "Margaret loves her rose garden", 60.0, None)
            .await
            .unwrap();
        store
            .remember("s-1", MemoryType::Relationship, "Her son Tom lives in Denver", 70.0, None)
            .await
            .unwrap();

        let hits = store.search("s-1", "garden", 5, None).await.unwrap();
        assert_eq!(hits.len(), 1, "only the garden memory clears 0.65");
        assert!(hits[0].content.contains("rose garden"));
        assert!(hits[0].similarity.unwrap() > 0.9);

        let all = store.load_all("s-1").unwrap();
        let garden = all.iter().find(|r| r.content.contains("garden")).unwrap();
        assert_eq!(garden.access_count, 1);
    }

    #[tokio::test]
    async fn tiered_context_suppresses_earlier_tiers() {
        let store = store();
        store
            .remember("s-1", MemoryType::Concern, "Margaret loves her rose garden", 90.0, None)
            .await
            .unwrap();
        store
            .remember("s-1", MemoryType::Relationship, "Her son Tom lives in Denver", 85.0, None)
            .await
            .unwrap();

        let block = store.tiered_context("s-1", Some("garden")).await.unwrap();
        // the concern sits in the critical tier…
        assert!(block.contains("Important:"));
        // …and must not repeat in the contextual tier despite matching
        assert_eq!(block.matches("rose garden").count(), 1);
    }

    #[test]
    fn effective_importance_decays_with_half_life() {
        let store = store();
        let now = Utc::now();
        let record = MemoryRecord {
            id: "m".into(),
            senior_id: "s-1".into(),
            memory_type: MemoryType::Fact,
            content: "x".into(),
            embedding: vec![1.0, 0.0, 0.0],
            importance: 80.0,
            created_at: now - chrono::Duration::days(30),
            last_accessed_at: now - chrono::Duration::days(30),
            access_count: 0,
            source_call_id: None,
        };
        let eff = store.effective_importance(&record, now);
        // one half-life: 80 → 40, no recency boost
        assert!((eff - 40.0).abs() < 0.5, "got {eff}");
    }

    #[test]
    fn recent_access_grants_a_bounded_boost() {
        let store = store();
        let now = Utc::now();
        let record = MemoryRecord {
            id: "m".into(),
            senior_id: "s-1".into(),
            memory_type: MemoryType::Fact,
            content: "x".into(),
            embedding: vec![1.0, 0.0, 0.0],
            importance: 80.0,
            created_at: now,
            last_accessed_at: now,
            access_count: 3,
            source_call_id: None,
        };
        let eff = store.effective_importance(&record, now);
        assert!(eff > 80.0);
        assert!(eff <= 80.0 + RECENCY_BOOST_MAX + f64::EPSILON);
    }
}
