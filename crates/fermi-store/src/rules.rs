//! Learned-rule stores
//!
//! High-confidence results are persisted under a deterministic key so a
//! repeat question in the same scope resolves as a literal.

use crate::StoreError;
use fermi_domain::traits::{LearnedRule, LearnedRuleStore};
use fermi_domain::{normalize_question, Certainty, Context, Source};
use rusqlite::{params, Connection, OptionalExtension, Row};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Deterministic key for a question within a context scope
///
/// `RULE-<domain>-<12 hex chars of sha256(question|domain|region|time)>`.
/// The question is normalized first, so case and spacing do not matter.
pub fn rule_key(question: &str, context: &Context) -> String {
    let domain = context.domain.as_deref().unwrap_or("general");
    let material = format!(
        "{}|{}|{}|{}",
        normalize_question(question),
        domain.to_lowercase(),
        context.region.as_deref().unwrap_or("").to_lowercase(),
        context.time_period.as_deref().unwrap_or("").to_lowercase(),
    );
    let digest = format!("{:x}", Sha256::digest(material.as_bytes()));
    let tag: String = domain
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("RULE-{}-{}", tag, &digest[..12])
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// SQLite-backed learned-rule store
///
/// The connection is guarded by a mutex so the store can be shared across
/// the blocking threads the estimator runs lookups on.
pub struct SqliteRuleStore {
    conn: Mutex<Connection>,
}

impl SqliteRuleStore {
    /// Open or create a store at `path`
    ///
    /// Use `:memory:` for an in-memory database (useful for testing).
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        info!("Opening learned-rule store at {}", path.as_ref().display());
        let conn = Connection::open(path)?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored rules
    pub fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM learned_rules", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// How many times a rule has been served
    pub fn usage_count(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let usage: Option<i64> = self
            .conn()
            .query_row(
                "SELECT usage_count FROM learned_rules WHERE rule_key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(usage.map(|u| u as u64))
    }

    fn row_to_rule(row: &Row<'_>) -> rusqlite::Result<(LearnedRule, String, String)> {
        let range_low: Option<f64> = row.get(3)?;
        let range_high: Option<f64> = row.get(4)?;
        let evidence_count: i64 = row.get(9)?;
        let certainty: String = row.get(7)?;
        let source: String = row.get(8)?;
        let rule = LearnedRule {
            key: row.get(0)?,
            question: row.get(1)?,
            value: row.get(2)?,
            value_range: range_low.zip(range_high),
            unit: row.get(5)?,
            confidence: row.get(6)?,
            certainty: Certainty::Low,
            source: Source::Literal,
            evidence_count: evidence_count.max(0) as usize,
            domain: row.get(10)?,
            region: row.get(11)?,
            time_period: row.get(12)?,
        };
        Ok((rule, certainty, source))
    }
}

impl LearnedRuleStore for SqliteRuleStore {
    type Error = StoreError;

    fn lookup(&self, key: &str) -> Result<Option<LearnedRule>, Self::Error> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT rule_key, question, value, range_low, range_high, unit, confidence,
                        certainty, source, evidence_count, domain, region, time_period
                 FROM learned_rules WHERE rule_key = ?1",
                params![key],
                Self::row_to_rule,
            )
            .optional()?;

        let Some((mut rule, certainty, source)) = row else {
            return Ok(None);
        };
        rule.certainty = certainty.parse().map_err(StoreError::InvalidData)?;
        rule.source = Source::parse(&source)
            .ok_or_else(|| StoreError::InvalidData(format!("unknown source tag {source:?}")))?;

        conn.execute(
            "UPDATE learned_rules SET usage_count = usage_count + 1 WHERE rule_key = ?1",
            params![key],
        )?;
        Ok(Some(rule))
    }

    fn save(&self, rule: &LearnedRule) -> Result<(), Self::Error> {
        if !rule.value.is_finite() {
            return Err(StoreError::InvalidData(format!(
                "rule {} has a non-finite value",
                rule.key
            )));
        }
        let now = now_secs();
        self.conn().execute(
            "INSERT INTO learned_rules (
                rule_key, question, value, range_low, range_high, unit, confidence,
                certainty, source, evidence_count, domain, region, time_period,
                usage_count, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 0, ?14, ?14)
             ON CONFLICT(rule_key) DO UPDATE SET
                question = excluded.question,
                value = excluded.value,
                range_low = excluded.range_low,
                range_high = excluded.range_high,
                unit = excluded.unit,
                confidence = excluded.confidence,
                certainty = excluded.certainty,
                source = excluded.source,
                evidence_count = excluded.evidence_count,
                updated_at = excluded.updated_at",
            params![
                rule.key,
                rule.question,
                rule.value,
                rule.value_range.map(|r| r.0),
                rule.value_range.map(|r| r.1),
                rule.unit,
                rule.confidence,
                rule.certainty.as_str(),
                rule.source.as_str(),
                rule.evidence_count as i64,
                rule.domain,
                rule.region,
                rule.time_period,
                now,
            ],
        )?;
        debug!("Saved learned rule {}", rule.key);
        Ok(())
    }
}

/// Learned-rule store held in a map, for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    rules: Mutex<HashMap<String, LearnedRule>>,
}

impl InMemoryRuleStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rules
    pub fn len(&self) -> usize {
        self.rules.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LearnedRuleStore for InMemoryRuleStore {
    type Error = StoreError;

    fn lookup(&self, key: &str) -> Result<Option<LearnedRule>, Self::Error> {
        Ok(self
            .rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn save(&self, rule: &LearnedRule) -> Result<(), Self::Error> {
        self.rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(rule.key.clone(), rule.clone());
        Ok(())
    }
}

/// Store that remembers nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRuleStore;

impl LearnedRuleStore for NullRuleStore {
    type Error = StoreError;

    fn lookup(&self, _key: &str) -> Result<Option<LearnedRule>, Self::Error> {
        Ok(None)
    }

    fn save(&self, _rule: &LearnedRule) -> Result<(), Self::Error> {
        Ok(())
    }
}
