//! Startup configuration.
//!
//! Everything in here is built once and handed to the importer or the server;
//! nothing is mutated afterwards.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use crate::models::Difficulty;

pub const DEFAULT_DATABASE: &str = "auditor_challenges.db";
pub const DEFAULT_BIND: &str = "127.0.0.1:5000";
pub const DEFAULT_MAX_PER_CWE: usize = 500;
pub const DEFAULT_UNLIMITED_CWE: &str = "CWE-121";
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// The CWE classes a challenge may be tagged with, and their display names.
pub const DEFAULT_CWES: &[(&str, &str)] = &[
    ("CWE-476", "NULL Pointer Dereference"),
    ("CWE-787", "Out-of-bounds Write"),
    ("CWE-416", "Use After Free"),
    ("CWE-125", "Out-of-bounds Read"),
    ("CWE-20", "Improper Input Validation"),
    ("CWE-401", "Memory Leak"),
    ("CWE-200", "Information Exposure"),
    ("CWE-362", "Race Condition"),
    ("CWE-190", "Integer Overflow"),
    ("CWE-120", "Classic Buffer Overflow"),
    ("CWE-415", "Double Free"),
    ("CWE-835", "Infinite Loop"),
    ("CWE-369", "Divide By Zero"),
    ("CWE-122", "Heap Overflow"),
    ("CWE-770", "Allocation without Limits"),
    ("CWE-287", "Improper Authentication"),
    ("CWE-404", "Improper Resource Shutdown"),
    ("CWE-908", "Use of Uninitialized Resource"),
    ("CWE-667", "Improper Locking"),
    ("CWE-284", "Improper Access Control"),
    ("CWE-367", "TOCTOU Race Condition"),
    ("CWE-269", "Improper Privilege Management"),
    ("CWE-843", "Type Confusion"),
    ("CWE-193", "Off-by-one Error"),
    ("CWE-191", "Integer Underflow"),
    ("CWE-754", "Improper Check for Exceptional Conditions"),
    ("CWE-704", "Incorrect Type Conversion"),
    ("CWE-681", "Incorrect Numeric Conversion"),
    ("CWE-203", "Observable Discrepancy"),
    ("CWE-129", "Improper Validation of Array Index"),
    ("CWE-682", "Incorrect Calculation"),
    ("CWE-824", "Uninitialized Pointer"),
    ("CWE-330", "Insufficiently Random Values"),
    ("CWE-121", "Stack Overflow"),
];

/// Allow-list of CWE ids mapped to human-readable names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CweCatalog {
    names: BTreeMap<String, String>,
}

impl CweCatalog {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            names: entries
                .into_iter()
                .map(|(id, name)| (id.into(), name.into()))
                .collect(),
        }
    }

    pub fn contains(&self, cwe_id: &str) -> bool {
        self.names.contains_key(cwe_id)
    }

    /// Name for `cwe_id`, falling back to the id itself.
    pub fn name_of<'a>(&'a self, cwe_id: &'a str) -> &'a str {
        self.names.get(cwe_id).map_or(cwe_id, String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for CweCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_CWES.iter().copied())
    }
}

/// Points awarded per difficulty, and the cost of peeking at the fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringTable {
    pub easy: i64,
    pub medium: i64,
    pub hard: i64,
    pub insane: i64,
    pub diff_penalty: i64,
}

impl ScoringTable {
    pub fn points_for(&self, difficulty: Difficulty) -> i64 {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Medium => self.medium,
            Difficulty::Hard => self.hard,
            Difficulty::Insane => self.insane,
        }
    }
}

impl Default for ScoringTable {
    fn default() -> Self {
        Self { easy: 15, medium: 20, hard: 25, insane: 30, diff_penalty: 5 }
    }
}

#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub input: PathBuf,
    pub database: PathBuf,
    pub max_per_cwe: usize,
    /// This CWE bucket is never capped.
    pub unlimited_cwe: String,
    pub difficulty: Difficulty,
    pub batch_size: usize,
    pub catalog: CweCatalog,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("megavul_simple.json"),
            database: PathBuf::from(DEFAULT_DATABASE),
            max_per_cwe: DEFAULT_MAX_PER_CWE,
            unlimited_cwe: String::from(DEFAULT_UNLIMITED_CWE),
            difficulty: Difficulty::Easy,
            batch_size: DEFAULT_BATCH_SIZE,
            catalog: CweCatalog::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database: PathBuf,
    pub bind: String,
    /// Raw cookie signing key material. Needs at least 64 bytes to be used.
    pub secret_key: Option<Vec<u8>>,
    pub cookie_secure: bool,
    /// Include the correct CWE in `GET /challenge` responses.
    pub reveal_answers: bool,
    pub scoring: ScoringTable,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
            bind: String::from(DEFAULT_BIND),
            secret_key: None,
            cookie_secure: true,
            reveal_answers: false,
            scoring: ScoringTable::default(),
        }
    }
}

impl ServerConfig {
    /// Reads the server configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(database) = lookup("QUIZ_DATABASE") {
            config.database = PathBuf::from(database);
        }
        if let Some(bind) = lookup("QUIZ_BIND") {
            config.bind = bind;
        }
        config.secret_key = lookup("QUIZ_SECRET_KEY").map(String::into_bytes);
        if let Some(raw) = lookup("QUIZ_COOKIE_SECURE") {
            config.cookie_secure = parse_flag(&raw).context("Invalid QUIZ_COOKIE_SECURE")?;
        }
        if let Some(raw) = lookup("QUIZ_REVEAL_ANSWERS") {
            config.reveal_answers = parse_flag(&raw).context("Invalid QUIZ_REVEAL_ANSWERS")?;
        }

        Ok(config)
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("expected a boolean, got '{other}'")),
    }
}
