//! MegaVul → challenge corpus import.
//!
//! The pipeline reads the whole dataset, keeps only records with a CVE id and
//! an allow-listed primary CWE, buckets them by CWE, caps every bucket except
//! one at a fixed size by random sampling, and writes the result into a
//! freshly created database.

mod record;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use itertools::Itertools;
use rand::Rng;
use rand::seq::SliceRandom;
use rusqlite::Connection;

use crate::config::{CweCatalog, ImportConfig};
use crate::models::{Difficulty, NewChallenge};
use crate::quizdb;

pub use record::{Candidate, DatasetEntry, MegaVulRecord, Rejection};

const DESCRIPTION_TEMPLATE: &str = "Analyze the 'Vulnerable Code' snippet...";
const IMPACT_TEMPLATE: &str = "Exploitation could lead to various security impacts.";
const HINT_TEMPLATE: &str = "Examine data flow, boundary conditions, and resource management.";
const SOLUTION_TEMPLATE: &str = "Specific fix depends on the exact code pattern.";

/// Counts of what happened to each input entry during filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterTally {
    pub processed: usize,
    pub malformed: usize,
    pub missing_cve: usize,
    pub disallowed_cwe: usize,
    pub incomplete: usize,
    pub admitted: usize,
}

impl FilterTally {
    fn reject(&mut self, reason: Rejection) {
        match reason {
            Rejection::MissingCve => self.missing_cve += 1,
            Rejection::DisallowedCwe => self.disallowed_cwe += 1,
            Rejection::Incomplete => self.incomplete += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub tally: FilterTally,
    /// Number of records selected for each CWE id after capping.
    pub selected_per_cwe: BTreeMap<String, usize>,
    pub inserted: usize,
    pub errors: usize,
}

impl ImportReport {
    pub fn selected(&self) -> usize {
        self.selected_per_cwe.values().sum()
    }
}

impl std::fmt::Display for ImportReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Import summary:\n\
             \tProcessed: {}\n\
             \tMalformed: {}\n\
             \tSkipped (no CVE): {}\n\
             \tSkipped (CWE not allowed): {}\n\
             \tSkipped (incomplete): {}\n\
             \tAdmitted: {}\n\
             \tSelected: {}\n\
             \tInserted: {}\n\
             \tErrors: {}",
            self.tally.processed,
            self.tally.malformed,
            self.tally.missing_cve,
            self.tally.disallowed_cwe,
            self.tally.incomplete,
            self.tally.admitted,
            self.selected(),
            self.inserted,
            self.errors,
        )?;
        write!(f, "Selected per CWE:")?;
        for (cwe_id, count) in &self.selected_per_cwe {
            write!(f, "\n\t{cwe_id}: {count}")?;
        }
        Ok(())
    }
}

/// Reads the dataset file, which must hold a single JSON array.
///
/// Entries are parsed straight into records; fields the importer never reads are skipped.
pub fn load_dataset(path: &Path) -> Result<Vec<DatasetEntry>> {
    let file = File::open(path)
        .with_context(|| format!("Input JSON file '{}' not found or unreadable.", path.display()))?;

    let entries: Vec<DatasetEntry> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Expected a JSON list in '{}'.", path.display()))?;

    log::info!("[load_dataset] Loaded {} total entries from {}.", entries.len(), path.display());
    Ok(entries)
}

/// Keeps the entries that pass every import filter, tallying the rest.
pub fn filter_entries(entries: Vec<DatasetEntry>, catalog: &CweCatalog, tally: &mut FilterTally) -> Vec<Candidate> {
    let mut admitted = Vec::new();

    for entry in entries {
        tally.processed += 1;

        let record = match entry {
            DatasetEntry::Record(record) => record,
            DatasetEntry::Malformed(_) => {
                log::trace!("[filter_entries] Dropping non-object entry #{}.", tally.processed);
                tally.malformed += 1;
                continue;
            }
        };

        match record.admit(catalog) {
            Ok(candidate) => admitted.push(candidate),
            Err(reason) => tally.reject(reason),
        }
    }

    tally.admitted = admitted.len();
    log::info!(
        "[filter_entries] Processed {}, skipped {} without CVE, {} with non-allowed CWE, \
         {} incomplete, {} malformed.",
        tally.processed, tally.missing_cve, tally.disallowed_cwe, tally.incomplete, tally.malformed
    );
    admitted
}

/// Buckets candidates by CWE id. Order within a bucket is arrival order.
pub fn group_by_cwe(candidates: Vec<Candidate>) -> BTreeMap<String, Vec<Candidate>> {
    candidates
        .into_iter()
        .into_group_map_by(|candidate| candidate.cwe_id.clone())
        .into_iter()
        .collect()
}

/// Limits every bucket except `unlimited_cwe` to `max_per_cwe` entries,
/// keeping a uniformly random subset of oversized buckets.
pub fn cap_groups<R: Rng + ?Sized>(
    groups: BTreeMap<String, Vec<Candidate>>,
    max_per_cwe: usize,
    unlimited_cwe: &str,
    rng: &mut R,
) -> BTreeMap<String, Vec<Candidate>> {
    groups
        .into_iter()
        .map(|(cwe_id, mut entries)| {
            if cwe_id == unlimited_cwe {
                log::info!("[cap_groups] Keeping all {} entries for {cwe_id}.", entries.len());
            } else if entries.len() > max_per_cwe {
                log::info!(
                    "[cap_groups] {cwe_id}: found {}, shuffling and taking {max_per_cwe}.",
                    entries.len()
                );
                entries.shuffle(&mut *rng);
                entries.truncate(max_per_cwe);
            } else {
                log::debug!("[cap_groups] {cwe_id}: found {}, keeping all.", entries.len());
            }
            (cwe_id, entries)
        })
        .collect()
}

/// Builds the challenge row for a selected candidate.
pub fn to_challenge(candidate: Candidate, catalog: &CweCatalog, difficulty: Difficulty) -> NewChallenge {
    let cwe_name = catalog.name_of(&candidate.cwe_id).to_string();

    let mut title = format!("{cwe_name} ({})", candidate.cwe_id);
    if !candidate.cve_id.is_empty() {
        title += &format!(" - {}", candidate.cve_id);
    }
    let vulnerability = format!(
        "Potential {cwe_name} vulnerability ({}). Associated CVE: {}.",
        candidate.cwe_id, candidate.cve_id
    );

    NewChallenge {
        cve_id: Some(candidate.cve_id).filter(|cve| !cve.is_empty()),
        cwe_id: candidate.cwe_id,
        cwe_name,
        difficulty,
        title,
        vulnerable_code: candidate.vulnerable_code,
        fixed_code: candidate.fixed_code,
        description: String::from(DESCRIPTION_TEMPLATE),
        vulnerability,
        impact: String::from(IMPACT_TEMPLATE),
        hint: String::from(HINT_TEMPLATE),
        solution: String::from(SOLUTION_TEMPLATE),
        commit_hash: candidate.commit_hash,
        git_url: candidate.git_url,
    }
}

/// Inserts challenges, committing every `batch_size` rows.
///
/// A row that fails to insert is logged and skipped. Returns `(inserted, errors)`.
pub fn persist_challenges(
    connection: &mut Connection,
    challenges: &[NewChallenge],
    batch_size: usize,
) -> Result<(usize, usize)> {
    let mut inserted = 0;
    let mut errors = 0;

    for batch in challenges.chunks(batch_size.max(1)) {
        let tx = connection.transaction().context("Could not open insert transaction")?;
        for challenge in batch {
            match quizdb::insert_challenge(&tx, challenge) {
                Ok(_) => inserted += 1,
                Err(err) => {
                    log::warn!(
                        "[persist_challenges] Error inserting {} (commit hash: {}): {err}",
                        challenge.title,
                        if challenge.commit_hash.is_empty() { "N/A" } else { challenge.commit_hash.as_str() }
                    );
                    errors += 1;
                }
            }
        }
        tx.commit().context("Could not commit inserted challenges")?;
        log::debug!("[persist_challenges] Committed {inserted} entries so far.");
    }

    Ok((inserted, errors))
}

/// Runs the full import described by `config`.
///
/// The dataset is read and filtered before the database is touched; the
/// database file is then deleted and rebuilt from scratch.
pub fn run_import<R: Rng + ?Sized>(config: &ImportConfig, rng: &mut R) -> Result<ImportReport> {
    let entries = load_dataset(&config.input)?;

    let mut report = ImportReport::default();
    let candidates = filter_entries(entries, &config.catalog, &mut report.tally);
    let groups = group_by_cwe(candidates);
    log::info!(
        "[run_import] Grouped {} valid entries into {} CWE groups.",
        report.tally.admitted,
        groups.len()
    );

    let selected = cap_groups(groups, config.max_per_cwe, &config.unlimited_cwe, rng);
    report.selected_per_cwe = selected
        .iter()
        .map(|(cwe_id, entries)| (cwe_id.clone(), entries.len()))
        .collect();

    let challenges = selected
        .into_values()
        .flatten()
        .map(|candidate| to_challenge(candidate, &config.catalog, config.difficulty))
        .collect::<Vec<_>>();

    let mut connection = quizdb::recreate_db(&config.database)?;
    log::info!("[run_import] Inserting {} selected challenge entries...", challenges.len());
    let (inserted, errors) = persist_challenges(&mut connection, &challenges, config.batch_size)?;
    report.inserted = inserted;
    report.errors = errors;

    log::info!("[run_import] Successfully inserted {inserted} challenge entries.");
    if errors > 0 {
        log::warn!("[run_import] Errors encountered during insertion: {errors} entries.");
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::{Value, json};
    use std::collections::HashSet;

    fn entries(values: Vec<Value>) -> Vec<DatasetEntry> {
        values.into_iter().map(|value| serde_json::from_value(value).unwrap()).collect()
    }

    fn candidate(cwe_id: &str, n: usize) -> Candidate {
        Candidate {
            cwe_id: cwe_id.to_string(),
            cve_id: format!("CVE-2020-{n:04}"),
            vulnerable_code: format!("before {n}"),
            fixed_code: format!("after {n}"),
            commit_hash: format!("{n:08x}"),
            git_url: String::new(),
        }
    }

    fn candidates(cwe_id: &str, count: usize) -> Vec<Candidate> {
        (0..count).map(|n| candidate(cwe_id, n)).collect()
    }

    #[test]
    fn filter_tallies_every_reason() {
        let input = entries(vec![
            json!({"cve_id": "CVE-1", "cwe_ids": ["CWE-125"], "is_vul": true, "func_before": "a", "func": "b"}),
            json!({"cwe_ids": ["CWE-125"], "is_vul": true, "func_before": "a", "func": "b"}),
            json!({"cve_id": "CVE-2", "cwe_ids": ["CWE-79"], "is_vul": true, "func_before": "a", "func": "b"}),
            json!({"cve_id": "CVE-3", "cwe_ids": ["CWE-125"], "is_vul": false, "func_before": "a", "func": "b"}),
            json!("not an object"),
            json!({"cve_id": 17}),
        ]);

        let mut tally = FilterTally::default();
        let admitted = filter_entries(input, &CweCatalog::default(), &mut tally);

        assert_eq!(admitted.len(), 1);
        assert_eq!(tally, FilterTally {
            processed: 6,
            malformed: 1,
            missing_cve: 2,
            disallowed_cwe: 1,
            incomplete: 1,
            admitted: 1,
        });
    }

    #[test]
    fn numeric_cwe_counts_as_disallowed() {
        let input = entries(vec![
            json!({"cve_id": "CVE-1", "cwe_ids": [125], "is_vul": true, "func_before": "a", "func": "b"}),
            json!({"cve_id": "CVE-2", "cwe_ids": "CWE-125", "is_vul": true, "func_before": "a", "func": "b"}),
        ]);

        let mut tally = FilterTally::default();
        assert!(filter_entries(input, &CweCatalog::default(), &mut tally).is_empty());
        assert_eq!(tally.disallowed_cwe, 2);
        assert_eq!(tally.malformed, 0);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let input = entries(vec![json!({
            "cve_id": "CVE-1",
            "cwe_ids": ["CWE-125"],
            "is_vul": true,
            "func_before": "a",
            "func": "b",
            "abstract_func_before": "x",
            "diff_line_info": {"deleted_lines": [], "added_lines": []},
        })]);

        let mut tally = FilterTally::default();
        assert_eq!(filter_entries(input, &CweCatalog::default(), &mut tally).len(), 1);
    }

    #[test]
    fn loads_records_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("megavul.json");
        std::fs::write(&path, r#"[{"cve_id": "CVE-1", "cwe_ids": [125]}, 3, "x"]"#).unwrap();

        let loaded = load_dataset(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        assert!(matches!(loaded[0], DatasetEntry::Record(_)));
        assert!(matches!(loaded[1], DatasetEntry::Malformed(_)));
        assert!(matches!(loaded[2], DatasetEntry::Malformed(_)));
    }

    #[test]
    fn grouping_preserves_arrival_order() {
        let input = vec![candidate("CWE-20", 1), candidate("CWE-125", 2), candidate("CWE-20", 3)];
        let groups = group_by_cwe(input);

        assert_eq!(groups.len(), 2);
        let order: Vec<_> = groups["CWE-20"].iter().map(|c| c.cve_id.as_str()).collect();
        assert_eq!(order, vec!["CVE-2020-0001", "CVE-2020-0003"]);
    }

    #[test]
    fn caps_oversized_buckets_only() {
        let mut groups = BTreeMap::new();
        groups.insert(String::from("CWE-125"), candidates("CWE-125", 600));
        groups.insert(String::from("CWE-20"), candidates("CWE-20", 10));
        groups.insert(String::from("CWE-121"), candidates("CWE-121", 700));

        let mut rng = StdRng::seed_from_u64(7);
        let capped = cap_groups(groups, 500, "CWE-121", &mut rng);

        assert_eq!(capped["CWE-125"].len(), 500);
        assert_eq!(capped["CWE-20"], candidates("CWE-20", 10));
        assert_eq!(capped["CWE-121"].len(), 700);
        assert!(capped["CWE-125"].iter().all_unique());
    }

    #[test]
    fn oversized_buckets_are_sampled_not_truncated() {
        let kept = |seed: u64| -> HashSet<Candidate> {
            let mut groups = BTreeMap::new();
            groups.insert(String::from("CWE-125"), candidates("CWE-125", 600));
            let mut capped = cap_groups(groups, 500, "CWE-121", &mut StdRng::seed_from_u64(seed));
            capped.remove("CWE-125").unwrap().into_iter().collect()
        };
        let head: HashSet<Candidate> = candidates("CWE-125", 500).into_iter().collect();

        let first = kept(1);
        let second = kept(2);
        assert_eq!(first.len(), 500);
        assert_ne!(first, head);
        assert_ne!(second, head);
        assert_ne!(first, second);
    }

    #[test]
    fn capping_is_reproducible_with_a_seed() {
        let make = || {
            let mut groups = BTreeMap::new();
            groups.insert(String::from("CWE-125"), candidates("CWE-125", 50));
            groups.insert(String::from("CWE-787"), candidates("CWE-787", 50));
            groups
        };

        let first = cap_groups(make(), 10, "CWE-121", &mut StdRng::seed_from_u64(42));
        let second = cap_groups(make(), 10, "CWE-121", &mut StdRng::seed_from_u64(42));
        assert_eq!(first, second);
    }

    #[test]
    fn builds_titles_and_templates() {
        let challenge = to_challenge(candidate("CWE-416", 9), &CweCatalog::default(), Difficulty::Easy);

        assert_eq!(challenge.title, "Use After Free (CWE-416) - CVE-2020-0009");
        assert_eq!(challenge.cwe_name, "Use After Free");
        assert_eq!(challenge.cve_id.as_deref(), Some("CVE-2020-0009"));
        assert_eq!(challenge.difficulty, Difficulty::Easy);
        assert_eq!(
            challenge.vulnerability,
            "Potential Use After Free vulnerability (CWE-416). Associated CVE: CVE-2020-0009."
        );
        assert_eq!(challenge.solution, SOLUTION_TEMPLATE);
    }

    #[test]
    fn title_omits_missing_cve() {
        let mut input = candidate("CWE-20", 1);
        input.cve_id = String::new();
        let challenge = to_challenge(input, &CweCatalog::default(), Difficulty::Easy);
        assert_eq!(challenge.title, "Improper Input Validation (CWE-20)");
        assert!(challenge.cve_id.is_none());
    }

    #[test]
    fn failed_inserts_are_counted_not_fatal() {
        let mut connection = Connection::open_in_memory().unwrap();
        // No schema at all: every insert fails.
        let challenges: Vec<_> = candidates("CWE-125", 3)
            .into_iter()
            .map(|c| to_challenge(c, &CweCatalog::default(), Difficulty::Easy))
            .collect();

        let (inserted, errors) = persist_challenges(&mut connection, &challenges, 2).unwrap();
        assert_eq!((inserted, errors), (0, 3));
    }

    #[test]
    fn persists_across_batches() {
        let mut connection = crate::quizdb::test_support::memory_db();
        let challenges: Vec<_> = candidates("CWE-125", 5)
            .into_iter()
            .map(|c| to_challenge(c, &CweCatalog::default(), Difficulty::Easy))
            .collect();

        let (inserted, errors) = persist_challenges(&mut connection, &challenges, 2).unwrap();
        assert_eq!((inserted, errors), (5, 0));
        assert_eq!(quizdb::count_challenges(&connection).unwrap(), 5);
    }
}
