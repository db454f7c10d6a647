use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::{Connection, OptionalExtension, params_from_iter};

use crate::{quizdb::DBResult, models::{self, Difficulty}};

impl ToSql for Difficulty {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Difficulty {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|err| FromSqlError::Other(Box::new(err)))
    }
}

/////*============== CHALLENGE QUERIES ==============*/
impl<'a> TryFrom<&'a rusqlite::Row<'a>> for models::Challenge {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            cwe_id: row.get("cwe_id")?,
            cwe_name: row.get("cwe_name")?,
            cve_id: row.get("cve_id")?,
            difficulty: row.get("difficulty")?,
            title: row.get("title")?,
            vulnerable_code: row.get("vulnerable_code")?,
            fixed_code: row.get("fixed_code")?,
            description: row.get("description")?,
            vulnerability: row.get("vulnerability")?,
            impact: row.get("impact")?,
            hint: row.get("hint")?,
            solution: row.get("solution")?,
            commit_hash: row.get("commit_hash")?,
            git_url: row.get("git_url")?,
        })
    }
}

/// Inserts a challenge and returns its new id.
pub fn insert_challenge(connection: &Connection, challenge: &models::NewChallenge) -> DBResult<i64> {
    log::trace!("[insert_challenge] Inserting challenge {} into challenges...", challenge.title);

    let query_params = rusqlite::named_params! {
            ":cwe_id":          challenge.cwe_id,
            ":cwe_name":        challenge.cwe_name,
            ":cve_id":          challenge.cve_id,
            ":difficulty":      challenge.difficulty,
            ":title":           challenge.title,
            ":vulnerable_code": challenge.vulnerable_code,
            ":fixed_code":      challenge.fixed_code,
            ":description":     challenge.description,
            ":vulnerability":   challenge.vulnerability,
            ":impact":          challenge.impact,
            ":hint":            challenge.hint,
            ":solution":        challenge.solution,
            ":commit_hash":     challenge.commit_hash,
            ":git_url":         challenge.git_url,
    };

    connection
        .prepare_cached(
            "INSERT INTO challenges
                ( cwe_id,  cwe_name,  cve_id,  difficulty,  title,  vulnerable_code,  fixed_code,
                  description,  vulnerability,  impact,  hint,  solution,  commit_hash,  git_url)
             VALUES
                (:cwe_id, :cwe_name, :cve_id, :difficulty, :title, :vulnerable_code, :fixed_code,
                 :description, :vulnerability, :impact, :hint, :solution, :commit_hash, :git_url)",
        )?
        .execute(query_params)?;

    Ok(connection.last_insert_rowid())
}

/// Returns the challenge with id `challenge_id`, if it exists.
pub fn query_challenge(connection: &Connection, challenge_id: i64) -> DBResult<Option<models::Challenge>> {
    connection
        .prepare("SELECT * FROM challenges WHERE id = :id")?
        .query_row(rusqlite::named_params! { ":id": challenge_id }, |row| models::Challenge::try_from(row))
        .optional()
}

/// Picks a random challenge of `difficulty` whose id is not in `seen`.
///
/// Returns None once every challenge of that difficulty has been seen.
pub fn query_random_unseen_challenge(
    connection: &Connection,
    difficulty: Difficulty,
    seen: &[i64],
) -> DBResult<Option<models::Challenge>> {
    log::trace!("[query_random_unseen_challenge] Picking a {difficulty} challenge, excluding {} seen.",
                seen.len());

    let not_in_clause = if seen.is_empty() {
        String::new()
    } else {
        format!("AND id NOT IN ({})", vec!["?"; seen.len()].join(", "))
    };
    let sql = format!(
        "SELECT * FROM challenges
         WHERE difficulty = ? {not_in_clause}
         ORDER BY random() LIMIT 1"
    );

    let query_params = std::iter::once(Value::from(difficulty.as_str().to_string()))
        .chain(seen.iter().copied().map(Value::from));

    connection
        .prepare(&sql)?
        .query_row(params_from_iter(query_params), |row| models::Challenge::try_from(row))
        .optional()
}

/// Returns the fixed version of a challenge's code.
///
/// The outer `Option` is None if no such challenge exists.
pub fn query_fixed_code(connection: &Connection, challenge_id: i64) -> DBResult<Option<Option<String>>> {
    connection
        .prepare("SELECT fixed_code FROM challenges WHERE id = :id")?
        .query_row(rusqlite::named_params! { ":id": challenge_id }, |row| row.get("fixed_code"))
        .optional()
}

/// Every distinct CWE present in the corpus, ordered by name.
pub fn query_cwe_options(connection: &Connection) -> DBResult<Vec<models::CweOption>> {
    let mut stmt = connection.prepare(
        "SELECT DISTINCT cwe_id, cwe_name FROM challenges ORDER BY cwe_name, cwe_id",
    )?;

    let options = stmt
        .query_map([], |row| {
            Ok(models::CweOption { cwe_id: row.get("cwe_id")?, cwe_name: row.get("cwe_name")? })
        })?
        .collect::<DBResult<Vec<models::CweOption>>>()?;

    Ok(options)
}

pub fn count_challenges(connection: &Connection) -> DBResult<i64> {
    connection.query_row("SELECT COUNT(*) FROM challenges", [], |row| row.get(0))
}

/// Number of challenges per CWE id, ordered by CWE id.
pub fn count_challenges_by_cwe(connection: &Connection) -> DBResult<Vec<(String, i64)>> {
    let mut stmt = connection.prepare(
        "SELECT cwe_id, COUNT(*) AS total FROM challenges GROUP BY cwe_id ORDER BY cwe_id",
    )?;

    let counts = stmt
        .query_map([], |row| Ok((row.get("cwe_id")?, row.get("total")?)))?
        .collect::<DBResult<Vec<(String, i64)>>>()?;

    Ok(counts)
}
