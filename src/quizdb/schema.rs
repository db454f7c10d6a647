pub const USERS_SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS users (
        id             INTEGER     PRIMARY KEY AUTOINCREMENT,
        username       TEXT        UNIQUE NOT NULL,
        password_hash  TEXT        NOT NULL,
        created_at     TIMESTAMP   DEFAULT CURRENT_TIMESTAMP
    )";

pub const USERNAME_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_username ON users (username)";

pub const PROGRESS_SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS user_progress (
        user_id          INTEGER     PRIMARY KEY,
        total_score      INTEGER     NOT NULL DEFAULT 0,
        completed_count  INTEGER     NOT NULL DEFAULT 0,
        seen_challenges  TEXT        NOT NULL DEFAULT '[]',

        FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
    )";

pub const CHALLENGES_SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS challenges (
        id               INTEGER     PRIMARY KEY AUTOINCREMENT,
        cwe_id           TEXT        NOT NULL,
        cwe_name         TEXT,
        cve_id           TEXT,
        difficulty       TEXT        NOT NULL,
        title            TEXT,
        vulnerable_code  TEXT        NOT NULL,
        fixed_code       TEXT,
        description      TEXT,
        vulnerability    TEXT,
        impact           TEXT,
        hint             TEXT,
        solution         TEXT,
        commit_hash      TEXT,
        git_url          TEXT
    )";

pub const CHALLENGE_INDEXES: [&str; 3] = [
    "CREATE INDEX IF NOT EXISTS idx_difficulty ON challenges (difficulty)",
    "CREATE INDEX IF NOT EXISTS idx_cwe_id ON challenges (cwe_id)",
    "CREATE INDEX IF NOT EXISTS idx_cve_id ON challenges (cve_id)",
];
