use crate::config::ScoringTable;
use crate::models::Difficulty;

/// Points earned for a single answer. Never negative.
pub fn score_attempt(table: &ScoringTable, difficulty: Difficulty, correct: bool, used_diff: bool) -> i64 {
    let mut earned = 0;
    if correct {
        earned += table.points_for(difficulty);
    }
    if used_diff {
        earned -= table.diff_penalty;
    }
    earned.max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Difficulty::Easy, true, false, 15)]
    #[case(Difficulty::Medium, true, false, 20)]
    #[case(Difficulty::Medium, true, true, 15)]
    #[case(Difficulty::Hard, true, true, 20)]
    #[case(Difficulty::Insane, true, false, 30)]
    #[case(Difficulty::Medium, false, false, 0)]
    #[case(Difficulty::Medium, false, true, 0)]
    fn scores_attempts(
        #[case] difficulty: Difficulty,
        #[case] correct: bool,
        #[case] used_diff: bool,
        #[case] expected: i64,
    ) {
        let table = ScoringTable::default();
        assert_eq!(score_attempt(&table, difficulty, correct, used_diff), expected);
    }

    #[test]
    fn large_penalty_is_floored() {
        let table = ScoringTable { diff_penalty: 100, ..ScoringTable::default() };
        assert_eq!(score_attempt(&table, Difficulty::Insane, true, true), 0);
    }
}
