use std::collections::HashMap;

use uuid::Uuid;

pub const MIN_CUMULATIVE_GPA: &str = "min_cumulative_gpa";
pub const MIN_CUMULATIVE_CREDITS: &str = "min_cumulative_credits";
pub const PROBATION_BOARD_THRESHOLD: &str = "probation_board_threshold";
pub const FORGIVENESS_CEILING: &str = "forgiveness_ceiling";
pub const CREDIT_GATE_PERCENT: &str = "credit_gate_percent";
pub const HIGH_WEIGHT_THRESHOLD: &str = "high_weight_threshold";

/// Track-specific minimum GPA rows are named `min_gpa:<track>`.
pub const MIN_GPA_TRACK_PREFIX: &str = "min_gpa:";

/// One row of the parameters table. `student_id` present means a per-student
/// override, which always wins over the system-wide row of the same name.
#[derive(Debug, Clone)]
pub struct ParameterRow {
    pub name: String,
    pub student_id: Option<Uuid>,
    pub value: f64,
}

/// Thresholds resolved for a single student.
#[derive(Debug, Clone)]
pub struct EffectiveParams {
    pub min_cumulative_gpa: f64,
    pub min_cumulative_credits: f64,
    pub probation_board_threshold: i32,
    pub forgiveness_ceiling: f64,
    pub credit_gate_percent: f64,
    pub high_weight_threshold: f64,
    min_track_gpa: HashMap<String, f64>,
}

impl Default for EffectiveParams {
    fn default() -> Self {
        Self {
            min_cumulative_gpa: 2.0,
            min_cumulative_credits: 120.0,
            probation_board_threshold: 3,
            forgiveness_ceiling: 1.7,
            credit_gate_percent: 0.75,
            high_weight_threshold: 6.0,
            min_track_gpa: HashMap::new(),
        }
    }
}

impl EffectiveParams {
    /// Minimum GPA required to access a specialization track's courses.
    /// Falls back to the cumulative minimum when no track row exists.
    pub fn min_gpa_for_track(&self, track: &str) -> f64 {
        self.min_track_gpa
            .get(track)
            .copied()
            .unwrap_or(self.min_cumulative_gpa)
    }

    /// Resolves rows for one student: system-wide rows first, then any row
    /// carrying this student's id on top.
    pub fn resolve(rows: &[ParameterRow], student_id: Uuid) -> Self {
        let mut params = Self::default();
        for row in rows.iter().filter(|r| r.student_id.is_none()) {
            params.apply(&row.name, row.value);
        }
        for row in rows.iter().filter(|r| r.student_id == Some(student_id)) {
            params.apply(&row.name, row.value);
        }
        params
    }

    fn apply(&mut self, name: &str, value: f64) {
        match name {
            MIN_CUMULATIVE_GPA => self.min_cumulative_gpa = value,
            MIN_CUMULATIVE_CREDITS => self.min_cumulative_credits = value,
            PROBATION_BOARD_THRESHOLD => self.probation_board_threshold = value as i32,
            FORGIVENESS_CEILING => self.forgiveness_ceiling = value,
            CREDIT_GATE_PERCENT => self.credit_gate_percent = value,
            HIGH_WEIGHT_THRESHOLD => self.high_weight_threshold = value,
            other => {
                if let Some(track) = other.strip_prefix(MIN_GPA_TRACK_PREFIX) {
                    self.min_track_gpa.insert(track.to_string(), value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, student: Option<Uuid>, value: f64) -> ParameterRow {
        ParameterRow {
            name: name.to_string(),
            student_id: student,
            value,
        }
    }

    #[test]
    fn system_rows_replace_defaults() {
        let student = Uuid::new_v4();
        let rows = vec![row(MIN_CUMULATIVE_GPA, None, 2.3)];
        let params = EffectiveParams::resolve(&rows, student);
        assert_eq!(params.min_cumulative_gpa, 2.3);
    }

    #[test]
    fn student_override_wins_over_system_row() {
        let student = Uuid::new_v4();
        let rows = vec![
            row("min_gpa:finance", None, 2.5),
            row("min_gpa:finance", Some(student), 2.0),
            row("min_gpa:finance", Some(Uuid::new_v4()), 3.5),
        ];
        let params = EffectiveParams::resolve(&rows, student);
        assert_eq!(params.min_gpa_for_track("finance"), 2.0);
    }

    #[test]
    fn unknown_track_falls_back_to_cumulative_minimum() {
        let params = EffectiveParams::resolve(&[], Uuid::new_v4());
        assert_eq!(
            params.min_gpa_for_track("history"),
            params.min_cumulative_gpa
        );
    }
}
