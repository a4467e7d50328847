
/// Knobs of one elaboration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElabConfig {
    /// Missing-clause examples collected before the report is cut short.
    pub missing_clauses_limit: usize,
    pub report_redundant_clauses: bool,
    /// Whether function bodies may eliminate the interval type.
    pub allow_interval_elimination: bool,
    pub stack_red_zone: usize,
    pub stack_grow: usize,
}

impl Default for ElabConfig {
    fn default() -> Self {
        ElabConfig {
            missing_clauses_limit: 10,
            report_redundant_clauses: true,
            allow_interval_elimination: true,
            stack_red_zone: 64 * 1024,
            stack_grow: 1024 * 1024,
        }
    }
}
