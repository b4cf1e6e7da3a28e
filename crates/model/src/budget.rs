use std::time::{SystemTime, UNIX_EPOCH};

/// Remaining wall-clock budget before the invoking environment forcibly
/// terminates this invocation.
///
/// Readings are monotonically decreasing; callers must query fresh on every
/// check rather than caching a value.
pub trait BudgetClock: Send + Sync {
    fn remaining_millis(&self) -> u64;
}

/// Budget derived from the invocation deadline supplied by the Lambda
/// runtime (milliseconds since the Unix epoch).
pub struct DeadlineBudget {
    deadline_epoch_millis: u64,
}

impl DeadlineBudget {
    pub fn new(deadline_epoch_millis: u64) -> Self {
        DeadlineBudget {
            deadline_epoch_millis,
        }
    }
}

impl BudgetClock for DeadlineBudget {
    fn remaining_millis(&self) -> u64 {
        let now_millis: u64 = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(u64::MAX);

        self.deadline_epoch_millis.saturating_sub(now_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_deadline_reads_zero() {
        let budget = DeadlineBudget::new(0);

        assert_eq!(0, budget.remaining_millis());
    }

    #[test]
    fn future_deadline_reads_positive() {
        let now_millis: u64 = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        let budget = DeadlineBudget::new(now_millis + 60_000);

        assert!(budget.remaining_millis() > 30_000);
    }
}
