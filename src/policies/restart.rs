//! # Restart policy for supervised processes.
//!
//! [`RestartPolicy`] decides whether another attempt is allowed after a failure.
//! It is derived from the loader's integer `max_restarts`:
//!
//! ```text
//! max_restarts = -1 (any negative) → Never       one attempt, then Failed
//! max_restarts =  0                → Always      retry forever, never Failed by exhaustion
//! max_restarts =  n > 0            → Limited(n)  retry while restart_count < n
//! ```

/// Policy controlling whether a failed process is retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Never retry.
    Never,
    /// Retry unconditionally.
    Always,
    /// Retry while fewer than `n` retries were made in the current streak.
    Limited(u32),
}

impl Default for RestartPolicy {
    /// Returns [`RestartPolicy::Always`] (`max_restarts = 0`).
    fn default() -> Self {
        RestartPolicy::Always
    }
}

impl RestartPolicy {
    /// Maps the loader's integer convention to a policy.
    ///
    /// ```
    /// use procvisor::RestartPolicy;
    ///
    /// assert_eq!(RestartPolicy::from_max_restarts(-1), RestartPolicy::Never);
    /// assert_eq!(RestartPolicy::from_max_restarts(0), RestartPolicy::Always);
    /// assert_eq!(RestartPolicy::from_max_restarts(3), RestartPolicy::Limited(3));
    /// ```
    pub fn from_max_restarts(max_restarts: i32) -> Self {
        match max_restarts {
            n if n < 0 => RestartPolicy::Never,
            0 => RestartPolicy::Always,
            n => RestartPolicy::Limited(n.unsigned_abs()),
        }
    }

    /// True if another retry is allowed after `restart_count` retries.
    pub fn allows(&self, restart_count: u32) -> bool {
        match self {
            RestartPolicy::Never => false,
            RestartPolicy::Always => true,
            RestartPolicy::Limited(n) => restart_count < *n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limited_allows_exactly_n_retries() {
        let p = RestartPolicy::Limited(3);
        let retries = (0..10).take_while(|&c| p.allows(c)).count();
        assert_eq!(retries, 3);
    }

    #[test]
    fn never_and_always() {
        assert!(!RestartPolicy::Never.allows(0));
        assert!(RestartPolicy::Always.allows(u32::MAX));
        assert_eq!(RestartPolicy::from_max_restarts(-7), RestartPolicy::Never);
    }
}
