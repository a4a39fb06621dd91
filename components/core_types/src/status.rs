//! Thread states and the legal-transition whitelist.

/// A thread can be in one of these states at any given point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadStatus {
    /// A thread that has not yet started.
    New,
    /// A thread that is able to be run. The thread may actually be running;
    /// query the thread pool to determine if this is the case.
    Runnable,
    /// A thread that is blocked waiting for a monitor lock.
    Blocked,
    /// A thread that is blocked waiting for a monitor lock after being
    /// notified or interrupted out of a wait. The thread has already been
    /// woken once and cannot process a further interruption until it
    /// regains the lock.
    UninterruptiblyBlocked,
    /// A thread waiting indefinitely for another thread's notify.
    Waiting,
    /// A thread waiting for a notify for up to a specified time.
    TimedWaiting,
    /// A thread waiting for an asynchronous host operation to complete.
    AsyncWaiting,
    /// A thread that is parked.
    Parked,
    /// A thread that has exited.
    Terminated,
}

impl ThreadStatus {
    /// Returns true if a transition from `self` to `to` is on the
    /// whitelist. Attempting any other transition is an internal-invariant
    /// violation, not a recoverable error.
    ///
    /// `New -> Terminated` is legal only because forced shutdown may kill a
    /// thread that never started; the normal run loop can never take it.
    pub fn can_transition_to(self, to: ThreadStatus) -> bool {
        use ThreadStatus::*;
        match self {
            New => matches!(to, Runnable | Terminated),
            Runnable => matches!(
                to,
                Blocked
                    | UninterruptiblyBlocked
                    | Waiting
                    | TimedWaiting
                    | Parked
                    | AsyncWaiting
                    | Terminated
            ),
            Blocked => matches!(to, Runnable | Terminated),
            UninterruptiblyBlocked => matches!(to, Runnable | Terminated),
            Waiting => matches!(to, UninterruptiblyBlocked | Runnable | Terminated),
            TimedWaiting => matches!(to, UninterruptiblyBlocked | Runnable | Terminated),
            Parked => matches!(to, AsyncWaiting | Runnable | Terminated),
            AsyncWaiting => matches!(to, Runnable | Terminated),
            Terminated => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ThreadStatus::*;

    #[test]
    fn test_new_transitions() {
        assert!(New.can_transition_to(Runnable));
        assert!(New.can_transition_to(Terminated));
        assert!(!New.can_transition_to(Blocked));
        assert!(!New.can_transition_to(Waiting));
    }

    #[test]
    fn test_blocked_to_waiting_is_illegal() {
        assert!(!Blocked.can_transition_to(Waiting));
        assert!(!Blocked.can_transition_to(TimedWaiting));
        assert!(Blocked.can_transition_to(Runnable));
    }

    #[test]
    fn test_waiting_wakes_through_uninterruptible_block() {
        assert!(Waiting.can_transition_to(UninterruptiblyBlocked));
        assert!(TimedWaiting.can_transition_to(UninterruptiblyBlocked));
        assert!(Waiting.can_transition_to(Runnable));
    }

    #[test]
    fn test_parked_transitions() {
        assert!(Parked.can_transition_to(AsyncWaiting));
        assert!(Parked.can_transition_to(Runnable));
        assert!(!Parked.can_transition_to(Blocked));
    }

    #[test]
    fn test_terminated_is_final() {
        for to in [
            New,
            Runnable,
            Blocked,
            UninterruptiblyBlocked,
            Waiting,
            TimedWaiting,
            AsyncWaiting,
            Parked,
            Terminated,
        ] {
            assert!(!Terminated.can_transition_to(to));
        }
    }
}
