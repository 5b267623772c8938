//! Callbacks from the lifecycle into the application.

use std::time::Duration;

/// What the lifecycle asks of the surrounding application.
///
/// Called from timer tasks, so implementations must be cheap and must not
/// block: hand the event to the UI thread and return.
pub trait SessionHooks: Send + Sync + 'static {
    /// The session is over; send the user to the login screen.
    ///
    /// Called at most once per lifecycle.
    fn go_to_login(&self, return_path: Option<String>);

    /// The inactivity timeout is `remaining` away.
    ///
    /// Called once per warning episode; new activity re-arms it.
    fn on_warning(&self, _remaining: Duration) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct LoginOnly {
        logins: AtomicUsize,
    }

    impl SessionHooks for LoginOnly {
        fn go_to_login(&self, _return_path: Option<String>) {
            self.logins.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_default_on_warning_is_a_no_op() {
        let hooks = LoginOnly::default();

        hooks.on_warning(Duration::from_secs(120));

        assert_eq!(hooks.logins.load(Ordering::SeqCst), 0);
    }
}
