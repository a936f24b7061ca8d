//! Actor identity resolution for audit events.
//!
//! The resolution chain: `--actor` flag > `WARDEN_ACTOR` env > `USER` env (TTY only).
//! Mutating commands require an actor; read-only commands work without one.

use std::env;

/// Errors from actor resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorResolutionError {
    /// Human-readable description.
    pub message: String,
    /// Machine error code.
    pub code: &'static str,
}

impl std::fmt::Display for ActorResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ActorResolutionError {}

/// Environment reader trait for dependency injection in tests.
trait EnvReader {
    fn get(&self, key: &str) -> Option<String>;
    fn is_tty(&self) -> bool;
}

struct RealEnv;

impl EnvReader for RealEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.is_empty())
    }

    fn is_tty(&self) -> bool {
        use std::io::IsTerminal;
        std::io::stdin().is_terminal()
    }
}

fn resolve_actor_with(cli_flag: Option<&str>, env: &dyn EnvReader) -> Option<String> {
    if let Some(actor) = cli_flag.filter(|a| !a.trim().is_empty()) {
        return Some(actor.trim().to_string());
    }

    if let Some(val) = env.get("WARDEN_ACTOR") {
        return Some(val);
    }

    // USER only counts for an interactive operator, never for piped agents.
    if env.is_tty() {
        return env.get("USER");
    }

    None
}

/// Resolve the actor identity, or `None` if nothing is configured.
pub fn resolve_actor(cli_flag: Option<&str>) -> Option<String> {
    resolve_actor_with(cli_flag, &RealEnv)
}

/// Resolve the actor identity, returning an error if not found.
pub fn require_actor(cli_flag: Option<&str>) -> Result<String, ActorResolutionError> {
    resolve_actor(cli_flag).ok_or_else(|| ActorResolutionError {
        message: "Actor identity required for this command. \
                  Set --actor or the WARDEN_ACTOR environment variable."
            .to_string(),
        code: "missing_actor",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MockEnv {
        vars: HashMap<String, String>,
        tty: bool,
    }

    impl MockEnv {
        fn new() -> Self {
            Self {
                vars: HashMap::new(),
                tty: false,
            }
        }

        fn var(mut self, key: &str, val: &str) -> Self {
            self.vars.insert(key.to_string(), val.to_string());
            self
        }

        fn tty(mut self) -> Self {
            self.tty = true;
            self
        }
    }

    impl EnvReader for MockEnv {
        fn get(&self, key: &str) -> Option<String> {
            self.vars.get(key).filter(|v| !v.is_empty()).cloned()
        }

        fn is_tty(&self) -> bool {
            self.tty
        }
    }

    #[test]
    fn flag_wins() {
        let env = MockEnv::new().var("WARDEN_ACTOR", "env-actor");
        assert_eq!(
            resolve_actor_with(Some("flag-actor"), &env).as_deref(),
            Some("flag-actor")
        );
    }

    #[test]
    fn blank_flag_falls_through_to_env() {
        let env = MockEnv::new().var("WARDEN_ACTOR", "env-actor");
        assert_eq!(resolve_actor_with(Some("  "), &env).as_deref(), Some("env-actor"));
    }

    #[test]
    fn user_only_on_tty() {
        let piped = MockEnv::new().var("USER", "alice");
        assert!(resolve_actor_with(None, &piped).is_none());

        let interactive = MockEnv::new().var("USER", "alice").tty();
        assert_eq!(resolve_actor_with(None, &interactive).as_deref(), Some("alice"));
    }

    #[test]
    fn env_beats_user() {
        let env = MockEnv::new()
            .var("WARDEN_ACTOR", "sal")
            .var("USER", "alice")
            .tty();
        assert_eq!(resolve_actor_with(None, &env).as_deref(), Some("sal"));
    }

    #[test]
    fn nothing_configured() {
        assert!(resolve_actor_with(None, &MockEnv::new()).is_none());
    }
}
