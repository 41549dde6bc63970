//! Diagnostics configuration, read once from environment variables.
use std::{str::FromStr, sync::LazyLock};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// 0 is silent. At 10 each executed line is logged, at 20 each function
    /// call, at 30 every instruction.
    pub verbosity: u8,
    /// Default call depth limit for the command-line runner.
    pub max_call_depth: Option<usize>,
}

impl Config {
    #[inline]
    pub fn should_log(&self, level: u8) -> bool {
        self.verbosity >= level
    }
}

fn parse_env_opt<T>(key: &str) -> Option<T>
where
    T: FromStr, <T as FromStr>::Err: std::fmt::Display
{
    let val = std::env::var(key).ok()?;
    if val.is_empty() {
        return None;
    }
    match val.parse::<T>() {
        Ok(v) => Some(v),
        Err(err) => {
            eprintln!("Ignoring env var {key} with value {val}: {err}");
            None
        }
    }
}

fn parse_env<T>(key: &str, default: T) -> T
where
    T: FromStr, <T as FromStr>::Err: std::fmt::Display
{
    parse_env_opt(key).unwrap_or(default)
}

fn create_config() -> Config {
    Config {
        verbosity: parse_env("OBSOLETE_VERBOSITY", 0),
        max_call_depth: parse_env_opt("OBSOLETE_MAX_CALL_DEPTH"),
    }
}

static CELL: LazyLock<Config> = LazyLock::new(create_config);

pub fn get_config() -> &'static Config {
    &CELL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_log() {
        let conf = Config { verbosity: 20, ..Config::default() };
        assert!(conf.should_log(10));
        assert!(conf.should_log(20));
        assert!(!conf.should_log(30));
        assert!(!Config::default().should_log(1));
    }

    #[test]
    fn test_parse_env() {
        assert_eq!(parse_env::<u8>("OBSOLETE_TEST_SURELY_UNSET_VARIABLE", 7), 7);
        assert_eq!(parse_env_opt::<usize>("OBSOLETE_TEST_SURELY_UNSET_VARIABLE"), None);
    }

    #[test]
    fn test_malformed_env_falls_back() {
        std::env::set_var("OBSOLETE_TEST_MALFORMED_VERBOSITY", "loud");
        assert_eq!(parse_env::<u8>("OBSOLETE_TEST_MALFORMED_VERBOSITY", 7), 7);
        std::env::set_var("OBSOLETE_TEST_MALFORMED_DEPTH", "-3");
        assert_eq!(parse_env_opt::<usize>("OBSOLETE_TEST_MALFORMED_DEPTH"), None);
        std::env::set_var("OBSOLETE_TEST_MALFORMED_DEPTH", "12");
        assert_eq!(parse_env_opt::<usize>("OBSOLETE_TEST_MALFORMED_DEPTH"), Some(12));
    }
}
