use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_PATH: &str = "ServerConfig.yml";
pub const DEFAULT_ENV_PATH: &str = "Environment.yml";

/// Fallback used when the environment file is missing or unparsable: large
/// enough that the dispatcher's scheduled-termination predicate
/// (`(hh+1) % interval_hour == 0 && mm == 0`) effectively never fires.
const DEFAULT_INTERVAL_HOUR: i64 = 99_999;

/// Database connection settings, loaded from a YAML file whose path is the
/// sole CLI argument (or [`DEFAULT_CONFIG_PATH`] when none is given).
///
/// `${VAR}` / `$VAR` references in the file are expanded against the process
/// environment before the YAML is parsed, mirroring the historical
/// `os.ExpandEnv`-before-`yaml.Unmarshal` two-step.
#[derive(Debug)]
pub struct DbConfig {
    pub dbhost: String,
    pub dbname: String,
    pub dbuser: String,
    pub dbpw: String,
}

#[derive(Debug, Deserialize)]
struct RawDbConfig {
    #[serde(rename = "Dbhost", default)]
    dbhost: Option<String>,
    #[serde(rename = "Dbname")]
    dbname: String,
    #[serde(rename = "Dbuser")]
    dbuser: String,
    #[serde(rename = "Dbpw")]
    dbpw: String,
}

/// Controls the dispatcher's bounded-lifetime termination predicate.
#[derive(Debug, Clone, Copy)]
pub struct Environment {
    pub interval_hour: i64,
}

#[derive(Debug, Deserialize)]
struct RawEnvironment {
    #[serde(rename = "IntervalHour")]
    interval_hour: i64,
}

pub fn load_db_config(path: &str) -> Result<DbConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| Error::Config(format!("couldn't read `{path}`: {err}")))?;
    let expanded = expand_env_vars(&raw);

    let raw_config: RawDbConfig = serde_yaml::from_str(&expanded)
        .map_err(|err| Error::Config(format!("couldn't parse `{path}`: {err}")))?;

    Ok(DbConfig {
        dbhost: raw_config.dbhost.unwrap_or_default(),
        dbname: raw_config.dbname,
        dbuser: raw_config.dbuser,
        dbpw: raw_config.dbpw,
    })
}

/// Unlike `load_db_config`, a missing or unparsable environment file is not
/// fatal: it degrades to [`DEFAULT_INTERVAL_HOUR`], matching the historical
/// `"Set IntervalMin to 99999"` fallback rather than aborting startup.
pub fn load_environment(path: &str) -> Environment {
    let parsed = std::fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_yaml::from_str::<RawEnvironment>(&expand_env_vars(&raw)).ok());

    match parsed {
        Some(raw) => Environment {
            interval_hour: raw.interval_hour,
        },
        None => {
            tracing::warn!(
                path,
                default = DEFAULT_INTERVAL_HOUR,
                "couldn't load environment file, IntervalHour will effectively never trigger shutdown"
            );
            Environment {
                interval_hour: DEFAULT_INTERVAL_HOUR,
            }
        }
    }
}

/// Expands `${NAME}` and `$NAME` references using the process environment.
/// Unknown variables expand to an empty string, matching Go's `os.ExpandEnv`.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        match chars.peek() {
            Some('{') => {
                chars.next();
                let mut name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    name.push(c);
                }
                out.push_str(&std::env::var(&name).unwrap_or_default());
            }
            Some(&c) if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(&std::env::var(&name).unwrap_or_default());
            }
            _ => out.push('$'),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_braced_and_bare_vars() {
        unsafe {
            std::env::set_var("RANKWATCH_TEST_HOST", "db.internal");
        }
        let input = "Dbhost: ${RANKWATCH_TEST_HOST}\nDbname: $RANKWATCH_TEST_HOST\n";
        let expanded = expand_env_vars(input);
        assert_eq!(expanded, "Dbhost: db.internal\nDbname: db.internal\n");
    }

    #[test]
    fn unknown_var_expands_to_empty() {
        let expanded = expand_env_vars("x: ${RANKWATCH_DEFINITELY_UNSET_VAR}");
        assert_eq!(expanded, "x: ");
    }

    #[test]
    fn missing_environment_file_falls_back_to_default_interval() {
        let env = load_environment("/nonexistent/Environment.yml");
        assert_eq!(env.interval_hour, DEFAULT_INTERVAL_HOUR);
    }
}
