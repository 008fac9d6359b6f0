use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::constants::AAP_JOB_TEMPLATE_ID_PREFIX;
use crate::fs::write_private_file;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EnvFileError {
    #[error("Environment file `{path}` already exists, use --force to overwrite it.")]
    AlreadyExists { path: String },
    #[error("Environment file `{path}` not found, run `workshop init` first.")]
    NotFound { path: String },
    #[error("Cannot read environment file `{path}`: {raw_error_message}")]
    CannotRead { path: String, raw_error_message: String },
    #[error("Cannot write environment file `{path}`: {raw_error_message}")]
    CannotWrite { path: String, raw_error_message: String },
    #[error("Invalid environment variable name `{key}`.")]
    InvalidKey { key: String },
    #[error("Invalid line {line} in environment file: {raw_error_message}")]
    InvalidLine { line: usize, raw_error_message: String },
    #[error("Missing `{key}` in environment file `{path}`.")]
    MissingKey { key: String, path: String },
}

#[derive(Debug, Clone, PartialEq)]
enum EnvLine {
    Entry { key: String, value: String },
    Other(String),
}

/// Shell sourceable `export KEY='value'` file, rewritten as a whole on every change.
#[derive(Clone, PartialEq)]
pub struct EnvFile {
    path: PathBuf,
    lines: Vec<EnvLine>,
}

// values are credentials
impl fmt::Debug for EnvFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvFile")
            .field("path", &self.path)
            .field("keys", &self.keys())
            .finish()
    }
}

impl EnvFile {
    /// Creates the file with the given entries. An existing file is kept unless `force` is set.
    pub fn create(path: &Path, entries: &[(&str, String)], force: bool) -> Result<Self, EnvFileError> {
        if path.exists() && !force {
            return Err(EnvFileError::AlreadyExists {
                path: path.display().to_string(),
            });
        }

        let mut lines = vec![
            EnvLine::Other(format!("# Workshop environment generated on {}", Utc::now().to_rfc3339())),
            EnvLine::Other("# Load it in a shell with: source .env".to_string()),
        ];
        for (key, value) in entries {
            validate_key(key)?;
            lines.push(EnvLine::Entry {
                key: key.to_string(),
                value: value.to_string(),
            });
        }

        let env_file = EnvFile {
            path: path.to_path_buf(),
            lines,
        };
        env_file.save()?;
        info!("Environment file written to {}", path.display());

        Ok(env_file)
    }

    pub fn load(path: &Path) -> Result<Self, EnvFileError> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EnvFileError::NotFound {
                path: path.display().to_string(),
            },
            _ => EnvFileError::CannotRead {
                path: path.display().to_string(),
                raw_error_message: e.to_string(),
            },
        })?;

        Ok(EnvFile {
            path: path.to_path_buf(),
            lines: parse_lines(&content)?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        // last definition wins, as in a shell
        self.lines.iter().rev().find_map(|line| match line {
            EnvLine::Entry { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn require(&self, key: &str) -> Result<&str, EnvFileError> {
        self.get(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| EnvFileError::MissingKey {
                key: key.to_string(),
                path: self.path.display().to_string(),
            })
    }

    pub fn get_id(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn keys(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                EnvLine::Entry { key, .. } => Some(key.as_str()),
                EnvLine::Other(_) => None,
            })
            .collect()
    }

    /// Every entry, in file order, as exported to child processes.
    pub fn to_envs(&self) -> Vec<(String, String)> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                EnvLine::Entry { key, value } => Some((key.to_string(), value.to_string())),
                EnvLine::Other(_) => None,
            })
            .collect()
    }

    /// Replaces the line defining `key` in place, or appends it. The file is saved right away.
    pub fn upsert(&mut self, key: &str, value: &str) -> Result<(), EnvFileError> {
        validate_key(key)?;

        let mut replaced = false;
        for line in self.lines.iter_mut() {
            if let EnvLine::Entry { key: k, value: v } = line {
                if k == key {
                    *v = value.to_string();
                    replaced = true;
                }
            }
        }
        if !replaced {
            self.lines.push(EnvLine::Entry {
                key: key.to_string(),
                value: value.to_string(),
            });
        }

        debug!("{} {} in {}", if replaced { "Updated" } else { "Added" }, key, self.path.display());
        self.save()
    }

    pub fn render(&self) -> String {
        let mut content = self
            .lines
            .iter()
            .map(|line| match line {
                EnvLine::Entry { key, value } => format!("export {}={}", key, shell_quote(value)),
                EnvLine::Other(raw) => raw.to_string(),
            })
            .collect::<Vec<String>>()
            .join("\n");
        content.push('\n');
        content
    }

    fn save(&self) -> Result<(), EnvFileError> {
        write_private_file(&self.path, &self.render()).map_err(|e| EnvFileError::CannotWrite {
            path: self.path.display().to_string(),
            raw_error_message: e.to_string(),
        })
    }
}

/// `.env` key recording the id of a job template: `Deploy App` gives `AAP_JOB_TEMPLATE_DEPLOY_APP_ID`.
pub fn job_template_env_key(template_name: &str) -> String {
    let slug = template_name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_ascii_uppercase())
        .collect::<Vec<String>>()
        .join("_");

    format!("{AAP_JOB_TEMPLATE_ID_PREFIX}{slug}_ID")
}

fn validate_key(key: &str) -> Result<(), EnvFileError> {
    let mut chars = key.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_') && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    match valid {
        true => Ok(()),
        false => Err(EnvFileError::InvalidKey { key: key.to_string() }),
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

fn parse_lines(content: &str) -> Result<Vec<EnvLine>, EnvFileError> {
    let mut lines = vec![];
    for (idx, raw) in content.lines().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            lines.push(EnvLine::Other(raw.to_string()));
            continue;
        }

        let assignment = trimmed
            .strip_prefix("export ")
            .map(|s| s.trim_start())
            .unwrap_or(trimmed);
        let (key, raw_value) = assignment.split_once('=').ok_or_else(|| EnvFileError::InvalidLine {
            line: idx + 1,
            raw_error_message: "expected KEY=value".to_string(),
        })?;
        validate_key(key)?;

        let value = shell_unquote(raw_value).map_err(|raw_error_message| EnvFileError::InvalidLine {
            line: idx + 1,
            raw_error_message,
        })?;
        lines.push(EnvLine::Entry {
            key: key.to_string(),
            value,
        });
    }

    Ok(lines)
}

/// Reads a single shell word: quoted segments are concatenated, unquoted text stops at the
/// first blank, a trailing `# comment` is dropped.
fn shell_unquote(raw: &str) -> Result<String, String> {
    let mut value = String::new();
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' => loop {
                match chars.next() {
                    Some('\'') => break,
                    Some(c) => value.push(c),
                    None => return Err("unterminated single quote".to_string()),
                }
            },
            '"' => loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some(escaped @ ('"' | '\\' | '$' | '`')) => value.push(escaped),
                        Some(other) => {
                            value.push('\\');
                            value.push(other);
                        }
                        None => return Err("unterminated double quote".to_string()),
                    },
                    Some(c) => value.push(c),
                    None => return Err("unterminated double quote".to_string()),
                }
            },
            '\\' => {
                if let Some(escaped) = chars.next() {
                    value.push(escaped);
                }
            }
            c if c.is_whitespace() => break,
            c => value.push(c),
        }
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_create_is_write_once() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(".env");

        EnvFile::create(&path, &[("WORKSHOP_GUID", "abc12".to_string())], false).expect("created");
        assert_eq!(
            EnvFile::create(&path, &[("WORKSHOP_GUID", "zzz99".to_string())], false),
            Err(EnvFileError::AlreadyExists {
                path: path.display().to_string()
            })
        );
        assert_eq!(EnvFile::load(&path).expect("loaded").get("WORKSHOP_GUID"), Some("abc12"));

        EnvFile::create(&path, &[("WORKSHOP_GUID", "zzz99".to_string())], true).expect("forced");
        assert_eq!(EnvFile::load(&path).expect("loaded").get("WORKSHOP_GUID"), Some("zzz99"));
    }

    #[test]
    fn test_values_are_single_quoted() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(".env");

        let env_file =
            EnvFile::create(&path, &[("OCP_PASSWORD", "it's a $ecret".to_string())], false).expect("created");

        let content = fs::read_to_string(&path).expect("readable");
        assert!(content.starts_with("# Workshop environment generated on "));
        assert!(content.contains("export OCP_PASSWORD='it'\\''s a $ecret'\n"));
        assert_eq!(EnvFile::load(&path).expect("loaded"), env_file);
        assert_eq!(EnvFile::load(&path).expect("loaded").get("OCP_PASSWORD"), Some("it's a $ecret"));
    }

    #[test]
    fn test_upsert_replaces_in_place_and_appends() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(".env");
        fs::write(
            &path,
            "# hand written\nexport AAP_URL='https://aap.example.com'\nAAP_PROJECT_ID=1\n\n# keep me\nWORKSHOP_GUID=abc12\n",
        )
        .expect("fixture written");

        let mut env_file = EnvFile::load(&path).expect("loaded");
        env_file.upsert("AAP_PROJECT_ID", "42").expect("replaced");
        env_file.upsert("AAP_INVENTORY_ID", "7").expect("appended");

        assert_eq!(
            fs::read_to_string(&path).expect("readable"),
            "# hand written\nexport AAP_URL='https://aap.example.com'\nexport AAP_PROJECT_ID='42'\n\n# keep me\n\
             export WORKSHOP_GUID='abc12'\nexport AAP_INVENTORY_ID='7'\n"
        );
        assert_eq!(
            env_file.keys(),
            vec!["AAP_URL", "AAP_PROJECT_ID", "WORKSHOP_GUID", "AAP_INVENTORY_ID"]
        );
        assert_eq!(env_file.get_id("AAP_PROJECT_ID"), Some(42));
    }

    #[test]
    fn test_reader_accepts_shell_forms() {
        let lines = parse_lines(
            "export A=plain\nB='single quoted'\nC=\"double \\\"quoted\\\" $HOME\"\nD=value # comment\nE=\n",
        )
        .expect("valid lines");

        let env_file = EnvFile {
            path: PathBuf::from(".env"),
            lines,
        };
        assert_eq!(env_file.get("A"), Some("plain"));
        assert_eq!(env_file.get("B"), Some("single quoted"));
        assert_eq!(env_file.get("C"), Some("double \"quoted\" $HOME"));
        assert_eq!(env_file.get("D"), Some("value"));
        assert_eq!(env_file.get("E"), Some(""));
        assert!(env_file.require("E").is_err());
    }

    #[test]
    fn test_invalid_content() {
        assert!(matches!(
            parse_lines("not an assignment\n"),
            Err(EnvFileError::InvalidLine { line: 1, .. })
        ));
        assert!(matches!(
            parse_lines("A='unterminated\n"),
            Err(EnvFileError::InvalidLine { line: 1, .. })
        ));
        assert_eq!(
            parse_lines("1BAD=x\n"),
            Err(EnvFileError::InvalidKey { key: "1BAD".to_string() })
        );
        assert!(matches!(
            EnvFile::load(Path::new("/this/path/does/not/exist/.env")),
            Err(EnvFileError::NotFound { .. })
        ));
    }

    #[test]
    fn test_job_template_env_key() {
        assert_eq!(job_template_env_key("Deploy App"), "AAP_JOB_TEMPLATE_DEPLOY_APP_ID");
        assert_eq!(
            job_template_env_key("  CICS / deploy-v2 (prod) "),
            "AAP_JOB_TEMPLATE_CICS_DEPLOY_V2_PROD_ID"
        );
    }
}
