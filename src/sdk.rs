use std::io::Write;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, info, warn};
use serde::Deserialize;
use tempfile::NamedTempFile;

use crate::config::Config;
use crate::error::{PruneError, Result};
use crate::runner::CommandRunner;

/// Where gcloud gets its identity from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Credential file already present on disk, e.g. written by an auth step.
    File(PathBuf),
    /// Inline key, JSON or base64-encoded JSON.
    Key(String),
}

impl Credentials {
    /// The ambient credential file wins over an inline key.
    pub fn select(file: Option<&Path>, key: Option<&str>) -> Option<Self> {
        match (file, key) {
            (Some(file), key) => {
                if key.is_some() {
                    warn!(
                        "both a credentials file ({}) and inline credentials are set, using the file",
                        file.display()
                    );
                }
                Some(Credentials::File(file.to_path_buf()))
            }
            (None, Some(key)) => Some(Credentials::Key(key.to_string())),
            (None, None) => None,
        }
    }
}

#[derive(Deserialize)]
struct KeyFile {
    project_id: Option<String>,
}

/// Key JSON, decoding it first when it was passed base64-encoded.
pub fn decode_key(key: &str) -> Result<String> {
    let key = key.trim();
    if key.starts_with('{') {
        return Ok(key.to_string());
    }
    let bytes = STANDARD
        .decode(key)
        .map_err(|e| PruneError::config(format!("credentials are neither JSON nor base64: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|_| PruneError::config("decoded credentials are not valid UTF-8"))
}

/// `project_id` field of a service account key, if it has one.
pub fn project_from_key(key: &str) -> Result<Option<String>> {
    let key: KeyFile = serde_json::from_str(&decode_key(key)?)?;
    Ok(key.project_id.filter(|p| !p.is_empty()))
}

/// Installation and authentication of the cloud CLI.
pub trait CloudSdk {
    fn is_installed(&self) -> Result<bool>;
    fn latest_version(&self) -> Result<String>;
    fn install(&self, version: &str) -> Result<()>;
    fn authenticate(&self, credentials: &Credentials) -> Result<()>;
    fn is_authenticated(&self) -> Result<bool>;
    fn is_project_id_set(&self) -> Result<bool>;
    fn set_project(&self, project_id: &str) -> Result<()>;
    /// Program to invoke for `app versions` commands.
    fn tool_command(&self) -> &str;
}

pub struct Gcloud<'a, R: CommandRunner> {
    runner: &'a R,
    path: String,
}

impl<'a, R: CommandRunner> Gcloud<'a, R> {
    pub fn new(runner: &'a R, path: impl Into<String>) -> Self {
        Self {
            runner,
            path: path.into(),
        }
    }

    fn args(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    fn login(&self, cred_file: &Path) -> Result<()> {
        let args = vec![
            "auth".to_string(),
            "login".to_string(),
            format!("--cred-file={}", cred_file.display()),
            "--quiet".to_string(),
        ];
        let output = self.runner.run(&self.path, &args)?;
        if !output.success() {
            return Err(PruneError::Auth(format!(
                "gcloud auth login failed: {}",
                output.stderr.trim()
            )));
        }
        Ok(())
    }
}

impl<'a, R: CommandRunner> CloudSdk for Gcloud<'a, R> {
    fn is_installed(&self) -> Result<bool> {
        match self.runner.run(&self.path, &Self::args(&["version"])) {
            Ok(output) => Ok(output.success()),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn latest_version(&self) -> Result<String> {
        Err(PruneError::Sdk(format!(
            "{} was not found and resolving SDK releases is not supported; install the Cloud SDK first",
            self.path
        )))
    }

    fn install(&self, version: &str) -> Result<()> {
        Err(PruneError::Sdk(format!(
            "installing Cloud SDK {} is not supported; install it before running",
            version
        )))
    }

    fn authenticate(&self, credentials: &Credentials) -> Result<()> {
        match credentials {
            Credentials::File(path) => {
                info!("authenticating with credential file {}", path.display());
                self.login(path)
            }
            Credentials::Key(key) => {
                info!("authenticating with inline credentials");
                // removed again when `file` drops
                let mut file = NamedTempFile::new()?;
                file.write_all(decode_key(key)?.as_bytes())?;
                file.flush()?;
                self.login(file.path())
            }
        }
    }

    fn is_authenticated(&self) -> Result<bool> {
        let output = self.runner.run_checked(
            &self.path,
            &Self::args(&[
                "auth",
                "list",
                "--filter=status:ACTIVE",
                "--format=value(account)",
            ]),
        )?;
        Ok(!output.stdout.trim().is_empty())
    }

    fn is_project_id_set(&self) -> Result<bool> {
        let output = self
            .runner
            .run_checked(&self.path, &Self::args(&["config", "get-value", "project"]))?;
        let project = output.stdout.trim();
        debug!("configured project: {:?}", project);
        Ok(!project.is_empty() && project != "(unset)")
    }

    fn set_project(&self, project_id: &str) -> Result<()> {
        self.runner.run_checked(
            &self.path,
            &Self::args(&["config", "set", "project", project_id]),
        )?;
        Ok(())
    }

    fn tool_command(&self) -> &str {
        &self.path
    }
}

/// Gets the SDK installed, authenticated and pointed at a project.
///
/// Returns the project id the run should pass explicitly, which is the
/// configured one or, failing that, the one named in an inline key. `None`
/// means gcloud's own default project is used.
pub fn ensure_ready<S: CloudSdk>(sdk: &S, config: &Config) -> Result<Option<String>> {
    if !sdk.is_installed()? {
        let version = sdk.latest_version()?;
        sdk.install(&version)?;
    }

    let credentials = Credentials::select(
        config.credentials_file.as_deref(),
        config.credentials.as_deref(),
    );

    let mut project_id = config.target.project_id.clone();
    if project_id.is_none() {
        if let Some(Credentials::Key(key)) = &credentials {
            project_id = project_from_key(key)?;
        }
    }
    if project_id.is_none() && !sdk.is_project_id_set()? {
        return Err(PruneError::config("No project Id provided."));
    }

    if let Some(credentials) = &credentials {
        sdk.authenticate(credentials)?;
    }

    if let Some(project_id) = &project_id {
        sdk.set_project(project_id)?;
    }

    if !sdk.is_authenticated()? {
        return Err(PruneError::Auth(
            "Error authenticating the Cloud SDK.".to_string(),
        ));
    }

    Ok(project_id)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    use crate::config::{Config, FileConfig, RawInputs};
    use crate::error::PruneError;
    use crate::runner::scripted::ScriptedRunner;
    use crate::sdk::{
        decode_key, ensure_ready, project_from_key, CloudSdk, Credentials, Gcloud,
    };

    const KEY: &str = r#"{"type": "service_account", "project_id": "key-project"}"#;

    fn config(raw: RawInputs) -> Config {
        Config::resolve(
            RawInputs {
                limit: Some("2".to_string()),
                ..raw
            },
            FileConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn file_takes_precedence_over_key() {
        let file = PathBuf::from("/tmp/creds.json");
        assert_eq!(
            Credentials::select(Some(file.as_path()), Some(KEY)),
            Some(Credentials::File(file.clone()))
        );
        assert_eq!(
            Credentials::select(None, Some(KEY)),
            Some(Credentials::Key(KEY.to_string()))
        );
        assert_eq!(Credentials::select(None, None), None);
    }

    #[test]
    fn reads_project_from_key() {
        assert_eq!(
            project_from_key(KEY).unwrap().as_deref(),
            Some("key-project")
        );
        assert_eq!(project_from_key("{}").unwrap(), None);
        assert!(matches!(
            project_from_key("not json"),
            Err(PruneError::Json(_))
        ));
    }

    #[test]
    fn base64_key_is_decoded() {
        let encoded = STANDARD.encode(KEY);
        assert_eq!(
            encoded,
            "eyJ0eXBlIjogInNlcnZpY2VfYWNjb3VudCIsICJwcm9qZWN0X2lkIjogImtleS1wcm9qZWN0In0="
        );
        assert_eq!(decode_key(&encoded).unwrap(), KEY);
        assert_eq!(decode_key(&format!("  {}\n", KEY)).unwrap(), KEY);
        assert_eq!(
            project_from_key(&encoded).unwrap().as_deref(),
            Some("key-project")
        );
        assert!(matches!(decode_key("not base64!"), Err(PruneError::Config(_))));
    }

    #[test]
    fn base64_key_supplies_project_and_logs_in() {
        let runner = ScriptedRunner::new()
            .ok("")
            .ok("") // auth login
            .ok("") // config set project
            .ok("ci@key-project.iam.gserviceaccount.com\n");
        let gcloud = Gcloud::new(&runner, "gcloud");
        let config = config(RawInputs {
            credentials: Some(STANDARD.encode(KEY)),
            ..RawInputs::default()
        });

        let project = ensure_ready(&gcloud, &config).unwrap();
        assert_eq!(project.as_deref(), Some("key-project"));
        assert_eq!(runner.args(2), vec!["config", "set", "project", "key-project"]);
    }

    #[test]
    fn failed_login_is_auth_error() {
        let runner = ScriptedRunner::new()
            .ok("")
            .fail(1, "ERROR: (gcloud.auth.login) invalid key");
        let gcloud = Gcloud::new(&runner, "gcloud");
        let config = config(RawInputs {
            project_id: Some("my-project".to_string()),
            credentials: Some(KEY.to_string()),
            ..RawInputs::default()
        });

        match ensure_ready(&gcloud, &config) {
            Err(PruneError::Auth(msg)) => assert!(msg.contains("invalid key")),
            other => panic!("expected Auth, got {:?}", other),
        }
    }

    #[test]
    fn missing_binary_is_not_installed() {
        let runner = ScriptedRunner::new().missing();
        let gcloud = Gcloud::new(&runner, "gcloud");
        assert!(!gcloud.is_installed().unwrap());
    }

    #[test]
    fn unset_project_is_detected() {
        let runner = ScriptedRunner::new().ok("(unset)\n").ok("my-project\n");
        let gcloud = Gcloud::new(&runner, "gcloud");
        assert!(!gcloud.is_project_id_set().unwrap());
        assert!(gcloud.is_project_id_set().unwrap());
    }

    #[test]
    fn ready_with_explicit_project() {
        let runner = ScriptedRunner::new()
            .ok("Google Cloud SDK 450.0.0\n") // version
            .ok("") // config set project
            .ok("ci@my-project.iam.gserviceaccount.com\n"); // auth list
        let gcloud = Gcloud::new(&runner, "gcloud");
        let config = config(RawInputs {
            project_id: Some("my-project".to_string()),
            ..RawInputs::default()
        });

        let project = ensure_ready(&gcloud, &config).unwrap();
        assert_eq!(project.as_deref(), Some("my-project"));
        assert_eq!(runner.args(1), vec!["config", "set", "project", "my-project"]);
        assert_eq!(runner.call_count(), 3);
    }

    #[test]
    fn inline_key_supplies_project_and_logs_in() {
        let runner = ScriptedRunner::new()
            .ok("Google Cloud SDK 450.0.0\n")
            .ok("") // auth login
            .ok("") // config set project
            .ok("ci@key-project.iam.gserviceaccount.com\n");
        let gcloud = Gcloud::new(&runner, "gcloud");
        let config = config(RawInputs {
            credentials: Some(KEY.to_string()),
            ..RawInputs::default()
        });

        let project = ensure_ready(&gcloud, &config).unwrap();
        assert_eq!(project.as_deref(), Some("key-project"));

        let login = runner.args(1);
        assert_eq!(&login[..2], &["auth", "login"]);
        assert!(login[2].starts_with("--cred-file="));
        assert_eq!(runner.args(2), vec!["config", "set", "project", "key-project"]);
    }

    #[test]
    fn credential_file_is_used_directly() {
        let runner = ScriptedRunner::new()
            .ok("")
            .ok("") // auth login
            .ok("") // config set project
            .ok("ci@my-project.iam.gserviceaccount.com\n");
        let gcloud = Gcloud::new(&runner, "gcloud");
        let config = config(RawInputs {
            project_id: Some("my-project".to_string()),
            credentials: Some(KEY.to_string()),
            credentials_file: Some(PathBuf::from("/runner/creds.json")),
            ..RawInputs::default()
        });

        ensure_ready(&gcloud, &config).unwrap();
        assert_eq!(
            runner.args(1),
            vec!["auth", "login", "--cred-file=/runner/creds.json", "--quiet"]
        );
    }

    #[test]
    fn no_project_anywhere_fails_before_auth() {
        let runner = ScriptedRunner::new().ok("").ok("(unset)\n");
        let gcloud = Gcloud::new(&runner, "gcloud");
        let config = config(RawInputs::default());

        let res = ensure_ready(&gcloud, &config);
        assert!(matches!(res, Err(PruneError::Config(_))));
        assert_eq!(runner.call_count(), 2);
    }

    #[test]
    fn ambient_default_project_is_enough() {
        let runner = ScriptedRunner::new()
            .ok("")
            .ok("my-project\n") // config get-value project
            .ok("ci@my-project.iam.gserviceaccount.com\n");
        let gcloud = Gcloud::new(&runner, "gcloud");

        let project = ensure_ready(&gcloud, &config(RawInputs::default())).unwrap();
        assert_eq!(project, None);
    }

    #[test]
    fn no_active_account_is_auth_error() {
        let runner = ScriptedRunner::new().ok("").ok("").ok("\n");
        let gcloud = Gcloud::new(&runner, "gcloud");
        let config = config(RawInputs {
            project_id: Some("my-project".to_string()),
            ..RawInputs::default()
        });

        assert!(matches!(
            ensure_ready(&gcloud, &config),
            Err(PruneError::Auth(_))
        ));
    }

    #[test]
    fn missing_sdk_cannot_be_installed() {
        let runner = ScriptedRunner::new().missing();
        let gcloud = Gcloud::new(&runner, "/nowhere/gcloud");
        let res = ensure_ready(&gcloud, &config(RawInputs::default()));
        assert!(matches!(res, Err(PruneError::Sdk(_))));
        assert_eq!(gcloud.tool_command(), "/nowhere/gcloud");
    }
}
