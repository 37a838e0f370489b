//! Hand-off to the external provisioning engine.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{CommandSpec, ProvisionerConfig};
use crate::error::{Result, StackError};
use crate::resources::{StackOutputs, DEPLOYMENT_ID, URL_OUTPUT};
use crate::stack::WrittenAssembly;

/// Provisioning engine that reconciles a written assembly.
pub trait Provisioner {
    /// Short description for logs.
    fn describe(&self) -> String;

    /// Create or update the stack and report its outputs.
    fn provision(&self, assembly: &WrittenAssembly) -> Result<StackOutputs>;
}

/// Provisioner that runs configured commands.
///
/// Steps run in order with placeholders substituted; the first failing
/// step aborts. Outputs come from the outputs command when configured,
/// otherwise from the last step's stdout.
#[derive(Debug, Clone)]
pub struct CommandProvisioner {
    stack_name: String,
    region: String,
    steps: Vec<CommandSpec>,
    outputs: Option<CommandSpec>,
    events: Option<CommandSpec>,
    working_dir: PathBuf,
}

impl CommandProvisioner {
    /// Create from the provisioner config, running commands in `working_dir`.
    pub fn from_config(config: &ProvisionerConfig, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            stack_name: config.stack_name.clone(),
            region: config.region.clone(),
            steps: config.steps.clone(),
            outputs: config.outputs.clone(),
            events: config.events.clone(),
            working_dir: working_dir.into(),
        }
    }

    fn substitute(&self, arg: &str, assembly: &WrittenAssembly) -> String {
        arg.replace("{template}", &assembly.template_path.to_string_lossy())
            .replace("{assets}", &assembly.assets_path.to_string_lossy())
            .replace("{out_dir}", &assembly.out_dir.to_string_lossy())
            .replace("{stack}", &self.stack_name)
            .replace("{region}", &self.region)
    }

    fn run(&self, spec: &CommandSpec, assembly: &WrittenAssembly) -> Result<String> {
        let args: Vec<String> = spec
            .args
            .iter()
            .map(|arg| self.substitute(arg, assembly))
            .collect();
        let shown = describe_command(&spec.command, &args);

        debug!(command = %shown, "running provisioning step");
        let output = Command::new(&spec.command)
            .args(&args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                StackError::Provisioning(format!("failed to start `{}`: {}", shown, e))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !stdout.trim().is_empty() {
            debug!(command = %shown, "{}", stdout.trim_end());
        }

        if !output.status.success() {
            return Err(classify_failure(&shown, &output.status.to_string(), &stdout, &stderr));
        }
        Ok(stdout)
    }
}

impl CommandProvisioner {
    /// Look up failed resource events after a step failed.
    ///
    /// The deploy command itself only reports that the stack update failed;
    /// the events say whether the deployment resource was the one rejected.
    fn reclassify(&self, error: StackError, assembly: &WrittenAssembly) -> StackError {
        let (StackError::Provisioning(message), Some(events)) = (&error, &self.events) else {
            return error;
        };

        match self.run(events, assembly) {
            Ok(stdout) => match stdout.lines().find(|line| mentions_failed_deployment(line)) {
                Some(line) => StackError::Reconciliation(format!("{} ({})", line.trim(), message)),
                None => error,
            },
            Err(e) => {
                debug!(error = %e, "failed to query stack events");
                error
            }
        }
    }
}

impl Provisioner for CommandProvisioner {
    fn describe(&self) -> String {
        match self.steps.last() {
            Some(step) => describe_command(&step.command, &step.args),
            None => "no provisioning steps".to_string(),
        }
    }

    fn provision(&self, assembly: &WrittenAssembly) -> Result<StackOutputs> {
        if self.steps.is_empty() {
            warn!("no provisioning steps configured");
        }

        let mut last_stdout = String::new();
        for (i, step) in self.steps.iter().enumerate() {
            info!(step = i + 1, total = self.steps.len(), command = %step.command, "provisioning");
            last_stdout = self
                .run(step, assembly)
                .map_err(|e| self.reclassify(e, assembly))?;
        }

        let stdout = match self.outputs {
            Some(ref spec) => self.run(spec, assembly)?,
            None => last_stdout,
        };
        parse_outputs(&stdout)
    }
}

fn describe_command(command: &str, args: &[String]) -> String {
    if args.is_empty() {
        command.to_string()
    } else {
        format!("{} {}", command, args.join(" "))
    }
}

/// Classify a failed engine command.
///
/// Failures reported against the deployment resource mean the stack itself
/// was created but uploading or invalidating the assets was rejected.
pub fn classify_failure(command: &str, status: &str, stdout: &str, stderr: &str) -> StackError {
    let reconciliation = stderr
        .lines()
        .chain(stdout.lines())
        .find(|line| mentions_failed_deployment(line));

    match reconciliation {
        Some(line) => StackError::Reconciliation(line.trim().to_string()),
        None => {
            let detail = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .map(|l| format!(": {}", l.trim()))
                .unwrap_or_default();
            StackError::Provisioning(format!("`{}` failed ({}){}", command, status, detail))
        }
    }
}

fn mentions_failed_deployment(line: &str) -> bool {
    let tokens: Vec<&str> = line
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .collect();
    tokens.contains(&DEPLOYMENT_ID)
        && tokens.iter().any(|t| *t == "FAILED" || t.ends_with("_FAILED"))
}

/// Parse engine stdout into outputs.
///
/// JSON is preferred; otherwise the first `https://` token is taken as the
/// URL.
pub fn parse_outputs(stdout: &str) -> Result<StackOutputs> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(StackOutputs::new());
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return StackOutputs::from_json(&value);
    }

    let mut outputs = StackOutputs::new();
    if let Some(url) = extract_url(trimmed) {
        outputs.insert(URL_OUTPUT, url);
    }
    Ok(outputs)
}

fn extract_url(output: &str) -> Option<String> {
    for line in output.lines() {
        if let Some(start) = line.find("https://") {
            let url_part = &line[start..];
            let end = url_part
                .find(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == ',')
                .unwrap_or(url_part.len());
            return Some(url_part[..end].trim_end_matches('/').to_string());
        }
    }
    None
}

/// Working directory for engine commands: the directory holding the config.
pub fn engine_working_dir(base_dir: &Path) -> PathBuf {
    if base_dir.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        base_dir.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_outputs_json_list() {
        let outputs = parse_outputs(
            r#"[{"OutputKey": "DistributionDomainName", "OutputValue": "d1.cloudfront.net"}]"#,
        )
        .unwrap();
        assert_eq!(outputs.url().unwrap(), "https://d1.cloudfront.net");
    }

    #[test]
    fn test_parse_outputs_text_fallback() {
        let outputs = parse_outputs(
            "Stack ServerlessSsrStack\nOutputs:\n  URL = https://d2.cloudfront.net/ (ready)\n",
        )
        .unwrap();
        assert_eq!(outputs.get(URL_OUTPUT), Some("https://d2.cloudfront.net"));
        assert!(parse_outputs("").unwrap().is_empty());
        assert!(parse_outputs("done").unwrap().is_empty());
    }

    #[test]
    fn test_failure_classification() {
        let err = classify_failure(
            "aws cloudformation deploy",
            "exit status: 255",
            "",
            "Deployment  Custom::CDKBucketDeployment  CREATE_FAILED  AccessDenied\n",
        );
        assert_eq!(err.kind(), ErrorKind::Reconciliation);

        let err = classify_failure(
            "aws cloudformation deploy",
            "exit status: 255",
            "",
            "Distribution  CREATE_FAILED  Invalid request\n",
        );
        assert_eq!(err.kind(), ErrorKind::Provisioning);
        assert!(err.to_string().contains("Invalid request"));

        // Prose mentioning deployment is not a resource failure
        let err = classify_failure("x", "exit status: 1", "", "Deployment of stack failed\n");
        assert_eq!(err.kind(), ErrorKind::Provisioning);
    }

    #[test]
    fn test_engine_working_dir() {
        assert_eq!(engine_working_dir(Path::new("")), PathBuf::from("."));
        assert_eq!(engine_working_dir(Path::new("/app")), PathBuf::from("/app"));
    }

    #[cfg(unix)]
    mod commands {
        use super::super::*;
        use crate::asset::{AssetManifest, ASSET_MANIFEST_VERSION};
        use crate::error::ErrorKind;
        use crate::stack::CloudAssembly;
        use crate::template::Template;
        use std::collections::BTreeMap;

        fn written(dir: &Path) -> WrittenAssembly {
            CloudAssembly {
                stack_name: "TestStack".into(),
                template: Template::new(),
                assets: AssetManifest {
                    version: ASSET_MANIFEST_VERSION.into(),
                    files: BTreeMap::new(),
                },
            }
            .write(&dir.join("out"))
            .unwrap()
        }

        fn sh(script: &str) -> CommandSpec {
            CommandSpec::new("sh", &["-c", script])
        }

        fn provisioner(dir: &Path, steps: Vec<CommandSpec>, outputs: Option<CommandSpec>) -> CommandProvisioner {
            let config = ProvisionerConfig {
                stack_name: "TestStack".into(),
                steps,
                outputs,
                events: None,
                ..ProvisionerConfig::default()
            };
            CommandProvisioner::from_config(&config, dir)
        }

        #[test]
        fn test_steps_run_in_order_with_placeholders() {
            let dir = tempfile::tempdir().unwrap();
            let assembly = written(dir.path());
            let p = provisioner(
                dir.path(),
                vec![
                    sh("test -f {template} && echo publish >> log"),
                    sh("test -f {assets} && echo {stack}-{region} >> log"),
                ],
                Some(sh(r#"echo '{"DistributionDomainName": "d3.cloudfront.net"}'"#)),
            );

            let outputs = p.provision(&assembly).unwrap();
            assert_eq!(outputs.url().unwrap(), "https://d3.cloudfront.net");
            let log = std::fs::read_to_string(dir.path().join("log")).unwrap();
            assert_eq!(log, "publish\nTestStack-us-east-1\n");
        }

        #[test]
        fn test_failing_step_aborts() {
            let dir = tempfile::tempdir().unwrap();
            let assembly = written(dir.path());
            let p = provisioner(
                dir.path(),
                vec![sh("echo 'bad template' >&2; exit 3"), sh("touch second")],
                None,
            );

            let err = p.provision(&assembly).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Provisioning);
            assert!(err.to_string().contains("bad template"));
            assert!(!dir.path().join("second").exists());
        }

        #[test]
        fn test_failed_deployment_event_means_reconciliation() {
            let dir = tempfile::tempdir().unwrap();
            let assembly = written(dir.path());
            let mut p = provisioner(
                dir.path(),
                vec![sh("echo 'Failed to create/update the stack' >&2; exit 255")],
                None,
            );
            p.events = Some(sh(
                r"printf 'Deployment\tUPDATE_FAILED\tAccessDenied\nTestStack\tUPDATE_ROLLBACK_COMPLETE\tNone\n'",
            ));

            let err = p.provision(&assembly).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Reconciliation);
            assert!(err.to_string().contains("AccessDenied"));
            assert!(err.to_string().contains("Failed to create/update the stack"));
        }

        #[test]
        fn test_other_failed_events_stay_provisioning() {
            let dir = tempfile::tempdir().unwrap();
            let assembly = written(dir.path());
            let mut p = provisioner(dir.path(), vec![sh("exit 255")], None);
            p.events = Some(sh(r"printf 'Distribution\tCREATE_FAILED\tInvalid request\n'"));
            assert_eq!(p.provision(&assembly).unwrap_err().kind(), ErrorKind::Provisioning);

            // An events query that itself fails keeps the original error
            p.events = Some(sh("exit 1"));
            assert_eq!(p.provision(&assembly).unwrap_err().kind(), ErrorKind::Provisioning);
        }

        #[test]
        fn test_outputs_from_last_step() {
            let dir = tempfile::tempdir().unwrap();
            let assembly = written(dir.path());
            let p = provisioner(
                dir.path(),
                vec![sh("echo 'deployed: https://d4.cloudfront.net'")],
                None,
            );
            let outputs = p.provision(&assembly).unwrap();
            assert_eq!(outputs.url().unwrap(), "https://d4.cloudfront.net");
        }

        #[test]
        fn test_missing_engine() {
            let dir = tempfile::tempdir().unwrap();
            let assembly = written(dir.path());
            let p = provisioner(
                dir.path(),
                vec![CommandSpec::new("ssr-no-such-engine", &[])],
                None,
            );
            assert!(matches!(p.provision(&assembly), Err(StackError::Provisioning(_))));
        }
    }
}
